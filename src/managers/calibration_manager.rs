// CalibrationManager: Focused manager for calibration workflow
//
// Single Responsibility: drive the calibration procedure against a backend
// and keep the in-process calibration state in sync with the store.
//
// Locks are only held between awaits, never across them.

use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use log::{info, warn};

use crate::analyte::Analyte;
use crate::backend::Backend;
use crate::calibration::{
    CalibrationProcedure, CalibrationProgress, CalibrationState, MeasurementOutcome,
    MeasurementTicket,
};
use crate::error::{log_backend_error, log_calibration_error, CalibrationError};
use crate::managers::BroadcastChannelManager;
use crate::telemetry;

/// Manages calibration workflow and state persistence
///
/// Single Responsibility: Calibration lifecycle and state management
///
/// This manager handles:
/// - Solution selection and measurement sequencing
/// - The electrode stabilisation delay between fetch and read
/// - Pushing changed curves to the calibration store
/// - Loading stored curves into the shared calibration state
/// - Publishing progress on the calibration broadcast channel
///
/// # Example
/// ```ignore
/// let manager = CalibrationManager::new(backend, state, broadcasts, Duration::from_secs(30));
/// manager.select_concentration(50.0)?;
/// let outcome = manager.measure().await?;
/// ```
pub struct CalibrationManager<B: Backend> {
    backend: Arc<B>,
    procedure: Arc<Mutex<CalibrationProcedure>>,
    state: Arc<RwLock<CalibrationState>>,
    broadcasts: Arc<BroadcastChannelManager>,
    measurement_delay: Duration,
}

impl<B: Backend> CalibrationManager<B> {
    /// Create a new CalibrationManager
    ///
    /// # Arguments
    /// * `backend` - Sensor source and calibration store
    /// * `state` - Calibration state shared with live monitoring
    /// * `broadcasts` - Channel manager used for progress updates
    /// * `measurement_delay` - Wait between fetch request and voltage read
    pub fn new(
        backend: Arc<B>,
        state: Arc<RwLock<CalibrationState>>,
        broadcasts: Arc<BroadcastChannelManager>,
        measurement_delay: Duration,
    ) -> Self {
        Self {
            backend,
            procedure: Arc::new(Mutex::new(CalibrationProcedure::new_default())),
            state,
            broadcasts,
            measurement_delay,
        }
    }

    pub fn measurement_delay(&self) -> Duration {
        self.measurement_delay
    }

    /// Select the analyte to calibrate
    pub fn select_analyte(&self, analyte: Analyte) -> Result<CalibrationProgress, CalibrationError> {
        let progress = {
            let mut procedure = self.lock_procedure()?;
            procedure.select_analyte(analyte);
            procedure.get_progress()
        };
        self.publish(progress.clone());
        Ok(progress)
    }

    /// Select the standard solution for the current analyte
    ///
    /// # Errors
    /// `InvalidConcentration` when the analyte does not offer the value
    pub fn select_concentration(
        &self,
        concentration_um: f64,
    ) -> Result<CalibrationProgress, CalibrationError> {
        let progress = {
            let mut procedure = self.lock_procedure()?;
            procedure
                .select_concentration(concentration_um)
                .inspect_err(|err| log_calibration_error(err, "select_concentration"))?;
            procedure.get_progress()
        };
        self.publish(progress.clone());
        Ok(progress)
    }

    /// Current progress for the selected analyte
    pub fn progress(&self) -> Result<CalibrationProgress, CalibrationError> {
        Ok(self.lock_procedure()?.get_progress())
    }

    /// Measure the selected solution
    ///
    /// Sends a fetch request, waits for the electrode to stabilise, reads the
    /// voltage and feeds it to the procedure. When the fit changes the
    /// stored curve, the store and the shared state are updated.
    ///
    /// # Returns
    /// * `Ok(MeasurementOutcome)` - `Discarded` when the selection changed while waiting
    ///
    /// # Errors
    /// - Another measurement already in flight
    /// - Backend failure on fetch, read or curve update
    /// - Non-finite voltage
    /// - Lock poisoning on procedure or state
    pub async fn measure(&self) -> Result<MeasurementOutcome, CalibrationError> {
        let (ticket, progress) = {
            let mut procedure = self.lock_procedure()?;
            let ticket = procedure
                .request_measurement()
                .inspect_err(|err| log_calibration_error(err, "request_measurement"))?;
            (ticket, procedure.get_progress())
        };
        self.publish(progress);

        if let Err(err) = self.backend.request_fetch().await {
            log_backend_error(&err, "request_fetch");
            self.abandon(&ticket);
            return Err(err.into());
        }

        let progress = {
            let mut procedure = self.lock_procedure()?;
            procedure.begin_delay(&ticket);
            procedure.get_progress()
        };
        self.publish(progress);

        tokio::time::sleep(self.measurement_delay).await;

        let snapshot = match self.backend.read_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log_backend_error(&err, "read_snapshot");
                self.abandon(&ticket);
                return Err(err.into());
            }
        };
        let voltage = snapshot.voltage(ticket.analyte);

        let (outcome, progress) = {
            let mut procedure = self.lock_procedure()?;
            let outcome = procedure
                .accept_voltage(&ticket, voltage)
                .inspect_err(|err| log_calibration_error(err, "accept_voltage"))?;
            (outcome, procedure.get_progress())
        };

        if outcome == MeasurementOutcome::Discarded {
            return Ok(outcome);
        }

        if let Err(err) = self
            .backend
            .record_point(ticket.analyte, ticket.concentration_um, voltage)
            .await
        {
            // The raw log is informational; the buffered point still counts.
            log_backend_error(&err, "record_point");
            telemetry::hub().record_error(&err, "record_point");
        }

        match &outcome {
            MeasurementOutcome::Fitted(curve) => {
                telemetry::hub().record_fit(ticket.analyte, curve);
                self.store_curve(&ticket, *curve).await?;
            }
            MeasurementOutcome::RegressionFailed(err) => {
                telemetry::hub().record_regression_failure(ticket.analyte, err);
            }
            _ => {}
        }

        self.publish(progress);
        Ok(outcome)
    }

    /// Load every stored curve into the shared calibration state
    ///
    /// Missing curves and legacy failure markers clear the analyte's entry,
    /// so the default regression applies.
    ///
    /// # Returns
    /// Number of analytes with a usable curve
    pub async fn load_curves(&self) -> Result<usize, CalibrationError> {
        let mut loaded = Vec::with_capacity(Analyte::ALL.len());
        for analyte in Analyte::ALL {
            let curve = self
                .backend
                .get_curve(analyte)
                .await
                .inspect_err(|err| log_backend_error(err, "load_curves"))?;
            loaded.push((analyte, curve));
        }

        let mut state = self.write_state()?;
        let mut usable = 0;
        for (analyte, curve) in loaded {
            match curve {
                Some(curve) if state.set_curve(analyte, curve) => usable += 1,
                _ => state.clear_curve(analyte),
            }
        }
        info!("Loaded {} calibration curve(s)", usable);
        Ok(usable)
    }

    /// Toggle calibration mode
    pub fn set_use_calibration(&self, enabled: bool) -> Result<(), CalibrationError> {
        self.write_state()?.use_calibration = enabled;
        Ok(())
    }

    /// Get a copy of the shared calibration state
    pub fn get_state(&self) -> Result<CalibrationState, CalibrationError> {
        let state_guard = self
            .read_state()
            .inspect_err(|err| log_calibration_error(err, "get_calibration_state"))?;
        Ok(state_guard.clone())
    }

    /// Abandon any pending measurement and drop buffered points
    pub fn reset(&self) -> Result<CalibrationProgress, CalibrationError> {
        let progress = {
            let mut procedure = self.lock_procedure()?;
            procedure.cancel_measurement();
            procedure.clear_points();
            procedure.get_progress()
        };
        self.publish(progress.clone());
        Ok(progress)
    }

    // ========================================================================
    // HELPER METHODS - Lock management and persistence
    // ========================================================================

    /// Push a fitted curve unless the store already holds it
    async fn store_curve(
        &self,
        ticket: &MeasurementTicket,
        curve: crate::calibration::CalibrationCurve,
    ) -> Result<(), CalibrationError> {
        let stored = self
            .backend
            .get_curve(ticket.analyte)
            .await
            .inspect_err(|err| log_backend_error(err, "get_curve"))?;

        if stored == Some(curve) {
            info!("Curve for {} unchanged, not pushing", ticket.analyte);
        } else {
            self.backend
                .set_curve(ticket.analyte, curve)
                .await
                .inspect_err(|err| log_backend_error(err, "set_curve"))?;
            info!(
                "Stored curve for {}: E0={:.5}, slope={:.5}",
                ticket.analyte, curve.e0, curve.slope
            );
        }

        if !self.write_state()?.set_curve(ticket.analyte, curve) {
            warn!("Fitted curve for {} is not usable", ticket.analyte);
        }
        Ok(())
    }

    /// Release a ticket after a backend failure, if still pending
    fn abandon(&self, ticket: &MeasurementTicket) {
        if let Ok(mut procedure) = self.lock_procedure() {
            if procedure.pending().as_ref() == Some(ticket) {
                procedure.cancel_measurement();
                let progress = procedure.get_progress();
                drop(procedure);
                self.publish(progress);
            }
        }
    }

    fn publish(&self, progress: CalibrationProgress) {
        self.broadcasts.send_calibration(progress);
    }

    /// Safely acquire lock on calibration procedure
    fn lock_procedure(&self) -> Result<MutexGuard<'_, CalibrationProcedure>, CalibrationError> {
        self.procedure
            .lock()
            .map_err(|_| CalibrationError::StatePoisoned)
    }

    /// Safely acquire read lock on calibration state
    fn read_state(&self) -> Result<RwLockReadGuard<'_, CalibrationState>, CalibrationError> {
        self.state
            .read()
            .map_err(|_| CalibrationError::StatePoisoned)
    }

    /// Safely acquire write lock on calibration state
    fn write_state(&self) -> Result<RwLockWriteGuard<'_, CalibrationState>, CalibrationError> {
        self.state
            .write()
            .map_err(|_| CalibrationError::StatePoisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CalibrationStore, DeviceSimulator, MemoryBackend};
    use crate::calibration::{CalibrationCurve, CalibrationPhase};
    use crate::error::BackendError;
    use crate::reading::SensorSnapshot;
    use approx::assert_relative_eq;

    const DELAY: Duration = Duration::from_secs(30);

    fn manager(backend: MemoryBackend) -> CalibrationManager<MemoryBackend> {
        CalibrationManager::new(
            Arc::new(backend),
            Arc::new(RwLock::new(CalibrationState::new_default())),
            Arc::new(BroadcastChannelManager::initialized()),
            DELAY,
        )
    }

    fn simulated() -> MemoryBackend {
        MemoryBackend::new().with_simulator(DeviceSimulator::new(1).with_noise(0.0))
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_waits_for_delay() {
        let backend = simulated();
        let manager = manager(backend.clone());

        let started = tokio::time::Instant::now();
        let outcome = manager.measure().await.unwrap();
        assert_eq!(outcome, MeasurementOutcome::BufferNotFull { points: 1 });
        assert!(started.elapsed() >= DELAY);
        assert_eq!(backend.fetch_requests(), 1);
        assert!(backend
            .calibration_log()
            .contains_key("nitrate_calibrated/10uM"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_solutions_store_curve() {
        let backend = simulated();
        let manager = manager(backend.clone());

        let mut last = None;
        for concentration in [10.0, 50.0, 100.0] {
            manager.select_concentration(concentration).unwrap();
            backend.set_simulated_level(Analyte::Nitrate, concentration);
            last = Some(manager.measure().await.unwrap());
        }

        let curve = match last.unwrap() {
            MeasurementOutcome::Fitted(curve) => curve,
            other => panic!("expected fit, got {:?}", other),
        };
        // The simulator follows the default curve exactly
        assert_relative_eq!(curve.e0, 0.17334, epsilon = 1e-9);
        assert_relative_eq!(curve.slope, -0.05446, epsilon = 1e-9);
        assert_eq!(backend.get_curve(Analyte::Nitrate).await.unwrap(), Some(curve));
        assert_eq!(manager.get_state().unwrap().curve(Analyte::Nitrate), Some(curve));
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_change_during_delay_discards() {
        let backend = simulated();
        let manager = Arc::new(manager(backend.clone()));

        let measuring = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.measure().await })
        };
        tokio::time::sleep(Duration::from_secs(10)).await;
        manager.select_analyte(Analyte::Chlorine).unwrap();

        let outcome = measuring.await.unwrap().unwrap();
        assert_eq!(outcome, MeasurementOutcome::Discarded);
        assert!(backend.calibration_log().is_empty());
        assert_eq!(manager.progress().unwrap().points_collected, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_measure_rejected() {
        let manager = Arc::new(manager(simulated()));
        let first = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.measure().await })
        };
        tokio::task::yield_now().await;

        assert_eq!(
            manager.measure().await.unwrap_err(),
            CalibrationError::MeasurementInFlight
        );
        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_releases_ticket() {
        let backend = simulated();
        let manager = manager(backend.clone());
        backend.fail_next(BackendError::Transport {
            reason: "offline".to_string(),
        });

        let err = manager.measure().await.unwrap_err();
        assert!(matches!(err, CalibrationError::Backend(_)));
        assert_eq!(
            manager.progress().unwrap().phase,
            CalibrationPhase::AwaitingSolutionSelection
        );
        // Next attempt is not blocked by the failed one
        assert!(manager.measure().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_curve_not_pushed_again() {
        let backend = MemoryBackend::new();
        let manager = manager(backend.clone());
        manager.select_analyte(Analyte::Chlorine).unwrap();

        let solutions = [(10.0_f64, 0.18), (100.0, 0.13), (1000.0, 0.08)];
        let points: Vec<_> = solutions
            .iter()
            .map(|&(c, v)| crate::calibration::CalibrationPoint::from_concentration(c, v))
            .collect();
        let expected = crate::calibration::fit(&points).unwrap();
        backend.set_curve(Analyte::Chlorine, expected).await.unwrap();
        assert_eq!(backend.curve_writes(), 1);

        for (concentration, voltage) in solutions {
            manager.select_concentration(concentration).unwrap();
            backend.publish_snapshot(SensorSnapshot {
                chlorine: voltage,
                ..SensorSnapshot::default()
            });
            manager.measure().await.unwrap();
        }

        assert_eq!(backend.curve_writes(), 1);
        assert_eq!(
            manager.get_state().unwrap().curve(Analyte::Chlorine),
            Some(expected)
        );
    }

    #[tokio::test]
    async fn test_load_curves_ignores_sentinel() {
        let backend = MemoryBackend::new();
        backend
            .set_curve(Analyte::Nitrate, CalibrationCurve::new(0.2, -0.055))
            .await
            .unwrap();
        backend
            .set_curve(Analyte::Chlorine, CalibrationCurve::SENTINEL)
            .await
            .unwrap();
        let manager = manager(backend);

        assert_eq!(manager.load_curves().await.unwrap(), 1);
        let state = manager.get_state().unwrap();
        assert!(state.curve(Analyte::Nitrate).is_some());
        assert!(state.curve(Analyte::Chlorine).is_none());
    }

    #[tokio::test]
    async fn test_progress_is_broadcast() {
        let manager = manager(MemoryBackend::new());
        let mut rx = manager.broadcasts.subscribe_calibration().unwrap();
        manager.select_analyte(Analyte::Ammonia).unwrap();
        let progress = rx.try_recv().unwrap();
        assert_eq!(progress.analyte, Analyte::Ammonia);
        assert_eq!(progress.phase, CalibrationPhase::AwaitingSolutionSelection);
    }

    #[test]
    fn test_invalid_concentration_rejected() {
        let manager = manager(MemoryBackend::new());
        assert!(matches!(
            manager.select_concentration(42.0),
            Err(CalibrationError::InvalidConcentration { .. })
        ));
    }
}
