// MonitorManager: live readings and history
//
// Single Responsibility: turn backend snapshots into reports using the
// shared calibration state, and publish them.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use log::debug;

use crate::analysis::LiveReport;
use crate::backend::{Backend, Subscription};
use crate::calibration::CalibrationState;
use crate::error::{log_backend_error, BackendError};
use crate::managers::BroadcastChannelManager;
use crate::reading::SensorSnapshot;
use crate::telemetry::{self, LifecyclePhase};

/// Manages live monitoring and history
pub struct MonitorManager<B: Backend> {
    backend: Arc<B>,
    state: Arc<RwLock<CalibrationState>>,
    broadcasts: Arc<BroadcastChannelManager>,
    fetch_delay: Duration,
    history_limit: usize,
    last_report: Arc<Mutex<Option<LiveReport>>>,
}

impl<B: Backend> MonitorManager<B> {
    pub fn new(
        backend: Arc<B>,
        state: Arc<RwLock<CalibrationState>>,
        broadcasts: Arc<BroadcastChannelManager>,
        fetch_delay: Duration,
        history_limit: usize,
    ) -> Self {
        Self {
            backend,
            state,
            broadcasts,
            fetch_delay,
            history_limit,
            last_report: Arc::new(Mutex::new(None)),
        }
    }

    /// Request a fresh reading, wait for the electrodes, then report
    ///
    /// # Errors
    /// Backend failure on the fetch request or the snapshot read
    pub async fn refresh(&self) -> Result<LiveReport, BackendError> {
        self.backend
            .request_fetch()
            .await
            .inspect_err(|err| self.fail(err, "request_fetch"))?;
        tokio::time::sleep(self.fetch_delay).await;
        self.current_report().await
    }

    /// Report for the snapshot currently stored, without a fetch request
    pub async fn current_report(&self) -> Result<LiveReport, BackendError> {
        let snapshot = self
            .backend
            .read_snapshot()
            .await
            .inspect_err(|err| self.fail(err, "read_snapshot"))?;
        let report = self.report_for(&snapshot)?;
        self.remember(&report);
        self.broadcasts.send_report(report.clone());
        Ok(report)
    }

    /// Last `history_limit` entries as reports, newest first
    pub async fn history(&self) -> Result<Vec<LiveReport>, BackendError> {
        let entries = self
            .backend
            .read_history(self.history_limit)
            .await
            .inspect_err(|err| self.fail(err, "read_history"))?;
        let state = read_state(&self.state)?;
        Ok(entries
            .iter()
            .map(|entry| LiveReport::from_history(entry, &state))
            .collect())
    }

    /// Share text for the most recent report
    pub fn share_text(&self) -> Option<String> {
        self.last_report().map(|report| report.share_text())
    }

    pub fn last_report(&self) -> Option<LiveReport> {
        self.last_report
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    /// Follow the live snapshot as reports
    ///
    /// Each snapshot is converted with the calibration state current at
    /// arrival, so toggling calibration mode applies to the next update.
    pub fn subscribe_reports(&self) -> Subscription<LiveReport> {
        let mut snapshots = self.backend.subscribe_snapshots();
        let state = Arc::clone(&self.state);
        let broadcasts = Arc::clone(&self.broadcasts);
        let last_report = Arc::clone(&self.last_report);
        telemetry::hub().record_lifecycle(LifecyclePhase::MonitoringStarted);

        Subscription::spawn(16, move |tx| async move {
            while let Some(snapshot) = snapshots.recv().await {
                let report = match read_state(&state) {
                    Ok(state) => LiveReport::from_snapshot(&snapshot, &state),
                    Err(err) => {
                        log_backend_error(&err, "subscribe_reports");
                        break;
                    }
                };
                telemetry::hub().record_report(&report);
                if let Ok(mut guard) = last_report.lock() {
                    *guard = Some(report.clone());
                }
                broadcasts.send_report(report.clone());
                if tx.send(report).await.is_err() {
                    break;
                }
            }
            debug!("Report subscription ended");
            telemetry::hub().record_lifecycle(LifecyclePhase::MonitoringStopped);
        })
    }

    fn report_for(&self, snapshot: &SensorSnapshot) -> Result<LiveReport, BackendError> {
        let state = read_state(&self.state)?;
        let report = LiveReport::from_snapshot(snapshot, &state);
        telemetry::hub().record_report(&report);
        Ok(report)
    }

    fn remember(&self, report: &LiveReport) {
        if let Ok(mut guard) = self.last_report.lock() {
            *guard = Some(report.clone());
        }
    }

    fn fail(&self, err: &BackendError, context: &str) {
        log_backend_error(err, context);
        telemetry::hub().record_error(err, context);
    }
}

fn read_state(
    state: &RwLock<CalibrationState>,
) -> Result<std::sync::RwLockReadGuard<'_, CalibrationState>, BackendError> {
    state.read().map_err(|_| BackendError::LockPoisoned {
        component: "calibration_state".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{CurveSource, SafetyLevel};
    use crate::analyte::Analyte;
    use crate::backend::{DeviceSimulator, MemoryBackend};
    use crate::calibration::CalibrationCurve;
    use approx::assert_relative_eq;

    const DELAY: Duration = Duration::from_secs(30);

    fn manager(backend: MemoryBackend) -> MonitorManager<MemoryBackend> {
        MonitorManager::new(
            Arc::new(backend),
            Arc::new(RwLock::new(CalibrationState::new_default())),
            Arc::new(BroadcastChannelManager::initialized()),
            DELAY,
            10,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_waits_then_reports() {
        let backend = MemoryBackend::new().with_simulator(DeviceSimulator::new(3).with_noise(0.0));
        let manager = manager(backend.clone());

        let started = tokio::time::Instant::now();
        let report = manager.refresh().await.unwrap();
        assert!(started.elapsed() >= DELAY);
        assert_eq!(backend.fetch_requests(), 1);

        let nitrate = report.reading(Analyte::Nitrate).unwrap();
        assert_relative_eq!(nitrate.concentration_um, 50.0, max_relative = 1e-9);
        assert_eq!(nitrate.level, SafetyLevel::Safe);
        assert!(manager.share_text().unwrap().contains("Nitrate: 50.00 µM"));
    }

    #[tokio::test]
    async fn test_refresh_failure_is_reported() {
        let backend = MemoryBackend::new();
        let manager = manager(backend.clone());
        backend.fail_next(BackendError::Http { status: 500 });
        assert_eq!(
            manager.refresh().await.unwrap_err(),
            BackendError::Http { status: 500 }
        );
        assert!(manager.last_report().is_none());
    }

    #[tokio::test]
    async fn test_history_uses_calibration_state() {
        let backend = MemoryBackend::new();
        backend.insert_history(
            "1718000001",
            SensorSnapshot {
                nitrate: 0.1,
                ..SensorSnapshot::default()
            },
        );
        backend.insert_history(
            "1718000002",
            SensorSnapshot {
                nitrate: 0.2,
                ..SensorSnapshot::default()
            },
        );
        let manager = manager(backend);
        {
            let mut state = manager.state.write().unwrap();
            state.use_calibration = true;
            state.set_curve(Analyte::Nitrate, CalibrationCurve::new(0.3, -0.1));
        }

        let history = manager.history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].key.as_deref(), Some("1718000002"));
        let nitrate = history[0].reading(Analyte::Nitrate).unwrap();
        assert_eq!(nitrate.source, CurveSource::Calibrated);
        assert_relative_eq!(nitrate.concentration_um, 10.0, max_relative = 1e-9);
    }

    #[tokio::test]
    async fn test_subscription_reports_each_snapshot() {
        let backend = MemoryBackend::new();
        let manager = manager(backend.clone());
        let mut reports = manager.subscribe_reports();

        // Current value first
        let first = reports.recv().await.unwrap();
        assert_eq!(first.temperature, 0.0);

        backend.publish_snapshot(SensorSnapshot {
            nitrate: -0.05,
            temperature: 22.0,
            ..SensorSnapshot::default()
        });
        let second = reports.recv().await.unwrap();
        assert_eq!(second.temperature, 22.0);
        assert!(second
            .reading(Analyte::Nitrate)
            .unwrap()
            .concentration_um
            .is_nan());
        assert_eq!(manager.last_report().unwrap().temperature, 22.0);
    }

    #[tokio::test]
    async fn test_current_report_is_broadcast() {
        let manager = manager(MemoryBackend::new());
        let mut rx = manager.broadcasts.subscribe_reports().unwrap();
        manager.current_report().await.unwrap();
        assert_eq!(rx.try_recv().unwrap().readings.len(), 3);
    }
}
