// AppContext: Dependency Injection Container
// Centralizes all application state for testability and clean architecture

use std::sync::{Arc, RwLock};

use log::{info, warn};
use tokio::sync::broadcast;

use crate::analysis::LiveReport;
use crate::backend::Backend;
use crate::calibration::{CalibrationProgress, CalibrationState};
use crate::config::AppConfig;
use crate::error::{log_calibration_error, CalibrationError};
use crate::liveness::{Clock, LivenessStatus};
use crate::managers::{
    BroadcastChannelManager, CalibrationManager, ConnectionManager, MonitorManager,
};
use crate::telemetry::{self, LifecyclePhase};

/// AppContext: Dependency injection container for all application state
///
/// Wires one backend into the focused managers:
/// - CalibrationManager: solution selection, measurements, curve persistence
/// - MonitorManager: live reports, history, share text
/// - ConnectionManager: device heartbeat
/// - BroadcastChannelManager: UI-facing broadcast channels
///
/// Calibration and monitoring share one `CalibrationState`, so a freshly
/// fitted curve applies to the next live report.
pub struct AppContext<B: Backend> {
    backend: Arc<B>,
    calibration_state: Arc<RwLock<CalibrationState>>,
    broadcasts: Arc<BroadcastChannelManager>,
    calibration: CalibrationManager<B>,
    monitor: MonitorManager<B>,
    connection: ConnectionManager<B>,
}

impl<B: Backend> AppContext<B> {
    /// Create a new AppContext
    ///
    /// All broadcast channels are initialized; calibration starts from the
    /// default state until [`AppContext::load_calibration`] runs.
    ///
    /// # Arguments
    /// * `backend` - Sensor source, calibration store and heartbeat source
    /// * `config` - Timing and liveness configuration
    /// * `clock` - Wall clock used for liveness evaluation
    pub fn new(backend: B, config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let backend = Arc::new(backend);
        let calibration_state = Arc::new(RwLock::new(CalibrationState::new_default()));
        let broadcasts = Arc::new(BroadcastChannelManager::initialized());

        let calibration = CalibrationManager::new(
            Arc::clone(&backend),
            Arc::clone(&calibration_state),
            Arc::clone(&broadcasts),
            config.calibration.measurement_delay(),
        );
        let monitor = MonitorManager::new(
            Arc::clone(&backend),
            Arc::clone(&calibration_state),
            Arc::clone(&broadcasts),
            config.monitoring.fetch_delay(),
            config.monitoring.history_limit,
        );
        let connection = ConnectionManager::new(
            Arc::clone(&backend),
            config.liveness.policy(),
            clock,
            config.liveness.check_interval(),
            Arc::clone(&broadcasts),
        );

        telemetry::hub().record_lifecycle(LifecyclePhase::ContextInitialized);
        info!("App context initialized");

        Self {
            backend,
            calibration_state,
            broadcasts,
            calibration,
            monitor,
            connection,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn calibration(&self) -> &CalibrationManager<B> {
        &self.calibration
    }

    pub fn monitor(&self) -> &MonitorManager<B> {
        &self.monitor
    }

    pub fn connection(&self) -> &ConnectionManager<B> {
        &self.connection
    }

    pub fn broadcasts(&self) -> &Arc<BroadcastChannelManager> {
        &self.broadcasts
    }

    /// Load stored curves into the shared calibration state
    ///
    /// Calibration mode itself stays a user choice; see
    /// [`CalibrationManager::set_use_calibration`].
    ///
    /// # Returns
    /// Number of analytes with a usable stored curve
    pub async fn load_calibration(&self) -> Result<usize, CalibrationError> {
        let loaded = self
            .calibration
            .load_curves()
            .await
            .inspect_err(|err| log_calibration_error(err, "load_calibration"))?;
        if loaded == 0 {
            warn!("No stored calibration curves, using default regressions");
        }
        Ok(loaded)
    }

    /// Snapshot of the shared calibration state
    pub fn calibration_state(&self) -> Result<CalibrationState, CalibrationError> {
        self.calibration_state
            .read()
            .map(|state| state.clone())
            .map_err(|_| CalibrationError::StatePoisoned)
    }

    // ========================================================================
    // STREAM METHODS
    // ========================================================================

    pub fn subscribe_reports(&self) -> Option<broadcast::Receiver<LiveReport>> {
        self.broadcasts.subscribe_reports()
    }

    pub fn subscribe_calibration(&self) -> Option<broadcast::Receiver<CalibrationProgress>> {
        self.broadcasts.subscribe_calibration()
    }

    pub fn subscribe_connection(&self) -> Option<broadcast::Receiver<LivenessStatus>> {
        self.broadcasts.subscribe_connection()
    }
}
