// Managers Module
//
// Focused manager classes extracted from AppContext to apply Single Responsibility Principle.
//
// Each manager handles one specific concern:
// - CalibrationManager: Calibration workflow and curve persistence
// - MonitorManager: Live reports, history and share text
// - ConnectionManager: Device heartbeat and connectivity edges
// - BroadcastChannelManager: Tokio broadcast channel management

pub mod broadcast_manager;
pub mod calibration_manager;
pub mod connection_manager;
pub mod monitor_manager;

pub use broadcast_manager::BroadcastChannelManager;
pub use calibration_manager::CalibrationManager;
pub use connection_manager::{ConnectionManager, ConnectionTracker};
pub use monitor_manager::MonitorManager;
