use flutter_rust_bridge::frb;

use crate::error::{BackendErrorCodes, CalibrationErrorCodes};
use crate::telemetry::{self, TelemetrySnapshot};

/// Recent metric events plus counters, for a debug screen
#[frb(sync)]
pub fn get_telemetry_snapshot() -> TelemetrySnapshot {
    telemetry::hub().snapshot()
}

// Error code constant accessors for Dart/Flutter

/// Get CalibrationErrorCodes as a structured object with all error code constants
#[frb(sync)]
pub fn get_calibration_error_codes() -> CalibrationErrorCodes {
    CalibrationErrorCodes {}
}

/// Get BackendErrorCodes as a structured object with all error code constants
#[frb(sync)]
pub fn get_backend_error_codes() -> BackendErrorCodes {
    BackendErrorCodes {}
}
