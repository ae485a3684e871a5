// Calibration error types and constants

use crate::error::{BackendError, ErrorCode};
use flutter_rust_bridge::frb;
use log::error;
use std::fmt;

/// Calibration error code constants exposed to Dart via FFI
///
/// These constants provide a single source of truth for error codes
/// shared between Rust and Dart. The flutter_rust_bridge will automatically
/// generate corresponding Dart constants.
///
/// Error code range: 2001-2006
#[frb(unignore)]
pub struct CalibrationErrorCodes {}

#[frb]
impl CalibrationErrorCodes {
    /// Selected concentration is not offered for the analyte
    pub const INVALID_CONCENTRATION: i32 = 2001;

    /// A measurement is already waiting for its voltage
    pub const MEASUREMENT_IN_FLIGHT: i32 = 2002;

    /// Voltage delivered while no measurement was requested
    pub const NO_MEASUREMENT_PENDING: i32 = 2003;

    /// Calibration state lock was poisoned
    pub const STATE_POISONED: i32 = 2004;

    /// Remote store or sensor feed failed during calibration
    pub const BACKEND: i32 = 2005;

    /// Electrode returned a voltage that cannot be used as a point
    pub const INVALID_VOLTAGE: i32 = 2006;

    /// Get INVALID_CONCENTRATION error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn invalid_concentration() -> i32 {
        Self::INVALID_CONCENTRATION
    }

    /// Get MEASUREMENT_IN_FLIGHT error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn measurement_in_flight() -> i32 {
        Self::MEASUREMENT_IN_FLIGHT
    }

    /// Get NO_MEASUREMENT_PENDING error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn no_measurement_pending() -> i32 {
        Self::NO_MEASUREMENT_PENDING
    }

    /// Get STATE_POISONED error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn state_poisoned() -> i32 {
        Self::STATE_POISONED
    }

    /// Get BACKEND error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn backend() -> i32 {
        Self::BACKEND
    }

    /// Get INVALID_VOLTAGE error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn invalid_voltage() -> i32 {
        Self::INVALID_VOLTAGE
    }
}

/// Log a calibration error with structured context
///
/// This function logs calibration errors with structured fields including:
/// - error_code: Numeric error code for programmatic handling
/// - component: The component where the error occurred
/// - message: Human-readable error message
/// - context: Additional contextual information
pub fn log_calibration_error(err: &CalibrationError, context: &str) {
    error!(
        "Calibration error in {}: code={}, component=CalibrationProcedure, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Calibration-related errors
///
/// Cover solution selection, measurement sequencing and the remote
/// reads/writes a calibration step performs.
///
/// Error code ranges: 2001-2006
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Concentration is not one of the analyte's standard solutions
    InvalidConcentration { concentration_um: f64 },

    /// A measurement is already pending
    MeasurementInFlight,

    /// No measurement is pending
    NoMeasurementPending,

    /// Calibration state lock was poisoned
    StatePoisoned,

    /// Backend failure while measuring or persisting
    Backend(BackendError),

    /// Voltage is not finite
    InvalidVoltage { voltage: f64 },
}

impl ErrorCode for CalibrationError {
    fn code(&self) -> i32 {
        match self {
            CalibrationError::InvalidConcentration { .. } => {
                CalibrationErrorCodes::INVALID_CONCENTRATION
            }
            CalibrationError::MeasurementInFlight => CalibrationErrorCodes::MEASUREMENT_IN_FLIGHT,
            CalibrationError::NoMeasurementPending => {
                CalibrationErrorCodes::NO_MEASUREMENT_PENDING
            }
            CalibrationError::StatePoisoned => CalibrationErrorCodes::STATE_POISONED,
            CalibrationError::Backend(_) => CalibrationErrorCodes::BACKEND,
            CalibrationError::InvalidVoltage { .. } => CalibrationErrorCodes::INVALID_VOLTAGE,
        }
    }

    fn message(&self) -> String {
        match self {
            CalibrationError::InvalidConcentration { concentration_um } => {
                format!("Invalid calibration concentration: {} µM", concentration_um)
            }
            CalibrationError::MeasurementInFlight => {
                "A calibration measurement is already in progress".to_string()
            }
            CalibrationError::NoMeasurementPending => {
                "No calibration measurement is pending".to_string()
            }
            CalibrationError::StatePoisoned => "Calibration state lock poisoned".to_string(),
            CalibrationError::Backend(err) => format!("Backend failure: {}", err.message()),
            CalibrationError::InvalidVoltage { voltage } => {
                format!("Invalid electrode voltage: {}", voltage)
            }
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalibrationError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CalibrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CalibrationError::Backend(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BackendError> for CalibrationError {
    fn from(err: BackendError) -> Self {
        CalibrationError::Backend(err)
    }
}
