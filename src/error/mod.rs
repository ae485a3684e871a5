// Error types for the ISE monitor
//
// This module defines custom error types for backend access and calibration,
// providing structured error handling with error codes suitable for FFI communication.

mod backend;
mod calibration;

pub use backend::{log_backend_error, BackendError, BackendErrorCodes};
pub use calibration::{log_calibration_error, CalibrationError, CalibrationErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the FFI boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
