// Backend error types and constants

use crate::error::ErrorCode;
use flutter_rust_bridge::frb;
use log::error;
use std::fmt;

/// Backend error code constants exposed to Dart via FFI
///
/// Error code range: 3001-3006
#[frb(unignore)]
pub struct BackendErrorCodes {}

#[frb]
impl BackendErrorCodes {
    /// Remote database answered with a non-success HTTP status
    pub const HTTP: i32 = 3001;

    /// Request could not be sent or the connection dropped
    pub const TRANSPORT: i32 = 3002;

    /// Remote value could not be decoded
    pub const DECODE: i32 = 3003;

    /// Remote path holds no value
    pub const MISSING_VALUE: i32 = 3004;

    /// Subscription or broadcast channel closed
    pub const CHANNEL_CLOSED: i32 = 3005;

    /// In-process backend lock was poisoned
    pub const LOCK_POISONED: i32 = 3006;

    /// Get HTTP error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn http() -> i32 {
        Self::HTTP
    }

    /// Get TRANSPORT error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn transport() -> i32 {
        Self::TRANSPORT
    }

    /// Get DECODE error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn decode() -> i32 {
        Self::DECODE
    }

    /// Get MISSING_VALUE error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn missing_value() -> i32 {
        Self::MISSING_VALUE
    }

    /// Get CHANNEL_CLOSED error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn channel_closed() -> i32 {
        Self::CHANNEL_CLOSED
    }

    /// Get LOCK_POISONED error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn lock_poisoned() -> i32 {
        Self::LOCK_POISONED
    }
}

/// Log a backend error with structured context
///
/// Logs the numeric code, the component and the message so failures
/// from the remote store can be correlated with device-side logs.
pub fn log_backend_error(err: &BackendError, context: &str) {
    error!(
        "Backend error in {}: code={}, component=RemoteStore, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised while talking to the remote store or the sensor feed
///
/// Every read/write against the remote database is recoverable: callers
/// surface the error and skip the computation that needed the value.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Non-success HTTP status from the database REST endpoint
    Http { status: u16 },

    /// Request failed before a response arrived
    Transport { reason: String },

    /// Response body did not have the expected shape
    Decode { reason: String },

    /// Nothing stored at the requested path
    MissingValue { path: String },

    /// Subscription or channel closed
    ChannelClosed,

    /// In-process lock poisoned
    LockPoisoned { component: String },
}

impl ErrorCode for BackendError {
    fn code(&self) -> i32 {
        match self {
            BackendError::Http { .. } => BackendErrorCodes::HTTP,
            BackendError::Transport { .. } => BackendErrorCodes::TRANSPORT,
            BackendError::Decode { .. } => BackendErrorCodes::DECODE,
            BackendError::MissingValue { .. } => BackendErrorCodes::MISSING_VALUE,
            BackendError::ChannelClosed => BackendErrorCodes::CHANNEL_CLOSED,
            BackendError::LockPoisoned { .. } => BackendErrorCodes::LOCK_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            BackendError::Http { status } => format!("HTTP error: {}", status),
            BackendError::Transport { reason } => format!("Transport error: {}", reason),
            BackendError::Decode { reason } => format!("Decode error: {}", reason),
            BackendError::MissingValue { path } => format!("No value at {}", path),
            BackendError::ChannelClosed => "Channel closed".to_string(),
            BackendError::LockPoisoned { component } => {
                format!("Lock poisoned for component: {}", component)
            }
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BackendError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for BackendError {}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            BackendError::Http {
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            BackendError::Decode {
                reason: err.to_string(),
            }
        } else {
            BackendError::Transport {
                reason: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Decode {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_codes() {
        assert_eq!(
            BackendError::Http { status: 500 }.code(),
            BackendErrorCodes::HTTP
        );
        assert_eq!(
            BackendError::Transport {
                reason: "reset".to_string()
            }
            .code(),
            BackendErrorCodes::TRANSPORT
        );
        assert_eq!(
            BackendError::Decode {
                reason: "bad".to_string()
            }
            .code(),
            BackendErrorCodes::DECODE
        );
        assert_eq!(
            BackendError::MissingValue {
                path: "calibration/nitrate".to_string()
            }
            .code(),
            BackendErrorCodes::MISSING_VALUE
        );
        assert_eq!(
            BackendError::ChannelClosed.code(),
            BackendErrorCodes::CHANNEL_CLOSED
        );
        assert_eq!(
            BackendError::LockPoisoned {
                component: "latest".to_string()
            }
            .code(),
            BackendErrorCodes::LOCK_POISONED
        );
    }

    #[test]
    fn test_backend_error_messages() {
        assert_eq!(
            BackendError::Http { status: 401 }.message(),
            "HTTP error: 401"
        );
        assert_eq!(
            BackendError::MissingValue {
                path: "deviceStatus/lastSeen".to_string()
            }
            .message(),
            "No value at deviceStatus/lastSeen"
        );
    }

    #[test]
    fn test_serde_error_maps_to_decode() {
        let err = serde_json::from_str::<f64>("\"not a number\"").unwrap_err();
        let backend: BackendError = err.into();
        assert_eq!(backend.code(), BackendErrorCodes::DECODE);
    }

    #[test]
    fn test_error_code_getters() {
        assert_eq!(BackendErrorCodes::http(), 3001);
        assert_eq!(BackendErrorCodes::transport(), 3002);
        assert_eq!(BackendErrorCodes::decode(), 3003);
        assert_eq!(BackendErrorCodes::missing_value(), 3004);
        assert_eq!(BackendErrorCodes::channel_closed(), 3005);
        assert_eq!(BackendErrorCodes::lock_poisoned(), 3006);
    }
}
