//! Configuration management for the monitor
//!
//! This module provides runtime configuration loading from JSON files.
//! Database location, the electrode stabilisation delays and the liveness
//! threshold all come from here so that deployments and tests can change
//! them without recompilation.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::liveness::LivenessPolicy;

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub calibration: CalibrationConfig,
    pub monitoring: MonitoringConfig,
    pub liveness: LivenessConfig,
}

/// Remote database location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database root URL; `None` selects the in-memory backend
    pub url: Option<String>,
    /// Database secret or ID token
    pub auth_token: Option<String>,
    /// Polling period for subscriptions over REST
    pub poll_interval_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            auth_token: None,
            poll_interval_ms: 1000,
        }
    }
}

impl DatabaseConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Calibration workflow configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Electrode stabilisation time between fetch request and voltage read
    pub measurement_delay_secs: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            measurement_delay_secs: 30,
        }
    }
}

impl CalibrationConfig {
    pub fn measurement_delay(&self) -> Duration {
        Duration::from_secs(self.measurement_delay_secs)
    }
}

/// Live monitoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Stabilisation time between fetch request and snapshot read
    pub fetch_delay_secs: u64,
    /// History entries shown
    pub history_limit: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            fetch_delay_secs: 30,
            history_limit: 10,
        }
    }
}

impl MonitoringConfig {
    pub fn fetch_delay(&self) -> Duration {
        Duration::from_secs(self.fetch_delay_secs)
    }
}

/// Device liveness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Maximum heartbeat age still counted as connected
    pub disconnect_threshold_secs: i64,
    /// Deployment offset from UTC
    pub utc_offset_minutes: i32,
    /// Re-evaluation period while no heartbeat arrives
    pub check_interval_ms: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            disconnect_threshold_secs: 5,
            utc_offset_minutes: 330,
            check_interval_ms: 1000,
        }
    }
}

impl LivenessConfig {
    pub fn policy(&self) -> LivenessPolicy {
        LivenessPolicy::new(self.disconnect_threshold_secs, self.utc_offset_minutes)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.max(1))
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The loaded configuration, or defaults if the file doesn't exist or
    /// its JSON is invalid. Missing fields take their default values.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Write configuration as pretty JSON
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration for the current platform
    ///
    /// Android ships without a config file; the database location is
    /// supplied through the FFI instead.
    #[cfg(target_os = "android")]
    pub fn load() -> Self {
        log::info!("[Config] Using default configuration on Android");
        Self::default()
    }

    /// Load configuration for the current platform
    #[cfg(not(target_os = "android"))]
    pub fn load() -> Self {
        Self::load_from_file("assets/ise_config.json")
    }
}
