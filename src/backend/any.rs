// AnyBackend - runtime backend selection
//
// The backend ports use `impl Future` returns and are not object safe, so
// the FFI and CLI layers pick a backend through this enum instead of a
// trait object.

use log::{info, warn};

use super::{
    CalibrationStore, DeviceSimulator, DeviceStatusSource, MemoryBackend, RealtimeDbClient,
    SensorDataSource, Subscription,
};
use crate::analyte::Analyte;
use crate::calibration::CalibrationCurve;
use crate::config::DatabaseConfig;
use crate::error::BackendError;
use crate::reading::{HistoryEntry, SensorSnapshot};

/// Either the remote database or the in-process store
#[derive(Clone)]
pub enum AnyBackend {
    Memory(MemoryBackend),
    Remote(RealtimeDbClient),
}

impl AnyBackend {
    /// In-process store with a simulated device
    pub fn simulated(seed: u64) -> Self {
        AnyBackend::Memory(MemoryBackend::new().with_simulator(DeviceSimulator::new(seed)))
    }

    /// Remote database when a URL is configured, otherwise a simulated device
    pub fn from_config(config: &DatabaseConfig) -> Self {
        match config.url.as_deref() {
            Some(url) if !url.trim().is_empty() => {
                info!("Using realtime database at {}", url);
                AnyBackend::Remote(
                    RealtimeDbClient::new(url, config.auth_token.clone())
                        .with_poll_interval(config.poll_interval()),
                )
            }
            _ => {
                warn!("No database URL configured, using simulated device");
                Self::simulated(0)
            }
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, AnyBackend::Memory(_))
    }

    pub fn as_memory(&self) -> Option<&MemoryBackend> {
        match self {
            AnyBackend::Memory(backend) => Some(backend),
            AnyBackend::Remote(_) => None,
        }
    }
}

impl SensorDataSource for AnyBackend {
    async fn request_fetch(&self) -> Result<(), BackendError> {
        match self {
            AnyBackend::Memory(backend) => backend.request_fetch().await,
            AnyBackend::Remote(backend) => backend.request_fetch().await,
        }
    }

    async fn read_snapshot(&self) -> Result<SensorSnapshot, BackendError> {
        match self {
            AnyBackend::Memory(backend) => backend.read_snapshot().await,
            AnyBackend::Remote(backend) => backend.read_snapshot().await,
        }
    }

    fn subscribe_snapshots(&self) -> Subscription<SensorSnapshot> {
        match self {
            AnyBackend::Memory(backend) => backend.subscribe_snapshots(),
            AnyBackend::Remote(backend) => backend.subscribe_snapshots(),
        }
    }

    async fn read_history(&self, limit: usize) -> Result<Vec<HistoryEntry>, BackendError> {
        match self {
            AnyBackend::Memory(backend) => backend.read_history(limit).await,
            AnyBackend::Remote(backend) => backend.read_history(limit).await,
        }
    }
}

impl CalibrationStore for AnyBackend {
    async fn get_curve(&self, analyte: Analyte) -> Result<Option<CalibrationCurve>, BackendError> {
        match self {
            AnyBackend::Memory(backend) => backend.get_curve(analyte).await,
            AnyBackend::Remote(backend) => backend.get_curve(analyte).await,
        }
    }

    async fn set_curve(&self, analyte: Analyte, curve: CalibrationCurve) -> Result<(), BackendError> {
        match self {
            AnyBackend::Memory(backend) => backend.set_curve(analyte, curve).await,
            AnyBackend::Remote(backend) => backend.set_curve(analyte, curve).await,
        }
    }

    async fn record_point(
        &self,
        analyte: Analyte,
        concentration_um: f64,
        voltage: f64,
    ) -> Result<(), BackendError> {
        match self {
            AnyBackend::Memory(backend) => {
                backend.record_point(analyte, concentration_um, voltage).await
            }
            AnyBackend::Remote(backend) => {
                backend.record_point(analyte, concentration_um, voltage).await
            }
        }
    }
}

impl DeviceStatusSource for AnyBackend {
    async fn last_seen(&self) -> Result<Option<i64>, BackendError> {
        match self {
            AnyBackend::Memory(backend) => backend.last_seen().await,
            AnyBackend::Remote(backend) => backend.last_seen().await,
        }
    }

    fn subscribe_last_seen(&self) -> Subscription<Option<i64>> {
        match self {
            AnyBackend::Memory(backend) => backend.subscribe_last_seen(),
            AnyBackend::Remote(backend) => backend.subscribe_last_seen(),
        }
    }
}
