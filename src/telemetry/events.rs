//! Core telemetry event types describing monitor activity exposed to the
//! CLI and flutter_rust_bridge streams.

use serde::{Deserialize, Serialize};

use crate::analysis::CurveSource;
use crate::analyte::Analyte;

/// Lifecycle stages of the monitor context.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    ContextInitialized,
    MonitoringStarted,
    MonitoringStopped,
}

/// Rich metric events covering readings, calibration and connectivity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    ReadingComputed {
        analyte: Analyte,
        voltage: f64,
        concentration_um: f64,
        source: CurveSource,
        safe: bool,
    },
    ConcentrationTrend {
        analyte: Analyte,
        avg_um: f64,
        max_um: f64,
        sample_count: usize,
    },
    CalibrationFitted {
        analyte: Analyte,
        e0: f64,
        slope: f64,
    },
    RegressionFailed {
        analyte: Analyte,
        reason: String,
    },
    ConnectionChanged {
        connected: bool,
        gap_secs: Option<i64>,
        timestamp_ms: u64,
    },
    Lifecycle {
        phase: LifecyclePhase,
        timestamp_ms: u64,
    },
    Error {
        code: i32,
        context: String,
    },
}
