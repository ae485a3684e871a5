//! Monitor telemetry collector and helpers.
//!
//! The collector multiplexes readings, calibration fits, connectivity
//! changes and backend errors into a bounded history plus async broadcast
//! stream.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use tokio::sync::{broadcast, mpsc};

use crate::analysis::LiveReport;
use crate::analyte::Analyte;
use crate::calibration::{CalibrationCurve, RegressionError};
use crate::error::ErrorCode;
use crate::liveness::LivenessStatus;

pub mod events;

pub use events::{LifecyclePhase, MetricEvent};

/// Global telemetry hub shared across the crate.
static HUB: Lazy<TelemetryHub> = Lazy::new(TelemetryHub::default);

/// Access the global telemetry hub.
pub fn hub() -> &'static TelemetryHub {
    &HUB
}

/// Snapshot of collector state for CLI reporting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
}

/// Telemetry state has no invariants a panic could break, so a poisoned
/// lock is recovered rather than propagated.
fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Broadcast-based collector retaining a bounded history of metrics.
pub struct TelemetryCollector {
    tx: broadcast::Sender<MetricEvent>,
    history: Mutex<VecDeque<MetricEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity: history_capacity.max(1),
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: MetricEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        {
            let mut history = lock_recover(&self.history);
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            history.push_back(event.clone());
        }

        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.tx.subscribe()
    }

    pub fn subscribe_unbounded(&self) -> mpsc::UnboundedReceiver<MetricEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut broadcast_rx = self.tx.subscribe();

        tokio::spawn(async move {
            while let Ok(event) = broadcast_rx.recv().await {
                if tx.send(event).is_err() {
                    break;
                }
            }
        });

        rx
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let history = lock_recover(&self.history);
        TelemetrySnapshot {
            recent: history.iter().cloned().collect(),
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_history.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

/// Rolling window of concentrations for one analyte.
struct TrendTracker {
    samples: VecDeque<f64>,
    max_samples: usize,
}

impl TrendTracker {
    fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    fn observe(&mut self, value: f64) -> (f64, f64, usize) {
        if self.samples.len() == self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value);

        let count = self.samples.len();
        let sum: f64 = self.samples.iter().sum();
        let max = self
            .samples
            .iter()
            .copied()
            .fold(f64::MIN, |acc, next| acc.max(next));
        (sum / count as f64, max, count)
    }
}

/// Top-level hub wrapping collector state plus derived trends.
pub struct TelemetryHub {
    collector: TelemetryCollector,
    trends: Mutex<HashMap<Analyte, TrendTracker>>,
    trend_window: usize,
}

impl TelemetryHub {
    pub fn new(channel_capacity: usize, history_capacity: usize, trend_window: usize) -> Self {
        Self {
            collector: TelemetryCollector::new(channel_capacity, history_capacity),
            trends: Mutex::new(HashMap::new()),
            trend_window,
        }
    }

    pub fn collector(&self) -> &TelemetryCollector {
        &self.collector
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.collector.snapshot()
    }

    /// Publish one event per analyte, plus a trend for every finite value
    pub fn record_report(&self, report: &LiveReport) {
        for reading in &report.readings {
            self.collector.publish(MetricEvent::ReadingComputed {
                analyte: reading.analyte,
                voltage: reading.voltage,
                concentration_um: reading.concentration_um,
                source: reading.source,
                safe: reading.safe,
            });

            if !reading.concentration_um.is_finite() {
                continue;
            }
            let (avg, max, count) = {
                let mut trends = lock_recover(&self.trends);
                trends
                    .entry(reading.analyte)
                    .or_insert_with(|| TrendTracker::new(self.trend_window))
                    .observe(reading.concentration_um)
            };
            self.collector.publish(MetricEvent::ConcentrationTrend {
                analyte: reading.analyte,
                avg_um: avg,
                max_um: max,
                sample_count: count,
            });
        }
    }

    pub fn record_fit(&self, analyte: Analyte, curve: &CalibrationCurve) {
        self.collector.publish(MetricEvent::CalibrationFitted {
            analyte,
            e0: curve.e0,
            slope: curve.slope,
        });
    }

    pub fn record_regression_failure(&self, analyte: Analyte, err: &RegressionError) {
        self.collector.publish(MetricEvent::RegressionFailed {
            analyte,
            reason: err.to_string(),
        });
    }

    pub fn record_connection(&self, status: &LivenessStatus) {
        self.collector.publish(MetricEvent::ConnectionChanged {
            connected: status.connected,
            gap_secs: status.gap_secs,
            timestamp_ms: now_timestamp_ms(),
        });
    }

    pub fn record_lifecycle(&self, phase: LifecyclePhase) {
        self.collector.publish(MetricEvent::Lifecycle {
            phase,
            timestamp_ms: now_timestamp_ms(),
        });
    }

    pub fn record_error(&self, err: &dyn ErrorCode, context: impl Into<String>) {
        self.collector.publish(MetricEvent::Error {
            code: err.code(),
            context: context.into(),
        });
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(256, 64, 32)
    }
}

fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
