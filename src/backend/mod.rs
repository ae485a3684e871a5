//! Backend ports - how the app reaches the device and the remote store
//!
//! The device publishes readings and a heartbeat to a remote realtime
//! database; the app never talks to the device directly. These traits are
//! the only contract the rest of the crate has with that store:
//!
//! * [`SensorDataSource`] - fetch requests, the latest snapshot, history
//! * [`CalibrationStore`] - fitted curves and the raw calibration log
//! * [`DeviceStatusSource`] - the device heartbeat (`lastSeen`)
//!
//! Single reads return futures; continuous reads return a [`Subscription`]
//! that stops its producer task when dropped.

pub mod any;
pub mod firebase;
pub mod memory;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::analyte::{concentration_label, Analyte};
use crate::calibration::CalibrationCurve;
use crate::error::BackendError;
use crate::reading::{HistoryEntry, SensorSnapshot};

pub use any::AnyBackend;
pub use firebase::RealtimeDbClient;
pub use memory::{DeviceSimulator, MemoryBackend};

/// Parent of the live snapshot and of every history entry
pub const SENSOR_DATA_PATH: &str = "sensorData";
/// Live snapshot written by the device
pub const LATEST_PATH: &str = "sensorData/latest";
/// Flag the app sets to ask the device for a fresh reading
pub const FETCH_REQUEST_PATH: &str = "sensorData/fetchRequest";
/// Parent of the per-analyte fitted curves
pub const CALIBRATION_PATH: &str = "calibration";
/// Device heartbeat, epoch seconds
pub const LAST_SEEN_PATH: &str = "deviceStatus/lastSeen";

/// Children of `sensorData` that are not history entries
pub const NON_HISTORY_KEYS: [&str; 2] = ["latest", "fetchRequest"];

/// Path of an analyte's fitted curve, e.g. `calibration/nitrate`
pub fn curve_path(analyte: Analyte) -> String {
    format!("{}/{}", CALIBRATION_PATH, analyte.key())
}

/// Path of one raw calibration voltage, e.g. `nitrate_calibrated/10uM`
pub fn calibration_log_path(analyte: Analyte, concentration_um: f64) -> String {
    format!(
        "{}_calibrated/{}",
        analyte.key(),
        concentration_label(concentration_um)
    )
}

/// Source of device readings
pub trait SensorDataSource: Send + Sync + 'static {
    /// Ask the device for a fresh reading (fire and forget)
    fn request_fetch(&self) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Read the latest snapshot once
    fn read_snapshot(&self) -> impl Future<Output = Result<SensorSnapshot, BackendError>> + Send;

    /// Follow the latest snapshot; the current value is delivered first
    fn subscribe_snapshots(&self) -> Subscription<SensorSnapshot>;

    /// Last `limit` history entries, newest first
    fn read_history(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<HistoryEntry>, BackendError>> + Send;
}

/// Persistent store for fitted curves
pub trait CalibrationStore: Send + Sync + 'static {
    /// Stored curve for an analyte, `None` when never calibrated
    fn get_curve(
        &self,
        analyte: Analyte,
    ) -> impl Future<Output = Result<Option<CalibrationCurve>, BackendError>> + Send;

    /// Replace the stored curve for an analyte
    fn set_curve(
        &self,
        analyte: Analyte,
        curve: CalibrationCurve,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Log one raw calibration voltage under `<analyte>_calibrated/<label>`
    fn record_point(
        &self,
        analyte: Analyte,
        concentration_um: f64,
        voltage: f64,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// Device heartbeat
pub trait DeviceStatusSource: Send + Sync + 'static {
    /// Last heartbeat in epoch seconds, `None` when never written
    fn last_seen(&self) -> impl Future<Output = Result<Option<i64>, BackendError>> + Send;

    /// Follow the heartbeat; the current value is delivered first
    fn subscribe_last_seen(&self) -> Subscription<Option<i64>>;
}

/// Everything the app needs from one backend
pub trait Backend: SensorDataSource + CalibrationStore + DeviceStatusSource {}

impl<T> Backend for T where T: SensorDataSource + CalibrationStore + DeviceStatusSource {}

/// `$key` ordering of history children
///
/// Integer keys sort numerically and before any other key, so `999` comes
/// before `1000` and both before `fetchRequest`.
pub fn compare_history_keys(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Cancellable stream of values produced by a background task
///
/// Dropping the subscription (or calling [`Subscription::unsubscribe`])
/// aborts the producer, so a listener can never outlive its consumer.
pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
    task: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Subscription<T> {
    /// Spawn `producer` on the current tokio runtime
    ///
    /// The producer receives the sending half and should return once
    /// `send` fails.
    ///
    /// # Panics
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, Fut>(capacity: usize, producer: F) -> Self
    where
        F: FnOnce(mpsc::Sender<T>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(producer(tx));
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Subscription fed directly by the returned sender
    pub fn channel(capacity: usize) -> (mpsc::Sender<T>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx, task: None })
    }
}

impl<T> Subscription<T> {
    /// Wait for the next value, `None` once the producer has stopped
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Stop the producer and discard anything still queued
    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.rx.close();
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_compare_history_keys() {
        use std::cmp::Ordering::{Greater, Less};
        assert_eq!(compare_history_keys("999", "1000"), Less);
        assert_eq!(compare_history_keys("1000", "fetchRequest"), Less);
        assert_eq!(compare_history_keys("latest", "fetchRequest"), Greater);
        assert_eq!(compare_history_keys("fetchRequest", "-5"), Greater);
    }

    #[test]
    fn test_paths() {
        assert_eq!(curve_path(Analyte::Nitrate), "calibration/nitrate");
        assert_eq!(
            calibration_log_path(Analyte::Chlorine, 1000.0),
            "chlorine_calibrated/1000uM"
        );
        assert_eq!(
            calibration_log_path(Analyte::Ammonia, 1.0),
            "ammonia_calibrated/1uM"
        );
    }

    #[tokio::test]
    async fn test_subscription_yields_values_as_stream() {
        let sub = Subscription::spawn(4, |tx| async move {
            for i in 0..3 {
                if tx.send(i).await.is_err() {
                    return;
                }
            }
        });
        let values: Vec<i32> = sub.collect().await;
        assert_eq!(values, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_subscription_stops_producer() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let mut sub = Subscription::spawn(1, move |tx| async move {
            let mut n = 0u32;
            loop {
                if tx.send(n).await.is_err() {
                    break;
                }
                n += 1;
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(sub.recv().await, Some(0));
        sub.unsubscribe();

        tokio::time::sleep(Duration::from_secs(1)).await;
        // Aborted, so the loop never observed the closed channel
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_channel_subscription_ends_when_sender_dropped() {
        let (tx, mut sub) = Subscription::channel(2);
        tx.send("a").await.unwrap();
        drop(tx);
        assert_eq!(sub.recv().await, Some("a"));
        assert_eq!(sub.recv().await, None);
    }
}
