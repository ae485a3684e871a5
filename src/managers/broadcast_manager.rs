// BroadcastChannelManager: Centralized tokio broadcast channel management
// Single Responsibility: Broadcast channel lifecycle and subscription

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::analysis::LiveReport;
use crate::calibration::CalibrationProgress;
use crate::liveness::LivenessStatus;

type Slot<T> = Arc<Mutex<Option<broadcast::Sender<T>>>>;

/// Manages all tokio broadcast channels
///
/// Single Responsibility: Broadcast channel lifecycle and subscription
///
/// This manager centralizes all broadcast channel creation, storage, and
/// subscription handling. It provides a clean interface for:
/// - Initializing broadcast channels with appropriate buffer sizes
/// - Subscribing to broadcast channels for multiple consumers
/// - Publishing without caring whether anyone listens
///
/// # Channel Types
/// - Reports: live concentration reports after every refresh
/// - Calibration: Progress updates during calibration workflow
/// - Connection: device connect/disconnect edges
pub struct BroadcastChannelManager {
    reports: Slot<LiveReport>,
    calibration: Slot<CalibrationProgress>,
    connection: Slot<LivenessStatus>,
}

/// Sender slots only hold channel handles, so a poisoned lock is recovered.
fn lock_slot<T>(slot: &Slot<T>) -> MutexGuard<'_, Option<broadcast::Sender<T>>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn init_slot<T: Clone>(slot: &Slot<T>, capacity: usize) -> broadcast::Sender<T> {
    let mut guard = lock_slot(slot);
    if let Some(tx) = guard.as_ref() {
        return tx.clone();
    }
    let (tx, _) = broadcast::channel(capacity);
    *guard = Some(tx.clone());
    tx
}

fn subscribe_slot<T: Clone>(slot: &Slot<T>) -> Option<broadcast::Receiver<T>> {
    lock_slot(slot).as_ref().map(|tx| tx.subscribe())
}

/// Returns the number of receivers reached; 0 when uninitialized or unheard
fn send_slot<T: Clone>(slot: &Slot<T>, value: T) -> usize {
    lock_slot(slot)
        .as_ref()
        .and_then(|tx| tx.send(value).ok())
        .unwrap_or(0)
}

impl BroadcastChannelManager {
    /// Create a new BroadcastChannelManager with all channels uninitialized
    ///
    /// Channels must be explicitly initialized via init_* methods before use.
    pub fn new() -> Self {
        Self {
            reports: Arc::new(Mutex::new(None)),
            calibration: Arc::new(Mutex::new(None)),
            connection: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a manager with every channel initialized
    pub fn initialized() -> Self {
        let manager = Self::new();
        manager.init_reports();
        manager.init_calibration();
        manager.init_connection();
        manager
    }

    // ========================================================================
    // REPORT CHANNEL
    // ========================================================================

    /// Initialize live report broadcast channel
    ///
    /// Idempotent: a second call returns the existing sender.
    ///
    /// # Notes
    /// - Buffer size: 32 reports (refreshes are at least seconds apart)
    /// - Old messages dropped if buffer fills (lagged subscribers)
    pub fn init_reports(&self) -> broadcast::Sender<LiveReport> {
        init_slot(&self.reports, 32)
    }

    /// Subscribe to live reports
    ///
    /// # Returns
    /// `Option<broadcast::Receiver<LiveReport>>` - Receiver or None if not initialized
    pub fn subscribe_reports(&self) -> Option<broadcast::Receiver<LiveReport>> {
        subscribe_slot(&self.reports)
    }

    pub fn send_report(&self, report: LiveReport) -> usize {
        send_slot(&self.reports, report)
    }

    // ========================================================================
    // CALIBRATION CHANNEL
    // ========================================================================

    /// Initialize calibration broadcast channel
    ///
    /// # Notes
    /// - Buffer size: 50 messages (several phase changes per measurement)
    pub fn init_calibration(&self) -> broadcast::Sender<CalibrationProgress> {
        init_slot(&self.calibration, 50)
    }

    /// Subscribe to calibration progress
    ///
    /// # Returns
    /// `Option<broadcast::Receiver<CalibrationProgress>>` - Receiver or None if not initialized
    pub fn subscribe_calibration(&self) -> Option<broadcast::Receiver<CalibrationProgress>> {
        subscribe_slot(&self.calibration)
    }

    pub fn send_calibration(&self, progress: CalibrationProgress) -> usize {
        send_slot(&self.calibration, progress)
    }

    // ========================================================================
    // CONNECTION CHANNEL
    // ========================================================================

    /// Initialize connection broadcast channel
    ///
    /// Only connectivity edges are sent, so a small buffer suffices.
    pub fn init_connection(&self) -> broadcast::Sender<LivenessStatus> {
        init_slot(&self.connection, 16)
    }

    /// Subscribe to connection changes
    pub fn subscribe_connection(&self) -> Option<broadcast::Receiver<LivenessStatus>> {
        subscribe_slot(&self.connection)
    }

    pub fn send_connection(&self, status: LivenessStatus) -> usize {
        send_slot(&self.connection, status)
    }
}

impl Default for BroadcastChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyte::Analyte;
    use crate::calibration::{CalibrationPhase, CalibrationState};
    use crate::reading::SensorSnapshot;

    #[test]
    fn test_report_channel_lifecycle() {
        let manager = BroadcastChannelManager::new();

        // Initially no subscription possible
        assert!(manager.subscribe_reports().is_none());

        let _tx = manager.init_reports();
        assert!(manager.subscribe_reports().is_some());
    }

    #[test]
    fn test_report_multiple_subscribers() {
        let manager = BroadcastChannelManager::new();
        manager.init_reports();

        let mut rx1 = manager.subscribe_reports().unwrap();
        let mut rx2 = manager.subscribe_reports().unwrap();

        let report = LiveReport::from_snapshot(
            &SensorSnapshot::default(),
            &CalibrationState::new_default(),
        );
        assert_eq!(manager.send_report(report), 2);

        assert_eq!(rx1.try_recv().unwrap().readings.len(), 3);
        assert_eq!(rx2.try_recv().unwrap().readings.len(), 3);
    }

    #[test]
    fn test_send_without_init_is_dropped() {
        let manager = BroadcastChannelManager::new();
        let progress = CalibrationProgress::new(Analyte::Nitrate, 10.0, CalibrationPhase::Idle);
        assert_eq!(manager.send_calibration(progress), 0);
    }

    #[test]
    fn test_init_is_idempotent() {
        let manager = BroadcastChannelManager::new();
        let tx = manager.init_connection();
        let mut rx = manager.subscribe_connection().unwrap();

        // Re-initializing must not orphan existing subscribers
        manager.init_connection();
        tx.send(LivenessStatus {
            connected: true,
            last_seen: Some(10),
            gap_secs: Some(0),
        })
        .unwrap();
        assert!(rx.try_recv().unwrap().connected);
    }

    #[test]
    fn test_default_implementation() {
        let manager = BroadcastChannelManager::default();

        assert!(manager.subscribe_reports().is_none());
        assert!(manager.subscribe_calibration().is_none());
        assert!(manager.subscribe_connection().is_none());

        let manager = BroadcastChannelManager::initialized();
        assert!(manager.subscribe_reports().is_some());
        assert!(manager.subscribe_calibration().is_some());
        assert!(manager.subscribe_connection().is_some());
    }
}
