// Device liveness - decides whether the sensor rig is online
//
// The device writes its heartbeat to `deviceStatus/lastSeen` as epoch
// seconds. The device is connected while `now - lastSeen` is at most the
// configured threshold. "Now" is taken in the deployment's fixed offset
// (UTC+5:30 by default); epoch arithmetic is offset independent, the
// offset only affects how timestamps are rendered in logs and the UI.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, FixedOffset, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Default deployment offset: UTC+5:30, in minutes
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 330;

/// Default maximum heartbeat age, in seconds
pub const DEFAULT_DISCONNECT_THRESHOLD_SECS: i64 = 5;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and simulation
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Clock starting at the given epoch second
    pub fn at_epoch(seconds: i64) -> Self {
        Self::new(Utc.timestamp_opt(seconds, 0).single().unwrap_or_default())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance_secs(&self, seconds: i64) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += chrono::Duration::seconds(seconds);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Connection state derived from one heartbeat evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessStatus {
    pub connected: bool,
    /// Heartbeat in epoch seconds, `None` if never written
    pub last_seen: Option<i64>,
    /// `now - lastSeen` in seconds; negative when the device clock runs ahead
    pub gap_secs: Option<i64>,
}

/// Liveness policy: threshold plus the deployment offset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivenessPolicy {
    pub threshold_secs: i64,
    pub offset: FixedOffset,
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_DISCONNECT_THRESHOLD_SECS,
            DEFAULT_UTC_OFFSET_MINUTES,
        )
    }
}

impl LivenessPolicy {
    /// Build a policy; an out-of-range offset falls back to UTC
    pub fn new(threshold_secs: i64, utc_offset_minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix());
        Self {
            threshold_secs,
            offset,
        }
    }

    /// Current time in the deployment offset
    pub fn local_now(&self, clock: &dyn Clock) -> DateTime<FixedOffset> {
        clock.now().with_timezone(&self.offset)
    }

    /// Evaluate a heartbeat at a given instant
    ///
    /// A missing heartbeat counts as epoch zero, which is always stale.
    pub fn evaluate_at(&self, last_seen: Option<i64>, now: DateTime<FixedOffset>) -> LivenessStatus {
        let gap = now.timestamp() - last_seen.unwrap_or(0);
        LivenessStatus {
            connected: gap <= self.threshold_secs,
            last_seen,
            gap_secs: last_seen.map(|_| gap),
        }
    }

    /// Evaluate a heartbeat against a clock
    pub fn evaluate(&self, last_seen: Option<i64>, clock: &dyn Clock) -> LivenessStatus {
        self.evaluate_at(last_seen, self.local_now(clock))
    }
}

/// Whether a heartbeat is fresh at `now`
///
/// # Arguments
/// * `last_seen` - Heartbeat in epoch seconds
/// * `now` - Current time in the deployment offset
/// * `threshold_secs` - Maximum accepted gap
pub fn is_connected_at(last_seen: i64, now: DateTime<FixedOffset>, threshold_secs: i64) -> bool {
    now.timestamp() - last_seen <= threshold_secs
}
