// ConnectionManager: device liveness tracking
//
// Single Responsibility: evaluate the device heartbeat and report
// connectivity edges. A status is emitted on the first evaluation and then
// only when connectivity flips, so a reconnect is reported exactly once.
// The heartbeat is re-evaluated on every update and on a periodic tick,
// since the gap keeps growing while the device is silent.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};

use crate::backend::{Backend, Subscription};
use crate::error::{log_backend_error, BackendError};
use crate::liveness::{Clock, LivenessPolicy, LivenessStatus};
use crate::managers::BroadcastChannelManager;
use crate::telemetry;

/// Edge detector over successive liveness evaluations
#[derive(Debug, Default, Clone)]
pub struct ConnectionTracker {
    last_seen: Option<i64>,
    connected: Option<bool>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new heartbeat value
    pub fn set_last_seen(&mut self, last_seen: Option<i64>) {
        self.last_seen = last_seen;
    }

    pub fn last_seen(&self) -> Option<i64> {
        self.last_seen
    }

    pub fn connected(&self) -> Option<bool> {
        self.connected
    }

    /// Evaluate the stored heartbeat; returns the status on an edge
    pub fn evaluate(&mut self, policy: &LivenessPolicy, clock: &dyn Clock) -> Option<LivenessStatus> {
        let status = policy.evaluate(self.last_seen, clock);
        if self.connected == Some(status.connected) {
            return None;
        }
        self.connected = Some(status.connected);
        Some(status)
    }
}

/// Manages device connectivity
pub struct ConnectionManager<B: Backend> {
    backend: Arc<B>,
    policy: LivenessPolicy,
    clock: Arc<dyn Clock>,
    check_interval: Duration,
    broadcasts: Arc<BroadcastChannelManager>,
    tracker: Arc<Mutex<ConnectionTracker>>,
}

impl<B: Backend> ConnectionManager<B> {
    pub fn new(
        backend: Arc<B>,
        policy: LivenessPolicy,
        clock: Arc<dyn Clock>,
        check_interval: Duration,
        broadcasts: Arc<BroadcastChannelManager>,
    ) -> Self {
        Self {
            backend,
            policy,
            clock,
            check_interval,
            broadcasts,
            tracker: Arc::new(Mutex::new(ConnectionTracker::new())),
        }
    }

    pub fn policy(&self) -> LivenessPolicy {
        self.policy
    }

    /// Last known connectivity, `None` before the first evaluation
    pub fn is_connected(&self) -> Option<bool> {
        self.tracker.lock().ok().and_then(|tracker| tracker.connected())
    }

    /// Read the heartbeat once and evaluate it
    ///
    /// Publishes on the connection channel when connectivity changed.
    pub async fn check_now(&self) -> Result<LivenessStatus, BackendError> {
        let last_seen = self
            .backend
            .last_seen()
            .await
            .inspect_err(|err| log_backend_error(err, "last_seen"))?;

        let status = self.policy.evaluate(last_seen, self.clock.as_ref());
        let edge = {
            let mut tracker = self.tracker.lock().map_err(|_| BackendError::LockPoisoned {
                component: "connection_tracker".to_string(),
            })?;
            tracker.set_last_seen(last_seen);
            tracker.evaluate(&self.policy, self.clock.as_ref())
        };
        if let Some(edge) = edge {
            announce(&self.broadcasts, &edge);
        }
        Ok(status)
    }

    /// Follow connectivity edges
    ///
    /// Combines heartbeat updates with a periodic re-evaluation so a device
    /// that stops writing is reported as disconnected once the threshold
    /// passes.
    pub fn watch(&self) -> Subscription<LivenessStatus> {
        let mut heartbeats = self.backend.subscribe_last_seen();
        let tracker = Arc::clone(&self.tracker);
        let broadcasts = Arc::clone(&self.broadcasts);
        let clock = Arc::clone(&self.clock);
        let policy = self.policy;
        let period = self.check_interval;

        Subscription::spawn(8, move |tx| async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // Wait for the first heartbeat before ticking
            ticker.reset();

            loop {
                let heartbeat = tokio::select! {
                    value = heartbeats.recv() => match value {
                        Some(value) => Some(value),
                        None => break,
                    },
                    _ = ticker.tick() => None,
                };

                let edge = match tracker.lock() {
                    Ok(mut tracker) => {
                        if let Some(last_seen) = heartbeat {
                            tracker.set_last_seen(last_seen);
                        }
                        tracker.evaluate(&policy, clock.as_ref())
                    }
                    Err(_) => {
                        warn!("Connection tracker poisoned, stopping watch");
                        break;
                    }
                };

                if let Some(edge) = edge {
                    announce(&broadcasts, &edge);
                    if tx.send(edge).await.is_err() {
                        break;
                    }
                }
            }
        })
    }
}

fn announce(broadcasts: &BroadcastChannelManager, status: &LivenessStatus) {
    if status.connected {
        info!("Device connected (gap {:?}s)", status.gap_secs);
    } else {
        warn!("Device disconnected (last seen {:?})", status.last_seen);
    }
    telemetry::hub().record_connection(status);
    broadcasts.send_connection(*status);
}
