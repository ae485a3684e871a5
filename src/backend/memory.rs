// MemoryBackend - in-process stand-in for the remote database
//
// Holds the same data the realtime database does (latest snapshot,
// history, curves, raw calibration log, heartbeat) behind one Arc so that
// clones share state. An optional DeviceSimulator answers fetch requests
// the way the sensor rig would, which lets the CLI and the tests run the
// full workflow offline.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;

use super::{
    calibration_log_path, compare_history_keys, CalibrationStore, DeviceStatusSource,
    SensorDataSource, Subscription,
};
use crate::analyte::Analyte;
use crate::calibration::CalibrationCurve;
use crate::error::BackendError;
use crate::liveness::{Clock, SystemClock};
use crate::reading::{HistoryEntry, SensorSnapshot};

/// Simulated sensor rig
///
/// Each electrode sits in a solution of known concentration; a sample is
/// the default-curve voltage for that concentration plus uniform noise.
#[derive(Debug, Clone)]
pub struct DeviceSimulator {
    rng: StdRng,
    levels_um: HashMap<Analyte, f64>,
    noise_v: f64,
    temperature: f64,
}

impl DeviceSimulator {
    /// Create a simulator with tap-water-like levels
    ///
    /// # Arguments
    /// * `seed` - RNG seed, identical seeds give identical sample sequences
    pub fn new(seed: u64) -> Self {
        let levels_um = HashMap::from([
            (Analyte::Chlorine, 20.0),
            (Analyte::Ammonia, 5.0),
            (Analyte::Nitrate, 50.0),
        ]);
        Self {
            rng: StdRng::seed_from_u64(seed),
            levels_um,
            noise_v: 0.002,
            temperature: 25.0,
        }
    }

    /// Set the peak-to-peak half width of the voltage noise
    pub fn with_noise(mut self, noise_v: f64) -> Self {
        self.noise_v = noise_v.abs();
        self
    }

    /// Immerse one electrode in a solution of the given concentration
    pub fn set_level(&mut self, analyte: Analyte, concentration_um: f64) {
        self.levels_um.insert(analyte, concentration_um);
    }

    pub fn level(&self, analyte: Analyte) -> f64 {
        self.levels_um.get(&analyte).copied().unwrap_or(1.0)
    }

    /// Noise-free electrode voltage for a concentration under the default curve
    pub fn voltage_for(analyte: Analyte, concentration_um: f64) -> f64 {
        let curve = analyte.default_curve();
        curve.offset + curve.divisor * concentration_um.log10()
    }

    /// Produce one snapshot
    pub fn sample(&mut self) -> SensorSnapshot {
        let mut snapshot = SensorSnapshot {
            temperature: self.temperature + self.rng.gen_range(-0.3..=0.3),
            ..SensorSnapshot::default()
        };
        for analyte in Analyte::ALL {
            let noise = self.rng.gen_range(-self.noise_v..=self.noise_v);
            snapshot.set_voltage(analyte, Self::voltage_for(analyte, self.level(analyte)) + noise);
        }
        snapshot
    }
}

#[derive(Default)]
struct StoreState {
    history: BTreeMap<String, SensorSnapshot>,
    curves: HashMap<Analyte, CalibrationCurve>,
    calibration_log: BTreeMap<String, f64>,
    fetch_requests: u64,
    curve_writes: u64,
    fail_next: Option<BackendError>,
    simulator: Option<DeviceSimulator>,
}

struct Inner {
    latest: watch::Sender<SensorSnapshot>,
    last_seen: watch::Sender<Option<i64>>,
    state: Mutex<StoreState>,
    clock: Arc<dyn Clock>,
}

/// In-process backend implementing every backend port
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Empty backend on the wall clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Empty backend whose heartbeats and history keys come from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (latest, _) = watch::channel(SensorSnapshot::default());
        let (last_seen, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                latest,
                last_seen,
                state: Mutex::new(StoreState::default()),
                clock,
            }),
        }
    }

    /// Attach a simulated device that answers fetch requests
    pub fn with_simulator(self, simulator: DeviceSimulator) -> Self {
        if let Ok(mut state) = self.inner.state.lock() {
            state.simulator = Some(simulator);
        }
        self
    }

    /// Move a simulated electrode into a standard solution
    ///
    /// No-op without an attached simulator.
    pub fn set_simulated_level(&self, analyte: Analyte, concentration_um: f64) {
        if let Ok(mut state) = self.inner.state.lock() {
            if let Some(simulator) = state.simulator.as_mut() {
                simulator.set_level(analyte, concentration_um);
            }
        }
    }

    /// Publish a new latest snapshot
    pub fn publish_snapshot(&self, snapshot: SensorSnapshot) {
        self.inner.latest.send_replace(snapshot);
    }

    /// Store a history entry under `key`
    pub fn insert_history(&self, key: impl Into<String>, snapshot: SensorSnapshot) {
        if let Ok(mut state) = self.inner.state.lock() {
            state.history.insert(key.into(), snapshot);
        }
    }

    /// Overwrite the heartbeat
    pub fn set_last_seen(&self, last_seen: Option<i64>) {
        self.inner.last_seen.send_replace(last_seen);
    }

    /// Write a heartbeat for the current clock time
    pub fn heartbeat(&self) {
        let now = self.inner.clock.now().timestamp();
        self.set_last_seen(Some(now));
    }

    /// Make the next backend call fail with `err`
    pub fn fail_next(&self, err: BackendError) {
        if let Ok(mut state) = self.inner.state.lock() {
            state.fail_next = Some(err);
        }
    }

    /// Number of fetch requests received
    pub fn fetch_requests(&self) -> u64 {
        self.inner
            .state
            .lock()
            .map(|state| state.fetch_requests)
            .unwrap_or(0)
    }

    /// Number of curve writes received
    pub fn curve_writes(&self) -> u64 {
        self.inner
            .state
            .lock()
            .map(|state| state.curve_writes)
            .unwrap_or(0)
    }

    /// Raw calibration log keyed by path, e.g. `nitrate_calibrated/10uM`
    pub fn calibration_log(&self) -> BTreeMap<String, f64> {
        self.inner
            .state
            .lock()
            .map(|state| state.calibration_log.clone())
            .unwrap_or_default()
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreState>, BackendError> {
        let mut state = self
            .inner
            .state
            .lock()
            .map_err(|_| BackendError::LockPoisoned {
                component: "memory_store".to_string(),
            })?;
        if let Some(err) = state.fail_next.take() {
            warn!("Injected backend failure: {}", err);
            return Err(err);
        }
        Ok(state)
    }
}

fn watch_subscription<T>(rx: watch::Receiver<T>) -> Subscription<T>
where
    T: Clone + Send + Sync + 'static,
{
    Subscription::spawn(16, move |tx| async move {
        let mut rx = rx;
        loop {
            let value = rx.borrow_and_update().clone();
            if tx.send(value).await.is_err() {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
}

impl SensorDataSource for MemoryBackend {
    async fn request_fetch(&self) -> Result<(), BackendError> {
        let sample = {
            let mut state = self.state()?;
            state.fetch_requests += 1;
            let sample = state.simulator.as_mut().map(DeviceSimulator::sample);
            sample
        };

        if let Some(snapshot) = sample {
            let now = self.inner.clock.now().timestamp();
            debug!("Simulated device answered fetch request at {}", now);
            self.insert_history(now.to_string(), snapshot);
            self.publish_snapshot(snapshot);
            self.set_last_seen(Some(now));
        }
        Ok(())
    }

    async fn read_snapshot(&self) -> Result<SensorSnapshot, BackendError> {
        drop(self.state()?);
        Ok(*self.inner.latest.borrow())
    }

    fn subscribe_snapshots(&self) -> Subscription<SensorSnapshot> {
        watch_subscription(self.inner.latest.subscribe())
    }

    async fn read_history(&self, limit: usize) -> Result<Vec<HistoryEntry>, BackendError> {
        let state = self.state()?;
        let mut entries: Vec<HistoryEntry> = state
            .history
            .iter()
            .map(|(key, snapshot)| HistoryEntry {
                key: key.clone(),
                snapshot: *snapshot,
            })
            .collect();
        entries.sort_by(|a, b| compare_history_keys(&b.key, &a.key));
        entries.truncate(limit);
        Ok(entries)
    }
}

impl CalibrationStore for MemoryBackend {
    async fn get_curve(&self, analyte: Analyte) -> Result<Option<CalibrationCurve>, BackendError> {
        Ok(self.state()?.curves.get(&analyte).copied())
    }

    async fn set_curve(&self, analyte: Analyte, curve: CalibrationCurve) -> Result<(), BackendError> {
        let mut state = self.state()?;
        state.curve_writes += 1;
        state.curves.insert(analyte, curve);
        Ok(())
    }

    async fn record_point(
        &self,
        analyte: Analyte,
        concentration_um: f64,
        voltage: f64,
    ) -> Result<(), BackendError> {
        self.state()?
            .calibration_log
            .insert(calibration_log_path(analyte, concentration_um), voltage);
        Ok(())
    }
}

impl DeviceStatusSource for MemoryBackend {
    async fn last_seen(&self) -> Result<Option<i64>, BackendError> {
        drop(self.state()?);
        Ok(*self.inner.last_seen.borrow())
    }

    fn subscribe_last_seen(&self) -> Subscription<Option<i64>> {
        watch_subscription(self.inner.last_seen.subscribe())
    }
}
