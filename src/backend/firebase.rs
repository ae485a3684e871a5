// RealtimeDbClient - Firebase Realtime Database REST adapter
//
// Every node is addressed as `{base}/{path}.json`; GET returns the JSON
// value or `null`, PUT replaces it. The REST API has no push channel that
// reqwest can follow portably, so subscriptions poll and emit on change.

use std::time::Duration;

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{
    calibration_log_path, compare_history_keys, curve_path, CalibrationStore, DeviceStatusSource,
    SensorDataSource, Subscription, FETCH_REQUEST_PATH, LAST_SEEN_PATH, LATEST_PATH, NON_HISTORY_KEYS,
    SENSOR_DATA_PATH,
};
use crate::analyte::Analyte;
use crate::calibration::CalibrationCurve;
use crate::error::{log_backend_error, BackendError};
use crate::reading::{HistoryEntry, SensorSnapshot};

/// Default polling period for subscriptions
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// REST client for one database instance
#[derive(Debug, Clone)]
pub struct RealtimeDbClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    poll_interval: Duration,
}

impl RealtimeDbClient {
    /// Create a client
    ///
    /// # Arguments
    /// * `base_url` - Database root, e.g. `https://<project>.firebaseio.com`
    /// * `auth_token` - Database secret or ID token, sent as `auth=`
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// REST URL of a node
    pub fn node_url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path.trim_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, self.node_url(path));
        match &self.auth_token {
            Some(token) => builder.query(&[("auth", token.as_str())]),
            None => builder,
        }
    }

    /// Read a node, `None` when it holds `null`
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, BackendError> {
        self.get_with_query(path, &[]).await
    }

    async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, BackendError> {
        let response = self
            .request(reqwest::Method::GET, path)
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        debug!("GET {} -> {} bytes", path, body.len());
        Ok(serde_json::from_str::<Option<T>>(&body)?)
    }

    /// Replace a node
    pub async fn put<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> Result<(), BackendError> {
        self.request(reqwest::Method::PUT, path)
            .json(value)
            .send()
            .await?
            .error_for_status()?;
        debug!("PUT {}", path);
        Ok(())
    }

    /// Poll a node and emit each distinct value, starting with the current one
    fn poll<T>(&self, path: &'static str) -> Subscription<Option<T>>
    where
        T: DeserializeOwned + PartialEq + Clone + Send + 'static,
    {
        let client = self.clone();
        Subscription::spawn(16, move |tx| async move {
            let mut interval = tokio::time::interval(client.poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last: Option<Option<T>> = None;
            loop {
                interval.tick().await;
                match client.get::<T>(path).await {
                    Ok(value) => {
                        if last.as_ref() == Some(&value) {
                            continue;
                        }
                        last = Some(value.clone());
                        if tx.send(value).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => log_backend_error(&err, path),
                }
            }
        })
    }
}

/// Turn the children of `sensorData` into history entries, newest first
///
/// Non-object children (`fetchRequest`) and the live snapshot are skipped;
/// entries that fail to decode are logged and dropped.
pub fn parse_history(
    children: serde_json::Map<String, serde_json::Value>,
    limit: usize,
) -> Vec<HistoryEntry> {
    let mut entries: Vec<HistoryEntry> = children
        .into_iter()
        .filter(|(key, value)| value.is_object() && !NON_HISTORY_KEYS.contains(&key.as_str()))
        .filter_map(|(key, value)| match serde_json::from_value(value) {
            Ok(snapshot) => Some(HistoryEntry { key, snapshot }),
            Err(err) => {
                warn!("Skipping malformed history entry {}: {}", key, err);
                None
            }
        })
        .collect();
    entries.sort_by(|a, b| compare_history_keys(&b.key, &a.key));
    entries.truncate(limit);
    entries
}


impl SensorDataSource for RealtimeDbClient {
    async fn request_fetch(&self) -> Result<(), BackendError> {
        self.put(FETCH_REQUEST_PATH, &true).await
    }

    async fn read_snapshot(&self) -> Result<SensorSnapshot, BackendError> {
        Ok(self
            .get::<SensorSnapshot>(LATEST_PATH)
            .await?
            .unwrap_or_default())
    }

    fn subscribe_snapshots(&self) -> Subscription<SensorSnapshot> {
        let mut raw = self.poll::<SensorSnapshot>(LATEST_PATH);
        Subscription::spawn(16, move |tx| async move {
            while let Some(value) = raw.recv().await {
                if tx.send(value.unwrap_or_default()).await.is_err() {
                    break;
                }
            }
        })
    }

    async fn read_history(&self, limit: usize) -> Result<Vec<HistoryEntry>, BackendError> {
        // Keys sort digits first, so `fetchRequest` and `latest` are always
        // the last two children and need room in the window.
        let window = limit + NON_HISTORY_KEYS.len();
        let query = [
            ("orderBy", "\"$key\"".to_string()),
            ("limitToLast", window.to_string()),
        ];
        let children = self
            .get_with_query::<serde_json::Map<String, serde_json::Value>>(SENSOR_DATA_PATH, &query)
            .await?
            .unwrap_or_default();
        Ok(parse_history(children, limit))
    }
}

impl CalibrationStore for RealtimeDbClient {
    async fn get_curve(&self, analyte: Analyte) -> Result<Option<CalibrationCurve>, BackendError> {
        self.get(&curve_path(analyte)).await
    }

    async fn set_curve(&self, analyte: Analyte, curve: CalibrationCurve) -> Result<(), BackendError> {
        self.put(&curve_path(analyte), &curve).await
    }

    async fn record_point(
        &self,
        analyte: Analyte,
        concentration_um: f64,
        voltage: f64,
    ) -> Result<(), BackendError> {
        self.put(&calibration_log_path(analyte, concentration_um), &voltage)
            .await
    }
}

impl DeviceStatusSource for RealtimeDbClient {
    async fn last_seen(&self) -> Result<Option<i64>, BackendError> {
        self.get(LAST_SEEN_PATH).await
    }

    fn subscribe_last_seen(&self) -> Subscription<Option<i64>> {
        self.poll::<i64>(LAST_SEEN_PATH)
    }
}
