use anyhow::{anyhow, Result};
use futures::{Stream, StreamExt};
use log::warn;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, UnboundedReceiverStream};

use crate::analysis::LiveReport;
use crate::backend::Subscription;
use crate::calibration::CalibrationProgress;
use crate::liveness::LivenessStatus;
use crate::telemetry::{self, MetricEvent};

use super::{context, runtime};

/// Broadcast receiver as a stream; lagged receivers skip what they missed
fn broadcast_stream<T>(rx: broadcast::Receiver<T>, name: &'static str) -> impl Stream<Item = T>
where
    T: Clone + Send + 'static,
{
    BroadcastStream::new(rx).filter_map(move |item| async move {
        match item {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("{} stream lagged: {}", name, err);
                None
            }
        }
    })
}

/// Reports produced by refreshes, history reads and live subscriptions
#[flutter_rust_bridge::frb(ignore)]
pub fn report_stream() -> Result<impl Stream<Item = LiveReport>> {
    let rx = context()?
        .subscribe_reports()
        .ok_or_else(|| anyhow!("report channel not initialized"))?;
    Ok(broadcast_stream(rx, "report"))
}

/// Calibration progress after every selection change and measurement phase
#[flutter_rust_bridge::frb(ignore)]
pub fn calibration_stream() -> Result<impl Stream<Item = CalibrationProgress>> {
    let rx = context()?
        .subscribe_calibration()
        .ok_or_else(|| anyhow!("calibration channel not initialized"))?;
    Ok(broadcast_stream(rx, "calibration"))
}

/// Connect/disconnect edges
#[flutter_rust_bridge::frb(ignore)]
pub fn connection_stream() -> Result<impl Stream<Item = LivenessStatus>> {
    let rx = context()?
        .subscribe_connection()
        .ok_or_else(|| anyhow!("connection channel not initialized"))?;
    Ok(broadcast_stream(rx, "connection"))
}

/// Follow the device's live snapshot as reports until dropped
#[flutter_rust_bridge::frb(ignore)]
pub fn watch_live_reports() -> Result<Subscription<LiveReport>> {
    let ctx = context()?;
    let _guard = runtime()?.enter();
    Ok(ctx.monitor().subscribe_reports())
}

/// Follow device connectivity until dropped
#[flutter_rust_bridge::frb(ignore)]
pub fn watch_connection() -> Result<Subscription<LivenessStatus>> {
    let ctx = context()?;
    let _guard = runtime()?.enter();
    Ok(ctx.connection().watch())
}

/// Stream of diagnostic metrics aggregated from telemetry hub.
///
/// Unbounded, so a slow debug screen never loses events.
#[flutter_rust_bridge::frb(ignore)]
pub fn diagnostic_metrics_stream() -> Result<impl Stream<Item = MetricEvent>> {
    let _guard = runtime()?.enter();
    let rx = telemetry::hub().collector().subscribe_unbounded();
    Ok(UnboundedReceiverStream::new(rx))
}
