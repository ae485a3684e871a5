// Public API for flutter_rust_bridge integration
// This module provides FFI functions for Flutter to drive monitoring and calibration

#![allow(dead_code)] // FFI functions are called from Dart, not detected by Rust analyzer

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use once_cell::sync::OnceCell;
use tokio::runtime::Runtime;

use crate::analysis::{self, LiveReport};
use crate::analyte::Analyte;
use crate::backend::AnyBackend;
use crate::calibration::{fit, CalibrationCurve, CalibrationPoint, CalibrationProgress};
use crate::config::AppConfig;
use crate::context::AppContext;
use crate::liveness::{LivenessStatus, SystemClock};

pub mod diagnostics;
pub mod streams;
pub mod types;

pub use diagnostics::{get_backend_error_codes, get_calibration_error_codes, get_telemetry_snapshot};
pub use streams::{
    calibration_stream, connection_stream, diagnostic_metrics_stream, report_stream,
    watch_connection, watch_live_reports,
};
pub use types::{AnalyteOption, ComputedConcentration};

// Re-export error code constants for FFI exposure
pub use crate::error::{BackendErrorCodes, CalibrationErrorCodes};

/// Global AppContext instance, created by `init_app`
static APP_CONTEXT: OnceCell<AppContext<AnyBackend>> = OnceCell::new();

/// Runtime driving backend I/O and measurement delays
static RUNTIME: OnceCell<Runtime> = OnceCell::new();

fn runtime() -> Result<&'static Runtime> {
    RUNTIME.get_or_try_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("ise-monitor")
            .enable_all()
            .build()
            .context("failed to start tokio runtime")
    })
}

fn context() -> Result<&'static AppContext<AnyBackend>> {
    APP_CONTEXT
        .get()
        .ok_or_else(|| anyhow!("app context not initialized; call init_app first"))
}

fn parse_analyte(analyte: &str) -> Result<Analyte> {
    analyte.parse::<Analyte>().map_err(|reason| anyhow!(reason))
}

/// Get the version of the monitoring core
#[flutter_rust_bridge::frb(sync)]
pub fn get_version() -> Result<String> {
    Ok(env!("CARGO_PKG_VERSION").to_string())
}

/// Initialize logging, the backend and stored calibration
///
/// Safe to call more than once; later calls return without touching the
/// existing context.
///
/// # Arguments
/// * `config_json` - `AppConfig` as JSON; `None` loads the bundled config
///
/// # Returns
/// * `Ok(usize)` - Number of stored calibration curves loaded
///
/// # Errors
/// - Malformed `config_json`
/// - Backend failure while loading stored curves
#[flutter_rust_bridge::frb]
pub fn init_app(config_json: Option<String>) -> Result<usize> {
    crate::init_logging();

    let config = match config_json {
        Some(json) => serde_json::from_str::<AppConfig>(&json).context("invalid app config")?,
        None => AppConfig::load(),
    };

    let rt = runtime()?;
    let ctx = APP_CONTEXT.get_or_init(|| {
        // Subscriptions spawn onto the runtime, so the context is built inside it
        let _guard = rt.enter();
        AppContext::new(
            AnyBackend::from_config(&config.database),
            &config,
            Arc::new(SystemClock),
        )
    });

    let loaded = rt.block_on(ctx.load_calibration())?;
    Ok(loaded)
}

/// Analytes with their calibration solutions, in display order
#[flutter_rust_bridge::frb(sync)]
pub fn get_analyte_options() -> Vec<AnalyteOption> {
    Analyte::ALL.iter().map(|analyte| AnalyteOption::from(*analyte)).collect()
}

/// Convert one voltage without touching the backend
///
/// # Arguments
/// * `analyte` - `chlorine`, `ammonia` or `nitrate`
/// * `voltage` - Electrode voltage (V)
/// * `curve` - Calibration curve to apply; `None` or an unusable curve uses
///   the default regression
#[flutter_rust_bridge::frb(sync)]
pub fn compute_concentration(
    analyte: String,
    voltage: f64,
    curve: Option<CalibrationCurve>,
) -> Result<ComputedConcentration> {
    let analyte = parse_analyte(&analyte)?;
    // A sentinel read back from the store marks a failed fit
    let curve = curve.filter(CalibrationCurve::is_usable);
    let (concentration_um, source) =
        analysis::compute_with_source(analyte, voltage, curve, curve.is_some());
    Ok(ComputedConcentration {
        analyte,
        concentration_um,
        source,
        safe: analysis::is_safe(analyte, concentration_um),
    })
}

/// Fit a curve to `(log10 concentration, voltage)` pairs
///
/// # Errors
/// Fewer than three points or identical concentrations
#[flutter_rust_bridge::frb(sync)]
pub fn fit_curve(log_concentrations: Vec<f64>, voltages: Vec<f64>) -> Result<CalibrationCurve> {
    if log_concentrations.len() != voltages.len() {
        return Err(anyhow!(
            "{} concentrations but {} voltages",
            log_concentrations.len(),
            voltages.len()
        ));
    }
    let points: Vec<CalibrationPoint> = log_concentrations
        .into_iter()
        .zip(voltages)
        .map(|(x, y)| CalibrationPoint::new(x, y))
        .collect();
    Ok(fit(&points)?)
}

// ========================================================================
// MONITORING
// ========================================================================

/// Ask the device for a reading, wait for it, and report
///
/// Blocks for the configured fetch delay (30 s by default).
#[flutter_rust_bridge::frb]
pub fn refresh_readings() -> Result<LiveReport> {
    let ctx = context()?;
    Ok(runtime()?.block_on(ctx.monitor().refresh())?)
}

/// Report for the snapshot currently stored, without a fetch request
#[flutter_rust_bridge::frb]
pub fn get_current_report() -> Result<LiveReport> {
    let ctx = context()?;
    Ok(runtime()?.block_on(ctx.monitor().current_report())?)
}

/// Recent history, newest first
#[flutter_rust_bridge::frb]
pub fn get_history() -> Result<Vec<LiveReport>> {
    let ctx = context()?;
    Ok(runtime()?.block_on(ctx.monitor().history())?)
}

/// Share-sheet text for the most recent report, if any
#[flutter_rust_bridge::frb(sync)]
pub fn get_share_text() -> Result<Option<String>> {
    Ok(context()?.monitor().share_text())
}

/// Read the heartbeat once and evaluate connectivity
#[flutter_rust_bridge::frb]
pub fn check_connection() -> Result<LivenessStatus> {
    let ctx = context()?;
    Ok(runtime()?.block_on(ctx.connection().check_now())?)
}

// ========================================================================
// CALIBRATION
// ========================================================================

/// Select the analyte to calibrate
#[flutter_rust_bridge::frb]
pub fn select_calibration_analyte(analyte: String) -> Result<CalibrationProgress> {
    let analyte = parse_analyte(&analyte)?;
    Ok(context()?.calibration().select_analyte(analyte)?)
}

/// Select the standard solution the electrode sits in
#[flutter_rust_bridge::frb]
pub fn select_calibration_concentration(concentration_um: f64) -> Result<CalibrationProgress> {
    Ok(context()?
        .calibration()
        .select_concentration(concentration_um)?)
}

/// Measure the selected solution
///
/// Blocks for the configured measurement delay (30 s by default). A
/// selection change made meanwhile discards the result.
#[flutter_rust_bridge::frb]
pub fn measure_calibration_point() -> Result<CalibrationProgress> {
    let ctx = context()?;
    runtime()?.block_on(ctx.calibration().measure())?;
    Ok(ctx.calibration().progress()?)
}

/// Current calibration progress
#[flutter_rust_bridge::frb(sync)]
pub fn get_calibration_progress() -> Result<CalibrationProgress> {
    Ok(context()?.calibration().progress()?)
}

/// Abandon any pending measurement and drop buffered points
#[flutter_rust_bridge::frb]
pub fn reset_calibration() -> Result<CalibrationProgress> {
    Ok(context()?.calibration().reset()?)
}

/// Toggle between calibrated curves and the default regressions
#[flutter_rust_bridge::frb]
pub fn set_use_calibration(enabled: bool) -> Result<()> {
    Ok(context()?.calibration().set_use_calibration(enabled)?)
}

/// Get current calibration state as JSON
///
/// # Usage
/// ```dart
/// final json = await getCalibrationState();
/// ```
#[flutter_rust_bridge::frb]
pub fn get_calibration_state() -> Result<String> {
    let state = context()?.calibration().get_state()?;
    serde_json::to_string(&state).context("failed to serialize calibration state")
}

#[cfg(test)]
mod tests;
