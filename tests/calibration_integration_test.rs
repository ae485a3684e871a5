//! Integration tests for calibration workflow
//!
//! These tests drive the complete calibration workflow through `AppContext`
//! against the in-memory backend with a simulated device:
//! - Three-solution measurement sequence and curve fitting
//! - Curve persistence and the raw calibration log
//! - Discarding a measurement when the selection changes during the delay
//! - Calibrated readings in live monitoring
//!
//! Tokio time is paused, so the 30 s electrode delays complete instantly.

use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;
use ise_monitor::analysis::CurveSource;
use ise_monitor::analyte::Analyte;
use ise_monitor::backend::{CalibrationStore, DeviceSimulator, MemoryBackend};
use ise_monitor::calibration::{CalibrationPhase, MeasurementOutcome};
use ise_monitor::config::AppConfig;
use ise_monitor::context::AppContext;
use ise_monitor::error::CalibrationError;
use ise_monitor::liveness::ManualClock;

fn setup() -> (MemoryBackend, Arc<AppContext<MemoryBackend>>) {
    let backend =
        MemoryBackend::new().with_simulator(DeviceSimulator::new(42).with_noise(0.0));
    let ctx = AppContext::new(
        backend.clone(),
        &AppConfig::default(),
        Arc::new(ManualClock::at_epoch(1_718_000_000)),
    );
    (backend, Arc::new(ctx))
}

/// Measure every standard solution of `analyte` with the simulator sitting in it
async fn calibrate(
    backend: &MemoryBackend,
    ctx: &AppContext<MemoryBackend>,
    analyte: Analyte,
) -> Vec<MeasurementOutcome> {
    ctx.calibration().select_analyte(analyte).unwrap();
    let mut outcomes = Vec::new();
    for &concentration in analyte.calibration_concentrations_um() {
        ctx.calibration().select_concentration(concentration).unwrap();
        backend.set_simulated_level(analyte, concentration);
        outcomes.push(ctx.calibration().measure().await.unwrap());
    }
    outcomes
}

#[tokio::test(start_paused = true)]
async fn test_full_calibration_workflow() {
    let (backend, ctx) = setup();

    let started = tokio::time::Instant::now();
    let outcomes = calibrate(&backend, &ctx, Analyte::Nitrate).await;
    assert!(started.elapsed() >= Duration::from_secs(90));

    assert!(matches!(outcomes[0], MeasurementOutcome::BufferNotFull { points: 1 }));
    assert!(matches!(outcomes[1], MeasurementOutcome::BufferNotFull { points: 2 }));
    let curve = match outcomes[2] {
        MeasurementOutcome::Fitted(curve) => curve,
        ref other => panic!("expected a fitted curve, got {:?}", other),
    };

    // The simulator follows the default regression, so the fit recovers it
    let default = Analyte::Nitrate.default_curve();
    assert_relative_eq!(curve.e0, default.offset, epsilon = 1e-9);
    assert_relative_eq!(curve.slope, default.divisor, epsilon = 1e-9);

    // Persisted and applied
    assert_eq!(
        backend.get_curve(Analyte::Nitrate).await.unwrap(),
        Some(curve)
    );
    let state = ctx.calibration_state().unwrap();
    assert_eq!(state.curve(Analyte::Nitrate), Some(curve));

    let log = backend.calibration_log();
    assert_eq!(log.len(), 3);
    assert!(log.contains_key("nitrate_calibrated/10uM"));
    assert!(log.contains_key("nitrate_calibrated/50uM"));
    assert!(log.contains_key("nitrate_calibrated/100uM"));

    let progress = ctx.calibration().progress().unwrap();
    assert_eq!(progress.phase, CalibrationPhase::Idle);
    assert_eq!(progress.points_collected, 3);
    assert_eq!(progress.last_curve, Some(curve));
}

#[tokio::test(start_paused = true)]
async fn test_calibrated_readings_in_live_monitoring() {
    let (backend, ctx) = setup();
    calibrate(&backend, &ctx, Analyte::Ammonia).await;
    ctx.calibration().set_use_calibration(true).unwrap();

    backend.set_simulated_level(Analyte::Ammonia, 40.0);
    let report = ctx.monitor().refresh().await.unwrap();

    let ammonia = report.reading(Analyte::Ammonia).unwrap();
    assert_eq!(ammonia.source, CurveSource::Calibrated);
    assert_relative_eq!(ammonia.concentration_um, 40.0, max_relative = 1e-6);
    assert!(ammonia.safe);

    // Other analytes were never calibrated and keep the default regression
    let nitrate = report.reading(Analyte::Nitrate).unwrap();
    assert_eq!(nitrate.source, CurveSource::Default);
}

#[tokio::test(start_paused = true)]
async fn test_selection_change_during_delay_discards_result() {
    let (backend, ctx) = setup();
    let mut progress_rx = ctx.subscribe_calibration().unwrap();

    let measuring = {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move { ctx.calibration().measure().await })
    };

    // Let the measurement reach its delay, then switch solution
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(ctx.calibration().progress().unwrap().phase.is_measuring());
    ctx.calibration().select_concentration(50.0).unwrap();

    let outcome = measuring.await.unwrap().unwrap();
    assert_eq!(outcome, MeasurementOutcome::Discarded);
    assert_eq!(ctx.calibration().progress().unwrap().points_collected, 0);
    assert!(backend.calibration_log().is_empty());

    let mut phases = Vec::new();
    while let Ok(progress) = progress_rx.try_recv() {
        phases.push(progress.phase);
    }
    assert_eq!(
        phases,
        vec![
            CalibrationPhase::MeasurementRequested,
            CalibrationPhase::MeasurementDelay,
            CalibrationPhase::AwaitingSolutionSelection,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_second_measurement_rejected_while_first_in_flight() {
    let (_backend, ctx) = setup();

    let first = {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move { ctx.calibration().measure().await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(
        ctx.calibration().measure().await.unwrap_err(),
        CalibrationError::MeasurementInFlight
    );
    assert!(matches!(
        first.await.unwrap().unwrap(),
        MeasurementOutcome::BufferNotFull { points: 1 }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_curves_survive_a_new_session() {
    let (backend, ctx) = setup();
    calibrate(&backend, &ctx, Analyte::Chlorine).await;

    let fresh = AppContext::new(
        backend.clone(),
        &AppConfig::default(),
        Arc::new(ManualClock::at_epoch(1_718_000_500)),
    );
    assert_eq!(fresh.load_calibration().await.unwrap(), 1);
    assert!(fresh
        .calibration_state()
        .unwrap()
        .curve(Analyte::Chlorine)
        .is_some());
}
