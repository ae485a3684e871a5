use super::*;
use crate::analysis::CurveSource;

#[test]
fn test_get_version() {
    let result = get_version().unwrap();
    assert_eq!(result, "0.1.0");
}

#[test]
fn test_analyte_options_cover_every_analyte() {
    let options = get_analyte_options();
    assert_eq!(options.len(), 3);
    let nitrate = options
        .iter()
        .find(|option| option.key == "nitrate")
        .unwrap();
    assert_eq!(nitrate.concentrations_um, vec![10.0, 50.0, 100.0]);
    assert_eq!(nitrate.concentration_labels, vec!["10uM", "50uM", "100uM"]);
    assert_eq!(nitrate.safety_limit_um, 806.0);
}

#[test]
fn test_compute_concentration() {
    let default = compute_concentration("Nitrate".to_string(), 0.17334, None).unwrap();
    assert_eq!(default.source, CurveSource::Default);
    assert!((default.concentration_um - 1.0).abs() < 1e-9);
    assert!(default.safe);

    let curve = CalibrationCurve::new(0.3, -0.1);
    let calibrated = compute_concentration("nitrate".to_string(), 0.2, Some(curve)).unwrap();
    assert_eq!(calibrated.source, CurveSource::Calibrated);
    assert!((calibrated.concentration_um - 10.0).abs() < 1e-9);

    assert!(compute_concentration("sulfate".to_string(), 0.1, None).is_err());
}

#[test]
fn test_compute_concentration_ignores_sentinel_curve() {
    let result = compute_concentration(
        "nitrate".to_string(),
        0.17334,
        Some(CalibrationCurve::SENTINEL),
    )
    .unwrap();
    assert_eq!(result.source, CurveSource::Default);
    assert!((result.concentration_um - 1.0).abs() < 1e-9);

    let flat = compute_concentration(
        "nitrate".to_string(),
        0.17334,
        Some(CalibrationCurve::new(0.2, 0.0)),
    )
    .unwrap();
    assert_eq!(flat.source, CurveSource::Default);
}

#[test]
fn test_fit_curve() {
    let curve = fit_curve(vec![1.0, 2.0, 3.0], vec![0.2, 0.1, 0.0]).unwrap();
    assert!((curve.e0 - 0.3).abs() < 1e-9);
    assert!((curve.slope + 0.1).abs() < 1e-9);

    assert!(fit_curve(vec![1.0, 2.0], vec![0.2, 0.1]).is_err());
    assert!(fit_curve(vec![1.0, 2.0, 3.0], vec![0.2]).is_err());
}

#[test]
fn test_init_app_with_simulated_backend() {
    let config = serde_json::to_string(&AppConfig::default()).unwrap();
    init_app(Some(config.clone())).unwrap();
    // Idempotent
    init_app(Some(config)).unwrap();

    let report = get_current_report().unwrap();
    assert_eq!(report.readings.len(), 3);
    assert!(get_share_text().unwrap().is_some());

    let progress = select_calibration_analyte("ammonia".to_string()).unwrap();
    // Ammonia also offers 10 µM, so the selection carries over
    assert_eq!(progress.concentration_um, 10.0);
    assert!(select_calibration_concentration(5.0).is_err());

    let state: serde_json::Value = serde_json::from_str(&get_calibration_state().unwrap()).unwrap();
    assert_eq!(state["use_calibration"], false);

    assert!(init_app(Some("{not json".to_string())).is_err());
}

#[test]
fn test_error_codes_exposed() {
    assert_eq!(CalibrationErrorCodes::INVALID_CONCENTRATION, 2001);
    assert_eq!(BackendErrorCodes::HTTP, 3001);
    let _ = get_calibration_error_codes();
    let _ = get_backend_error_codes();
}
