use super::*;
use approx::assert_relative_eq;

/// Run one complete measurement for the current selection
fn measure(procedure: &mut CalibrationProcedure, voltage: f64) -> MeasurementOutcome {
    let ticket = procedure.request_measurement().unwrap();
    assert!(procedure.begin_delay(&ticket));
    procedure.accept_voltage(&ticket, voltage).unwrap()
}

#[test]
fn test_new_default() {
    let procedure = CalibrationProcedure::new_default();
    assert_eq!(procedure.analyte(), Analyte::Nitrate);
    assert_eq!(procedure.concentration_um(), 10.0);
    assert_eq!(
        procedure.phase(),
        CalibrationPhase::AwaitingSolutionSelection
    );
    assert!(procedure.pending().is_none());
}

#[test]
fn test_new_rejects_unknown_concentration() {
    let result = CalibrationProcedure::new(Analyte::Chlorine, 50.0);
    assert_eq!(
        result.unwrap_err(),
        CalibrationError::InvalidConcentration {
            concentration_um: 50.0
        }
    );
}

#[test]
fn test_phase_transitions_for_one_measurement() {
    let mut procedure = CalibrationProcedure::new_default();
    let ticket = procedure.request_measurement().unwrap();
    assert_eq!(procedure.phase(), CalibrationPhase::MeasurementRequested);

    assert!(procedure.begin_delay(&ticket));
    assert_eq!(procedure.phase(), CalibrationPhase::MeasurementDelay);

    let outcome = procedure.accept_voltage(&ticket, 0.12).unwrap();
    assert_eq!(outcome, MeasurementOutcome::BufferNotFull { points: 1 });
    assert_eq!(procedure.phase(), CalibrationPhase::Idle);
    assert!(procedure.pending().is_none());
}

#[test]
fn test_second_request_while_pending_is_rejected() {
    let mut procedure = CalibrationProcedure::new_default();
    procedure.request_measurement().unwrap();
    assert_eq!(
        procedure.request_measurement().unwrap_err(),
        CalibrationError::MeasurementInFlight
    );
}

#[test]
fn test_three_points_produce_a_fit() {
    let mut procedure = CalibrationProcedure::new_default();
    let e0 = 0.2;
    let slope = -0.055;

    for concentration in [10.0_f64, 50.0, 100.0] {
        procedure.select_concentration(concentration).unwrap();
        let outcome = measure(&mut procedure, e0 + slope * concentration.log10());
        if concentration < 100.0 {
            assert!(matches!(outcome, MeasurementOutcome::BufferNotFull { .. }));
        } else {
            match outcome {
                MeasurementOutcome::Fitted(curve) => {
                    assert_relative_eq!(curve.e0, e0, epsilon = 1e-9);
                    assert_relative_eq!(curve.slope, slope, epsilon = 1e-9);
                }
                other => panic!("expected a fit, got {:?}", other),
            }
        }
    }

    let progress = procedure.get_progress();
    assert_eq!(progress.points_collected, 3);
    assert!(progress.is_buffer_full());
    assert!(progress.last_curve.is_some());
}

#[test]
fn test_fourth_point_refits_on_sliding_window() {
    let mut procedure = CalibrationProcedure::new_default();
    for (concentration, voltage) in [(10.0, 0.15), (50.0, 0.11), (100.0, 0.09)] {
        procedure.select_concentration(concentration).unwrap();
        measure(&mut procedure, voltage);
    }
    procedure.select_concentration(10.0).unwrap();
    let outcome = measure(&mut procedure, 0.14);
    assert!(matches!(outcome, MeasurementOutcome::Fitted(_)));

    let points = procedure.points(Analyte::Nitrate);
    assert_eq!(points.len(), 3);
    assert_eq!(points[0].voltage, 0.11);
    assert_eq!(points[2].voltage, 0.14);
}

#[test]
fn test_identical_concentrations_fail_regression() {
    let mut procedure = CalibrationProcedure::new_default();
    measure(&mut procedure, 0.15);
    measure(&mut procedure, 0.16);
    let outcome = measure(&mut procedure, 0.17);
    assert_eq!(
        outcome,
        MeasurementOutcome::RegressionFailed(RegressionError::DegenerateX)
    );
    assert!(procedure.get_progress().last_curve.is_none());
}

#[test]
fn test_switching_analyte_discards_late_voltage() {
    let mut procedure = CalibrationProcedure::new_default();
    let ticket = procedure.request_measurement().unwrap();
    procedure.begin_delay(&ticket);

    procedure.select_analyte(Analyte::Chlorine);
    assert_eq!(
        procedure.phase(),
        CalibrationPhase::AwaitingSolutionSelection
    );
    assert!(!procedure.begin_delay(&ticket));

    let outcome = procedure.accept_voltage(&ticket, 0.2).unwrap();
    assert_eq!(outcome, MeasurementOutcome::Discarded);
    assert!(procedure.points(Analyte::Nitrate).is_empty());
    assert!(procedure.points(Analyte::Chlorine).is_empty());
}

#[test]
fn test_switching_concentration_discards_late_voltage() {
    let mut procedure = CalibrationProcedure::new_default();
    let ticket = procedure.request_measurement().unwrap();
    procedure.select_concentration(50.0).unwrap();

    let outcome = procedure.accept_voltage(&ticket, 0.2).unwrap();
    assert_eq!(outcome, MeasurementOutcome::Discarded);
    assert!(procedure.points(Analyte::Nitrate).is_empty());

    // A fresh request after the switch is allowed immediately
    let fresh = procedure.request_measurement().unwrap();
    assert_eq!(fresh.concentration_um, 50.0);
    assert_ne!(fresh.generation, ticket.generation);
}

#[test]
fn test_invalid_concentration_keeps_selection() {
    let mut procedure = CalibrationProcedure::new_default();
    let ticket = procedure.request_measurement().unwrap();
    assert!(procedure.select_concentration(1000.0).is_err());
    assert_eq!(procedure.concentration_um(), 10.0);
    // Rejected selection does not invalidate the in-flight ticket
    assert_eq!(
        procedure.accept_voltage(&ticket, 0.1).unwrap(),
        MeasurementOutcome::BufferNotFull { points: 1 }
    );
}

#[test]
fn test_select_analyte_keeps_shared_concentration() {
    let mut procedure = CalibrationProcedure::new_default();
    procedure.select_analyte(Analyte::Ammonia);
    assert_eq!(procedure.concentration_um(), 10.0);

    procedure.select_concentration(1.0).unwrap();
    procedure.select_analyte(Analyte::Chlorine);
    assert_eq!(procedure.concentration_um(), 10.0);

    procedure.select_concentration(1000.0).unwrap();
    procedure.select_analyte(Analyte::Nitrate);
    assert_eq!(procedure.concentration_um(), 10.0);
}

#[test]
fn test_consumed_ticket_reports_no_pending() {
    let mut procedure = CalibrationProcedure::new_default();
    let ticket = procedure.request_measurement().unwrap();
    procedure.accept_voltage(&ticket, 0.1).unwrap();
    assert_eq!(
        procedure.accept_voltage(&ticket, 0.1).unwrap_err(),
        CalibrationError::NoMeasurementPending
    );
}

#[test]
fn test_non_finite_voltage_consumes_ticket() {
    let mut procedure = CalibrationProcedure::new_default();
    let ticket = procedure.request_measurement().unwrap();
    let err = procedure.accept_voltage(&ticket, f64::NAN).unwrap_err();
    assert!(matches!(err, CalibrationError::InvalidVoltage { .. }));
    assert!(procedure.pending().is_none());
    assert!(procedure.points(Analyte::Nitrate).is_empty());
}

#[test]
fn test_negative_voltage_is_buffered() {
    let mut procedure = CalibrationProcedure::new_default();
    assert_eq!(
        measure(&mut procedure, -0.05),
        MeasurementOutcome::BufferNotFull { points: 1 }
    );
    assert_eq!(procedure.get_progress().last_voltage, Some(-0.05));
}

#[test]
fn test_cancel_measurement() {
    let mut procedure = CalibrationProcedure::new_default();
    let ticket = procedure.request_measurement().unwrap();
    procedure.cancel_measurement();
    assert!(procedure.pending().is_none());
    assert_eq!(
        procedure.accept_voltage(&ticket, 0.1).unwrap(),
        MeasurementOutcome::Discarded
    );
}

#[test]
fn test_buffers_are_isolated_per_analyte() {
    let mut procedure = CalibrationProcedure::new_default();
    measure(&mut procedure, 0.15);
    procedure.select_analyte(Analyte::Ammonia);
    measure(&mut procedure, -0.2);
    measure(&mut procedure, -0.18);

    assert_eq!(procedure.points(Analyte::Nitrate).len(), 1);
    assert_eq!(procedure.points(Analyte::Ammonia).len(), 2);
    assert_eq!(procedure.get_progress().points_collected, 2);

    procedure.clear_points();
    assert!(procedure.points(Analyte::Ammonia).is_empty());
}
