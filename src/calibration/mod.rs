// Calibration module - user calibration workflow and curve storage
//
// This module provides four main components:
// 1. CalibrationBuffer: sliding window of the last three points per analyte
// 2. regression: least-squares fit of (log concentration, voltage) points
// 3. CalibrationState: fitted curves and the calibration-mode switch
// 4. CalibrationProcedure: the standard-solution measurement workflow
//
// The calibration workflow:
// 1. Select an analyte and a standard solution
// 2. Measure it; the voltage becomes a calibration point
// 3. With three points buffered, fit a curve and hand it to the store

pub mod buffer;
pub mod procedure;
pub mod progress;
pub mod regression;
pub mod state;

pub use buffer::{CalibrationBuffer, CalibrationPoint, POINTS_PER_FIT};
pub use procedure::{CalibrationProcedure, MeasurementOutcome, MeasurementTicket};
pub use progress::{CalibrationPhase, CalibrationProgress};
pub use regression::{fit, fit_or_sentinel, RegressionError};
pub use state::{CalibrationCurve, CalibrationState};
