// Concentration calculator - electrode voltage to analyte concentration
//
// Pure function of its inputs. Invalid readings are reported as NaN rather
// than as errors so that callers can display "--" without special casing.

use serde::{Deserialize, Serialize};

use crate::analyte::Analyte;
use crate::calibration::state::CalibrationCurve;

/// Which curve produced a concentration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveSource {
    /// User calibration curve
    Calibrated,
    /// Factory default regression
    Default,
    /// Reading rejected before any curve was applied
    Rejected,
}

/// Convert a voltage to a concentration in µM
///
/// # Arguments
/// * `analyte` - Electrode the voltage came from
/// * `voltage` - Electrode voltage in volts
/// * `curve` - Calibration curve, if one is stored
/// * `use_calibration` - Whether calibration mode is active
///
/// # Returns
/// Concentration in µM, or NaN for an invalid reading
pub fn compute(
    analyte: Analyte,
    voltage: f64,
    curve: Option<CalibrationCurve>,
    use_calibration: bool,
) -> f64 {
    compute_with_source(analyte, voltage, curve, use_calibration).0
}

/// Like [`compute`], also reporting which curve was applied
pub fn compute_with_source(
    analyte: Analyte,
    voltage: f64,
    curve: Option<CalibrationCurve>,
    use_calibration: bool,
) -> (f64, CurveSource) {
    if voltage < 0.0 && !analyte.accepts_negative_voltage() {
        return (f64::NAN, CurveSource::Rejected);
    }

    if use_calibration {
        if let Some(curve) = curve.filter(|c| c.slope != 0.0) {
            let value = (voltage - curve.e0) / curve.slope;
            if !value.is_finite() {
                return (f64::NAN, CurveSource::Calibrated);
            }
            return (10f64.powf(value), CurveSource::Calibrated);
        }
    }

    (default_regression(analyte, voltage), CurveSource::Default)
}

/// Factory default regression for an analyte
pub fn default_regression(analyte: Analyte, voltage: f64) -> f64 {
    let curve = analyte.default_curve();
    10f64.powf((voltage - curve.offset) / curve.divisor)
}
