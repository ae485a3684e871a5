// Regression engine - ordinary least squares over calibration points
//
// Fits voltage (y) against log10 concentration (x):
//   slope = (n*Sxy - Sx*Sy) / (n*Sxx - Sx^2)
//   E0    = (Sy - slope*Sx) / n
//
// The fit needs exactly the three points of a full calibration window.

use std::fmt;

use crate::calibration::buffer::{CalibrationPoint, POINTS_PER_FIT};
use crate::calibration::state::CalibrationCurve;

/// Reasons a regression fit cannot be produced
#[derive(Debug, Clone, PartialEq)]
pub enum RegressionError {
    /// Fewer points than a fit requires
    InsufficientPoints { required: usize, supplied: usize },
    /// All x values coincide, so the slope is undefined
    DegenerateX,
}

impl fmt::Display for RegressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegressionError::InsufficientPoints { required, supplied } => write!(
                f,
                "insufficient calibration points: need {}, got {}",
                required, supplied
            ),
            RegressionError::DegenerateX => {
                write!(f, "calibration concentrations are all identical")
            }
        }
    }
}

impl std::error::Error for RegressionError {}

/// Fit a calibration curve to a full window of points
///
/// # Arguments
/// * `points` - Calibration points, at least [`POINTS_PER_FIT`]
///
/// # Returns
/// * `Ok(CalibrationCurve)` - Fitted intercept and slope
/// * `Err(RegressionError)` - Too few points or collinear x values
pub fn fit(points: &[CalibrationPoint]) -> Result<CalibrationCurve, RegressionError> {
    if points.len() < POINTS_PER_FIT {
        return Err(RegressionError::InsufficientPoints {
            required: POINTS_PER_FIT,
            supplied: points.len(),
        });
    }

    // Rounding in the sums leaves a tiny non-zero denominator for most
    // repeated x values, so coincidence is checked on the inputs.
    let first_x = points[0].log_concentration;
    if points.iter().all(|p| p.log_concentration == first_x) {
        return Err(RegressionError::DegenerateX);
    }

    let n = points.len() as f64;
    let (sum_x, sum_y, sum_xy, sum_xx) = points.iter().fold(
        (0.0, 0.0, 0.0, 0.0),
        |(sx, sy, sxy, sxx), p| {
            (
                sx + p.log_concentration,
                sy + p.voltage,
                sxy + p.log_concentration * p.voltage,
                sxx + p.log_concentration * p.log_concentration,
            )
        },
    );

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator == 0.0 {
        return Err(RegressionError::DegenerateX);
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let e0 = (sum_y - slope * sum_x) / n;

    Ok(CalibrationCurve { e0, slope })
}

/// Fit and collapse failures into [`CalibrationCurve::SENTINEL`]
///
/// Kept for interoperability with stores written by clients that only
/// understand the `(0.0, -59.0)` failure marker.
pub fn fit_or_sentinel(points: &[CalibrationPoint]) -> CalibrationCurve {
    fit(points).unwrap_or(CalibrationCurve::SENTINEL)
}
