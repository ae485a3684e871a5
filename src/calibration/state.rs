// CalibrationState - fitted curves per analyte
//
// A calibration curve relates electrode voltage to log10 concentration:
//   voltage = E0 + Slope * log10(concentration_uM)
//
// Curves are fitted during calibration mode and pushed to the remote
// calibration store. This module holds the in-process copy used by the
// concentration calculator while calibration mode is active.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::analyte::Analyte;

/// Linear calibration curve (intercept and slope)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationCurve {
    /// Intercept in volts
    #[serde(rename = "E0")]
    pub e0: f64,
    /// Slope in volts per decade of concentration
    #[serde(rename = "Slope")]
    pub slope: f64,
}

impl CalibrationCurve {
    /// Legacy "fit failed" marker written by older clients
    pub const SENTINEL: CalibrationCurve = CalibrationCurve {
        e0: 0.0,
        slope: -59.0,
    };

    pub fn new(e0: f64, slope: f64) -> Self {
        Self { e0, slope }
    }

    /// True if this is exactly the legacy failure marker
    pub fn is_sentinel(&self) -> bool {
        self.e0 == Self::SENTINEL.e0 && self.slope == Self::SENTINEL.slope
    }

    /// True if the curve can be inverted into a concentration
    pub fn is_usable(&self) -> bool {
        self.e0.is_finite() && self.slope.is_finite() && self.slope != 0.0 && !self.is_sentinel()
    }
}

/// CalibrationState stores the curves used while calibration mode is active
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibrationState {
    /// Whether calibrated curves should be preferred over the defaults
    pub use_calibration: bool,
    /// Fitted curves keyed by analyte
    #[serde(default)]
    curves: HashMap<Analyte, CalibrationCurve>,
}

impl CalibrationState {
    /// Create default state: no curves, default regression in use
    pub fn new_default() -> Self {
        Self::default()
    }

    /// Get the stored curve for an analyte, if any
    pub fn curve(&self, analyte: Analyte) -> Option<CalibrationCurve> {
        self.curves.get(&analyte).copied()
    }

    /// Store a curve for an analyte
    ///
    /// Sentinel or non-invertible curves are not stored; any previous curve
    /// for the analyte is removed instead so the default regression applies.
    ///
    /// # Returns
    /// `true` if the curve was stored
    pub fn set_curve(&mut self, analyte: Analyte, curve: CalibrationCurve) -> bool {
        if curve.is_usable() {
            self.curves.insert(analyte, curve);
            true
        } else {
            log::warn!(
                "[CalibrationState] Ignoring unusable curve for {}: E0={}, Slope={}",
                analyte,
                curve.e0,
                curve.slope
            );
            self.curves.remove(&analyte);
            false
        }
    }

    /// Forget the curve for an analyte
    pub fn clear_curve(&mut self, analyte: Analyte) {
        self.curves.remove(&analyte);
    }

    /// Whether at least one analyte has a usable curve
    pub fn is_calibrated(&self) -> bool {
        !self.curves.is_empty()
    }
}
