// Safety classifier - compares a concentration against the analyte's WHO limit
//
// A reading is safe only when it is strictly below the limit. NaN readings
// (rejected voltages, broken curves) are classified unsafe: IEEE-754 makes
// every comparison with NaN false, and we keep that outcome explicit here.

use serde::{Deserialize, Serialize};

use crate::analyte::Analyte;

/// Safety verdict for a single concentration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    /// Below the WHO limit
    Safe,
    /// At or above the WHO limit
    Unsafe,
    /// Concentration could not be determined
    Unknown,
}

impl SafetyLevel {
    /// Get human-readable label for display
    pub fn display_name(&self) -> &'static str {
        match self {
            SafetyLevel::Safe => "Safe",
            SafetyLevel::Unsafe => "Unsafe",
            SafetyLevel::Unknown => "Invalid reading",
        }
    }
}

/// Whether a concentration is below the analyte's WHO limit
///
/// NaN is never safe.
pub fn is_safe(analyte: Analyte, concentration_um: f64) -> bool {
    if concentration_um.is_nan() {
        return false;
    }
    concentration_um < analyte.safety_limit_um()
}

/// Three-way classification separating invalid readings from unsafe ones
pub fn classify(analyte: Analyte, concentration_um: f64) -> SafetyLevel {
    if concentration_um.is_nan() {
        SafetyLevel::Unknown
    } else if is_safe(analyte, concentration_um) {
        SafetyLevel::Safe
    } else {
        SafetyLevel::Unsafe
    }
}
