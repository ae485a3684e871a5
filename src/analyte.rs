// Analyte catalogue - the chemical species measured by the electrode rig
//
// Each analyte carries three fixed tables:
// 1. A factory default regression curve used when no user calibration exists
// 2. A WHO safety limit in µM
// 3. The calibration solutions (µM) offered to the operator

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Factory default curve: `concentration = 10^((voltage - offset) / divisor)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefaultCurve {
    /// Voltage offset (V)
    pub offset: f64,
    /// Slope divisor (V per decade)
    pub divisor: f64,
}

/// Chemical species measured by the ion-selective electrodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Analyte {
    Chlorine,
    Ammonia,
    Nitrate,
}

impl Analyte {
    /// All analytes in display order
    pub const ALL: [Analyte; 3] = [Analyte::Chlorine, Analyte::Ammonia, Analyte::Nitrate];

    /// Default regression used when no calibration curve applies
    pub fn default_curve(&self) -> DefaultCurve {
        match self {
            Analyte::Nitrate => DefaultCurve {
                offset: 0.17334,
                divisor: -0.05446,
            },
            Analyte::Chlorine => DefaultCurve {
                offset: 0.22784,
                divisor: -0.04381,
            },
            // Inverted electrode polarity: offset is negative, slope positive
            Analyte::Ammonia => DefaultCurve {
                offset: -0.29024,
                divisor: 0.04874,
            },
        }
    }

    /// WHO safety limit in µM
    pub fn safety_limit_um(&self) -> f64 {
        match self {
            Analyte::Ammonia => 83.0,
            Analyte::Chlorine => 141.0,
            Analyte::Nitrate => 806.0,
        }
    }

    /// Calibration solutions offered to the operator, in µM
    pub fn calibration_concentrations_um(&self) -> &'static [f64] {
        match self {
            Analyte::Nitrate => &[10.0, 50.0, 100.0],
            Analyte::Ammonia => &[1.0, 10.0, 100.0],
            Analyte::Chlorine => &[10.0, 100.0, 1000.0],
        }
    }

    /// Whether a negative electrode voltage is a valid reading
    ///
    /// The ammonia electrode is wired with inverted polarity, so its signal
    /// is normally negative. Every other electrode treats negative voltage
    /// as an invalid reading.
    pub fn accepts_negative_voltage(&self) -> bool {
        matches!(self, Analyte::Ammonia)
    }

    /// Key used in the remote database (`sensorData/latest/<key>`, `calibration/<key>`)
    pub fn key(&self) -> &'static str {
        match self {
            Analyte::Chlorine => "chlorine",
            Analyte::Ammonia => "ammonia",
            Analyte::Nitrate => "nitrate",
        }
    }

    /// Get human-readable name for display
    pub fn display_name(&self) -> &'static str {
        match self {
            Analyte::Chlorine => "Chlorine",
            Analyte::Ammonia => "Ammonia",
            Analyte::Nitrate => "Nitrate",
        }
    }
}

impl fmt::Display for Analyte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Analyte {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chlorine" => Ok(Analyte::Chlorine),
            "ammonia" => Ok(Analyte::Ammonia),
            "nitrate" => Ok(Analyte::Nitrate),
            other => Err(format!(
                "unknown analyte '{}' (expected chlorine, ammonia or nitrate)",
                other
            )),
        }
    }
}

/// Label used for a calibration solution, e.g. `10uM`
///
/// Matches the keys the device firmware and the original app write under
/// `<analyte>_calibrated/`.
pub fn concentration_label(concentration_um: f64) -> String {
    format!("{}uM", concentration_um)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safety_limits() {
        assert_eq!(Analyte::Ammonia.safety_limit_um(), 83.0);
        assert_eq!(Analyte::Chlorine.safety_limit_um(), 141.0);
        assert_eq!(Analyte::Nitrate.safety_limit_um(), 806.0);
    }

    #[test]
    fn test_calibration_concentrations() {
        assert_eq!(
            Analyte::Nitrate.calibration_concentrations_um(),
            &[10.0, 50.0, 100.0]
        );
        assert_eq!(
            Analyte::Ammonia.calibration_concentrations_um(),
            &[1.0, 10.0, 100.0]
        );
        assert_eq!(
            Analyte::Chlorine.calibration_concentrations_um(),
            &[10.0, 100.0, 1000.0]
        );
    }

    #[test]
    fn test_only_ammonia_accepts_negative_voltage() {
        assert!(Analyte::Ammonia.accepts_negative_voltage());
        assert!(!Analyte::Chlorine.accepts_negative_voltage());
        assert!(!Analyte::Nitrate.accepts_negative_voltage());
    }

    #[test]
    fn test_from_str_is_case_insensitive() {
        assert_eq!("Nitrate".parse::<Analyte>(), Ok(Analyte::Nitrate));
        assert_eq!(" AMMONIA ".parse::<Analyte>(), Ok(Analyte::Ammonia));
        assert!("phosphate".parse::<Analyte>().is_err());
    }

    #[test]
    fn test_concentration_label() {
        assert_eq!(concentration_label(10.0), "10uM");
        assert_eq!(concentration_label(1000.0), "1000uM");
        assert_eq!(concentration_label(0.5), "0.5uM");
    }

    #[test]
    fn test_serde_uses_lowercase_keys() {
        let json = serde_json::to_string(&Analyte::Chlorine).unwrap();
        assert_eq!(json, "\"chlorine\"");
        for analyte in Analyte::ALL {
            assert_eq!(
                serde_json::to_string(&analyte).unwrap(),
                format!("\"{}\"", analyte.key())
            );
        }
    }
}
