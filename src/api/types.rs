use crate::analysis::CurveSource;
use crate::analyte::{concentration_label, Analyte};

/// One analyte as offered on the calibration screen
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnalyteOption {
    pub analyte: Analyte,
    pub key: String,
    pub display_name: String,
    /// WHO limit in µM
    pub safety_limit_um: f64,
    /// Standard solutions, ascending
    pub concentrations_um: Vec<f64>,
    /// Labels matching `concentrations_um`, e.g. `10uM`
    pub concentration_labels: Vec<String>,
}

impl From<Analyte> for AnalyteOption {
    fn from(analyte: Analyte) -> Self {
        let concentrations_um = analyte.calibration_concentrations_um().to_vec();
        let concentration_labels = concentrations_um
            .iter()
            .map(|c| concentration_label(*c))
            .collect();
        Self {
            analyte,
            key: analyte.key().to_string(),
            display_name: analyte.display_name().to_string(),
            safety_limit_um: analyte.safety_limit_um(),
            concentrations_um,
            concentration_labels,
        }
    }
}

/// Result of a one-off voltage conversion
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ComputedConcentration {
    pub analyte: Analyte,
    /// NaN when the reading was rejected
    pub concentration_um: f64,
    pub source: CurveSource,
    pub safe: bool,
}
