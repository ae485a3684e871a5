// Live report - concentrations and safety verdicts for every analyte
//
// Built fresh from one sensor snapshot and the active calibration state.
// Nothing here is persisted.

use serde::{Deserialize, Serialize};

use crate::analysis::classifier::{classify, is_safe, SafetyLevel};
use crate::analysis::concentration::{compute_with_source, CurveSource};
use crate::analyte::Analyte;
use crate::calibration::state::CalibrationState;
use crate::reading::{HistoryEntry, SensorSnapshot};

/// Computed result for one analyte
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyteReading {
    pub analyte: Analyte,
    /// Raw electrode voltage (V)
    pub voltage: f64,
    /// Concentration in µM, NaN when the reading was rejected
    pub concentration_um: f64,
    /// Curve used for the conversion
    pub source: CurveSource,
    /// Strictly below the WHO limit
    pub safe: bool,
    pub level: SafetyLevel,
}

impl AnalyteReading {
    /// Compute a reading for one analyte from a voltage
    pub fn compute(analyte: Analyte, voltage: f64, calibration: &CalibrationState) -> Self {
        let (concentration_um, source) = compute_with_source(
            analyte,
            voltage,
            calibration.curve(analyte),
            calibration.use_calibration,
        );
        Self {
            analyte,
            voltage,
            concentration_um,
            source,
            safe: is_safe(analyte, concentration_um),
            level: classify(analyte, concentration_um),
        }
    }
}

/// Report covering every analyte for one snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveReport {
    /// History key the snapshot was stored under, if it came from history
    pub key: Option<String>,
    pub readings: Vec<AnalyteReading>,
    /// Water temperature (°C)
    pub temperature: f64,
}

impl LiveReport {
    /// Compute a report from a raw snapshot
    pub fn from_snapshot(snapshot: &SensorSnapshot, calibration: &CalibrationState) -> Self {
        let readings = Analyte::ALL
            .iter()
            .map(|&analyte| AnalyteReading::compute(analyte, snapshot.voltage(analyte), calibration))
            .collect();
        Self {
            key: None,
            readings,
            temperature: snapshot.temperature,
        }
    }

    /// Compute a report for a stored history entry
    pub fn from_history(entry: &HistoryEntry, calibration: &CalibrationState) -> Self {
        let mut report = Self::from_snapshot(&entry.snapshot, calibration);
        report.key = Some(entry.key.clone());
        report
    }

    /// Reading for one analyte
    pub fn reading(&self, analyte: Analyte) -> Option<&AnalyteReading> {
        self.readings.iter().find(|r| r.analyte == analyte)
    }

    /// True when every analyte is below its limit
    pub fn all_safe(&self) -> bool {
        self.readings.iter().all(|r| r.safe)
    }

    /// Plain-text rendering for the share sheet
    pub fn share_text(&self) -> String {
        let mut text = String::from("ISE Sensor Data:\n");
        if let Some(key) = &self.key {
            text.push_str(&format!("Time: {}\n", key));
        }
        for reading in &self.readings {
            text.push_str(&format!(
                "- {}: {} ({})\n",
                reading.analyte,
                format_concentration(reading.concentration_um),
                reading.level.display_name()
            ));
        }
        text.push_str(&format!("- Temperature: {:.1}°C", self.temperature));
        text
    }
}

/// Format a concentration for display, `--` for NaN
pub fn format_concentration(concentration_um: f64) -> String {
    if concentration_um.is_nan() {
        "--".to_string()
    } else {
        format!("{:.2} µM", concentration_um)
    }
}
