// Progress tracking for calibration workflow
//
// This module provides the phase enum and the progress payload that is
// broadcast to the UI after every calibration transition.

use crate::analyte::{concentration_label, Analyte};
use crate::calibration::buffer::POINTS_PER_FIT;
use crate::calibration::state::CalibrationCurve;

/// Calibration phase for the active solution
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationPhase {
    /// Waiting for the operator to pick an analyte and a standard solution
    AwaitingSolutionSelection,
    /// Fetch request sent to the device
    MeasurementRequested,
    /// Electrode stabilising before the voltage is read
    MeasurementDelay,
    /// Voltage read and appended to the buffer
    VoltageReceived,
    /// Step finished, ready for the next solution
    Idle,
}

impl CalibrationPhase {
    /// Get human-readable name for display
    pub fn display_name(&self) -> &'static str {
        match self {
            CalibrationPhase::AwaitingSolutionSelection => "Select a solution",
            CalibrationPhase::MeasurementRequested => "Requesting reading",
            CalibrationPhase::MeasurementDelay => "Stabilising electrode",
            CalibrationPhase::VoltageReceived => "Voltage received",
            CalibrationPhase::Idle => "Ready",
        }
    }

    /// True while a measurement is outstanding
    pub fn is_measuring(&self) -> bool {
        matches!(
            self,
            CalibrationPhase::MeasurementRequested | CalibrationPhase::MeasurementDelay
        )
    }
}

/// Progress information for the current calibration step
///
/// This struct is sent to the Dart UI via flutter_rust_bridge Stream
/// for real-time display of calibration progress.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CalibrationProgress {
    /// Selected analyte
    pub analyte: Analyte,
    /// Selected standard solution (µM)
    pub concentration_um: f64,
    /// Label used for the raw calibration log, e.g. `10uM`
    pub concentration_label: String,
    pub phase: CalibrationPhase,
    /// Points currently buffered for the analyte (0-3)
    pub points_collected: u8,
    /// Points required before a fit is attempted
    pub points_needed: u8,
    /// Most recent voltage accepted for the analyte
    pub last_voltage: Option<f64>,
    /// Most recent successful fit for the analyte in this session
    pub last_curve: Option<CalibrationCurve>,
}

impl CalibrationProgress {
    pub fn new(analyte: Analyte, concentration_um: f64, phase: CalibrationPhase) -> Self {
        Self {
            analyte,
            concentration_um,
            concentration_label: concentration_label(concentration_um),
            phase,
            points_collected: 0,
            points_needed: POINTS_PER_FIT as u8,
            last_voltage: None,
            last_curve: None,
        }
    }

    /// Check if the buffer holds enough points for a fit
    pub fn is_buffer_full(&self) -> bool {
        self.points_collected >= self.points_needed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_progress_is_empty() {
        let progress =
            CalibrationProgress::new(Analyte::Ammonia, 1.0, CalibrationPhase::Idle);
        assert_eq!(progress.concentration_label, "1uM");
        assert_eq!(progress.points_collected, 0);
        assert_eq!(progress.points_needed, 3);
        assert!(!progress.is_buffer_full());
    }

    #[test]
    fn test_measuring_phases() {
        assert!(CalibrationPhase::MeasurementRequested.is_measuring());
        assert!(CalibrationPhase::MeasurementDelay.is_measuring());
        assert!(!CalibrationPhase::VoltageReceived.is_measuring());
        assert!(!CalibrationPhase::Idle.is_measuring());
    }

    #[test]
    fn test_progress_serializes_phase_snake_case() {
        let progress = CalibrationProgress::new(
            Analyte::Nitrate,
            10.0,
            CalibrationPhase::AwaitingSolutionSelection,
        );
        let json = serde_json::to_string(&progress).unwrap();
        assert!(json.contains("\"awaiting_solution_selection\""));
        assert!(json.contains("\"nitrate\""));
    }
}
