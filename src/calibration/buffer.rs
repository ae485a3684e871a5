// Calibration point buffer - sliding window of the latest measurements
//
// Each analyte keeps its own window of at most three points. Adding a fourth
// point evicts the oldest, so the regression always runs over the three most
// recent measurements in arrival order.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::analyte::Analyte;

/// Number of points a full window holds (and a regression needs)
pub const POINTS_PER_FIT: usize = 3;

/// One calibration measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    /// log10 of the solution concentration in µM
    pub log_concentration: f64,
    /// Measured electrode voltage in volts
    pub voltage: f64,
}

impl CalibrationPoint {
    pub fn new(log_concentration: f64, voltage: f64) -> Self {
        Self {
            log_concentration,
            voltage,
        }
    }

    /// Build a point from a concentration in µM
    pub fn from_concentration(concentration_um: f64, voltage: f64) -> Self {
        Self::new(concentration_um.log10(), voltage)
    }
}

/// Per-analyte sliding windows of calibration points
#[derive(Debug, Clone, Default)]
pub struct CalibrationBuffer {
    windows: HashMap<Analyte, VecDeque<CalibrationPoint>>,
}

impl CalibrationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a point for an analyte, evicting the oldest beyond three
    ///
    /// Never rejects input; degenerate voltages are stored as given.
    ///
    /// # Returns
    /// The analyte's window after insertion, oldest first
    pub fn add_point(
        &mut self,
        analyte: Analyte,
        log_concentration: f64,
        voltage: f64,
    ) -> Vec<CalibrationPoint> {
        let window = self
            .windows
            .entry(analyte)
            .or_insert_with(|| VecDeque::with_capacity(POINTS_PER_FIT + 1));
        window.push_back(CalibrationPoint::new(log_concentration, voltage));
        while window.len() > POINTS_PER_FIT {
            window.pop_front();
        }
        window.iter().copied().collect()
    }

    /// Current window for an analyte, oldest first
    pub fn points(&self, analyte: Analyte) -> Vec<CalibrationPoint> {
        self.windows
            .get(&analyte)
            .map(|window| window.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of points held for an analyte
    pub fn len(&self, analyte: Analyte) -> usize {
        self.windows.get(&analyte).map_or(0, VecDeque::len)
    }

    /// Whether the analyte's window is full
    pub fn is_full(&self, analyte: Analyte) -> bool {
        self.len(analyte) == POINTS_PER_FIT
    }

    /// Drop every point for an analyte
    pub fn clear(&mut self, analyte: Analyte) {
        self.windows.remove(&analyte);
    }

    /// Drop every point for every analyte
    pub fn clear_all(&mut self) {
        self.windows.clear();
    }
}
