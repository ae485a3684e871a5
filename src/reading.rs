//! Sensor readings as published by the device.
//!
//! The device writes one voltage per electrode plus a shared temperature to
//! `sensorData/latest`, and appends timestamped copies under `sensorData`.
//! Missing children read as `0.0`, matching what the device firmware expects
//! consumers to do.

use serde::{Deserialize, Serialize};

use crate::analyte::Analyte;

/// Latest raw values published by the device
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorSnapshot {
    /// Chlorine electrode voltage (V)
    #[serde(default)]
    pub chlorine: f64,
    /// Ammonia electrode voltage (V)
    #[serde(default)]
    pub ammonia: f64,
    /// Nitrate electrode voltage (V)
    #[serde(default)]
    pub nitrate: f64,
    /// Water temperature (°C)
    #[serde(default)]
    pub temperature: f64,
}

impl SensorSnapshot {
    /// Voltage reported for one electrode
    pub fn voltage(&self, analyte: Analyte) -> f64 {
        match analyte {
            Analyte::Chlorine => self.chlorine,
            Analyte::Ammonia => self.ammonia,
            Analyte::Nitrate => self.nitrate,
        }
    }

    /// Replace the voltage for one electrode
    pub fn set_voltage(&mut self, analyte: Analyte, voltage: f64) {
        match analyte {
            Analyte::Chlorine => self.chlorine = voltage,
            Analyte::Ammonia => self.ammonia = voltage,
            Analyte::Nitrate => self.nitrate = voltage,
        }
    }

    /// Voltage and temperature for one electrode
    pub fn measurement(&self, analyte: Analyte) -> Measurement {
        Measurement {
            voltage: self.voltage(analyte),
            temperature: self.temperature,
        }
    }
}

/// Voltage/temperature pair for one analyte at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub voltage: f64,
    pub temperature: f64,
}

/// One historical snapshot keyed by the device's timestamp key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Key under `sensorData` (device timestamp)
    pub key: String,
    pub snapshot: SensorSnapshot,
}
