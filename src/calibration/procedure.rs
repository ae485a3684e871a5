// CalibrationProcedure - standard-solution measurement workflow
//
// This module manages the calibration state machine for one operator
// session. The workflow for each standard solution:
// 1. Select an analyte and one of its standard concentrations
// 2. Request a measurement (the caller sends the fetch request)
// 3. Wait for the electrode to stabilise
// 4. Accept the voltage; once three points are buffered a curve is fitted
//
// The procedure itself never sleeps or performs I/O. Every measurement is
// identified by a ticket, and results for a superseded ticket are dropped so
// a late voltage can never land in the wrong analyte's buffer.

use std::collections::HashMap;

use log::{debug, info, warn};

use crate::analyte::Analyte;
use crate::calibration::buffer::{CalibrationBuffer, CalibrationPoint};
use crate::calibration::progress::{CalibrationPhase, CalibrationProgress};
use crate::calibration::regression::{fit, RegressionError};
use crate::calibration::state::CalibrationCurve;
use crate::error::CalibrationError;

/// Identifies one outstanding measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementTicket {
    pub analyte: Analyte,
    pub concentration_um: f64,
    /// Selection generation the ticket was issued under
    pub generation: u64,
}

/// Result of feeding a voltage into the procedure
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementOutcome {
    /// Ticket was superseded by a newer selection; nothing changed
    Discarded,
    /// Point buffered, more points needed before a fit
    BufferNotFull { points: usize },
    /// Buffer full and the fit succeeded
    Fitted(CalibrationCurve),
    /// Buffer full but the points could not be fitted
    RegressionFailed(RegressionError),
}

/// CalibrationProcedure manages the solution measurement workflow
#[derive(Debug, Clone)]
pub struct CalibrationProcedure {
    analyte: Analyte,
    concentration_um: f64,
    phase: CalibrationPhase,
    /// Bumped on every selection change and cancellation
    generation: u64,
    pending: Option<MeasurementTicket>,
    buffer: CalibrationBuffer,
    last_voltage: HashMap<Analyte, f64>,
    last_curve: HashMap<Analyte, CalibrationCurve>,
}

impl CalibrationProcedure {
    /// Create a procedure with an explicit starting selection
    ///
    /// # Errors
    /// `InvalidConcentration` when the concentration is not one of the
    /// analyte's standard solutions
    pub fn new(analyte: Analyte, concentration_um: f64) -> Result<Self, CalibrationError> {
        validate_concentration(analyte, concentration_um)?;
        Ok(Self {
            analyte,
            concentration_um,
            phase: CalibrationPhase::AwaitingSolutionSelection,
            generation: 0,
            pending: None,
            buffer: CalibrationBuffer::new(),
            last_voltage: HashMap::new(),
            last_curve: HashMap::new(),
        })
    }

    /// Create with the default selection (Nitrate, 10 µM)
    pub fn new_default() -> Self {
        Self {
            analyte: Analyte::Nitrate,
            concentration_um: 10.0,
            phase: CalibrationPhase::AwaitingSolutionSelection,
            generation: 0,
            pending: None,
            buffer: CalibrationBuffer::new(),
            last_voltage: HashMap::new(),
            last_curve: HashMap::new(),
        }
    }

    pub fn analyte(&self) -> Analyte {
        self.analyte
    }

    pub fn concentration_um(&self) -> f64 {
        self.concentration_um
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    pub fn pending(&self) -> Option<MeasurementTicket> {
        self.pending
    }

    /// Switch analyte
    ///
    /// Keeps the current concentration when the new analyte offers it,
    /// otherwise selects the analyte's lowest standard. Any in-flight
    /// measurement is invalidated.
    pub fn select_analyte(&mut self, analyte: Analyte) {
        let concentration_um = if analyte
            .calibration_concentrations_um()
            .contains(&self.concentration_um)
        {
            self.concentration_um
        } else {
            analyte.calibration_concentrations_um()[0]
        };
        self.analyte = analyte;
        self.concentration_um = concentration_um;
        self.reset_selection();
    }

    /// Switch standard solution for the current analyte
    ///
    /// # Errors
    /// `InvalidConcentration` when the analyte does not offer the value;
    /// the selection is left unchanged in that case
    pub fn select_concentration(&mut self, concentration_um: f64) -> Result<(), CalibrationError> {
        validate_concentration(self.analyte, concentration_um)?;
        self.concentration_um = concentration_um;
        self.reset_selection();
        Ok(())
    }

    /// Start a measurement for the current selection
    ///
    /// # Errors
    /// `MeasurementInFlight` while a previous ticket is still pending
    pub fn request_measurement(&mut self) -> Result<MeasurementTicket, CalibrationError> {
        if self.pending.is_some() {
            return Err(CalibrationError::MeasurementInFlight);
        }
        let ticket = MeasurementTicket {
            analyte: self.analyte,
            concentration_um: self.concentration_um,
            generation: self.generation,
        };
        self.pending = Some(ticket);
        self.phase = CalibrationPhase::MeasurementRequested;
        debug!(
            "Calibration measurement requested: {} {} µM (generation {})",
            ticket.analyte, ticket.concentration_um, ticket.generation
        );
        Ok(ticket)
    }

    /// Mark the stabilisation delay as started
    ///
    /// # Returns
    /// false when the ticket is no longer current
    pub fn begin_delay(&mut self, ticket: &MeasurementTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.phase = CalibrationPhase::MeasurementDelay;
        true
    }

    /// Feed the voltage read for a ticket
    ///
    /// Stale tickets are discarded without touching any buffer. A current
    /// ticket appends one point; when the analyte's window is full a fit is
    /// attempted. The procedure returns to `Idle` afterwards.
    ///
    /// # Errors
    /// * `NoMeasurementPending` - ticket is current but was already consumed
    /// * `InvalidVoltage` - voltage is NaN or infinite; the ticket is consumed
    pub fn accept_voltage(
        &mut self,
        ticket: &MeasurementTicket,
        voltage: f64,
    ) -> Result<MeasurementOutcome, CalibrationError> {
        if ticket.generation != self.generation {
            info!(
                "Discarding stale calibration voltage for {} {} µM",
                ticket.analyte, ticket.concentration_um
            );
            return Ok(MeasurementOutcome::Discarded);
        }
        if self.pending.as_ref() != Some(ticket) {
            return Err(CalibrationError::NoMeasurementPending);
        }
        self.pending = None;

        if !voltage.is_finite() {
            self.phase = CalibrationPhase::Idle;
            return Err(CalibrationError::InvalidVoltage { voltage });
        }

        self.phase = CalibrationPhase::VoltageReceived;
        self.last_voltage.insert(ticket.analyte, voltage);
        let point = CalibrationPoint::from_concentration(ticket.concentration_um, voltage);
        let window = self
            .buffer
            .add_point(ticket.analyte, point.log_concentration, point.voltage);

        let outcome = if self.buffer.is_full(ticket.analyte) {
            match fit(&window) {
                Ok(curve) => {
                    info!(
                        "Calibration fit for {}: E0={:.5}, slope={:.5}",
                        ticket.analyte, curve.e0, curve.slope
                    );
                    self.last_curve.insert(ticket.analyte, curve);
                    MeasurementOutcome::Fitted(curve)
                }
                Err(err) => {
                    warn!("Calibration fit for {} failed: {}", ticket.analyte, err);
                    MeasurementOutcome::RegressionFailed(err)
                }
            }
        } else {
            MeasurementOutcome::BufferNotFull {
                points: window.len(),
            }
        };

        self.phase = CalibrationPhase::Idle;
        Ok(outcome)
    }

    /// Abandon the in-flight measurement, if any
    pub fn cancel_measurement(&mut self) {
        if self.pending.is_some() {
            self.reset_selection();
        }
    }

    /// Points buffered for an analyte, oldest first
    pub fn points(&self, analyte: Analyte) -> Vec<CalibrationPoint> {
        self.buffer.points(analyte)
    }

    /// Drop every buffered point and session fit
    pub fn clear_points(&mut self) {
        self.buffer.clear_all();
        self.last_voltage.clear();
        self.last_curve.clear();
    }

    /// Get current calibration progress
    pub fn get_progress(&self) -> CalibrationProgress {
        let mut progress = CalibrationProgress::new(self.analyte, self.concentration_um, self.phase);
        progress.points_collected = self.buffer.len(self.analyte) as u8;
        progress.last_voltage = self.last_voltage.get(&self.analyte).copied();
        progress.last_curve = self.last_curve.get(&self.analyte).copied();
        progress
    }

    fn is_current(&self, ticket: &MeasurementTicket) -> bool {
        ticket.generation == self.generation && self.pending.as_ref() == Some(ticket)
    }

    fn reset_selection(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.pending = None;
        self.phase = CalibrationPhase::AwaitingSolutionSelection;
    }
}

impl Default for CalibrationProcedure {
    fn default() -> Self {
        Self::new_default()
    }
}

fn validate_concentration(analyte: Analyte, concentration_um: f64) -> Result<(), CalibrationError> {
    if analyte
        .calibration_concentrations_um()
        .contains(&concentration_um)
    {
        Ok(())
    } else {
        Err(CalibrationError::InvalidConcentration { concentration_um })
    }
}

#[cfg(test)]
#[path = "procedure_tests.rs"]
mod tests;
