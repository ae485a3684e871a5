// Analysis module - turns electrode voltages into concentrations and verdicts
//
// Pipeline: voltage -> concentration (calibrated or default curve) -> safety class

pub mod classifier;
pub mod concentration;
pub mod report;

pub use classifier::{classify, is_safe, SafetyLevel};
pub use concentration::{compute, compute_with_source, CurveSource};
pub use report::{AnalyteReading, LiveReport};
