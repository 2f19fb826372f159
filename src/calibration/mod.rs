//! Circle calibration and throw measurement.
//!
//! - [`types`]: circle definitions and the per-slot record
//! - [`geometry`]: reading ↔ plane conversions
//! - [`source`]: hardware and simulated reading strategies
//! - [`engine`]: the centre → edge → throw workflow

pub mod engine;
pub mod geometry;
pub mod source;
pub mod types;

pub use engine::CalibrationEngine;
pub use source::{HardwareSource, MeasurementPhase, ReadingRequest, ReadingSource, SimulatedSource};
pub use types::{
    CalibrationRecord, CalibrationState, CircleType, EdgeVerification, Point2D, ThrowMeasurement,
};
