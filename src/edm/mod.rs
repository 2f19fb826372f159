//! EDM (electronic distance measurement) instrument support.
//!
//! - [`parser`] decodes the instrument's fixed response grammar.
//! - [`protocol`] triggers reads over a device channel and enforces the dual-read
//!   consistency check.

pub mod parser;
pub mod protocol;

use serde::{Deserialize, Serialize};

pub use parser::{parse_angle, parse_response};
pub use protocol::{reconcile_pair, EdmProtocol, EDM_READ_COMMAND};

/// One decoded instrument response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedReading {
    /// Slope distance in millimetres
    pub slope_distance_mm: f64,
    /// Vertical angle in decimal degrees
    pub vertical_angle_deg: f64,
    /// Horizontal angle in decimal degrees
    pub horizontal_angle_deg: f64,
}

/// A reading that survived the consistency check (or was synthesised in demo mode).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AveragedReading {
    /// Slope distance in millimetres
    pub slope_distance_mm: f64,
    /// Vertical angle in decimal degrees
    #[serde(rename = "vAzDecimal")]
    pub vertical_angle_deg: f64,
    /// Horizontal angle in decimal degrees
    #[serde(rename = "harDecimal")]
    pub horizontal_angle_deg: f64,
}

impl AveragedReading {
    /// Field-wise mean of two raw reads.
    pub fn mean_of(first: &ParsedReading, second: &ParsedReading) -> Self {
        Self {
            slope_distance_mm: (first.slope_distance_mm + second.slope_distance_mm) / 2.0,
            vertical_angle_deg: (first.vertical_angle_deg + second.vertical_angle_deg) / 2.0,
            horizontal_angle_deg: (first.horizontal_angle_deg + second.horizontal_angle_deg)
                / 2.0,
        }
    }
}

impl From<ParsedReading> for AveragedReading {
    fn from(value: ParsedReading) -> Self {
        Self {
            slope_distance_mm: value.slope_distance_mm,
            vertical_angle_deg: value.vertical_angle_deg,
            horizontal_angle_deg: value.horizontal_angle_deg,
        }
    }
}
