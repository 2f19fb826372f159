//! Calibration record and circle definitions.
//!
//! The record serializes in the camelCase exchange format the operator UI consumes:
//!
//! ```json
//! {
//!   "deviceId": "circleA",
//!   "timestamp": "2026-05-02T09:14:03Z",
//!   "selectedCircleType": "DISCUS",
//!   "targetRadius": 1.25,
//!   "stationCoordinates": { "x": -9.8, "y": 4.1 },
//!   "isCentreSet": true,
//!   "edgeVerificationResult": {
//!     "measuredRadius": 1.2531,
//!     "differenceMm": 3.1,
//!     "isInTolerance": true,
//!     "toleranceAppliedMm": 5.0
//!   }
//! }
//! ```

use crate::error::PolyfieldError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Shot put circle radius (m)
pub const RADIUS_SHOT: f64 = 1.0675;
/// Discus circle radius (m)
pub const RADIUS_DISCUS: f64 = 1.250;
/// Hammer circle radius (m)
pub const RADIUS_HAMMER: f64 = 1.0675;
/// Javelin arc radius (m)
pub const RADIUS_JAVELIN_ARC: f64 = 8.000;

/// Edge tolerance for throws circles (mm)
pub const TOLERANCE_CIRCLE_MM: f64 = 5.0;
/// Edge tolerance for the javelin arc (mm)
pub const TOLERANCE_JAVELIN_MM: f64 = 10.0;

/// Throwing event circle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircleType {
    /// Shot put
    #[default]
    Shot,
    /// Discus
    Discus,
    /// Hammer
    Hammer,
    /// Javelin runway arc
    JavelinArc,
}

impl CircleType {
    /// Every circle type, in display order.
    pub const ALL: [CircleType; 4] = [
        CircleType::Shot,
        CircleType::Discus,
        CircleType::Hammer,
        CircleType::JavelinArc,
    ];

    /// Official radius in metres.
    pub fn standard_radius(self) -> f64 {
        match self {
            CircleType::Shot => RADIUS_SHOT,
            CircleType::Discus => RADIUS_DISCUS,
            CircleType::Hammer => RADIUS_HAMMER,
            CircleType::JavelinArc => RADIUS_JAVELIN_ARC,
        }
    }

    /// Allowed edge deviation in millimetres.
    pub fn tolerance_mm(self) -> f64 {
        match self {
            CircleType::JavelinArc => TOLERANCE_JAVELIN_MM,
            _ => TOLERANCE_CIRCLE_MM,
        }
    }

    /// Plausible throw distances (m) for simulated landings.
    pub fn throw_range(self) -> (f64, f64) {
        match self {
            CircleType::Shot => (8.0, 18.0),
            CircleType::Discus => (25.0, 65.0),
            CircleType::Hammer => (20.0, 75.0),
            CircleType::JavelinArc => (35.0, 85.0),
        }
    }

    /// Exchange-format tag.
    pub fn as_str(self) -> &'static str {
        match self {
            CircleType::Shot => "SHOT",
            CircleType::Discus => "DISCUS",
            CircleType::Hammer => "HAMMER",
            CircleType::JavelinArc => "JAVELIN_ARC",
        }
    }
}

impl std::fmt::Display for CircleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CircleType {
    type Err = PolyfieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "SHOT" => Ok(CircleType::Shot),
            "DISCUS" => Ok(CircleType::Discus),
            "HAMMER" => Ok(CircleType::Hammer),
            "JAVELIN_ARC" | "JAVELIN" => Ok(CircleType::JavelinArc),
            other => Err(PolyfieldError::Configuration(format!(
                "Unknown circle type '{other}'. Must be one of: SHOT, DISCUS, HAMMER, JAVELIN_ARC"
            ))),
        }
    }
}

/// Planar point in metres, origin at the circle centre.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    /// X (m)
    pub x: f64,
    /// Y (m)
    pub y: f64,
}

impl Point2D {
    /// Construct a point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Distance from the origin.
    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Point at `radius` and `bearing_rad` from the origin.
    pub fn polar(radius: f64, bearing_rad: f64) -> Self {
        Self::new(radius * bearing_rad.cos(), radius * bearing_rad.sin())
    }
}

impl std::ops::Add for Point2D {
    type Output = Point2D;

    fn add(self, rhs: Point2D) -> Point2D {
        Point2D::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point2D {
    type Output = Point2D;

    fn sub(self, rhs: Point2D) -> Point2D {
        Point2D::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Neg for Point2D {
    type Output = Point2D;

    fn neg(self) -> Point2D {
        Point2D::new(-self.x, -self.y)
    }
}

/// Outcome of an edge check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeVerification {
    /// Distance from centre to the sighted edge point (m)
    pub measured_radius: f64,
    /// `(measured - target) * 1000` (mm)
    pub difference_mm: f64,
    /// Whether `|difference_mm|` is within tolerance
    #[serde(rename = "isInTolerance")]
    pub in_tolerance: bool,
    /// Tolerance used (mm)
    pub tolerance_applied_mm: f64,
}

/// Workflow position derived from a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    /// Centre not set
    Uncalibrated,
    /// Centre set, no in-tolerance edge check
    CentreSet,
    /// Centre set and edge within tolerance
    EdgeVerified,
}

/// Per-slot calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationRecord {
    /// Slot key
    pub device_id: String,
    /// Last centre set (UTC)
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Circle in use
    #[serde(default)]
    pub selected_circle_type: CircleType,
    /// Radius measured against (m)
    pub target_radius: f64,
    /// Station position relative to the centre
    #[serde(default)]
    pub station_coordinates: Point2D,
    /// Whether the centre has been set
    #[serde(default)]
    pub is_centre_set: bool,
    /// Last edge check, cleared whenever the centre is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_verification_result: Option<EdgeVerification>,
}

impl CalibrationRecord {
    /// Fresh shot put record for `slot`.
    pub fn new(slot: impl Into<String>) -> Self {
        Self::for_circle(slot, CircleType::Shot)
    }

    /// Fresh record for `slot` using the standard radius of `circle`.
    pub fn for_circle(slot: impl Into<String>, circle: CircleType) -> Self {
        Self {
            device_id: slot.into(),
            timestamp: None,
            selected_circle_type: circle,
            target_radius: circle.standard_radius(),
            station_coordinates: Point2D::default(),
            is_centre_set: false,
            edge_verification_result: None,
        }
    }

    /// Where this record sits in the centre → edge workflow.
    pub fn state(&self) -> CalibrationState {
        match (self.is_centre_set, self.edge_in_tolerance()) {
            (false, _) => CalibrationState::Uncalibrated,
            (true, false) => CalibrationState::CentreSet,
            (true, true) => CalibrationState::EdgeVerified,
        }
    }

    /// Whether the last edge check passed.
    pub fn edge_in_tolerance(&self) -> bool {
        self.edge_verification_result
            .is_some_and(|edge| edge.in_tolerance)
    }
}

/// A measured throw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThrowMeasurement {
    /// Distance beyond the circle edge, rounded to centimetres (m)
    pub distance_m: f64,
    /// Circle the throw was measured from
    pub circle_type: CircleType,
}

impl ThrowMeasurement {
    /// Scoreboard text: the distance without unit.
    pub fn scoreboard_text(&self) -> String {
        format!("{:.2}", self.distance_m)
    }
}

impl std::fmt::Display for ThrowMeasurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2} m", self.distance_m)
    }
}
