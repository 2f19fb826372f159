//! Station geometry.
//!
//! A reading is decomposed into a horizontal offset from the station:
//!
//! ```text
//! h      = sd_m * sin(vaz)
//! offset = (h * cos(har), h * sin(har))
//! ```
//!
//! Sighting the centre gives the station as `-offset`. Any later sighting gives an
//! absolute point `station + offset`, measured from the centre at the origin.
//! [`reading_towards`] is the exact inverse and is what the simulator uses.

use super::types::{CircleType, EdgeVerification, Point2D};
use crate::edm::AveragedReading;

/// Guard band (mm) so an edge sitting exactly on the tolerance limit is accepted
/// despite binary rounding in the radius.
const TOLERANCE_EPSILON_MM: f64 = 1e-6;

/// Horizontal distance (m) covered by a reading.
pub fn horizontal_distance(reading: &AveragedReading) -> f64 {
    let sd_m = reading.slope_distance_mm / 1000.0;
    sd_m * reading.vertical_angle_deg.to_radians().sin()
}

/// Station → target offset (m) described by a reading.
pub fn horizontal_offset(reading: &AveragedReading) -> Point2D {
    Point2D::polar(
        horizontal_distance(reading),
        reading.horizontal_angle_deg.to_radians(),
    )
}

/// Station position given a reading sighted on the circle centre.
pub fn station_from_centre_reading(reading: &AveragedReading) -> Point2D {
    -horizontal_offset(reading)
}

/// Absolute position of a sighted point.
pub fn absolute_position(station: Point2D, reading: &AveragedReading) -> Point2D {
    station + horizontal_offset(reading)
}

/// Compare a measured radius against the target for `circle`.
pub fn evaluate_edge(measured_radius: f64, target_radius: f64, circle: CircleType) -> EdgeVerification {
    let difference_mm = (measured_radius - target_radius) * 1000.0;
    let tolerance_mm = circle.tolerance_mm();
    EdgeVerification {
        measured_radius,
        difference_mm,
        in_tolerance: difference_mm.abs() <= tolerance_mm + TOLERANCE_EPSILON_MM,
        tolerance_applied_mm: tolerance_mm,
    }
}

/// Edge check for a reading taken from `station`.
pub fn verify_edge(
    station: Point2D,
    reading: &AveragedReading,
    target_radius: f64,
    circle: CircleType,
) -> EdgeVerification {
    evaluate_edge(absolute_position(station, reading).norm(), target_radius, circle)
}

/// Throw distance (m) beyond the circle edge, unrounded.
pub fn throw_distance(station: Point2D, reading: &AveragedReading, target_radius: f64) -> f64 {
    absolute_position(station, reading).norm() - target_radius
}

/// The reading an instrument at `station` would report when sighted on `target`
/// with vertical angle `vaz_deg`. Horizontal angle is normalised to [0, 360).
pub fn reading_towards(station: Point2D, target: Point2D, vaz_deg: f64) -> AveragedReading {
    let delta = target - station;
    let horizontal = delta.norm();
    AveragedReading {
        slope_distance_mm: horizontal / vaz_deg.to_radians().sin() * 1000.0,
        vertical_angle_deg: vaz_deg,
        horizontal_angle_deg: normalize_degrees(delta.y.atan2(delta.x).to_degrees()),
    }
}

/// Wrap an angle into [0, 360).
pub fn normalize_degrees(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can return 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
