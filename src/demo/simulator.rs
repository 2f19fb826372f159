//! Geometry-consistent reading generator.
//!
//! Each slot gets a fixed virtual station 8–15 m from the circle centre. Centre, edge
//! and throw readings are derived from that station with
//! [`geometry::reading_towards`], the exact inverse of the calibration math, and then
//! perturbed by the configured noise. Running the normal workflow over these readings
//! therefore recovers the virtual station and reports near-target edge radii.

use super::rng::{NoiseModel, SimRng};
use crate::calibration::geometry;
use crate::calibration::{CircleType, Point2D};
use crate::edm::AveragedReading;
use std::collections::HashMap;
use std::f64::consts::{FRAC_PI_6, TAU};
use tracing::{debug, warn};

/// Half-width of the simulated edge radius deviation (m).
const EDGE_RADIUS_SPREAD_M: f64 = 0.004;
/// Half-width of the edge vertical angle deviation from the centre sighting (deg).
const EDGE_VAZ_SPREAD_DEG: f64 = 1.0;
/// Half-width of the throw vertical angle deviation from the centre sighting (deg).
const THROW_VAZ_SPREAD_DEG: f64 = 1.5;

/// Per-slot simulation state.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoSimState {
    /// Virtual station position
    pub station: Point2D,
    /// Last simulated centre sighting
    pub last_centre_reading: Option<AveragedReading>,
}

/// Synthetic EDM and wind source.
#[derive(Debug)]
pub struct DemoSimulator {
    rng: SimRng,
    noise: NoiseModel,
    stations: HashMap<String, DemoSimState>,
}

impl DemoSimulator {
    /// Simulator with default noise and an optional fixed seed.
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: SimRng::new(seed),
            noise: NoiseModel::default(),
            stations: HashMap::new(),
        }
    }

    /// Replace the noise model.
    pub fn with_noise(mut self, noise: NoiseModel) -> Self {
        self.noise = noise;
        self
    }

    /// Simulation state for `slot`, if initialised.
    pub fn state(&self, slot: &str) -> Option<&DemoSimState> {
        self.stations.get(slot)
    }

    /// Forget every slot's virtual station.
    pub fn reset(&mut self) {
        self.stations.clear();
    }

    /// Forget `slot`'s virtual station.
    pub fn reset_slot(&mut self, slot: &str) {
        self.stations.remove(slot);
    }

    /// Geometry-free reading for the bare `get_reliable_reading` path.
    pub fn random_reading(&mut self) -> AveragedReading {
        AveragedReading {
            slope_distance_mm: self.rng.uniform(10_000.0, 25_000.0),
            vertical_angle_deg: self.rng.uniform(92.0, 97.0),
            horizontal_angle_deg: self.rng.uniform(0.0, 360.0),
        }
    }

    /// Wind speed in [-2.0, +2.0] m/s.
    pub fn random_wind(&mut self) -> f64 {
        self.rng.uniform(-2.0, 2.0)
    }

    /// Reading from `slot`'s station to the circle centre.
    pub fn centre_reading(&mut self, slot: &str) -> AveragedReading {
        let station = self.station(slot);
        let vaz = self.rng.uniform(88.0, 92.0);
        let exact = geometry::reading_towards(station, Point2D::default(), vaz);
        let reading = self.perturb(exact, self.noise.distance_mm);

        if let Some(state) = self.stations.get_mut(slot) {
            state.last_centre_reading = Some(reading);
        }
        debug!(
            demo = true,
            slot,
            sd_mm = reading.slope_distance_mm,
            vaz_deg = reading.vertical_angle_deg,
            har_deg = reading.horizontal_angle_deg,
            "simulated centre reading"
        );
        reading
    }

    /// Reading from `slot`'s station to a point near the circle edge.
    pub fn edge_reading(&mut self, slot: &str, target_radius: f64) -> AveragedReading {
        let base_vaz = self.centre_baseline(slot);
        let station = self.station(slot);

        let radius = target_radius + self.rng.symmetric(EDGE_RADIUS_SPREAD_M);
        let bearing = self.rng.uniform(0.0, TAU);
        let edge = Point2D::polar(radius, bearing);
        let vaz = base_vaz + self.rng.symmetric(EDGE_VAZ_SPREAD_DEG);

        let exact = geometry::reading_towards(station, edge, vaz);
        let reading = self.perturb(exact, self.noise.distance_mm);
        debug!(
            demo = true,
            slot,
            edge_x = edge.x,
            edge_y = edge.y,
            radius,
            sd_mm = reading.slope_distance_mm,
            "simulated edge reading"
        );
        reading
    }

    /// Reading from `slot`'s station to a plausible landing point for `circle`.
    pub fn throw_reading(
        &mut self,
        slot: &str,
        target_radius: f64,
        circle: CircleType,
    ) -> AveragedReading {
        let base_vaz = self.centre_baseline(slot);
        let station = self.station(slot);

        let (min, max) = circle.throw_range();
        let throw = self.rng.uniform(min, max);
        let bearing = self.rng.symmetric(FRAC_PI_6);
        let landing = Point2D::polar(throw + target_radius, bearing);
        let vaz = base_vaz + self.rng.symmetric(THROW_VAZ_SPREAD_DEG);

        let exact = geometry::reading_towards(station, landing, vaz);
        // Landing marks are sighted less precisely than the circle.
        let reading = self.perturb(exact, self.noise.distance_mm * 2.0);
        debug!(
            demo = true,
            slot,
            %circle,
            expected_m = throw,
            landing_x = landing.x,
            landing_y = landing.y,
            "simulated throw reading"
        );
        reading
    }

    /// Station for `slot`, placing one on first use.
    fn station(&mut self, slot: &str) -> Point2D {
        if let Some(state) = self.stations.get(slot) {
            return state.station;
        }
        let distance = self.rng.uniform(8.0, 15.0);
        let bearing = self.rng.uniform(0.0, TAU);
        let station = Point2D::polar(distance, bearing);
        debug!(demo = true, slot, x = station.x, y = station.y, "placed virtual station");
        self.stations.insert(
            slot.to_string(),
            DemoSimState {
                station,
                last_centre_reading: None,
            },
        );
        station
    }

    /// Vertical angle of the cached centre sighting, simulating one if missing.
    fn centre_baseline(&mut self, slot: &str) -> f64 {
        let cached = self
            .stations
            .get(slot)
            .and_then(|state| state.last_centre_reading);
        match cached {
            Some(reading) => reading.vertical_angle_deg,
            None => {
                warn!(demo = true, slot, "no simulated centre sighting, generating one");
                self.centre_reading(slot).vertical_angle_deg
            }
        }
    }

    fn perturb(&mut self, exact: AveragedReading, distance_noise_mm: f64) -> AveragedReading {
        AveragedReading {
            slope_distance_mm: exact.slope_distance_mm + self.rng.symmetric(distance_noise_mm),
            vertical_angle_deg: exact.vertical_angle_deg + self.rng.symmetric(self.noise.angle_deg),
            horizontal_angle_deg: exact.horizontal_angle_deg
                + self.rng.symmetric(self.noise.angle_deg),
        }
    }
}
