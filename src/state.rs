//! The single shared state container.
//!
//! Device slots, calibration records, the wind ring, the demo simulation table and the
//! demo-mode flag all live behind one `parking_lot::Mutex`. The guard is never held
//! across an `.await`: callers copy what they need out, release, do their I/O, then
//! re-acquire to commit. Calibration records carry a per-slot revision so a commit
//! can tell whether the record changed while the lock was released.

use crate::calibration::CalibrationRecord;
use crate::config::PolyfieldConfig;
use crate::demo::{DemoSimulator, NoiseModel};
use crate::hardware::connection::DeviceHandle;
use crate::wind::WindBuffer;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Handle to the shared engine state.
pub(crate) type SharedState = Arc<Mutex<EngineState>>;

pub(crate) struct EngineState {
    pub(crate) devices: HashMap<String, DeviceHandle>,
    pub(crate) calibrations: HashMap<String, CalibrationRecord>,
    /// Bumped on every write to a slot's record, including removal.
    revisions: HashMap<String, u64>,
    pub(crate) wind: WindBuffer,
    pub(crate) demo: DemoSimulator,
    pub(crate) demo_mode: bool,
}

impl EngineState {
    pub(crate) fn new(config: &PolyfieldConfig) -> Self {
        let noise = NoiseModel {
            distance_mm: config.demo.distance_noise_mm,
            angle_deg: config.demo.angle_noise_deg,
        };
        Self {
            devices: HashMap::new(),
            calibrations: HashMap::new(),
            revisions: HashMap::new(),
            wind: WindBuffer::new(config.wind.capacity),
            demo: DemoSimulator::new(config.demo.seed).with_noise(noise),
            demo_mode: config.demo.enabled,
        }
    }

    pub(crate) fn shared(config: &PolyfieldConfig) -> SharedState {
        Arc::new(Mutex::new(Self::new(config)))
    }

    /// Current revision of `slot`'s calibration record.
    pub(crate) fn calibration_revision(&self, slot: &str) -> u64 {
        self.revisions.get(slot).copied().unwrap_or(0)
    }

    /// Store `record` for `slot` and bump its revision.
    pub(crate) fn store_calibration(&mut self, slot: &str, record: CalibrationRecord) {
        self.calibrations.insert(slot.to_string(), record);
        self.bump_revision(slot);
    }

    /// Drop `slot`'s record and bump its revision.
    pub(crate) fn remove_calibration(&mut self, slot: &str) -> Option<CalibrationRecord> {
        self.bump_revision(slot);
        self.calibrations.remove(slot)
    }

    fn bump_revision(&mut self, slot: &str) {
        *self.revisions.entry(slot.to_string()).or_insert(0) += 1;
    }
}
