//! Seeded RNG for reproducible demo sessions.
//!
//! The simulator lives inside the shared state lock, so the generator is owned
//! directly rather than wrapped in its own mutex.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded random source.
pub struct SimRng {
    inner: ChaCha8Rng,
}

impl SimRng {
    /// Create a new RNG with optional seed.
    /// If seed is None, uses a random seed from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        let inner = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        Self { inner }
    }

    /// Value in [0.0, 1.0)
    pub fn next_f64(&mut self) -> f64 {
        self.inner.gen()
    }

    /// Value in [low, high); returns `low` when the range is empty.
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        self.inner.gen_range(low..high)
    }

    /// Value in [-half_width, +half_width); zero for a non-positive width.
    pub fn symmetric(&mut self, half_width: f64) -> f64 {
        if half_width <= 0.0 {
            return 0.0;
        }
        self.uniform(-half_width, half_width)
    }
}

impl Default for SimRng {
    fn default() -> Self {
        Self::new(None)
    }
}

impl std::fmt::Debug for SimRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimRng")
            .field("inner", &"<ChaCha8Rng>")
            .finish()
    }
}

/// Half-widths of the symmetric measurement noise added to simulated readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseModel {
    /// Slope distance noise (mm)
    pub distance_mm: f64,
    /// Noise on each angle (degrees)
    pub angle_deg: f64,
}

impl NoiseModel {
    /// Noiseless readings; the simulated geometry is exact.
    pub const fn none() -> Self {
        Self {
            distance_mm: 0.0,
            angle_deg: 0.0,
        }
    }
}

impl Default for NoiseModel {
    fn default() -> Self {
        Self {
            distance_mm: 5.0,
            angle_deg: 0.05,
        }
    }
}
