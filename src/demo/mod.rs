//! Demo simulation: synthetic readings for running the workflow without hardware.

pub mod rng;
pub mod simulator;

pub use rng::{NoiseModel, SimRng};
pub use simulator::{DemoSimState, DemoSimulator};
