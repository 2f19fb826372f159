//! # PolyField Engine
//!
//! Device measurement and calibration engine for throwing-event officiating. It talks
//! to EDM instruments, a wind gauge and a scoreboard over serial lines or TCP, runs
//! the centre → edge → throw calibration workflow, and can stand in for all hardware
//! with a geometry-consistent simulator.
//!
//! ## Crate Structure
//!
//! - **`app`**: The [`Polyfield`] facade owning the shared state and exposing every
//!   operation.
//! - **`config`**: Layered `figment` configuration. See `config::PolyfieldConfig`.
//! - **`error`**: The `PolyfieldError` enum and its category taxonomy.
//! - **`logging`**: `tracing-subscriber` initialisation.
//! - **`hardware`**: Serial/TCP channel helpers and the per-slot connection table.
//! - **`edm`**: EDM response parsing and the dual-read protocol.
//! - **`calibration`**: Circle types, station geometry, reading sources and the
//!   calibration engine.
//! - **`demo`**: Seeded simulator producing readings for a virtual station.
//! - **`wind`**: Wind sample ring, line listener and windowed average.
//! - **`scoreboard`**: Fire-and-forget scoreboard writer.

pub mod app;
pub mod calibration;
pub mod config;
pub mod demo;
pub mod edm;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod scoreboard;
pub mod wind;

mod state;

pub use app::Polyfield;
pub use error::{AppResult, ErrorCategory, PolyfieldError};
