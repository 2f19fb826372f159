//! Configuration System using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults (the instrument constants the engine was designed around)
//! 2. `polyfield.toml` (or any file passed to [`PolyfieldConfig::load_from`])
//! 3. Environment variables prefixed with `POLYFIELD_`, nested with `__`
//!
//! # Example
//! ```no_run
//! use polyfield::config::PolyfieldConfig;
//!
//! let config = PolyfieldConfig::load()?;
//! println!("EDM read timeout: {:?}", config.edm.read_timeout());
//! # Ok::<(), polyfield::error::PolyfieldError>(())
//! ```

use crate::error::{AppResult, PolyfieldError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "polyfield.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolyfieldConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Serial and network link settings
    pub connection: ConnectionConfig,
    /// EDM reading protocol settings
    pub edm: EdmConfig,
    /// Wind gauge settings
    pub wind: WindConfig,
    /// Scoreboard settings
    pub scoreboard: ScoreboardConfig,
    /// Demo simulation settings
    pub demo: DemoConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "PolyField".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Link settings shared by every device slot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Serial baud rate
    pub baud_rate: u32,
    /// TCP dial timeout in milliseconds
    pub dial_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            dial_timeout_ms: 5000,
        }
    }
}

impl ConnectionConfig {
    /// Dial timeout as a [`Duration`].
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }
}

/// EDM dual-read protocol settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdmConfig {
    /// Read deadline for network-attached instruments in milliseconds
    pub read_timeout_ms: u64,
    /// Pause between the two reads of a pair in milliseconds
    pub inter_read_delay_ms: u64,
    /// Maximum slope-distance disagreement within a pair (mm)
    pub consistency_tolerance_mm: f64,
}

impl Default for EdmConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 10_000,
            inter_read_delay_ms: 250,
            consistency_tolerance_mm: 3.0,
        }
    }
}

impl EdmConfig {
    /// Network read deadline as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Inter-read pause as a [`Duration`].
    pub fn inter_read_delay(&self) -> Duration {
        Duration::from_millis(self.inter_read_delay_ms)
    }
}

/// Wind gauge settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindConfig {
    /// Slot key of the wind gauge
    pub slot: String,
    /// Ring capacity (samples)
    pub capacity: usize,
    /// Averaging window in seconds
    pub window_secs: u64,
}

impl Default for WindConfig {
    fn default() -> Self {
        Self {
            slot: "wind".to_string(),
            capacity: 120,
            window_secs: 5,
        }
    }
}

impl WindConfig {
    /// Averaging window as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Scoreboard settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreboardConfig {
    /// Slot key of the scoreboard
    pub slot: String,
    /// Text written once when the scoreboard connects
    pub sentinel: String,
}

impl Default for ScoreboardConfig {
    fn default() -> Self {
        Self {
            slot: "scoreboard".to_string(),
            sentinel: "88:88".to_string(),
        }
    }
}

/// Demo simulation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Start in demo mode
    pub enabled: bool,
    /// Fixed RNG seed for reproducible sessions
    pub seed: Option<u64>,
    /// Simulated delay before a centre reading (ms)
    pub centre_delay_ms: u64,
    /// Simulated delay before an edge reading (ms)
    pub edge_delay_ms: u64,
    /// Simulated delay before a throw reading (ms)
    pub throw_delay_ms: u64,
    /// Half-width of slope distance noise (mm)
    pub distance_noise_mm: f64,
    /// Half-width of angle noise (degrees)
    pub angle_noise_deg: f64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            seed: None,
            centre_delay_ms: 2000,
            edge_delay_ms: 2000,
            throw_delay_ms: 1500,
            distance_noise_mm: 5.0,
            angle_noise_deg: 0.05,
        }
    }
}

impl PolyfieldConfig {
    /// Load configuration from `polyfield.toml` and environment variables
    ///
    /// Environment variables override the file, e.g.
    /// `POLYFIELD_EDM__READ_TIMEOUT_MS=5000` or `POLYFIELD_DEMO__ENABLED=true`.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("POLYFIELD_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(PolyfieldError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(PolyfieldError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        if self.connection.baud_rate == 0 {
            return Err(PolyfieldError::Configuration(
                "connection.baud_rate must be positive".into(),
            ));
        }

        if !is_non_negative(self.edm.consistency_tolerance_mm) {
            return Err(PolyfieldError::Configuration(
                "edm.consistency_tolerance_mm must be a non-negative number".into(),
            ));
        }

        if self.wind.capacity == 0 || self.wind.window_secs == 0 {
            return Err(PolyfieldError::Configuration(
                "wind.capacity and wind.window_secs must be positive".into(),
            ));
        }

        if !is_non_negative(self.demo.distance_noise_mm)
            || !is_non_negative(self.demo.angle_noise_deg)
        {
            return Err(PolyfieldError::Configuration(
                "demo noise amplitudes must be non-negative numbers".into(),
            ));
        }

        if self.wind.slot == self.scoreboard.slot {
            return Err(PolyfieldError::Configuration(format!(
                "wind and scoreboard cannot share slot '{}'",
                self.wind.slot
            )));
        }

        Ok(())
    }

    /// Configuration tuned for tests and scripted demos: no simulated delays
    /// and no inter-read pause.
    pub fn instant() -> Self {
        let mut config = Self::default();
        config.edm.inter_read_delay_ms = 0;
        config.demo.centre_delay_ms = 0;
        config.demo.edge_delay_ms = 0;
        config.demo.throw_delay_ms = 0;
        config
    }
}

/// Finite and at least zero; rejects NaN and infinities.
fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}
