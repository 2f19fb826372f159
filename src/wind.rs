//! Wind gauge.
//!
//! The gauge streams comma-separated lines on its own; the second field is the signed
//! speed, e.g. `0,+1.3,M,00`. A listener task bound to the wind slot parses every line
//! into a timestamped sample and pushes it into a bounded ring. A wind measurement is
//! the mean of the samples inside the averaging window.

use crate::config::WindConfig;
use crate::error::{AppResult, PolyfieldError};
use crate::hardware::connection::ListenerHandle;
use crate::hardware::io::SharedPort;
use crate::scoreboard::ScoreboardSink;
use crate::state::SharedState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tracing::{debug, info, trace, warn};

/// One gauge sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindSample {
    /// Speed in m/s (positive is tailwind)
    pub value: f64,
    /// Arrival time
    pub timestamp: DateTime<Utc>,
}

/// Bounded ring of recent samples; the oldest is evicted when full.
#[derive(Debug, Clone)]
pub struct WindBuffer {
    samples: VecDeque<WindSample>,
    capacity: usize,
}

impl WindBuffer {
    /// Empty ring holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample stamped now.
    pub fn push(&mut self, value: f64) {
        self.push_at(value, Utc::now());
    }

    /// Append a sample with an explicit timestamp.
    pub fn push_at(&mut self, value: f64, timestamp: DateTime<Utc>) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(WindSample { value, timestamp });
    }

    /// Number of samples held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Ring capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Mean and count of samples newer than `now - window`.
    pub fn average_at(&self, now: DateTime<Utc>, window: Duration) -> Option<(f64, usize)> {
        let cutoff = chrono::Duration::from_std(window)
            .ok()
            .and_then(|window| now.checked_sub_signed(window));

        let (sum, count) = self
            .samples
            .iter()
            .filter(|sample| cutoff.map_or(true, |cutoff| sample.timestamp > cutoff))
            .fold((0.0, 0usize), |(sum, count), sample| {
                (sum + sample.value, count + 1)
            });

        (count > 0).then(|| (sum / count as f64, count))
    }
}

/// Extract the speed from a gauge line.
///
/// The second comma-separated field must carry an explicit sign. Anything else (idle
/// lines, status lines, garbage) yields `None`.
pub fn parse_wind_line(line: &str) -> Option<f64> {
    let field = line.trim().split(',').nth(1)?.trim();
    if !(field.starts_with('+') || field.starts_with('-')) {
        return None;
    }
    field.parse::<f64>().ok()
}

/// Averaged wind speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindMeasurement {
    /// Mean speed in m/s
    pub speed_ms: f64,
    /// Samples that contributed (zero for simulated values)
    pub samples: usize,
}

impl std::fmt::Display for WindMeasurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:+.1} m/s", self.speed_ms)
    }
}

/// Reads the ring (or the simulator in demo mode) and reports the windowed mean.
#[derive(Clone)]
pub struct WindGauge {
    state: SharedState,
    config: WindConfig,
    scoreboard: ScoreboardSink,
}

impl WindGauge {
    pub(crate) fn new(state: SharedState, config: WindConfig, scoreboard: ScoreboardSink) -> Self {
        Self {
            state,
            config,
            scoreboard,
        }
    }

    /// Average the last window of samples for `slot`.
    ///
    /// In demo mode a value in [-2.0, +2.0] is drawn instead. In live mode the slot
    /// must be connected and the window must hold at least one sample. The result is
    /// also pushed to the scoreboard.
    pub fn measure(&self, slot: &str) -> AppResult<WindMeasurement> {
        let measurement = {
            let mut state = self.state.lock();
            if state.demo_mode {
                WindMeasurement {
                    speed_ms: state.demo.random_wind(),
                    samples: 0,
                }
            } else {
                if !state.devices.contains_key(slot) {
                    return Err(PolyfieldError::NotConnected(slot.to_string()));
                }
                let window = self.config.window();
                let (speed_ms, samples) = state
                    .wind
                    .average_at(Utc::now(), window)
                    .ok_or(PolyfieldError::NoWindData { window })?;
                WindMeasurement { speed_ms, samples }
            }
        };

        info!(slot, wind = %measurement, samples = measurement.samples, "wind measured");
        self.scoreboard.dispatch(measurement.to_string());
        Ok(measurement)
    }
}

/// Spawn the line listener for a wind slot.
///
/// The task exits on EOF, on a read error, or when the handle is stopped.
pub(crate) fn spawn_listener(slot: String, port: SharedPort, state: SharedState) -> ListenerHandle {
    ListenerHandle::spawn(move |mut shutdown_rx| async move {
        debug!(slot = %slot, "wind listener started");
        let mut raw = Vec::new();
        loop {
            raw.clear();
            let read = {
                let mut port = port.lock().await;
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    result = port.read_until(b'\n', &mut raw) => result,
                }
            };
            // Line noise is not fatal; undecodable bytes just fail to parse.
            let line = String::from_utf8_lossy(&raw);

            match read {
                Ok(0) => {
                    info!(slot = %slot, "wind gauge closed the connection");
                    break;
                }
                Ok(_) => match parse_wind_line(&line) {
                    Some(value) => {
                        trace!(slot = %slot, value, "wind sample");
                        state.lock().wind.push(value);
                    }
                    None => trace!(slot = %slot, raw = %line.trim(), "ignored wind line"),
                },
                Err(e) => {
                    warn!(slot = %slot, error = %e, "wind listener read failed");
                    break;
                }
            }
        }
        debug!(slot = %slot, "wind listener stopped");
    })
}
