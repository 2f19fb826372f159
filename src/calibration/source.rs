//! Where calibration readings come from.
//!
//! The engine asks a [`ReadingSource`] for each phase of the workflow. The hardware
//! source runs the dual-read protocol against the slot's instrument; the simulated
//! source waits out a realistic delay and asks the demo simulator.

use super::types::CircleType;
use crate::config::DemoConfig;
use crate::edm::{AveragedReading, EdmProtocol};
use crate::error::AppResult;
use crate::hardware::connection::ConnectionManager;
use crate::state::SharedState;
use async_trait::async_trait;
use std::time::Duration;

/// Workflow step a reading is taken for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementPhase {
    /// Sighting the circle centre
    Centre,
    /// Sighting a point on the circle edge
    Edge,
    /// Sighting the landing mark
    Throw,
}

impl std::fmt::Display for MeasurementPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeasurementPhase::Centre => write!(f, "centre"),
            MeasurementPhase::Edge => write!(f, "edge"),
            MeasurementPhase::Throw => write!(f, "throw"),
        }
    }
}

/// What the engine knows about the slot when it asks for a reading.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingRequest {
    /// Slot key
    pub slot: String,
    /// Circle in use
    pub circle_type: CircleType,
    /// Radius measured against (m)
    pub target_radius: f64,
}

/// Supplier of averaged readings.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Obtain one reading for `phase`.
    async fn acquire(
        &self,
        phase: MeasurementPhase,
        request: &ReadingRequest,
    ) -> AppResult<AveragedReading>;
}

/// Reads the slot's instrument.
#[derive(Clone)]
pub struct HardwareSource {
    connections: ConnectionManager,
    protocol: EdmProtocol,
}

impl HardwareSource {
    /// Source backed by `connections` and `protocol`.
    pub fn new(connections: ConnectionManager, protocol: EdmProtocol) -> Self {
        Self {
            connections,
            protocol,
        }
    }
}

#[async_trait]
impl ReadingSource for HardwareSource {
    fn name(&self) -> &'static str {
        "hardware"
    }

    async fn acquire(
        &self,
        _phase: MeasurementPhase,
        request: &ReadingRequest,
    ) -> AppResult<AveragedReading> {
        let channel = self.connections.channel(&request.slot)?;
        self.protocol.reliable_reading(&channel).await
    }
}

/// Draws from the demo simulator after a phase-specific delay.
#[derive(Clone)]
pub struct SimulatedSource {
    state: SharedState,
    centre_delay: Duration,
    edge_delay: Duration,
    throw_delay: Duration,
}

impl SimulatedSource {
    pub(crate) fn new(state: SharedState, config: &DemoConfig) -> Self {
        Self {
            state,
            centre_delay: Duration::from_millis(config.centre_delay_ms),
            edge_delay: Duration::from_millis(config.edge_delay_ms),
            throw_delay: Duration::from_millis(config.throw_delay_ms),
        }
    }

    fn delay(&self, phase: MeasurementPhase) -> Duration {
        match phase {
            MeasurementPhase::Centre => self.centre_delay,
            MeasurementPhase::Edge => self.edge_delay,
            MeasurementPhase::Throw => self.throw_delay,
        }
    }
}

#[async_trait]
impl ReadingSource for SimulatedSource {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn acquire(
        &self,
        phase: MeasurementPhase,
        request: &ReadingRequest,
    ) -> AppResult<AveragedReading> {
        let delay = self.delay(phase);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        let reading = match phase {
            MeasurementPhase::Centre => state.demo.centre_reading(&request.slot),
            MeasurementPhase::Edge => state
                .demo
                .edge_reading(&request.slot, request.target_radius),
            MeasurementPhase::Throw => state.demo.throw_reading(
                &request.slot,
                request.target_radius,
                request.circle_type,
            ),
        };
        Ok(reading)
    }
}
