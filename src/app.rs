//! `Polyfield`: the engine facade.
//!
//! Owns the shared state and wires the connection manager, reading protocol,
//! calibration engine, wind gauge and scoreboard sink together. Every public
//! operation the operator UI drives is a method here.

use crate::calibration::{
    CalibrationEngine, CalibrationRecord, CircleType, HardwareSource, ReadingSource,
    SimulatedSource, ThrowMeasurement,
};
use crate::config::PolyfieldConfig;
use crate::edm::{AveragedReading, EdmProtocol, ParsedReading};
use crate::error::AppResult;
use crate::hardware::connection::{ConnectionInfo, ConnectionKind, ConnectionManager};
use crate::hardware::io::DynStream;
use crate::scoreboard::ScoreboardSink;
use crate::state::{EngineState, SharedState};
use crate::wind::{WindGauge, WindMeasurement};
use std::sync::Arc;
use tracing::{debug, info};

/// Device measurement and calibration engine.
#[derive(Clone)]
pub struct Polyfield {
    config: Arc<PolyfieldConfig>,
    state: SharedState,
    connections: ConnectionManager,
    protocol: EdmProtocol,
    calibration: CalibrationEngine,
    wind: WindGauge,
    scoreboard: ScoreboardSink,
}

impl Polyfield {
    /// Engine reading from real instruments (or the simulator in demo mode).
    pub fn new(config: PolyfieldConfig) -> Self {
        let config = Arc::new(config);
        let state = EngineState::shared(&config);
        let scoreboard = ScoreboardSink::new(state.clone(), config.scoreboard.slot.clone());
        let connections = ConnectionManager::new(state.clone(), config.clone(), scoreboard.clone());
        let protocol = EdmProtocol::from_config(&config.edm);

        let hardware: Arc<dyn ReadingSource> =
            Arc::new(HardwareSource::new(connections.clone(), protocol.clone()));
        let simulated: Arc<dyn ReadingSource> =
            Arc::new(SimulatedSource::new(state.clone(), &config.demo));
        let calibration =
            CalibrationEngine::new(state.clone(), hardware, simulated, scoreboard.clone());
        let wind = WindGauge::new(state.clone(), config.wind.clone(), scoreboard.clone());

        info!(
            app = %config.application.name,
            demo = config.demo.enabled,
            "engine ready"
        );

        Self {
            config,
            state,
            connections,
            protocol,
            calibration,
            wind,
            scoreboard,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &PolyfieldConfig {
        &self.config
    }

    // --- Connections ---

    /// Open a serial port for `slot`, replacing any existing connection.
    pub async fn connect_serial(&self, slot: &str, port_name: &str) -> AppResult<String> {
        self.connections.connect_serial(slot, port_name).await
    }

    /// Dial `host:port` for `slot`, replacing any existing connection.
    pub async fn connect_network(&self, slot: &str, host: &str, port: u16) -> AppResult<String> {
        self.connections.connect_network(slot, host, port).await
    }

    /// Bind an already-open channel to `slot`.
    ///
    /// # Panics
    ///
    /// Binding the wind slot spawns its listener, so that case must run inside a
    /// Tokio runtime.
    pub fn connect_stream(
        &self,
        slot: &str,
        kind: ConnectionKind,
        address: &str,
        stream: DynStream,
    ) -> String {
        self.connections.connect_stream(slot, kind, address, stream)
    }

    /// Close `slot`.
    pub fn disconnect(&self, slot: &str) -> AppResult<String> {
        self.connections.disconnect(slot)
    }

    /// Link details of `slot`, if connected.
    pub fn connection_info(&self, slot: &str) -> Option<ConnectionInfo> {
        self.connections
            .connection_info()
            .into_iter()
            .find(|info| info.slot == slot)
    }

    /// Every live slot, sorted by key.
    pub fn connected_slots(&self) -> Vec<ConnectionInfo> {
        self.connections.connection_info()
    }

    // --- Demo mode ---

    /// Switch demo mode; any change discards all virtual stations.
    pub fn set_demo_mode(&self, enabled: bool) {
        let mut state = self.state.lock();
        if state.demo_mode != enabled {
            state.demo.reset();
        }
        state.demo_mode = enabled;
        info!(enabled, "demo mode");
    }

    /// Whether demo mode is on.
    pub fn is_demo_mode(&self) -> bool {
        self.state.lock().demo_mode
    }

    // --- Readings ---

    /// Trigger one raw read on `slot`.
    pub async fn trigger_single_read(&self, slot: &str) -> AppResult<ParsedReading> {
        let channel = self.connections.channel(slot)?;
        self.protocol.trigger_single_read(&channel).await
    }

    /// Dual-read `slot`; in demo mode returns a random reading instead.
    pub async fn get_reliable_reading(&self, slot: &str) -> AppResult<AveragedReading> {
        {
            let mut state = self.state.lock();
            if state.demo_mode {
                let reading = state.demo.random_reading();
                debug!(demo = true, slot, sd_mm = reading.slope_distance_mm, "random reading");
                return Ok(reading);
            }
        }
        let channel = self.connections.channel(slot)?;
        self.protocol.reliable_reading(&channel).await
    }

    // --- Calibration ---

    /// Sight the centre and locate the station.
    pub async fn set_circle_centre(&self, slot: &str) -> AppResult<CalibrationRecord> {
        self.calibration.set_circle_centre(slot).await
    }

    /// Sight the edge and check the radius.
    pub async fn verify_circle_edge(&self, slot: &str) -> AppResult<CalibrationRecord> {
        self.calibration.verify_circle_edge(slot).await
    }

    /// Sight the landing mark.
    pub async fn measure_throw(&self, slot: &str) -> AppResult<ThrowMeasurement> {
        self.calibration.measure_throw(slot).await
    }

    /// Stored record or a fresh shot put record.
    pub fn calibration(&self, slot: &str) -> CalibrationRecord {
        self.calibration.calibration(slot)
    }

    /// Stored record or `NotCalibrated`.
    pub fn stored_calibration(&self, slot: &str) -> AppResult<CalibrationRecord> {
        self.calibration.stored_calibration(slot)
    }

    /// Replace the stored record, keeping its timestamp.
    pub fn save_calibration(&self, slot: &str, record: CalibrationRecord) {
        self.calibration.save_calibration(slot, record);
    }

    /// Switch the slot's circle type.
    pub fn select_circle(&self, slot: &str, circle: CircleType) -> CalibrationRecord {
        self.calibration.select_circle(slot, circle)
    }

    /// Forget the slot's calibration.
    pub fn reset_calibration(&self, slot: &str) {
        self.calibration.reset_calibration(slot);
    }

    /// Log the slot's calibration at debug level.
    pub fn log_calibration_summary(&self, slot: &str) {
        self.calibration.log_calibration_summary(slot);
    }

    // --- Wind & scoreboard ---

    /// Mean wind over the configured window.
    ///
    /// Safe to call outside a Tokio runtime; the scoreboard update is then skipped.
    pub fn measure_wind(&self, slot: &str) -> AppResult<WindMeasurement> {
        self.wind.measure(slot)
    }

    /// Write `text` to the scoreboard and wait for the write.
    pub async fn send_to_scoreboard(&self, text: &str) -> AppResult<()> {
        self.scoreboard.send(text).await
    }

    /// Close every slot and stop every listener.
    pub fn shutdown(&self) {
        self.connections.shutdown();
        info!("engine shut down");
    }
}
