//! Three-phase calibration workflow: set centre, verify edge, measure throw.
//!
//! Each operation snapshots the slot's record under the state lock, releases it,
//! acquires a reading from the active [`ReadingSource`], then re-locks to commit. A
//! failed acquisition returns before the commit, so the stored record is never
//! partially updated. The commit is refused with
//! [`PolyfieldError::CalibrationChanged`] when the record was reset, saved or switched
//! to another circle while the reading was in flight.

use super::geometry;
use super::source::{MeasurementPhase, ReadingRequest, ReadingSource};
use super::types::{CalibrationRecord, CircleType, ThrowMeasurement};
use crate::edm::AveragedReading;
use crate::error::{AppResult, PolyfieldError};
use crate::scoreboard::ScoreboardSink;
use crate::state::SharedState;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Record copied out under the lock, with the revision it was read at.
struct Snapshot {
    record: CalibrationRecord,
    revision: u64,
    demo: bool,
}

/// Per-slot calibration state machine.
#[derive(Clone)]
pub struct CalibrationEngine {
    state: SharedState,
    hardware: Arc<dyn ReadingSource>,
    simulated: Arc<dyn ReadingSource>,
    scoreboard: ScoreboardSink,
}

impl CalibrationEngine {
    pub(crate) fn new(
        state: SharedState,
        hardware: Arc<dyn ReadingSource>,
        simulated: Arc<dyn ReadingSource>,
        scoreboard: ScoreboardSink,
    ) -> Self {
        Self {
            state,
            hardware,
            simulated,
            scoreboard,
        }
    }

    /// Copy out the slot's record (or a fresh one), its revision and the demo flag.
    fn snapshot(&self, slot: &str) -> Snapshot {
        let state = self.state.lock();
        let record = state
            .calibrations
            .get(slot)
            .cloned()
            .unwrap_or_else(|| CalibrationRecord::new(slot));
        Snapshot {
            record,
            revision: state.calibration_revision(slot),
            demo: state.demo_mode,
        }
    }

    async fn acquire(
        &self,
        demo: bool,
        phase: MeasurementPhase,
        record: &CalibrationRecord,
    ) -> AppResult<AveragedReading> {
        let source = if demo { &self.simulated } else { &self.hardware };
        let request = ReadingRequest {
            slot: record.device_id.clone(),
            circle_type: record.selected_circle_type,
            target_radius: record.target_radius,
        };

        let reading = source.acquire(phase, &request).await.inspect_err(|e| {
            warn!(slot = %request.slot, %phase, source = source.name(), error = %e, "reading failed");
        })?;

        info!(
            slot = %request.slot,
            %phase,
            source = source.name(),
            circle = %request.circle_type,
            target_radius = request.target_radius,
            sd_mm = reading.slope_distance_mm,
            vaz_deg = reading.vertical_angle_deg,
            har_deg = reading.horizontal_angle_deg,
            "reading acquired"
        );
        Ok(reading)
    }

    fn ensure_unchanged(&self, slot: &str, revision: u64) -> AppResult<()> {
        if self.state.lock().calibration_revision(slot) != revision {
            warn!(slot, "calibration changed during reading, result discarded");
            return Err(PolyfieldError::CalibrationChanged(slot.to_string()));
        }
        Ok(())
    }

    fn commit(&self, revision: u64, record: CalibrationRecord) -> AppResult<()> {
        let slot = record.device_id.clone();
        let mut state = self.state.lock();
        if state.calibration_revision(&slot) != revision {
            warn!(slot = %slot, "calibration changed during reading, result discarded");
            return Err(PolyfieldError::CalibrationChanged(slot));
        }
        state.store_calibration(&slot, record);
        Ok(())
    }

    /// Sight the circle centre and locate the station.
    ///
    /// Clears any previous edge verification.
    #[instrument(skip(self))]
    pub async fn set_circle_centre(&self, slot: &str) -> AppResult<CalibrationRecord> {
        let Snapshot {
            mut record,
            revision,
            demo,
        } = self.snapshot(slot);
        let reading = self.acquire(demo, MeasurementPhase::Centre, &record).await?;

        let station = geometry::station_from_centre_reading(&reading);
        debug!(
            horizontal_m = geometry::horizontal_distance(&reading),
            station_x = station.x,
            station_y = station.y,
            "station located"
        );

        record.station_coordinates = station;
        record.is_centre_set = true;
        record.edge_verification_result = None;
        record.timestamp = Some(Utc::now());

        self.commit(revision, record.clone())?;
        Ok(record)
    }

    /// Sight a point on the circle edge and check its radius.
    #[instrument(skip(self))]
    pub async fn verify_circle_edge(&self, slot: &str) -> AppResult<CalibrationRecord> {
        let Snapshot {
            mut record,
            revision,
            demo,
        } = self.snapshot(slot);
        if !record.is_centre_set {
            return Err(PolyfieldError::CentreNotSet(slot.to_string()));
        }

        let reading = self.acquire(demo, MeasurementPhase::Edge, &record).await?;
        let result = geometry::verify_edge(
            record.station_coordinates,
            &reading,
            record.target_radius,
            record.selected_circle_type,
        );

        info!(
            circle = %record.selected_circle_type,
            target_radius = record.target_radius,
            measured_radius = result.measured_radius,
            difference_mm = result.difference_mm,
            tolerance_mm = result.tolerance_applied_mm,
            pass = result.in_tolerance,
            "edge verified"
        );

        record.edge_verification_result = Some(result);
        self.commit(revision, record.clone())?;
        Ok(record)
    }

    /// Sight the landing mark and report the distance beyond the circle.
    ///
    /// Outside demo mode the edge must have been verified within tolerance. The
    /// result is forwarded to the scoreboard without waiting on it.
    #[instrument(skip(self))]
    pub async fn measure_throw(&self, slot: &str) -> AppResult<ThrowMeasurement> {
        let Snapshot {
            record,
            revision,
            demo,
        } = self.snapshot(slot);
        if !record.is_centre_set {
            return Err(PolyfieldError::CentreNotSet(slot.to_string()));
        }
        if !demo && !record.edge_in_tolerance() {
            return Err(PolyfieldError::EdgeNotVerified(slot.to_string()));
        }

        let reading = self.acquire(demo, MeasurementPhase::Throw, &record).await?;
        self.ensure_unchanged(slot, revision)?;
        let raw = geometry::throw_distance(record.station_coordinates, &reading, record.target_radius);
        let throw = ThrowMeasurement {
            distance_m: geometry::round_to(raw, 2),
            circle_type: record.selected_circle_type,
        };

        info!(
            circle = %throw.circle_type,
            raw_m = raw,
            distance = %throw,
            "throw measured"
        );
        self.scoreboard.dispatch(throw.scoreboard_text());
        Ok(throw)
    }

    /// Stored record, or a fresh shot put record when none exists.
    pub fn calibration(&self, slot: &str) -> CalibrationRecord {
        self.snapshot(slot).record
    }

    /// Stored record only.
    pub fn stored_calibration(&self, slot: &str) -> AppResult<CalibrationRecord> {
        self.state
            .lock()
            .calibrations
            .get(slot)
            .cloned()
            .ok_or_else(|| PolyfieldError::NotCalibrated(slot.to_string()))
    }

    /// Store a caller-edited record, keeping the existing timestamp.
    pub fn save_calibration(&self, slot: &str, mut record: CalibrationRecord) {
        let mut state = self.state.lock();
        if let Some(existing) = state.calibrations.get(slot) {
            record.timestamp = existing.timestamp;
        }
        record.device_id = slot.to_string();
        state.store_calibration(slot, record);
        if state.demo_mode {
            state.demo.reset_slot(slot);
        }
        debug!(slot, "calibration saved");
    }

    /// Switch the slot to `circle` and its standard radius.
    ///
    /// The station is kept; any edge verification is discarded since it was judged
    /// against a different radius.
    pub fn select_circle(&self, slot: &str, circle: CircleType) -> CalibrationRecord {
        let mut state = self.state.lock();
        let mut record = state
            .calibrations
            .get(slot)
            .cloned()
            .unwrap_or_else(|| CalibrationRecord::new(slot));
        record.selected_circle_type = circle;
        record.target_radius = circle.standard_radius();
        record.edge_verification_result = None;
        state.store_calibration(slot, record.clone());

        if state.demo_mode {
            state.demo.reset_slot(slot);
        }
        info!(slot, %circle, radius = record.target_radius, "circle selected");
        record
    }

    /// Drop the slot's record.
    pub fn reset_calibration(&self, slot: &str) {
        let mut state = self.state.lock();
        state.remove_calibration(slot);
        if state.demo_mode {
            state.demo.reset_slot(slot);
        }
        info!(slot, "calibration reset");
    }

    /// Dump the slot's record (and virtual station in demo mode) at debug level.
    pub fn log_calibration_summary(&self, slot: &str) {
        let state = self.state.lock();
        let Some(record) = state.calibrations.get(slot) else {
            debug!(slot, "no calibration stored");
            return;
        };

        debug!(
            slot,
            circle = %record.selected_circle_type,
            target_radius = record.target_radius,
            centre_set = record.is_centre_set,
            station_x = record.station_coordinates.x,
            station_y = record.station_coordinates.y,
            timestamp = ?record.timestamp,
            "calibration summary"
        );
        if let Some(edge) = &record.edge_verification_result {
            debug!(
                slot,
                measured_radius = edge.measured_radius,
                difference_mm = edge.difference_mm,
                tolerance_mm = edge.tolerance_applied_mm,
                pass = edge.in_tolerance,
                "edge verification"
            );
        }
        if state.demo_mode {
            if let Some(sim) = state.demo.state(slot) {
                debug!(
                    demo = true,
                    slot,
                    station_x = sim.station.x,
                    station_y = sim.station.y,
                    "virtual station"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::types::{CalibrationState, Point2D};
    use crate::config::PolyfieldConfig;
    use crate::state::EngineState;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use tokio::sync::Notify;

    /// Replays queued readings, failing once the queue is empty.
    struct ScriptedSource {
        readings: Mutex<VecDeque<AveragedReading>>,
    }

    impl ScriptedSource {
        fn new(readings: impl IntoIterator<Item = AveragedReading>) -> Arc<Self> {
            Arc::new(Self {
                readings: Mutex::new(readings.into_iter().collect()),
            })
        }
    }

    #[async_trait]
    impl ReadingSource for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn acquire(
            &self,
            _phase: MeasurementPhase,
            request: &ReadingRequest,
        ) -> AppResult<AveragedReading> {
            self.readings
                .lock()
                .pop_front()
                .ok_or_else(|| PolyfieldError::NotConnected(request.slot.clone()))
        }
    }

    /// Holds its reading until released, so tests can act mid-acquisition.
    struct GatedSource {
        reading: AveragedReading,
        entered: Notify,
        release: Notify,
    }

    impl GatedSource {
        fn new(reading: AveragedReading) -> Arc<Self> {
            Arc::new(Self {
                reading,
                entered: Notify::new(),
                release: Notify::new(),
            })
        }
    }

    #[async_trait]
    impl ReadingSource for GatedSource {
        fn name(&self) -> &'static str {
            "gated"
        }

        async fn acquire(
            &self,
            _phase: MeasurementPhase,
            _request: &ReadingRequest,
        ) -> AppResult<AveragedReading> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(self.reading)
        }
    }

    const STATION: Point2D = Point2D::new(-9.0, 4.5);

    fn engine(hardware: Arc<ScriptedSource>) -> (CalibrationEngine, SharedState) {
        let config = PolyfieldConfig::instant();
        let state = EngineState::shared(&config);
        let scoreboard = ScoreboardSink::new(state.clone(), config.scoreboard.slot.clone());
        let engine = CalibrationEngine::new(
            state.clone(),
            hardware,
            ScriptedSource::new([]),
            scoreboard,
        );
        (engine, state)
    }

    fn gated_engine(source: Arc<GatedSource>) -> CalibrationEngine {
        let config = PolyfieldConfig::instant();
        let state = EngineState::shared(&config);
        let scoreboard = ScoreboardSink::new(state.clone(), config.scoreboard.slot.clone());
        CalibrationEngine::new(state, source, ScriptedSource::new([]), scoreboard)
    }

    fn centre() -> AveragedReading {
        geometry::reading_towards(STATION, Point2D::default(), 90.5)
    }

    fn edge(radius: f64) -> AveragedReading {
        geometry::reading_towards(STATION, Point2D::polar(radius, 2.0), 89.7)
    }

    #[tokio::test]
    async fn test_centre_recovers_station() {
        let (engine, _) = engine(ScriptedSource::new([centre()]));
        let record = engine.set_circle_centre("circleA").await.unwrap();

        assert!(record.is_centre_set);
        assert!(record.timestamp.is_some());
        assert!((record.station_coordinates.x - STATION.x).abs() < 1e-9);
        assert!((record.station_coordinates.y - STATION.y).abs() < 1e-9);
        assert_eq!(engine.stored_calibration("circleA").unwrap(), record);
    }

    #[tokio::test]
    async fn test_failed_reading_leaves_record_untouched() {
        let (engine, _) = engine(ScriptedSource::new([centre()]));
        let before = engine.set_circle_centre("circleA").await.unwrap();

        assert!(engine.set_circle_centre("circleA").await.is_err());
        assert_eq!(engine.stored_calibration("circleA").unwrap(), before);
    }

    #[tokio::test]
    async fn test_edge_requires_centre() {
        let (engine, _) = engine(ScriptedSource::new([edge(1.0675)]));
        let err = engine.verify_circle_edge("circleA").await.unwrap_err();
        assert!(matches!(err, PolyfieldError::CentreNotSet(_)));
    }

    #[tokio::test]
    async fn test_full_workflow() {
        let target = CircleType::Shot.standard_radius();
        let landing = geometry::reading_towards(STATION, Point2D::polar(14.321 + target, 0.2), 90.2);
        let (engine, _) = engine(ScriptedSource::new([centre(), edge(target + 0.003), landing]));

        engine.set_circle_centre("circleA").await.unwrap();
        let record = engine.verify_circle_edge("circleA").await.unwrap();
        let edge = record.edge_verification_result.unwrap();
        assert!((edge.difference_mm - 3.0).abs() < 1e-6);
        assert_eq!(record.state(), CalibrationState::EdgeVerified);

        let throw = engine.measure_throw("circleA").await.unwrap();
        assert_eq!(throw.distance_m, 14.32);
        assert_eq!(throw.to_string(), "14.32 m");
    }

    #[tokio::test]
    async fn test_throw_blocked_by_failed_edge() {
        let target = CircleType::Shot.standard_radius();
        let (engine, _) = engine(ScriptedSource::new([centre(), edge(target + 0.007)]));

        let err = engine.measure_throw("circleA").await.unwrap_err();
        assert!(matches!(err, PolyfieldError::CentreNotSet(_)));

        engine.set_circle_centre("circleA").await.unwrap();
        let err = engine.measure_throw("circleA").await.unwrap_err();
        assert!(matches!(err, PolyfieldError::EdgeNotVerified(_)));

        let record = engine.verify_circle_edge("circleA").await.unwrap();
        assert!(!record.edge_in_tolerance());
        let err = engine.measure_throw("circleA").await.unwrap_err();
        assert!(matches!(err, PolyfieldError::EdgeNotVerified(_)));
    }

    #[tokio::test]
    async fn test_recentre_clears_edge() {
        let target = CircleType::Shot.standard_radius();
        let (engine, _) = engine(ScriptedSource::new([centre(), edge(target), centre()]));
        engine.set_circle_centre("circleA").await.unwrap();
        engine.verify_circle_edge("circleA").await.unwrap();

        let record = engine.set_circle_centre("circleA").await.unwrap();
        assert!(record.edge_verification_result.is_none());
    }

    #[tokio::test]
    async fn test_select_circle_and_reset() {
        let (engine, _) = engine(ScriptedSource::new([centre(), edge(1.0675)]));
        engine.set_circle_centre("circleA").await.unwrap();
        engine.verify_circle_edge("circleA").await.unwrap();

        let record = engine.select_circle("circleA", CircleType::JavelinArc);
        assert_eq!(record.target_radius, 8.0);
        assert!(record.is_centre_set);
        assert!(record.edge_verification_result.is_none());

        engine.reset_calibration("circleA");
        assert!(matches!(
            engine.stored_calibration("circleA").unwrap_err(),
            PolyfieldError::NotCalibrated(_)
        ));
        assert_eq!(engine.calibration("circleA").target_radius, 1.0675);
    }

    #[tokio::test]
    async fn test_save_keeps_timestamp() {
        let (engine, _) = engine(ScriptedSource::new([centre()]));
        let stored = engine.set_circle_centre("circleA").await.unwrap();

        let mut edited = CalibrationRecord::for_circle("circleA", CircleType::Discus);
        edited.timestamp = None;
        engine.save_calibration("circleA", edited);

        let saved = engine.stored_calibration("circleA").unwrap();
        assert_eq!(saved.selected_circle_type, CircleType::Discus);
        assert_eq!(saved.timestamp, stored.timestamp);
    }

    #[tokio::test]
    async fn test_demo_mode_uses_simulated_source_and_skips_edge_gate() {
        let (engine, state) = engine(ScriptedSource::new([]));
        let simulated = ScriptedSource::new([
            centre(),
            geometry::reading_towards(STATION, Point2D::new(17.0675, 0.0), 90.0),
        ]);
        let engine = CalibrationEngine::new(
            state.clone(),
            engine.hardware.clone(),
            simulated,
            engine.scoreboard.clone(),
        );
        state.lock().demo_mode = true;

        engine.set_circle_centre("circleA").await.unwrap();
        let throw = engine.measure_throw("circleA").await.unwrap();
        assert_eq!(throw.distance_m, 16.0);
    }

    #[tokio::test]
    async fn test_circle_change_during_centre_read_wins() {
        let source = GatedSource::new(centre());
        let engine = gated_engine(source.clone());

        let pending = tokio::spawn({
            let engine = engine.clone();
            async move { engine.set_circle_centre("circleA").await }
        });
        source.entered.notified().await;
        engine.select_circle("circleA", CircleType::Discus);
        source.release.notify_one();

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, PolyfieldError::CalibrationChanged(ref slot) if slot == "circleA"));
        assert!(err.can_retry());

        let record = engine.stored_calibration("circleA").unwrap();
        assert_eq!(record.selected_circle_type, CircleType::Discus);
        assert_eq!(record.target_radius, 1.25);
        assert!(!record.is_centre_set);
    }

    #[tokio::test]
    async fn test_reset_during_centre_read_stays_reset() {
        let source = GatedSource::new(centre());
        let engine = gated_engine(source.clone());
        engine.select_circle("circleA", CircleType::Hammer);

        let pending = tokio::spawn({
            let engine = engine.clone();
            async move { engine.set_circle_centre("circleA").await }
        });
        source.entered.notified().await;
        engine.reset_calibration("circleA");
        source.release.notify_one();

        assert!(matches!(
            pending.await.unwrap().unwrap_err(),
            PolyfieldError::CalibrationChanged(_)
        ));
        assert!(matches!(
            engine.stored_calibration("circleA").unwrap_err(),
            PolyfieldError::NotCalibrated(_)
        ));
    }

    #[tokio::test]
    async fn test_throw_discarded_when_circle_changes_mid_read() {
        let (engine, state) = engine(ScriptedSource::new([centre()]));
        engine.set_circle_centre("circleA").await.unwrap();
        state.lock().demo_mode = true;

        let landing = geometry::reading_towards(STATION, Point2D::new(17.0675, 0.0), 90.0);
        let source = GatedSource::new(landing);
        let engine = CalibrationEngine::new(
            state.clone(),
            engine.hardware.clone(),
            source.clone(),
            engine.scoreboard.clone(),
        );

        let pending = tokio::spawn({
            let engine = engine.clone();
            async move { engine.measure_throw("circleA").await }
        });
        source.entered.notified().await;
        engine.select_circle("circleA", CircleType::JavelinArc);
        source.release.notify_one();

        assert!(matches!(
            pending.await.unwrap().unwrap_err(),
            PolyfieldError::CalibrationChanged(_)
        ));
    }
}
