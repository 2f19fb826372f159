//! Integration tests for the live calibration workflow over TCP.
//!
//! The fake instrument sits at a station 10 m from the centre on the -X axis, so
//! every sighting in these tests is along the X axis with whole-degree angles.

mod common;

use common::{edm_line, live_engine, spawn_fake_edm, spawn_fake_scoreboard, spawn_silent_edm};
use polyfield::calibration::{CalibrationState, CircleType};
use polyfield::config::PolyfieldConfig;
use polyfield::edm::EDM_READ_COMMAND;
use polyfield::hardware::ConnectionKind;
use polyfield::{ErrorCategory, Polyfield, PolyfieldError};
use std::time::Duration;

const RADIUS: f64 = 1.0675;

fn pair(line: String) -> [String; 2] {
    [line.clone(), line]
}

#[tokio::test]
async fn test_full_live_workflow_with_scoreboard() {
    // Centre: 10 m along +X. Edge: 8.9305 m (radius 1.0695). Throw: 26.5675 m.
    let script: Vec<String> = [
        pair(edm_line(10000.0, 90, 0)),
        pair(edm_line(8930.5, 90, 0)),
        pair(edm_line(26567.5, 90, 0)),
    ]
    .into_iter()
    .flatten()
    .collect();
    let (edm_port, edm) = spawn_fake_edm(script).await;
    let (board_port, mut board) = spawn_fake_scoreboard().await;

    let engine = live_engine();
    let message = engine
        .connect_network("circleA", "127.0.0.1", edm_port)
        .await
        .unwrap();
    assert_eq!(message, format!("Connected to circleA at 127.0.0.1:{edm_port}"));
    engine
        .connect_network("scoreboard", "127.0.0.1", board_port)
        .await
        .unwrap();
    assert_eq!(board.recv().await.unwrap(), "88:88");

    let record = engine.set_circle_centre("circleA").await.unwrap();
    assert!((record.station_coordinates.x + 10.0).abs() < 1e-9);
    assert!(record.station_coordinates.y.abs() < 1e-9);

    let record = engine.verify_circle_edge("circleA").await.unwrap();
    let edge = record.edge_verification_result.unwrap();
    assert!((edge.measured_radius - (RADIUS + 0.002)).abs() < 1e-9);
    assert!((edge.difference_mm - 2.0).abs() < 1e-6);
    assert!(edge.in_tolerance);
    assert_eq!(record.state(), CalibrationState::EdgeVerified);

    let throw = engine.measure_throw("circleA").await.unwrap();
    assert_eq!(throw.to_string(), "15.50 m");
    assert_eq!(board.recv().await.unwrap(), "15.50");

    let triggers = edm.await.unwrap();
    assert_eq!(triggers.len(), 6);
    assert!(triggers.iter().all(|cmd| *cmd == EDM_READ_COMMAND));

    engine.shutdown();
    assert!(engine.connected_slots().is_empty());
}

#[tokio::test]
async fn test_inconsistent_pair_leaves_record_untouched() {
    let script = vec![
        edm_line(10000.0, 90, 0),
        edm_line(10000.0, 90, 0),
        edm_line(10000.0, 90, 0),
        edm_line(10004.0, 90, 0),
    ];
    let (port, _edm) = spawn_fake_edm(script).await;

    let engine = live_engine();
    engine
        .connect_network("circleA", "127.0.0.1", port)
        .await
        .unwrap();

    let before = engine.set_circle_centre("circleA").await.unwrap();
    let err = engine.set_circle_centre("circleA").await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Consistency);
    assert_eq!(
        err.to_string(),
        "Readings inconsistent. R1(SD): 10000mm, R2(SD): 10004mm"
    );
    assert_eq!(engine.stored_calibration("circleA").unwrap(), before);
}

#[tokio::test]
async fn test_throw_requires_verified_edge_in_live_mode() {
    // Edge at radius 1.0745: 7 mm out.
    let script: Vec<String> = [pair(edm_line(10000.0, 90, 0)), pair(edm_line(8925.5, 90, 0))]
        .into_iter()
        .flatten()
        .collect();
    let (port, _edm) = spawn_fake_edm(script).await;

    let engine = live_engine();
    engine
        .connect_network("circleA", "127.0.0.1", port)
        .await
        .unwrap();

    assert!(matches!(
        engine.measure_throw("circleA").await.unwrap_err(),
        PolyfieldError::CentreNotSet(_)
    ));

    engine.set_circle_centre("circleA").await.unwrap();
    assert!(matches!(
        engine.measure_throw("circleA").await.unwrap_err(),
        PolyfieldError::EdgeNotVerified(_)
    ));

    let record = engine.verify_circle_edge("circleA").await.unwrap();
    let edge = record.edge_verification_result.unwrap();
    assert!((edge.difference_mm - 7.0).abs() < 1e-6);
    assert!(!edge.in_tolerance);

    let err = engine.measure_throw("circleA").await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Precondition);
}

#[tokio::test]
async fn test_javelin_tolerance_applies() {
    // Javelin arc radius 8 m; edge sighted at 8.007 m.
    let script: Vec<String> = [pair(edm_line(10000.0, 90, 0)), pair(edm_line(1993.0, 90, 0))]
        .into_iter()
        .flatten()
        .collect();
    let (port, _edm) = spawn_fake_edm(script).await;

    let engine = live_engine();
    engine
        .connect_network("javelin", "127.0.0.1", port)
        .await
        .unwrap();
    engine.select_circle("javelin", CircleType::JavelinArc);

    engine.set_circle_centre("javelin").await.unwrap();
    let record = engine.verify_circle_edge("javelin").await.unwrap();
    let edge = record.edge_verification_result.unwrap();
    assert!((edge.measured_radius - 8.007).abs() < 1e-9);
    assert_eq!(edge.tolerance_applied_mm, 10.0);
    assert!(edge.in_tolerance);
}

#[tokio::test]
async fn test_network_read_deadline() {
    let mut config = PolyfieldConfig::instant();
    config.edm.read_timeout_ms = 200;
    let engine = Polyfield::new(config);

    let (port, _edm) = spawn_silent_edm().await;
    engine
        .connect_network("circleA", "127.0.0.1", port)
        .await
        .unwrap();

    let started = std::time::Instant::now();
    let err = engine.get_reliable_reading("circleA").await.unwrap_err();
    assert!(matches!(err, PolyfieldError::ReadTimeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(err.can_retry());
}

#[tokio::test]
async fn test_malformed_response_surfaces_parse_error() {
    let (port, _edm) = spawn_fake_edm(vec!["15234 0883015\r\n".to_string()]).await;

    let engine = live_engine();
    engine
        .connect_network("circleA", "127.0.0.1", port)
        .await
        .unwrap();

    let err = engine.trigger_single_read("circleA").await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Parse);
}

#[tokio::test]
async fn test_unreachable_instrument() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let engine = live_engine();
    let err = engine
        .connect_network("circleA", "127.0.0.1", port)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Connection);
    assert!(engine.connection_info("circleA").is_none());

    assert!(matches!(
        engine.disconnect("circleA").unwrap_err(),
        PolyfieldError::SlotNotFound(_)
    ));
}

#[tokio::test]
async fn test_disconnect_releases_silent_serial_instrument() {
    use tokio::io::AsyncReadExt;

    let engine = live_engine();
    let (mut host, device) = tokio::io::duplex(64);
    engine.connect_stream("circleA", ConnectionKind::Serial, "bench", Box::new(device));

    let pending = tokio::spawn({
        let engine = engine.clone();
        async move { engine.get_reliable_reading("circleA").await }
    });

    // Wait until the trigger is out, so the read is in flight.
    let mut cmd = [0u8; 3];
    host.read_exact(&mut cmd).await.unwrap();
    assert_eq!(cmd, EDM_READ_COMMAND);

    engine.disconnect("circleA").unwrap();

    let result = tokio::time::timeout(Duration::from_millis(500), pending)
        .await
        .expect("reading still blocked after disconnect")
        .unwrap();
    assert!(matches!(result.unwrap_err(), PolyfieldError::NotConnected(_)));

    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_millis(500), host.read(&mut buf))
        .await
        .expect("instrument side never saw the port close")
        .unwrap();
    assert_eq!(read, 0);
}
