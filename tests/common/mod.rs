//! Loopback fakes for the instruments.

#![allow(dead_code)]

use polyfield::config::PolyfieldConfig;
use polyfield::Polyfield;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Engine with no simulated delays.
pub fn live_engine() -> Polyfield {
    Polyfield::new(PolyfieldConfig::instant())
}

/// EDM that answers each trigger with the next scripted line, then hangs up.
///
/// The join handle yields every trigger command it received.
pub async fn spawn_fake_edm(lines: Vec<String>) -> (u16, JoinHandle<Vec<[u8; 3]>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut triggers = Vec::new();
        for line in lines {
            let mut cmd = [0u8; 3];
            if socket.read_exact(&mut cmd).await.is_err() {
                break;
            }
            triggers.push(cmd);
            socket.write_all(line.as_bytes()).await.unwrap();
        }
        triggers
    });

    (port, handle)
}

/// EDM that accepts the connection and never answers.
pub async fn spawn_silent_edm() -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut sink = Vec::new();
        let _ = socket.read_to_end(&mut sink).await;
    });

    (port, handle)
}

/// Scoreboard that forwards every received line.
pub async fn spawn_fake_scoreboard() -> (u16, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(socket).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    (port, rx)
}

/// Wind gauge that streams `lines` once connected and keeps the socket open.
pub async fn spawn_fake_wind_gauge(lines: Vec<String>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        for line in lines {
            socket.write_all(line.as_bytes()).await.unwrap();
        }
        let mut sink = Vec::new();
        let _ = socket.read_to_end(&mut sink).await;
    });

    port
}

/// One EDM response line with whole-degree angles.
pub fn edm_line(slope_distance_mm: f64, vaz_deg: u32, har_deg: u32) -> String {
    format!("{slope_distance_mm} {vaz_deg:03}0000 {har_deg:03}0000 0\r\n")
}
