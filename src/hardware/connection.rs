//! Device slot table.
//!
//! Each named slot ("circleA", "wind", "scoreboard", ...) holds at most one live
//! channel. Connecting a slot that is already live closes the old channel first, and a
//! slot whose connect fails ends up empty.
//!
//! Slot names are free-form. Two of them are special: the configured wind slot gets a
//! background listener on connect, and the configured scoreboard slot gets the
//! sentinel text written to it once.

use super::io::{self, wrap_shared, DynStream, SharedPort};
use crate::config::PolyfieldConfig;
use crate::error::{AppResult, PolyfieldError};
use crate::scoreboard::ScoreboardSink;
use crate::state::SharedState;
use crate::wind;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Link type behind a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// Serial port (no read deadline)
    Serial,
    /// TCP socket (reads carry a deadline)
    Network,
}

impl std::fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionKind::Serial => write!(f, "serial"),
            ConnectionKind::Network => write!(f, "network"),
        }
    }
}

/// Background task bound to a slot, stopped when the slot closes.
pub(crate) struct ListenerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Spawn `body`, handing it the receiving end of the shutdown signal.
    pub(crate) fn spawn<F, Fut>(body: F) -> Self
    where
        F: FnOnce(oneshot::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(body(shutdown_rx));
        Self {
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    pub(crate) fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.abort();
    }
}

/// A live slot in the table.
pub(crate) struct DeviceHandle {
    kind: ConnectionKind,
    address: String,
    port: SharedPort,
    listener: Option<ListenerHandle>,
    closed: watch::Sender<bool>,
}

impl DeviceHandle {
    pub(crate) fn channel(&self, slot: &str) -> DeviceChannel {
        DeviceChannel::new(slot, self.kind, self.port.clone(), self.closed.subscribe())
    }

    fn info(&self, slot: &str) -> ConnectionInfo {
        ConnectionInfo {
            slot: slot.to_string(),
            kind: self.kind,
            address: self.address.clone(),
        }
    }

    /// Stop the listener and abandon in-flight exchanges on every channel cloned from
    /// this handle. The stream itself is dropped with the last port clone, which those
    /// exchanges release as they unwind.
    pub(crate) fn close(mut self) {
        self.closed.send_replace(true);
        if let Some(listener) = self.listener.take() {
            listener.stop();
        }
    }
}

/// A borrowed view of a live slot, cloned out of the table so I/O can proceed without
/// holding the state lock.
#[derive(Clone)]
pub struct DeviceChannel {
    /// Slot key
    pub slot: String,
    /// Link type
    pub kind: ConnectionKind,
    /// Shared channel
    pub port: SharedPort,
    closed: watch::Receiver<bool>,
}

impl DeviceChannel {
    pub(crate) fn new(
        slot: &str,
        kind: ConnectionKind,
        port: SharedPort,
        closed: watch::Receiver<bool>,
    ) -> Self {
        Self {
            slot: slot.to_string(),
            kind,
            port,
            closed,
        }
    }

    /// Whether the owning slot has been disconnected or replaced.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow() || self.closed.has_changed().is_err()
    }

    /// Run `exchange` unless the slot closes first, in which case it is dropped and
    /// `NotConnected` is returned.
    pub async fn until_closed<T, F>(&self, exchange: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        let mut closed = self.closed.clone();
        tokio::select! {
            biased;
            _ = async move {
                // A dropped sender also means the handle is gone.
                let _ = closed.wait_for(|closed| *closed).await;
            } => {
                debug!(slot = %self.slot, "exchange abandoned, slot closed");
                Err(PolyfieldError::NotConnected(self.slot.clone()))
            }
            result = exchange => result,
        }
    }
}

impl std::fmt::Debug for DeviceChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceChannel")
            .field("slot", &self.slot)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Summary of a live slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    /// Slot key
    pub slot: String,
    /// Link type
    pub kind: ConnectionKind,
    /// Port name or `host:port`
    pub address: String,
}

/// Opens, replaces and closes slot channels.
#[derive(Clone)]
pub struct ConnectionManager {
    state: SharedState,
    config: Arc<PolyfieldConfig>,
    scoreboard: ScoreboardSink,
}

impl ConnectionManager {
    pub(crate) fn new(
        state: SharedState,
        config: Arc<PolyfieldConfig>,
        scoreboard: ScoreboardSink,
    ) -> Self {
        Self {
            state,
            config,
            scoreboard,
        }
    }

    /// Open `port_name` at the configured baud rate and bind it to `slot`.
    #[cfg(feature = "serial")]
    pub async fn connect_serial(&self, slot: &str, port_name: &str) -> AppResult<String> {
        self.release(slot);

        let stream = io::open_serial_async(port_name, self.config.connection.baud_rate)
            .await
            .map_err(|e| PolyfieldError::Connection {
                slot: slot.to_string(),
                address: port_name.to_string(),
                message: e.to_string(),
            })?;

        self.attach(slot, ConnectionKind::Serial, port_name, Box::new(stream));
        Ok(format!("Connected to {slot} on {port_name}"))
    }

    /// Serial support was compiled out.
    #[cfg(not(feature = "serial"))]
    pub async fn connect_serial(&self, slot: &str, port_name: &str) -> AppResult<String> {
        warn!(slot, port = port_name, "serial connect requested without serial support");
        Err(PolyfieldError::SerialFeatureDisabled)
    }

    /// Dial `host:port` under the configured timeout and bind it to `slot`.
    pub async fn connect_network(&self, slot: &str, host: &str, port: u16) -> AppResult<String> {
        self.release(slot);

        let address = io::join_host_port(host, port);
        let stream = io::dial_tcp(&address, self.config.connection.dial_timeout())
            .await
            .map_err(|e| PolyfieldError::Connection {
                slot: slot.to_string(),
                address: address.clone(),
                message: e.to_string(),
            })?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!(slot, error = %e, "could not disable Nagle");
        }

        self.attach(slot, ConnectionKind::Network, &address, Box::new(stream));
        Ok(format!("Connected to {slot} at {address}"))
    }

    /// Bind an already-open channel to `slot`.
    ///
    /// # Panics
    ///
    /// Must run inside a Tokio runtime when `slot` is the wind slot, since its
    /// listener is spawned here.
    pub fn connect_stream(
        &self,
        slot: &str,
        kind: ConnectionKind,
        address: &str,
        stream: DynStream,
    ) -> String {
        self.release(slot);
        self.attach(slot, kind, address, stream);
        format!("Connected to {slot} at {address}")
    }

    /// Close and forget `slot`.
    pub fn disconnect(&self, slot: &str) -> AppResult<String> {
        let handle = self
            .state
            .lock()
            .devices
            .remove(slot)
            .ok_or_else(|| PolyfieldError::SlotNotFound(slot.to_string()))?;
        handle.close();
        info!(slot, "disconnected");
        Ok(format!("Disconnected {slot}"))
    }

    /// Channel for `slot`, or `NotConnected`.
    pub fn channel(&self, slot: &str) -> AppResult<DeviceChannel> {
        self.state
            .lock()
            .devices
            .get(slot)
            .map(|handle| handle.channel(slot))
            .ok_or_else(|| PolyfieldError::NotConnected(slot.to_string()))
    }

    /// Whether `slot` has a live channel.
    pub fn is_connected(&self, slot: &str) -> bool {
        self.state.lock().devices.contains_key(slot)
    }

    /// Live slots, sorted by key.
    pub fn connection_info(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> = self
            .state
            .lock()
            .devices
            .iter()
            .map(|(slot, handle)| handle.info(slot))
            .collect();
        infos.sort_by(|a, b| a.slot.cmp(&b.slot));
        infos
    }

    /// Close every slot.
    pub fn shutdown(&self) {
        let handles: Vec<(String, DeviceHandle)> = self.state.lock().devices.drain().collect();
        for (slot, handle) in handles {
            debug!(slot = %slot, "closing on shutdown");
            handle.close();
        }
    }

    /// Remove and close whatever `slot` currently holds.
    fn release(&self, slot: &str) {
        let previous = self.state.lock().devices.remove(slot);
        if let Some(handle) = previous {
            info!(slot, address = %handle.address, "closing existing connection");
            handle.close();
        }
    }

    fn attach(&self, slot: &str, kind: ConnectionKind, address: &str, stream: DynStream) {
        let port = wrap_shared(stream);

        let listener = (slot == self.config.wind.slot)
            .then(|| wind::spawn_listener(slot.to_string(), port.clone(), self.state.clone()));

        let (closed, _) = watch::channel(false);
        let handle = DeviceHandle {
            kind,
            address: address.to_string(),
            port,
            listener,
            closed,
        };

        // A concurrent connect on the same slot may have landed while we were dialing.
        let raced = self.state.lock().devices.insert(slot.to_string(), handle);
        if let Some(old) = raced {
            warn!(slot, "replaced a connection opened concurrently");
            old.close();
        }

        info!(slot, %kind, address, "connected");

        if slot == self.config.scoreboard.slot {
            self.scoreboard
                .dispatch(self.config.scoreboard.sentinel.clone());
        }
    }
}
