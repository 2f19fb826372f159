//! Scoreboard output.
//!
//! The scoreboard is a write-only display on its own slot. Each value goes out as one
//! CRLF-terminated line. Measurement paths never wait on it: they hand the value to
//! [`ScoreboardSink::dispatch`] and carry on, and failures only reach the log.

use crate::error::{AppResult, PolyfieldError};
use crate::state::SharedState;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Writes text to the scoreboard slot.
#[derive(Clone)]
pub struct ScoreboardSink {
    state: SharedState,
    slot: String,
}

impl ScoreboardSink {
    pub(crate) fn new(state: SharedState, slot: String) -> Self {
        Self { state, slot }
    }

    /// Slot key this sink writes to.
    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Write `value` followed by CRLF.
    ///
    /// In demo mode nothing is written; the value is logged instead.
    pub async fn send(&self, value: &str) -> AppResult<()> {
        let channel = {
            let state = self.state.lock();
            if state.demo_mode {
                info!(slot = %self.slot, value, "demo mode: would send to scoreboard");
                return Ok(());
            }
            state
                .devices
                .get(&self.slot)
                .map(|handle| handle.channel(&self.slot))
                .ok_or_else(|| PolyfieldError::NotConnected(self.slot.clone()))?
        };

        channel
            .until_closed(async {
                let mut port = channel.port.lock().await;
                let writer = port.get_mut();
                writer.write_all(format!("{value}\r\n").as_bytes()).await?;
                writer.flush().await?;
                Ok(())
            })
            .await?;
        debug!(slot = %self.slot, value, "sent to scoreboard");
        Ok(())
    }

    /// Send `value` on a background task; failures are logged.
    ///
    /// Outside a Tokio runtime there is nothing to run the task on, so the value is
    /// dropped with a warning.
    pub fn dispatch(&self, value: impl Into<String>) {
        let value = value.into();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(slot = %self.slot, value = %value, "no async runtime, scoreboard update dropped");
            return;
        };
        let sink = self.clone();
        runtime.spawn(async move {
            if let Err(e) = sink.send(&value).await {
                warn!(slot = %sink.slot, value = %value, error = %e, "scoreboard update failed");
            }
        });
    }
}
