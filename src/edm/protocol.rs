//! EDM dual-read protocol.
//!
//! A single read writes the three-byte trigger and waits for one response line. A
//! reliable reading takes two single reads a short pause apart and only accepts them
//! when their slope distances agree within the configured tolerance.

use super::{parse_response, AveragedReading, ParsedReading};
use crate::config::EdmConfig;
use crate::error::{AppResult, PolyfieldError};
use crate::hardware::connection::{ConnectionKind, DeviceChannel};
use std::cmp::Ordering;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tracing::{debug, instrument, warn};

/// Trigger command: DC1 followed by CR LF.
pub const EDM_READ_COMMAND: [u8; 3] = [0x11, 0x0d, 0x0a];

/// Reading protocol parameters.
#[derive(Debug, Clone)]
pub struct EdmProtocol {
    read_timeout: Duration,
    inter_read_delay: Duration,
    tolerance_mm: f64,
}

impl Default for EdmProtocol {
    fn default() -> Self {
        Self::from_config(&EdmConfig::default())
    }
}

impl EdmProtocol {
    /// Build from the `[edm]` configuration section.
    pub fn from_config(config: &EdmConfig) -> Self {
        Self {
            read_timeout: config.read_timeout(),
            inter_read_delay: config.inter_read_delay(),
            tolerance_mm: config.consistency_tolerance_mm,
        }
    }

    /// Trigger one read and parse the response.
    ///
    /// Network channels get a read deadline; serial reads block until a line arrives
    /// or the slot is disconnected. The port lock is held for the whole write/read
    /// exchange so concurrent callers on the same slot cannot interleave triggers.
    #[instrument(skip(self, channel), fields(slot = %channel.slot))]
    pub async fn trigger_single_read(&self, channel: &DeviceChannel) -> AppResult<ParsedReading> {
        channel.until_closed(self.exchange(channel)).await
    }

    async fn exchange(&self, channel: &DeviceChannel) -> AppResult<ParsedReading> {
        let mut port = channel.port.lock().await;

        port.get_mut().write_all(&EDM_READ_COMMAND).await?;
        port.get_mut().flush().await?;

        let mut line = String::new();
        let read = match channel.kind {
            ConnectionKind::Network => {
                match tokio::time::timeout(self.read_timeout, port.read_line(&mut line)).await {
                    Ok(result) => result?,
                    Err(_) => {
                        return Err(PolyfieldError::ReadTimeout {
                            slot: channel.slot.clone(),
                            timeout: self.read_timeout,
                        })
                    }
                }
            }
            ConnectionKind::Serial => port.read_line(&mut line).await?,
        };

        if read == 0 {
            return Err(PolyfieldError::UnexpectedEof(channel.slot.clone()));
        }

        debug!(raw = %line.trim(), "EDM response");
        parse_response(&line)
    }

    /// Take two reads and reconcile them.
    pub async fn reliable_reading(&self, channel: &DeviceChannel) -> AppResult<AveragedReading> {
        let first = self.trigger_single_read(channel).await?;
        if !self.inter_read_delay.is_zero() {
            tokio::time::sleep(self.inter_read_delay).await;
        }
        let second = self.trigger_single_read(channel).await?;

        reconcile_pair(&first, &second, self.tolerance_mm).inspect_err(|e| {
            warn!(slot = %channel.slot, error = %e, "rejected reading pair");
        })
    }
}

/// Accept a pair when the slope distances differ by at most `tolerance_mm`, and
/// average every field.
pub fn reconcile_pair(
    first: &ParsedReading,
    second: &ParsedReading,
    tolerance_mm: f64,
) -> AppResult<AveragedReading> {
    let difference = (first.slope_distance_mm - second.slope_distance_mm).abs();
    // NaN on either side compares as None and is rejected.
    if !matches!(
        difference.partial_cmp(&tolerance_mm),
        Some(Ordering::Less | Ordering::Equal)
    ) {
        return Err(PolyfieldError::InconsistentReading {
            first_mm: first.slope_distance_mm,
            second_mm: second.slope_distance_mm,
        });
    }
    Ok(AveragedReading::mean_of(first, second))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::hardware::io::wrap_shared;
    use tokio::io::{AsyncReadExt, DuplexStream};
    use tokio::sync::watch;

    fn reading(sd: f64, vaz: f64, har: f64) -> ParsedReading {
        ParsedReading {
            slope_distance_mm: sd,
            vertical_angle_deg: vaz,
            horizontal_angle_deg: har,
        }
    }

    fn channel(kind: ConnectionKind) -> (DuplexStream, DeviceChannel, watch::Sender<bool>) {
        let (host, device) = tokio::io::duplex(256);
        let (close, closed) = watch::channel(false);
        let channel = DeviceChannel::new("circleA", kind, wrap_shared(Box::new(device)), closed);
        (host, channel, close)
    }

    fn fast_protocol() -> EdmProtocol {
        EdmProtocol {
            read_timeout: Duration::from_millis(100),
            inter_read_delay: Duration::ZERO,
            tolerance_mm: 3.0,
        }
    }

    #[test]
    fn test_reconcile_within_tolerance() {
        let avg = reconcile_pair(
            &reading(10000.0, 90.0, 10.0),
            &reading(10003.0, 91.0, 12.0),
            3.0,
        )
        .unwrap();
        assert_eq!(avg.slope_distance_mm, 10001.5);
        assert_eq!(avg.vertical_angle_deg, 90.5);
        assert_eq!(avg.horizontal_angle_deg, 11.0);
    }

    #[test]
    fn test_reconcile_rejects_outside_tolerance() {
        let err = reconcile_pair(
            &reading(10000.0, 90.0, 10.0),
            &reading(10004.0, 90.0, 10.0),
            3.0,
        )
        .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Consistency);
        assert_eq!(
            err.to_string(),
            "Readings inconsistent. R1(SD): 10000mm, R2(SD): 10004mm"
        );
    }

    #[test]
    fn test_reconcile_rejects_nan_tolerance() {
        let pair = (reading(10000.0, 90.0, 10.0), reading(10100.0, 90.0, 10.0));
        assert!(reconcile_pair(&pair.0, &pair.1, f64::NAN).is_err());
    }

    #[tokio::test]
    async fn test_single_read_writes_trigger_and_parses() {
        let (mut host, channel, _close) = channel(ConnectionKind::Serial);
        let protocol = fast_protocol();

        let device = tokio::spawn(async move {
            let mut cmd = [0u8; 3];
            host.read_exact(&mut cmd).await.unwrap();
            host.write_all(b"15234 0883015 1801530 0\r\n").await.unwrap();
            (cmd, host)
        });

        let parsed = protocol.trigger_single_read(&channel).await.unwrap();
        let (cmd, _host) = device.await.unwrap();

        assert_eq!(cmd, EDM_READ_COMMAND);
        assert_eq!(parsed.slope_distance_mm, 15234.0);
    }

    #[tokio::test]
    async fn test_network_read_times_out() {
        let (_host, channel, _close) = channel(ConnectionKind::Network);
        let err = fast_protocol()
            .trigger_single_read(&channel)
            .await
            .unwrap_err();
        assert!(matches!(err, PolyfieldError::ReadTimeout { ref slot, .. } if slot == "circleA"));
    }

    #[tokio::test]
    async fn test_closed_channel_fails_write() {
        let (host, channel, _close) = channel(ConnectionKind::Serial);
        drop(host);
        let err = fast_protocol()
            .trigger_single_read(&channel)
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Io);
    }

    #[tokio::test]
    async fn test_hangup_after_trigger_is_eof() {
        let (mut host, channel, _close) = channel(ConnectionKind::Serial);
        let device = tokio::spawn(async move {
            let mut cmd = [0u8; 3];
            host.read_exact(&mut cmd).await.unwrap();
        });

        let err = fast_protocol()
            .trigger_single_read(&channel)
            .await
            .unwrap_err();
        device.await.unwrap();
        assert!(matches!(err, PolyfieldError::UnexpectedEof(ref slot) if slot == "circleA"));
    }

    #[tokio::test]
    async fn test_reliable_reading_averages_pair() {
        let (mut host, channel, _close) = channel(ConnectionKind::Network);
        let device = tokio::spawn(async move {
            let mut cmd = [0u8; 3];
            for line in ["10000 0900000 0000000 0\n", "10002 0900000 0000000 0\n"] {
                host.read_exact(&mut cmd).await.unwrap();
                host.write_all(line.as_bytes()).await.unwrap();
            }
            host
        });

        let avg = fast_protocol().reliable_reading(&channel).await.unwrap();
        let _host = device.await.unwrap();
        assert_eq!(avg.slope_distance_mm, 10001.0);
        assert_eq!(avg.vertical_angle_deg, 90.0);
    }

    #[tokio::test]
    async fn test_reliable_reading_rejects_inconsistent_pair() {
        let (mut host, channel, _close) = channel(ConnectionKind::Serial);
        let device = tokio::spawn(async move {
            let mut cmd = [0u8; 3];
            for line in ["10000 0900000 0000000 0\n", "10004 0900000 0000000 0\n"] {
                host.read_exact(&mut cmd).await.unwrap();
                host.write_all(line.as_bytes()).await.unwrap();
            }
            host
        });

        let err = fast_protocol().reliable_reading(&channel).await.unwrap_err();
        let _host = device.await.unwrap();
        assert!(matches!(err, PolyfieldError::InconsistentReading { .. }));
    }
}
