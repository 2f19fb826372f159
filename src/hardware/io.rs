//! Byte-channel abstractions shared by every device slot.
//!
//! Serial lines and TCP sockets are erased behind one trait alias so that the reading
//! protocol, the wind listener and the scoreboard sink never care which link a slot
//! uses.
//!
//! # Types
//!
//! - [`DeviceIO`]: Trait alias combining AsyncRead + AsyncWrite
//! - [`DynStream`]: Type-erased boxed channel
//! - [`SharedPort`]: Thread-safe shared channel with buffered reading
//!
//! # Utilities
//!
//! - [`open_serial_async`]: Open a serial port with spawn_blocking
//! - [`dial_tcp`]: Connect a TCP socket under a dial timeout

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Trait alias for async device I/O.
///
/// Any type implementing `AsyncRead + AsyncWrite + Unpin + Send` can back a slot:
/// - `tokio_serial::SerialStream` (RS-232 / USB-serial instruments)
/// - `tokio::net::TcpStream` (serial-to-Ethernet bridges)
/// - `tokio::io::DuplexStream` (testing)
pub trait DeviceIO: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> DeviceIO for T {}

/// Type-erased boxed device channel.
pub type DynStream = Box<dyn DeviceIO>;

/// Thread-safe shared channel with buffered reading.
///
/// All instrument grammars handled here are newline-terminated, so the reader side is
/// always wrapped in a `BufReader` for `read_line()`. Writes go through `get_mut()`.
pub type SharedPort = Arc<Mutex<BufReader<DynStream>>>;

/// Create a SharedPort from a type-erased channel.
pub fn wrap_shared(port: DynStream) -> SharedPort {
    Arc::new(Mutex::new(BufReader::new(port)))
}

/// Open a serial port asynchronously using spawn_blocking.
///
/// Standard settings are applied: 8N1, no flow control.
#[cfg(feature = "serial")]
pub async fn open_serial_async(
    port_path: &str,
    baud_rate: u32,
) -> std::io::Result<tokio_serial::SerialStream> {
    use tokio::task::spawn_blocking;
    use tokio_serial::SerialPortBuilderExt;

    let port_path_owned = port_path.to_string();

    spawn_blocking(move || {
        tokio_serial::new(&port_path_owned, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(std::io::Error::from)
    })
    .await
    .map_err(|e| std::io::Error::other(format!("serial open task failed: {e}")))?
}

/// Connect to `address` (`host:port`), failing with `TimedOut` after `timeout`.
pub async fn dial_tcp(address: &str, timeout: Duration) -> std::io::Result<TcpStream> {
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("dial {address} timed out after {timeout:?}"),
        )),
    }
}

/// Join host and port the way `net.JoinHostPort` would, bracketing IPv6 literals.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
