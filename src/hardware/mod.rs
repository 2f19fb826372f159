//! Hardware links.
//!
//! [`io`] erases serial and TCP channels behind one stream type; [`connection`] keeps
//! the slot table that maps device names to live channels.

pub mod connection;
pub mod io;

pub use connection::{ConnectionInfo, ConnectionKind, ConnectionManager, DeviceChannel};
pub use io::{DeviceIO, DynStream, SharedPort};
