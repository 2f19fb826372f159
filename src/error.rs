//! Custom error types for the application.
//!
//! This module defines the primary error type, `PolyfieldError`, for the whole engine.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! everything that can go wrong between an operator pressing "measure" and a distance
//! appearing on the scoreboard.
//!
//! ## Error Hierarchy
//!
//! Every variant belongs to exactly one [`ErrorCategory`]:
//!
//! - **`Connection`**: opening a serial port or dialing a TCP socket failed, or the
//!   requested slot has no live connection.
//! - **`Io`**: a write or read on a live channel failed, hit EOF, or ran past its deadline.
//! - **`Parse`**: the instrument answered with something that does not match its
//!   response grammar.
//! - **`Consistency`**: the two halves of a dual read disagree on slope distance.
//! - **`Precondition`**: the calibration workflow was driven out of order.
//! - **`NotFound`**: the slot, record or wind window holds nothing to operate on.
//! - **`Configuration`**: configuration could not be loaded or failed validation.
//!
//! Errors are always returned to the immediate caller. Nothing here retries.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, PolyfieldError>;

/// Coarse classification of a [`PolyfieldError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Open/dial failure or missing connection.
    Connection,
    /// Read/write failure or read timeout.
    Io,
    /// Malformed instrument response.
    Parse,
    /// Dual-read mismatch.
    Consistency,
    /// Workflow step attempted out of order.
    Precondition,
    /// Nothing stored for the requested key.
    NotFound,
    /// Configuration loading or validation.
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorCategory::Connection => "connection",
            ErrorCategory::Io => "io",
            ErrorCategory::Parse => "parse",
            ErrorCategory::Consistency => "consistency",
            ErrorCategory::Precondition => "precondition",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Configuration => "configuration",
        };
        write!(f, "{}", label)
    }
}

/// Primary error type for the device engine.
#[derive(Error, Debug)]
pub enum PolyfieldError {
    /// Opening a serial port or dialing a socket failed.
    #[error("Could not connect {slot} to {address}: {message}")]
    Connection {
        /// Device slot being connected.
        slot: String,
        /// Port name or `host:port`.
        address: String,
        /// Underlying failure.
        message: String,
    },

    /// The slot has no live connection.
    #[error("{0} not connected")]
    NotConnected(String),

    /// Serial support was compiled out.
    #[error("Serial support not enabled. Rebuild with --features serial")]
    SerialFeatureDisabled,

    /// Standard I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A network read did not complete before its deadline.
    #[error("No response from {slot} within {timeout:?}")]
    ReadTimeout {
        /// Device slot being read.
        slot: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },

    /// The channel closed before a full line arrived.
    #[error("Unexpected EOF from {0}")]
    UnexpectedEof(String),

    /// The response line did not carry the required fields.
    #[error("Malformed EDM response: {0}")]
    MalformedResponse(String),

    /// An angle field could not be decoded as `[D]DDMMSS`.
    #[error("Invalid angle field '{field}': {reason}")]
    InvalidAngle {
        /// Offending token.
        field: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The two reads of a pair disagree on slope distance.
    #[error("Readings inconsistent. R1(SD): {first_mm:.0}mm, R2(SD): {second_mm:.0}mm")]
    InconsistentReading {
        /// Slope distance of the first read (mm).
        first_mm: f64,
        /// Slope distance of the second read (mm).
        second_mm: f64,
    },

    /// The slot's record was reset, saved or switched to another circle while a
    /// reading was in flight; the reading was discarded.
    #[error("{0}: calibration changed during the reading, measure again")]
    CalibrationChanged(String),

    /// Edge verification or throw measurement attempted before the centre is set.
    #[error("{0}: circle centre must be set first")]
    CentreNotSet(String),

    /// Throw measurement attempted without an in-tolerance edge verification.
    #[error("{0}: EDM must be calibrated with valid edge verification before measurement")]
    EdgeNotVerified(String),

    /// Disconnect or lookup on a slot that was never connected.
    #[error("Unknown device slot '{0}'")]
    SlotNotFound(String),

    /// No calibration record stored for the slot.
    #[error("No calibration stored for '{0}'")]
    NotCalibrated(String),

    /// Wind window filtered down to nothing.
    #[error("No wind readings in the last {} seconds", .window.as_secs())]
    NoWindData {
        /// Averaging window that was searched.
        window: Duration,
    },

    /// Configuration file or environment could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration values parsed but are semantically invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl From<figment::Error> for PolyfieldError {
    fn from(value: figment::Error) -> Self {
        PolyfieldError::Config(Box::new(value))
    }
}

impl PolyfieldError {
    /// Taxonomy bucket this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            PolyfieldError::Connection { .. }
            | PolyfieldError::NotConnected(_)
            | PolyfieldError::SerialFeatureDisabled => ErrorCategory::Connection,
            PolyfieldError::Io(_)
            | PolyfieldError::ReadTimeout { .. }
            | PolyfieldError::UnexpectedEof(_) => ErrorCategory::Io,
            PolyfieldError::MalformedResponse(_) | PolyfieldError::InvalidAngle { .. } => {
                ErrorCategory::Parse
            }
            PolyfieldError::InconsistentReading { .. } | PolyfieldError::CalibrationChanged(_) => {
                ErrorCategory::Consistency
            }
            PolyfieldError::CentreNotSet(_) | PolyfieldError::EdgeNotVerified(_) => {
                ErrorCategory::Precondition
            }
            PolyfieldError::SlotNotFound(_)
            | PolyfieldError::NotCalibrated(_)
            | PolyfieldError::NoWindData { .. } => ErrorCategory::NotFound,
            PolyfieldError::Config(_) | PolyfieldError::Configuration(_) => {
                ErrorCategory::Configuration
            }
        }
    }

    /// Whether the operator can simply try again (re-sight, re-trigger).
    pub fn can_retry(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Io | ErrorCategory::Parse | ErrorCategory::Consistency
        ) || matches!(self, PolyfieldError::NoWindData { .. })
    }
}
