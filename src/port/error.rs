//! Port-specific error types.
//!
//! Defines error types for serial channel operations, separate from application-level
//! errors to maintain clean separation of concerns.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during serial channel operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The endpoint configuration failed range checks.
    #[error("Invalid endpoint configuration: {0}")]
    InvalidConfig(String),

    /// The specified serial endpoint was not found on the system.
    #[error("Serial port not found: {0}")]
    NotFound(String),

    /// The endpoint is held open by another connection.
    #[error("Serial port is already in use: {0}")]
    InUse(String),

    /// The backend cannot express the requested line setting.
    #[error("Unsupported line setting: {0}")]
    Unsupported(String),

    /// Attempted to open while another open was still being set up.
    #[error("Port is already open")]
    AlreadyOpen,

    /// Attempted to use a channel that's not open.
    #[error("Port is not open")]
    NotOpen,

    /// A write was requested with nothing to send.
    #[error("Refusing to write an empty payload")]
    EmptyPayload,

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The channel was closed while the operation was waiting.
    #[error("Channel shut down while the operation was pending")]
    Shutdown,

    /// The receive thread could not be started.
    #[error("Failed to start receive thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// An I/O error occurred during device operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create an InvalidConfig error from a message.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create an Unsupported error from a message.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Create a Timeout error from a duration.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout(duration)
    }

    /// True when the device only reported that nothing completed within the
    /// current poll slice. Callers retry these instead of failing.
    pub fn is_pending(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}
