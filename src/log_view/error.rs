//! Error types for the log view.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by `LogRing` disk operations.
#[derive(Debug, Error)]
pub enum LogError {
    /// A line asked to be persisted before `initialize` succeeded.
    #[error("Session log file is not open")]
    SinkNotOpen,

    /// The log directory could not be created.
    #[error("Failed to create log directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Creating or writing the session file failed.
    #[error("Failed to write session log '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for log view operations.
pub type LogResult<T> = Result<T, LogError>;
