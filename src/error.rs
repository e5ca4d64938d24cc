//! Crate-level error type for the binary and callers that drive several
//! components at once.

use crate::buffer::BufferError;
use crate::config::ConfigError;
use crate::log_view::LogError;
use crate::port::PortError;
use thiserror::Error;

/// A specialized `Result` type for operations spanning multiple modules.
pub type AppResult<T> = Result<T, AppError>;

/// Unified application error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Serial channel error: {0}")]
    Port(#[from] PortError),

    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Log error: {0}")]
    Log(#[from] LogError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("An I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions_keep_the_message() {
        let err: AppError = PortError::NotOpen.into();
        assert!(matches!(err, AppError::Port(PortError::NotOpen)));
        assert!(err.to_string().starts_with("Serial channel error"));

        let err: AppError = BufferError::ZeroCapacity.into();
        assert!(err.to_string().contains("greater than zero"));
    }
}
