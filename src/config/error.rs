//! Errors raised while locating, parsing, validating or saving `comlink.toml`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to write configuration file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single value is out of range.
    #[error("Invalid value {value} for '{key}': {message}")]
    ValidationError {
        key: String,
        value: String,
        message: String,
    },

    /// The display would be rebuilt after every line: once rebuilt, the
    /// buffered lines alone already reach the rewrite threshold.
    #[error(
        "log_view.max_buffered_lines ({buffered}) must be below \
         log_view.rewrite_line_threshold ({threshold})"
    )]
    RewriteBelowBuffer { buffered: usize, threshold: u64 },

    /// A `COMLINK_*` override could not be parsed.
    #[error("Failed to parse environment variable '{var}': {message}")]
    EnvParseError { var: String, message: String },

    /// `save` was called on a loader that never had a file path.
    #[error("No configuration file path to save to")]
    NoSavePath,
}

impl ConfigError {
    pub fn validation(
        key: impl Into<String>,
        value: impl std::fmt::Display,
        message: impl Into<String>,
    ) -> Self {
        Self::ValidationError {
            key: key.into(),
            value: value.to_string(),
            message: message.into(),
        }
    }

    pub fn env_parse(var: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            message: message.into(),
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
