//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! All configuration sections are defined here with appropriate defaults.

use crate::log_view::{RingLimits, RxMode};
use crate::port::{ChannelOptions, DataBits, EndpointConfig, FlowControl, Parity, StopBits};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default line parameters
    pub serial: SerialConfig,
    /// Channel timing
    pub transport: TransportConfig,
    /// Display log limits and session file
    pub log_view: LogViewConfig,
    /// Raw byte staging buffer
    pub buffer: BufferConfig,
    /// Diagnostic logging
    pub logging: LoggingConfig,
}

/// Serial port configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Default baud rate for new connections
    pub default_baud: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    pub rts: bool,
    pub dtr: bool,
    /// Port aliases for convenience
    #[serde(default)]
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            default_baud: 115200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            rts: false,
            dtr: false,
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    /// Resolve a port name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Endpoint settings for `name` (alias-resolved) using these defaults.
    pub fn endpoint(&self, name: &str) -> EndpointConfig {
        EndpointConfig {
            address: self.resolve_port(name),
            baud_rate: self.default_baud,
            data_bits: self.data_bits,
            parity: self.parity,
            stop_bits: self.stop_bits,
            flow_control: self.flow_control,
            rts: self.rts,
            dtr: self.dtr,
        }
    }
}

/// Channel timing section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Upper bound for one write call
    pub write_timeout_ms: u64,
    /// Upper bound for stopping the receive thread
    pub close_timeout_ms: u64,
    /// Device read/write slice
    pub poll_interval_ms: u64,
    /// Largest chunk delivered to the data callback
    pub scratch_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        let options = ChannelOptions::default();
        Self {
            write_timeout_ms: options.write_timeout.as_millis() as u64,
            close_timeout_ms: options.close_timeout.as_millis() as u64,
            poll_interval_ms: options.poll_interval.as_millis() as u64,
            scratch_size: options.scratch_size,
        }
    }
}

impl TransportConfig {
    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            close_timeout: Duration::from_millis(self.close_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            scratch_size: self.scratch_size,
        }
    }
}

/// Display log section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogViewConfig {
    pub max_buffered_lines: usize,
    pub rewrite_line_threshold: u64,
    pub rewrite_byte_threshold: usize,
    /// Where session files are created
    pub directory: PathBuf,
    /// Persist every displayed line
    pub save_to_disk: bool,
    /// How received bytes are rendered
    pub rx_mode: RxMode,
}

impl Default for LogViewConfig {
    fn default() -> Self {
        let limits = RingLimits::default();
        Self {
            max_buffered_lines: limits.max_buffered_lines,
            rewrite_line_threshold: limits.rewrite_line_threshold,
            rewrite_byte_threshold: limits.rewrite_byte_threshold,
            directory: PathBuf::from("logs"),
            save_to_disk: false,
            rx_mode: RxMode::Hex,
        }
    }
}

impl LogViewConfig {
    pub fn limits(&self) -> RingLimits {
        RingLimits {
            max_buffered_lines: self.max_buffered_lines,
            rewrite_line_threshold: self.rewrite_line_threshold,
            rewrite_byte_threshold: self.rewrite_byte_threshold,
        }
    }
}

/// Raw byte staging buffer section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: crate::buffer::DEFAULT_CAPACITY,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}
