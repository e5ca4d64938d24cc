//! comlink: serial-port communication core.
//!
//! # Modules
//!
//! - `port`: endpoint settings, device backends and the `PortChannel` that owns
//!   one open connection with its background receive thread
//! - `buffer`: fixed-capacity circular byte buffer that drops the oldest bytes
//! - `log_view`: bounded display log with rewrite thresholds and a session file
//! - `config`: TOML configuration with environment overrides
//! - `error`: crate-level error aggregating the module errors

pub mod buffer;
pub mod config;
pub mod error;
pub mod log_view;
pub mod port;

// Re-export commonly used types for convenience
pub use buffer::{BufferError, CircularBuffer};
pub use error::{AppError, AppResult};
pub use log_view::{Color, LogError, LogKind, LogLine, LogRing, RingLimits, RxMode};
pub use port::{
    list_endpoints, ChannelOptions, ChannelStats, DataBits, DeviceOpener, EndpointConfig,
    EndpointInfo, FlowControl, MockBus, ModemStatus, NativeOpener, Parity, PortChannel, PortError,
    SerialDevice, StopBits,
};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
