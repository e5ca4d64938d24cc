//! Configuration module for comlink.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `COMLINK_CONFIG` environment variable (explicit path)
//! 2. `./comlink.toml` (current directory)
//! 3. The platform config directory, e.g. `~/.config/comlink/comlink.toml`
//!    on Linux or `%APPDATA%\comlink\config\comlink.toml` on Windows
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Scalar values can be overridden via environment variables.
//! The pattern is: `COMLINK_<SECTION>_<KEY>`
//!
//! Examples:
//! - `COMLINK_SERIAL_DEFAULT_BAUD=9600`
//! - `COMLINK_TRANSPORT_WRITE_TIMEOUT_MS=500`
//! - `COMLINK_LOG_VIEW_SAVE_TO_DISK=true`
//!
//! # Example
//!
//! ```rust,ignore
//! use comlink::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//! println!("Default baud: {}", config.serial.default_baud);
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{
    BufferConfig, Config, LogFormat, LogViewConfig, LoggingConfig, SerialConfig, TransportConfig,
};
