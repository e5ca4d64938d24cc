//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "COMLINK";

/// Config file name
const CONFIG_FILE_NAME: &str = "comlink.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "COMLINK_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Environment variables can override any config file values. The result
    /// is validated before it is returned.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        // Still apply env overrides even with defaults
        if apply_env_overrides(&mut config).is_err() || validate(&config).is_err() {
            config = Config::default();
        }

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a mutable reference to the configuration.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to file.
    pub fn save(&self) -> ConfigResult<()> {
        let path = self.config_path.as_ref().ok_or(ConfigError::NoSavePath)?;

        save_to_file(&self.config, path)
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. Platform config directory
    if let Some(app_config) = get_default_config_path() {
        if app_config.exists() {
            return Some(app_config);
        }
    }

    // 4. No config file found - will use defaults
    None
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "comlink").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

/// Save configuration to a file.
fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Parse `COMLINK_<key>` into `target` if the variable is set.
fn override_from_env<T: FromStr>(key: &str, target: &mut T, what: &str) -> ConfigResult<()> {
    let var = format!("{ENV_PREFIX}_{key}");
    if let Ok(val) = std::env::var(&var) {
        *target = val
            .parse()
            .map_err(|_| ConfigError::env_parse(var, format!("Invalid {what}")))?;
    }
    Ok(())
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `COMLINK_<SECTION>_<KEY>`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    let serial = &mut config.serial;
    override_from_env("SERIAL_DEFAULT_BAUD", &mut serial.default_baud, "baud rate")?;

    let t = &mut config.transport;
    override_from_env("TRANSPORT_WRITE_TIMEOUT_MS", &mut t.write_timeout_ms, "timeout")?;
    override_from_env("TRANSPORT_CLOSE_TIMEOUT_MS", &mut t.close_timeout_ms, "timeout")?;
    override_from_env("TRANSPORT_POLL_INTERVAL_MS", &mut t.poll_interval_ms, "interval")?;
    override_from_env("TRANSPORT_SCRATCH_SIZE", &mut t.scratch_size, "buffer size")?;

    let lv = &mut config.log_view;
    override_from_env("LOG_VIEW_MAX_BUFFERED_LINES", &mut lv.max_buffered_lines, "line count")?;
    override_from_env(
        "LOG_VIEW_REWRITE_LINE_THRESHOLD",
        &mut lv.rewrite_line_threshold,
        "line count",
    )?;
    override_from_env(
        "LOG_VIEW_REWRITE_BYTE_THRESHOLD",
        &mut lv.rewrite_byte_threshold,
        "byte count",
    )?;
    override_from_env("LOG_VIEW_DIRECTORY", &mut lv.directory, "path")?;
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_LOG_VIEW_SAVE_TO_DISK")) {
        lv.save_to_disk = val.to_lowercase() == "true" || val == "1";
    }

    override_from_env("BUFFER_CAPACITY", &mut config.buffer.capacity, "capacity")?;

    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_LOGGING_LEVEL")) {
        config.logging.level = val;
    }

    Ok(())
}

const MUST_BE_POSITIVE: &str = "must be greater than zero";

/// Reject values that would make a component unusable.
fn validate(config: &Config) -> ConfigResult<()> {
    if config.serial.default_baud == 0 {
        return Err(ConfigError::validation("serial.default_baud", 0, MUST_BE_POSITIVE));
    }
    let transport = &config.transport;
    for (key, value) in [
        ("transport.write_timeout_ms", transport.write_timeout_ms),
        ("transport.close_timeout_ms", transport.close_timeout_ms),
        ("transport.poll_interval_ms", transport.poll_interval_ms),
    ] {
        if value == 0 {
            return Err(ConfigError::validation(key, value, MUST_BE_POSITIVE));
        }
    }

    let log_view = &config.log_view;
    for (key, value) in [
        ("transport.scratch_size", transport.scratch_size),
        ("log_view.max_buffered_lines", log_view.max_buffered_lines),
        ("log_view.rewrite_byte_threshold", log_view.rewrite_byte_threshold),
        ("buffer.capacity", config.buffer.capacity),
    ] {
        if value == 0 {
            return Err(ConfigError::validation(key, value, MUST_BE_POSITIVE));
        }
    }
    if log_view.rewrite_line_threshold == 0 {
        return Err(ConfigError::validation(
            "log_view.rewrite_line_threshold",
            0,
            MUST_BE_POSITIVE,
        ));
    }
    if log_view.max_buffered_lines as u64 >= log_view.rewrite_line_threshold {
        return Err(ConfigError::RewriteBelowBuffer {
            buffered: log_view.max_buffered_lines,
            threshold: log_view.rewrite_line_threshold,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_default_loader() {
        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().serial.default_baud, 115200);
    }

    #[test]
    #[serial]
    fn test_env_override() {
        env::set_var("COMLINK_SERIAL_DEFAULT_BAUD", "57600");
        env::set_var("COMLINK_LOG_VIEW_SAVE_TO_DISK", "1");

        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().serial.default_baud, 57600);
        assert!(loader.config().log_view.save_to_disk);

        env::remove_var("COMLINK_SERIAL_DEFAULT_BAUD");
        env::remove_var("COMLINK_LOG_VIEW_SAVE_TO_DISK");
    }

    #[test]
    #[serial]
    fn test_bad_env_value_is_reported() {
        env::set_var("COMLINK_TRANSPORT_WRITE_TIMEOUT_MS", "soon");
        let mut config = Config::default();
        let err = apply_env_overrides(&mut config).unwrap_err();
        env::remove_var("COMLINK_TRANSPORT_WRITE_TIMEOUT_MS");

        assert!(matches!(err, ConfigError::EnvParseError { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = Config::default();
        config.buffer.capacity = 0;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_buffer_at_rewrite_threshold() {
        let mut config = Config::default();
        config.log_view.max_buffered_lines = 100;
        config.log_view.rewrite_line_threshold = 100;
        match validate(&config) {
            Err(ConfigError::RewriteBelowBuffer {
                buffered,
                threshold,
            }) => assert_eq!((buffered, threshold), (100, 100)),
            other => panic!("unexpected {other:?}"),
        }

        config.log_view.rewrite_line_threshold = 101;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_validation_error_names_value() {
        let mut config = Config::default();
        config.transport.poll_interval_ms = 0;
        let err = validate(&config).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value 0 for 'transport.poll_interval_ms': must be greater than zero"
        );
    }

    #[test]
    fn test_save_without_path_fails() {
        let loader = ConfigLoader {
            config_path: None,
            config: Config::default(),
        };
        assert!(matches!(loader.save(), Err(ConfigError::NoSavePath)));
    }

    #[test]
    #[serial]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut loader = ConfigLoader::with_defaults();
        loader.config_mut().serial.default_baud = 19200;
        loader.save_to(&path).unwrap();

        let reloaded = ConfigLoader::load_from(&path).unwrap();
        assert_eq!(reloaded.config().serial.default_baud, 19200);
        assert_eq!(reloaded.config_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ConfigLoader::load_from("/definitely/not/here/comlink.toml").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
