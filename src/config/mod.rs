//! Application configuration loading, validation, and management.
//!
//! This module provides the top-level `Config` structure that aggregates
//! logging, scanner, and transport configurations. It handles locating and
//! loading the TOML file and validating every section.
//!
//! The configuration is loaded early in the application lifecycle and is
//! intended to remain immutable thereafter.

use std::{
    fs,
    path::{Path, PathBuf},
};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use time::{macros::format_description, OffsetDateTime, UtcOffset};
use validator::Validate;

use super::config::{logger::LoggerConfig, scanner::ScannerConfig};

pub mod logger;
pub mod scanner;

/// Environment variable pointing at the configuration file.
pub const CONFIG_ENV: &str = "BOOTHSCAN_CONFIG";

/// Fallback configuration path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/boothscan/config.toml";

/// Local UTC offset, resolved once. The lookup fails once the process is
/// multi-threaded, so `main` forces it before starting the runtime.
pub static LOCAL_OFFSET: Lazy<UtcOffset> =
    Lazy::new(|| UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC));

/// Local wall-clock time as `YYYY-MM-DD HH:MM:SS`.
pub fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .to_offset(*LOCAL_OFFSET)
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_default()
}

/// Simple macros for printing timestamped messages before the tracing subscriber
/// is initialized. These are used during early configuration loading.
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {{
        println!("{}  {} {}",
            console::style($crate::config::timestamp()).dim(),
            console::style("INFO").green(),
            format_args!($($arg)*)
        );
    }};
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {{
        println!("{}  {} {}",
            console::style($crate::config::timestamp()).dim(),
            console::style("WARN").yellow(),
            format_args!($($arg)*)
        );
    }};
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {{
        println!("{}  {} {}",
            console::style($crate::config::timestamp()).dim(),
            console::style("ERROR").red(),
            format_args!($($arg)*)
        );
    }};
}

/// Errors that can occur during configuration loading, parsing, or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Generic configuration-related error with a descriptive message.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error while accessing configuration files.
    #[error("IO error while reading configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// Failure to parse the TOML configuration file.
    #[error("Parse error while reading configuration: {0}")]
    ParseError(String),

    /// Validation failure after successful parsing.
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Broker session settings, owned by the transport crate.
pub type TransportConfig = boothscan_mqtt::Config;

/// Top-level application configuration.
///
/// ```toml
/// [logger]
/// level = "info"
/// file = "/var/log/boothscan/scanner.log"
///
/// [scanner]
/// booth_id = 1
///
/// [transport]
/// host = "192.168.106.196"
/// port = 1883
/// ```
#[derive(Serialize, Deserialize, Debug, Validate, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// Logging subsystem configuration.
    #[validate(nested)]
    pub logger: LoggerConfig,

    /// Input handling and event identity.
    #[validate(nested)]
    pub scanner: ScannerConfig,

    /// Broker connection settings.
    #[validate(nested)]
    pub transport: TransportConfig,
}

impl Config {
    /// Locates and loads the configuration file.
    ///
    /// When no file can be found the built-in defaults are used, so a freshly
    /// imaged booth device still starts against `localhost`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a configuration file exists but cannot be
    /// read, parsed, or validated.
    pub fn new() -> Result<Self, ConfigError> {
        match Self::get_config_path() {
            Some(path) => Self::load(&path),
            None => {
                print_warn!(
                    "No configuration file found ({} unset, {} missing). Using defaults",
                    CONFIG_ENV,
                    DEFAULT_CONFIG_PATH
                );
                let config = Config::default();
                config
                    .validate()
                    .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
                Ok(config)
            }
        }
    }

    /// Determines the configuration file path.
    ///
    /// Priority:
    /// 1. `BOOTHSCAN_CONFIG` environment variable
    /// 2. `/etc/boothscan/config.toml`
    fn get_config_path() -> Option<PathBuf> {
        if let Ok(config_path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(config_path);
            print_info!("Using config from {}: {}", CONFIG_ENV, path.display());
            return Some(path);
        }

        let fallback = Path::new(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            print_info!("Using default config path: {}", fallback.display());
            return Some(fallback.to_path_buf());
        }

        None
    }

    /// Loads and validates configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Propagates IO, parsing, and validation errors as `ConfigError`.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        print_info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let config_str = fs::read_to_string(path)?;
        let config = Self::parse(&config_str)?;

        print_info!("Successfully loaded config from: {}", path.display());
        Ok(config)
    }

    /// Parses and validates configuration text.
    pub fn parse(text: &str) -> Result<Config, ConfigError> {
        let config: Config =
            toml::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_timestamp_shape() {
        let ts = timestamp();
        assert_eq!(ts.len(), 19);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], " ");
        assert_eq!(&ts[13..14], ":");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.scanner.booth_id, 1);
        assert_eq!(config.transport.port, 1883);
        assert_eq!(config.transport.outbound_topic, "openhouse/scan");
        assert_eq!(config.logger.level, "info");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [logger]
            level = "debug"
            file = "/tmp/boothscan-test.log"

            [scanner]
            booth_id = 7
            prompt = false

            [transport]
            host = "192.168.106.196"
            retry_delay = 3
            "#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.logger.level, "debug");
        assert_eq!(
            config.logger.file.as_deref(),
            Some(Path::new("/tmp/boothscan-test.log"))
        );
        assert_eq!(config.scanner.booth_id, 7);
        assert!(!config.scanner.prompt);
        assert_eq!(config.transport.host, "192.168.106.196");
        assert_eq!(config.transport.retry_delay, 3);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/boothscan.toml"));
        assert!(matches!(result, Err(ConfigError::Config(_))));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            Config::parse("[scanner\nbooth_id = 1"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_nested_validation() {
        let result = Config::parse(
            r#"
            [transport]
            port = 0
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));

        let result = Config::parse(
            r#"
            [logger]
            level = "loud"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
