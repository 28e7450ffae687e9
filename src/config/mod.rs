/// Configuration management for mirador

use crate::driver::DriverTimeouts;
use crate::keys::{DEFAULT_PATTERN, DEFAULT_SCAN_COUNT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub use crate::error::ConfigError;

/// Main mirador configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Driver timeouts
    #[serde(default)]
    pub session: SessionConfig,
    /// Key enumeration
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Monitoring loop
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Saved profiles
    #[serde(default)]
    pub profiles: ProfilesConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Driver timeouts, all in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub connect_timeout_ms: u64,
    pub send_timeout_ms: u64,
    pub receive_timeout_ms: u64,
}

/// Key enumeration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Pattern used when none is given
    pub default_pattern: String,
    /// Keys requested per SCAN page
    pub scan_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Delay between snapshots in milliseconds
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilesConfig {
    /// Profile file path; profiles are kept in memory only when unset
    pub file: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, text)
    pub format: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let timeouts = DriverTimeouts::default();
        Self {
            connect_timeout_ms: timeouts.connect.as_millis() as u64,
            send_timeout_ms: timeouts.send.as_millis() as u64,
            receive_timeout_ms: timeouts.receive.as_millis() as u64,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            default_pattern: DEFAULT_PATTERN.to_string(),
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { interval_ms: 2000 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeouts = [
            ("connect_timeout_ms", self.session.connect_timeout_ms),
            ("send_timeout_ms", self.session.send_timeout_ms),
            ("receive_timeout_ms", self.session.receive_timeout_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "session {} must be greater than 0",
                    name
                )));
            }
        }

        if self.catalog.scan_count == 0 {
            return Err(ConfigError::ValidationError(
                "catalog scan_count must be greater than 0".to_string(),
            ));
        }

        if self.monitor.interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "monitor interval_ms must be greater than 0".to_string(),
            ));
        }

        if let Some(file) = &self.profiles.file {
            if file.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "profiles file cannot be empty".to_string(),
                ));
            }
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}",
                    self.logging.level
                )))
            }
        }

        match self.logging.format.as_str() {
            "json" | "text" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}",
                    self.logging.format
                )))
            }
        }

        Ok(())
    }

    /// Driver timeouts derived from the session section
    pub fn timeouts(&self) -> DriverTimeouts {
        DriverTimeouts {
            connect: Duration::from_millis(self.session.connect_timeout_ms),
            send: Duration::from_millis(self.session.send_timeout_ms),
            receive: Duration::from_millis(self.session.receive_timeout_ms),
        }
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.interval_ms)
    }

    /// Create example configuration file
    pub fn create_example_config<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        let config = Config {
            profiles: ProfilesConfig {
                file: Some("mirador-profiles.toml".to_string()),
            },
            ..Default::default()
        };

        config.save_to_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeouts(), DriverTimeouts::default());
        assert_eq!(config.monitor_interval(), Duration::from_secs(2));
        assert_eq!(config.catalog.scan_count, DEFAULT_SCAN_COUNT);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.session.receive_timeout_ms = 0;
        assert!(config.validate().is_err());
        config.session.receive_timeout_ms = 1000;
        assert!(config.validate().is_ok());

        config.catalog.scan_count = 0;
        assert!(config.validate().is_err());
        config.catalog.scan_count = 10;

        config.monitor.interval_ms = 0;
        assert!(config.validate().is_err());
        config.monitor.interval_ms = 500;

        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
        config.logging.level = "debug".to_string();

        config.profiles.file = Some("  ".to_string());
        assert!(config.validate().is_err());
        config.profiles.file = None;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [monitor]
            interval_ms = 750
            "#,
        )
        .unwrap();
        assert_eq!(config.monitor.interval_ms, 750);
        assert_eq!(config.session.connect_timeout_ms, 5000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_section_fills_missing_fields() {
        let config: Config = toml::from_str(
            r#"
            [session]
            connect_timeout_ms = 1500

            [catalog]
            default_pattern = "user:*"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.session.connect_timeout_ms, 1500);
        assert_eq!(config.session.receive_timeout_ms, 5000);
        assert_eq!(config.catalog.default_pattern, "user:*");
        assert_eq!(config.catalog.scan_count, DEFAULT_SCAN_COUNT);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_file_operations() {
        let temp_file = NamedTempFile::new().unwrap();

        Config::create_example_config(temp_file.path()).unwrap();
        let loaded = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(loaded.profiles.file.as_deref(), Some("mirador-profiles.toml"));
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "[monitor]\ninterval_ms = 0\n").unwrap();
        assert!(matches!(
            Config::load_from_file(temp_file.path()),
            Err(ConfigError::ValidationError(_))
        ));

        assert!(matches!(
            Config::load_from_file("/nonexistent/mirador.toml"),
            Err(ConfigError::IoError(_))
        ));
    }
}
