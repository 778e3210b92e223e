//! Logging configuration
//!
//! Per-component levels plus output destinations for the tracing subscriber.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    pub global_level: String,

    /// Level for the per-strategy spans and events
    pub strategy_level: String,

    /// Enable console output (stderr)
    pub console_output: bool,

    /// Emit console records as JSON instead of human-readable text
    pub json_console: bool,

    /// Directory for daily-rolled JSON log files (None = no file logging)
    pub log_directory: Option<PathBuf>,

    /// Include file/line in console records
    pub include_file_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            global_level: "info".to_string(),
            strategy_level: "info".to_string(),
            console_output: true,
            json_console: false,
            log_directory: None,
            include_file_location: false,
        }
    }
}

impl LoggingConfig {
    /// Verbose settings for local debugging of the cascade.
    pub fn development() -> Self {
        Self {
            global_level: "debug".to_string(),
            strategy_level: "trace".to_string(),
            console_output: true,
            json_console: false,
            log_directory: Some(PathBuf::from("logs")),
            include_file_location: true,
        }
    }

    /// Quiet, machine-readable settings for batch runs.
    pub fn production() -> Self {
        Self {
            global_level: "warn".to_string(),
            strategy_level: "info".to_string(),
            console_output: true,
            json_console: true,
            log_directory: None,
            include_file_location: false,
        }
    }

    /// Raises both levels according to a `-v` count.
    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        let level = match verbose {
            0 => return self,
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        self.global_level = level.to_string();
        self.strategy_level = level.to_string();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if !VALID_LEVELS.contains(&self.global_level.as_str()) {
            return Err(format!(
                "Invalid global_level: {}. Must be one of: {:?}",
                self.global_level, VALID_LEVELS
            ));
        }

        if !VALID_LEVELS.contains(&self.strategy_level.as_str()) {
            return Err(format!(
                "Invalid strategy_level: {}. Must be one of: {:?}",
                self.strategy_level, VALID_LEVELS
            ));
        }

        if let Some(ref log_dir) = self.log_directory {
            if let Some(parent) = log_dir.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(format!("Log directory parent does not exist: {:?}", parent));
                }
            }
        }

        Ok(())
    }

    /// `EnvFilter` directive string for this crate.
    pub fn filter_directives(&self) -> String {
        let krate = env!("CARGO_PKG_NAME").replace('-', "_");
        format!(
            "{krate}={},{krate}::algorithms={}",
            self.global_level, self.strategy_level
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.global_level, "info");
        assert!(config.console_output);
        assert!(config.log_directory.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        let dev = LoggingConfig::development();
        assert_eq!(dev.strategy_level, "trace");
        assert!(dev.include_file_location);

        let prod = LoggingConfig::production();
        assert_eq!(prod.global_level, "warn");
        assert!(prod.json_console);
    }

    #[test]
    fn test_config_validation() {
        let mut config = LoggingConfig::default();
        config.global_level = "loud".to_string();
        assert!(config.validate().is_err());

        config.global_level = "debug".to_string();
        config.strategy_level = "chatty".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_verbosity_and_directives() {
        let config = LoggingConfig::default().with_verbosity(2);
        assert_eq!(config.global_level, "debug");
        assert_eq!(
            config.filter_directives(),
            "ui_align=debug,ui_align::algorithms=debug"
        );
        assert_eq!(LoggingConfig::production().with_verbosity(0).global_level, "warn");
    }
}
