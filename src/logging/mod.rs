//! Structured logging for the alignment engine
//!
//! Subscriber setup plus the span types used by the cascade. Library code only
//! emits `tracing` records; binaries decide where they go.

pub mod config;
pub mod spans;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use config::LoggingConfig;
pub use spans::{AlignmentSpan, StrategySpan};

/// Keeps the file writer flushing until dropped.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the global subscriber from `config`.
///
/// `RUST_LOG`, when set, overrides the configured levels.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard> {
    config.validate().map_err(anyhow::Error::msg)?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let mut layers = Vec::new();

    if config.console_output {
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_line_number(config.include_file_location)
            .with_file(config.include_file_location);
        if config.json_console {
            layers.push(console_layer.json().boxed());
        } else {
            layers.push(console_layer.boxed());
        }
    }

    let mut file_guard = None;
    if let Some(ref log_dir) = config.log_directory {
        std::fs::create_dir_all(log_dir)?;
        let file_appender = tracing_appender::rolling::daily(log_dir, "alignment.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        file_guard = Some(guard);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .json();
        layers.push(file_layer.boxed());
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()?;

    tracing::debug!(config = ?config, "Logging system initialized");
    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_rejects_invalid_config() {
        let config = LoggingConfig {
            global_level: "nope".to_string(),
            ..LoggingConfig::default()
        };
        assert!(init_logging(&config).is_err());
    }

    #[test]
    fn test_logging_init_with_file_output() {
        let temp_dir = TempDir::new().unwrap();
        let config = LoggingConfig {
            console_output: false,
            log_directory: Some(temp_dir.path().join("logs")),
            ..LoggingConfig::default()
        };

        // A second global init in the same test binary fails, which is fine here.
        if let Ok(guard) = init_logging(&config) {
            tracing::info!("file logging smoke test");
            drop(guard);
        }
        assert!(temp_dir.path().join("logs").exists());
    }
}
