//! Structured logging initialization.
//!
//! Wraps `tracing-subscriber` with a small config surface: level, JSON or
//! human-readable output, target inclusion. The `RUST_LOG` environment
//! variable overrides the configured level when set.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::TelemetryError;

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether to install a subscriber at all.
    pub enabled: bool,
    /// Default level directive (e.g. "info", "palisade=debug").
    pub level: String,
    /// JSON output (production) vs human-readable (development).
    pub json_format: bool,
    /// Include the emitting module path in output.
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json_format: true,
            include_target: true,
        }
    }
}

impl LogConfig {
    /// Human-readable debug output for local development.
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            json_format: false,
            ..Self::default()
        }
    }

    /// JSON info-level output for production.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }
}

/// Installs the global tracing subscriber.
///
/// Call once per process, before the server starts.
///
/// # Errors
///
/// Returns [`TelemetryError::LoggingInit`] when a subscriber is already
/// installed.
pub fn init_logging(config: &LogConfig) -> Result<(), TelemetryError> {
    if !config.enabled {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let fmt_layer = if config.json_format {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(config.include_target)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(config.include_target)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert!(config.enabled);
        assert_eq!(config.level, "info");
        assert!(config.json_format);
    }

    #[test]
    fn test_development_preset() {
        let config = LogConfig::development();
        assert_eq!(config.level, "debug");
        assert!(!config.json_format);
    }

    #[test]
    fn test_disabled_init_is_noop() {
        let config = LogConfig {
            enabled: false,
            ..LogConfig::default()
        };
        assert!(init_logging(&config).is_ok());
        // A second call must also succeed since nothing was installed.
        assert!(init_logging(&config).is_ok());
    }
}
