//! Telemetry error types.

use thiserror::Error;

/// Errors raised while initializing telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Logging subscriber initialization failed (usually: already set).
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),

    /// Invalid telemetry configuration.
    #[error("invalid telemetry configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::LoggingInit("subscriber already set".into());
        assert!(err.to_string().contains("subscriber already set"));
    }
}
