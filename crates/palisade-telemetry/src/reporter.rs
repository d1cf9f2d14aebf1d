//! Periodic metric reporters.
//!
//! Reporters dump a registry snapshot on a fixed interval. Two sinks are
//! available: stdout (console reporter) and the log (via `tracing`). Both
//! can run simultaneously with independent intervals.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::metrics::MetricRegistry;

/// Reporter toggles and polling intervals.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Dump snapshots to stdout.
    pub console: bool,
    /// Console polling interval.
    pub console_interval: Duration,
    /// Dump snapshots through `tracing` at INFO.
    pub log: bool,
    /// Log polling interval.
    pub log_interval: Duration,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            console: false,
            console_interval: Duration::from_secs(60),
            log: false,
            log_interval: Duration::from_secs(60),
        }
    }
}

/// Spawns the configured reporter tasks.
///
/// Returns the join handles so the owner can abort them at shutdown.
/// With both reporters disabled this returns an empty vector.
pub fn start_reporters(
    registry: Arc<MetricRegistry>,
    config: &ReporterConfig,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    if config.console {
        let registry = Arc::clone(&registry);
        let period = config.console_interval;
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // first tick fires immediately; skip it
            loop {
                interval.tick().await;
                let snapshot = registry.snapshot();
                match serde_json::to_string_pretty(&snapshot) {
                    Ok(rendered) => println!("{rendered}"),
                    Err(e) => tracing::warn!(error = %e, "failed to render metrics snapshot"),
                }
            }
        }));
    }

    if config.log {
        let registry = Arc::clone(&registry);
        let period = config.log_interval;
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let snapshot = registry.snapshot();
                match serde_json::to_string(&snapshot) {
                    Ok(rendered) => {
                        tracing::info!(target: "palisade::metrics", metrics = %rendered);
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to render metrics snapshot"),
                }
            }
        }));
    }

    handles
}
