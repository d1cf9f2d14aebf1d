//! Observability for Palisade.
//!
//! This crate provides three pieces:
//!
//! - **Metrics** ([`metrics`]): an instance-owned [`MetricRegistry`] of
//!   named meters, counters, and timers with a JSON snapshot. There is no
//!   process-global registry — the server owns one and threads it through
//!   its context, which keeps tests hermetic.
//! - **Logging** ([`logging`]): `tracing-subscriber` initialization with
//!   env-filter support and JSON or human-readable output.
//! - **Reporters** ([`reporter`]): background tasks that periodically dump
//!   a registry snapshot to stdout or the log.
//!
//! # Metric naming
//!
//! Metric names are dot-separated camelCase, e.g. `requests`,
//! `responseCodes.ok`, `connections.rejected`. Snapshot output converts
//! rates to events/second and durations to milliseconds.
//!
//! # Example
//!
//! ```rust
//! use palisade_telemetry::MetricRegistry;
//!
//! let registry = MetricRegistry::new();
//! let requests = registry.meter("requests");
//! requests.mark();
//!
//! let snapshot = registry.snapshot();
//! assert_eq!(snapshot.meters["requests"].count, 1);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;
pub mod metrics;
pub mod reporter;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};
pub use metrics::{Counter, Meter, MetricRegistry, MetricsSnapshot, Timer};
pub use reporter::{start_reporters, ReporterConfig};
