//! Health checks.
//!
//! Applications register named checks producing [`HealthResult::Healthy`]
//! or [`HealthResult::Unhealthy`] on demand. The `/health` admin endpoint
//! runs every check and answers 200 only when all pass. Checks can also
//! run on a background schedule; execution is concurrent but bounded.
//!
//! # Example
//!
//! ```rust
//! use palisade_server::health::{HealthCheckRegistry, HealthResult};
//!
//! # async fn example() {
//! let registry = HealthCheckRegistry::new(4);
//! registry.register("database", || async { HealthResult::Healthy });
//! registry.register("cache", || async {
//!     HealthResult::unhealthy("connection refused")
//! });
//!
//! let report = registry.run_all().await;
//! assert!(!report.all_healthy());
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use palisade_core::BoxFuture;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// The result of one health check run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HealthResult {
    /// The dependency is fine.
    Healthy,
    /// The dependency is not fine.
    Unhealthy {
        /// Operator-facing reason.
        reason: String,
    },
}

impl HealthResult {
    /// Builds an unhealthy result with a reason.
    #[must_use]
    pub fn unhealthy(reason: impl Into<String>) -> Self {
        Self::Unhealthy {
            reason: reason.into(),
        }
    }

    /// Whether this result is healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// A registered health check.
pub trait HealthCheck: Send + Sync + 'static {
    /// Produces the current health of the checked dependency.
    fn check(&self) -> BoxFuture<'_, HealthResult>;
}

impl<F, Fut> HealthCheck for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = HealthResult> + Send + 'static,
{
    fn check(&self) -> BoxFuture<'_, HealthResult> {
        Box::pin((self)())
    }
}

/// The aggregated outcome of running all checks.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Per-check results, keyed by registration name.
    pub checks: BTreeMap<String, HealthResult>,
}

impl HealthReport {
    /// Whether every check passed (vacuously true with no checks).
    #[must_use]
    pub fn all_healthy(&self) -> bool {
        self.checks.values().all(HealthResult::is_healthy)
    }
}

/// Registry of named health checks.
#[derive(Clone)]
pub struct HealthCheckRegistry {
    checks: Arc<RwLock<Vec<(String, Arc<dyn HealthCheck>)>>>,
    concurrency: Arc<Semaphore>,
}

impl std::fmt::Debug for HealthCheckRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .checks
            .read()
            .expect("health registry lock")
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        f.debug_struct("HealthCheckRegistry")
            .field("checks", &names)
            .finish()
    }
}

impl HealthCheckRegistry {
    /// Creates a registry executing at most `concurrency` checks at once.
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        Self {
            checks: Arc::new(RwLock::new(Vec::new())),
            concurrency: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Registers a check under `name`. A later registration with the same
    /// name replaces the earlier one.
    pub fn register(&self, name: impl Into<String>, check: impl HealthCheck) {
        let name = name.into();
        let mut checks = self.checks.write().expect("health registry lock");
        checks.retain(|(existing, _)| *existing != name);
        checks.push((name, Arc::new(check)));
    }

    /// Number of registered checks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.checks.read().expect("health registry lock").len()
    }

    /// Whether no checks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every check, concurrently but bounded, and collects a report.
    pub async fn run_all(&self) -> HealthReport {
        let checks: Vec<(String, Arc<dyn HealthCheck>)> = self
            .checks
            .read()
            .expect("health registry lock")
            .clone();

        let mut tasks = Vec::with_capacity(checks.len());
        for (name, check) in checks {
            let permits = Arc::clone(&self.concurrency);
            tasks.push(tokio::spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .expect("health semaphore closed");
                let result = check.check().await;
                (name, result)
            }));
        }

        let mut report = BTreeMap::new();
        for task in tasks {
            match task.await {
                Ok((name, result)) => {
                    report.insert(name, result);
                }
                Err(e) => {
                    tracing::error!(error = %e, "health check task panicked");
                }
            }
        }
        HealthReport { checks: report }
    }

    /// Spawns a background task running all checks on a fixed schedule.
    ///
    /// Unhealthy results are logged at WARN. Returns the task handle so
    /// the owner can abort it at shutdown.
    pub fn spawn_background(&self, initial_delay: Duration, delay: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(initial_delay).await;
            loop {
                let report = registry.run_all().await;
                for (name, result) in &report.checks {
                    if let HealthResult::Unhealthy { reason } = result {
                        tracing::warn!(check = %name, %reason, "health check failing");
                    }
                }
                tokio::time::sleep(delay).await;
            }
        })
    }
}
