//! The process-wide server context.
//!
//! Built once when the orchestrator finalizes its route table, then
//! shared read-only by every request. Holds the metric registry handle,
//! the `requests` meter, and the frozen [`RouteTable`] snapshot. Handlers
//! can reach it through
//! [`RequestContext::extension`](palisade_core::RequestContext::extension).

use std::sync::Arc;

use palisade_telemetry::{Meter, MetricRegistry};

use crate::routes::RouteTable;

/// Immutable process-wide state shared by all requests.
#[derive(Debug, Clone)]
pub struct ServerContext {
    registry: Arc<MetricRegistry>,
    requests: Arc<Meter>,
    table: Arc<RouteTable>,
}

impl ServerContext {
    /// Assembles the context from its finalized parts.
    #[must_use]
    pub fn new(registry: Arc<MetricRegistry>, table: Arc<RouteTable>) -> Self {
        let requests = registry.meter("requests");
        Self {
            registry,
            requests,
            table,
        }
    }

    /// The metric registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// The `requests` meter (ticks once per received request).
    #[must_use]
    pub fn requests(&self) -> &Arc<Meter> {
        &self.requests
    }

    /// The frozen route table.
    #[must_use]
    pub fn table(&self) -> &Arc<RouteTable> {
        &self.table
    }
}
