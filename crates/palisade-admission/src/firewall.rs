//! Protocol anomaly counters.
//!
//! The firewall observes, it does not block: each counter exists so
//! operators can alert on malformed traffic. Events are fed from the
//! connection drivers' error classification.

use std::sync::Arc;

use palisade_telemetry::{Meter, MetricRegistry};

/// Counters for protocol-level anomalies.
#[derive(Debug, Clone)]
pub struct Firewall {
    oversized_headers: Arc<Meter>,
    malformed_frames: Arc<Meter>,
    request_line_too_long: Arc<Meter>,
}

impl Firewall {
    /// Creates the firewall, registering its meters.
    #[must_use]
    pub fn new(registry: &MetricRegistry) -> Self {
        Self {
            oversized_headers: registry.meter("firewall.oversizedHeaders"),
            malformed_frames: registry.meter("firewall.malformedFrames"),
            request_line_too_long: registry.meter("firewall.requestLineTooLong"),
        }
    }

    /// Records an oversized-header event.
    pub fn oversized_header(&self) {
        self.oversized_headers.mark();
    }

    /// Records a malformed-frame event.
    pub fn malformed_frame(&self) {
        self.malformed_frames.mark();
    }

    /// Records a request-line-too-long event.
    pub fn request_line_too_long(&self) {
        self.request_line_too_long.mark();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment_independently() {
        let registry = MetricRegistry::new();
        let firewall = Firewall::new(&registry);

        firewall.oversized_header();
        firewall.malformed_frame();
        firewall.malformed_frame();

        assert_eq!(registry.meter("firewall.oversizedHeaders").count(), 1);
        assert_eq!(registry.meter("firewall.malformedFrames").count(), 2);
        assert_eq!(registry.meter("firewall.requestLineTooLong").count(), 0);
    }

    #[test]
    fn test_clones_share_counters() {
        let registry = MetricRegistry::new();
        let firewall = Firewall::new(&registry);
        let clone = firewall.clone();

        firewall.request_line_too_long();
        clone.request_line_too_long();
        assert_eq!(registry.meter("firewall.requestLineTooLong").count(), 2);
    }
}
