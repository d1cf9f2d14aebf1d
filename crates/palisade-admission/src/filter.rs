//! IP allow/deny filtering.
//!
//! Evaluation order: if the allow list is non-empty, the remote must match
//! it; then a deny-list match rejects. A rejected connection is closed
//! before TLS and `connections.filtered` increments — no bytes are ever
//! written to a filtered peer.

use std::net::IpAddr;
use std::sync::Arc;

use ipnetwork::IpNetwork;
use palisade_core::Error;
use palisade_telemetry::{Meter, MetricRegistry};

/// CIDR-based allow/deny filter evaluated per remote address.
///
/// # Example
///
/// ```rust
/// use palisade_admission::IpFilter;
/// use palisade_telemetry::MetricRegistry;
///
/// let registry = MetricRegistry::new();
/// let filter = IpFilter::from_config(&registry, &[], &["10.0.0.0/8".into()]).unwrap();
///
/// assert!(filter.admit("192.0.2.1".parse().unwrap()));
/// assert!(!filter.admit("10.1.2.3".parse().unwrap()));
/// ```
#[derive(Debug)]
pub struct IpFilter {
    allow: Vec<IpNetwork>,
    deny: Vec<IpNetwork>,
    filtered: Arc<Meter>,
}

impl IpFilter {
    /// Builds a filter from CIDR strings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when any entry is not a valid CIDR range.
    pub fn from_config(
        registry: &MetricRegistry,
        allow_list: &[String],
        deny_list: &[String],
    ) -> Result<Self, Error> {
        Ok(Self {
            allow: parse_cidrs(allow_list, "allow")?,
            deny: parse_cidrs(deny_list, "deny")?,
            filtered: registry.meter("connections.filtered"),
        })
    }

    /// Evaluates the remote address.
    ///
    /// Returns `false` (and meters the rejection) when the peer must be
    /// closed without further processing.
    #[must_use]
    pub fn admit(&self, remote: IpAddr) -> bool {
        if !self.allow.is_empty() && !self.allow.iter().any(|net| net.contains(remote)) {
            self.filtered.mark();
            tracing::debug!(%remote, "connection filtered: not on allow list");
            return false;
        }
        if self.deny.iter().any(|net| net.contains(remote)) {
            self.filtered.mark();
            tracing::debug!(%remote, "connection filtered: on deny list");
            return false;
        }
        true
    }

    /// Returns `true` when neither list has entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}

fn parse_cidrs(entries: &[String], which: &str) -> Result<Vec<IpNetwork>, Error> {
    entries
        .iter()
        .map(|entry| {
            entry
                .parse::<IpNetwork>()
                .map_err(|e| Error::config(format!("invalid {which}-list CIDR {entry:?}: {e}")))
        })
        .collect()
}
