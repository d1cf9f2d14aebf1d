//! Admission control for the Palisade ingress pipeline.
//!
//! Everything that decides whether a connection or request gets in, before
//! any user handler runs:
//!
//! - [`ConnectionLimiter`] — global cap on concurrently open connections
//! - [`IpFilter`] — CIDR allow/deny evaluation per remote address
//! - [`ServiceRateLimiter`] — two-tier (soft/hard) per-IP token buckets
//! - [`Firewall`] — protocol anomaly counters for operators
//!
//! Rejections here are not errors: each is metered under its own name
//! (`connections.rejected`, `connections.filtered`,
//! `requests.softRateLimited`, `requests.hardRateLimited`) and the
//! connection is closed or the request answered with `429` as the policy
//! dictates.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod filter;
pub mod firewall;
pub mod limiter;
pub mod rate;

pub use filter::IpFilter;
pub use firewall::Firewall;
pub use limiter::{ConnectionGuard, ConnectionLimiter};
pub use rate::{RateDecision, RateLimiterConfig, ServiceRateLimiter};
