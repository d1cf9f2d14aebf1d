//! Global connection limiter.
//!
//! A compare-and-swap counter against a fixed cap. Acquisition happens
//! before the connection is handed to the pipeline; the returned guard
//! releases the slot exactly once when dropped, so a panicking connection
//! task still gives its slot back.
//!
//! On refusal the caller accepts the socket and immediately closes it
//! (no TLS handshake, no bytes written) — refusing at the socket level
//! rather than leaving the connection in the SYN backlog.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use palisade_telemetry::{Meter, MetricRegistry};

/// Caps the number of concurrently open connections.
///
/// # Example
///
/// ```rust
/// use palisade_admission::ConnectionLimiter;
/// use palisade_telemetry::MetricRegistry;
///
/// let registry = MetricRegistry::new();
/// let limiter = ConnectionLimiter::new(&registry, 2);
///
/// let a = limiter.try_acquire().unwrap();
/// let _b = limiter.try_acquire().unwrap();
/// assert!(limiter.try_acquire().is_none());
///
/// drop(a);
/// assert!(limiter.try_acquire().is_some());
/// ```
#[derive(Debug)]
pub struct ConnectionLimiter {
    open: Arc<AtomicUsize>,
    cap: usize,
    next_id: AtomicU64,
    rejected: Arc<Meter>,
}

impl ConnectionLimiter {
    /// Creates a limiter with the given cap, registering its
    /// `connections.rejected` meter.
    #[must_use]
    pub fn new(registry: &MetricRegistry, max_connections: usize) -> Self {
        Self {
            open: Arc::new(AtomicUsize::new(0)),
            cap: max_connections,
            next_id: AtomicU64::new(0),
            rejected: registry.meter("connections.rejected"),
        }
    }

    /// Attempts to claim a connection slot.
    ///
    /// Returns `None` when the cap is reached, after incrementing the
    /// rejection meter. The open-connection count never exceeds the cap.
    #[must_use]
    pub fn try_acquire(&self) -> Option<ConnectionGuard> {
        let mut current = self.open.load(Ordering::Relaxed);
        loop {
            if current >= self.cap {
                self.rejected.mark();
                return None;
            }
            match self.open.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    return Some(ConnectionGuard {
                        open: Arc::clone(&self.open),
                        id: self.next_id.fetch_add(1, Ordering::Relaxed),
                    });
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// Number of currently open connections.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::Relaxed)
    }

    /// The configured cap.
    #[must_use]
    pub fn max_connections(&self) -> usize {
        self.cap
    }
}

/// A claimed connection slot.
///
/// Dropping the guard releases the slot; the decrement happens exactly
/// once.
#[derive(Debug)]
pub struct ConnectionGuard {
    open: Arc<AtomicUsize>,
    id: u64,
}

impl ConnectionGuard {
    /// Process-unique id for the connection holding this slot.
    #[must_use]
    pub fn connection_id(&self) -> u64 {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::AcqRel);
    }
}
