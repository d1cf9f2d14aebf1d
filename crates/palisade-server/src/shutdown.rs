//! Shutdown signalling and in-flight connection tracking.
//!
//! [`ShutdownSignal`] is the single-shot trigger that moves the server
//! from `Serving` to `Draining`. It is idempotent — only the first
//! `trigger` does anything — and can be re-armed after a restart drain
//! completes. [`ConnectionTracker`] counts in-flight connections so the
//! drain knows when everything has finished.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// A clonable, idempotent, re-armable shutdown trigger.
///
/// # Example
///
/// ```rust
/// use palisade_server::ShutdownSignal;
///
/// let signal = ShutdownSignal::new();
/// assert!(!signal.is_triggered());
///
/// signal.trigger();
/// signal.trigger(); // no-op
/// assert!(signal.is_triggered());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<SignalInner>,
}

#[derive(Debug, Default)]
struct SignalInner {
    triggered: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    /// Creates an un-triggered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal. Idempotent.
    pub fn trigger(&self) {
        if self
            .inner
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.inner.notify.notify_waiters();
        }
    }

    /// Whether the signal has fired.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Re-arms the signal after a restart drain.
    pub fn reset(&self) {
        self.inner.triggered.store(false, Ordering::SeqCst);
    }

    /// Completes when the signal fires; immediately if it already has.
    pub async fn recv(&self) {
        loop {
            if self.is_triggered() {
                return;
            }
            let notified = self.inner.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

/// Counts in-flight connections for drain accounting.
///
/// Every accepted connection holds a [`ConnectionToken`]; the drain waits
/// in [`wait_idle`](ConnectionTracker::wait_idle) until all tokens drop.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    active: AtomicUsize,
    notify: Notify,
}

impl ConnectionTracker {
    /// Creates a tracker with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        ConnectionToken {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Number of connections currently in flight.
    #[must_use]
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Completes when every token has dropped; immediately if none exist.
    pub async fn wait_idle(&self) {
        loop {
            if self.active() == 0 {
                return;
            }
            let notified = self.inner.notify.notified();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Token held for a connection's lifetime.
#[derive(Debug)]
pub struct ConnectionToken {
    inner: Arc<TrackerInner>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        if self.inner.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_signal_trigger_idempotent() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        signal.trigger();
        assert!(signal.is_triggered());
    }

    #[test]
    fn test_signal_clones_share_state() {
        let a = ShutdownSignal::new();
        let b = a.clone();
        a.trigger();
        assert!(b.is_triggered());
    }

    #[test]
    fn test_signal_reset_rearms() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        signal.reset();
        assert!(!signal.is_triggered());
        signal.trigger();
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn test_recv_completes_on_trigger() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();

        let handle = tokio::spawn(async move { waiter.recv().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.trigger();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("recv should complete")
            .expect("no panic");
    }

    #[tokio::test]
    async fn test_recv_immediate_when_triggered() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        tokio::time::timeout(Duration::from_millis(10), signal.recv())
            .await
            .expect("should complete immediately");
    }

    #[test]
    fn test_tracker_counts() {
        let tracker = ConnectionTracker::new();
        let a = tracker.acquire();
        let b = tracker.acquire();
        assert_eq!(tracker.active(), 2);
        drop(a);
        assert_eq!(tracker.active(), 1);
        drop(b);
        assert_eq!(tracker.active(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_immediate_when_empty() {
        let tracker = ConnectionTracker::new();
        tokio::time::timeout(Duration::from_millis(10), tracker.wait_idle())
            .await
            .expect("should complete immediately");
    }

    #[tokio::test]
    async fn test_wait_idle_waits_for_tokens() {
        let tracker = ConnectionTracker::new();
        let token = tracker.acquire();

        let waiter = tracker.clone();
        let handle = tokio::spawn(async move { waiter.wait_idle().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(token);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("wait_idle should complete")
            .expect("no panic");
    }
}
