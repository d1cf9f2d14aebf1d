//! Cooperative request cancellation.
//!
//! When a connection closes while a request is still in flight, the
//! request's [`CancelToken`] fires. Handlers are expected to observe the
//! token at their next suspension point and abandon work; nothing is
//! force-terminated.
//!
//! # Example
//!
//! ```rust
//! use palisade_core::CancelToken;
//!
//! # async fn example() {
//! let token = CancelToken::new();
//! let watcher = token.clone();
//!
//! tokio::select! {
//!     _ = watcher.cancelled() => { /* abandon work */ }
//!     _ = async { /* the actual work */ } => {}
//! }
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// A clonable cancellation handle shared between a connection and the
/// requests running on it.
///
/// Cancelling is idempotent: the first call wins, later calls are no-ops.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    /// Creates a new, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Fires the token, waking every task waiting in [`cancelled`].
    ///
    /// [`cancelled`]: CancelToken::cancelled
    pub fn cancel(&self) {
        if self
            .inner
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns `true` once [`cancel`](CancelToken::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Completes when the token is cancelled. Completes immediately if it
    /// already was.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            // Register interest before re-checking to avoid a lost wakeup.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_token_starts_uncancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_clones_share_state() {
        let a = CancelToken::new();
        let b = a.clone();
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_completes_after_cancel() {
        let token = CancelToken::new();
        let watcher = token.clone();

        let wait = tokio::spawn(async move { watcher.cancelled().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), wait)
            .await
            .expect("cancelled() should complete")
            .expect("task should not panic");
    }

    #[tokio::test]
    async fn test_cancelled_completes_immediately_if_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();

        tokio::time::timeout(Duration::from_millis(10), token.cancelled())
            .await
            .expect("should complete immediately");
    }
}
