//! The orchestrator lifecycle state machine.
//!
//! `Built → Binding → Serving → Draining → Stopped`, with one loop back:
//! a restart re-enters `Binding` after its drain completes. The state is
//! a shared atomic read by the admin surface (`/ready` answers 503 unless
//! the state is `Serving`).

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle states in transition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// Constructed; routes still mutable.
    Built = 0,
    /// Route table frozen; listener being bound.
    Binding = 1,
    /// Accept loop running.
    Serving = 2,
    /// Listener closed; in-flight connections finishing.
    Draining = 3,
    /// Everything released.
    Stopped = 4,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Built,
            1 => Self::Binding,
            2 => Self::Serving,
            3 => Self::Draining,
            _ => Self::Stopped,
        }
    }

    /// Human-readable state name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Built => "built",
            Self::Binding => "binding",
            Self::Serving => "serving",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, observable lifecycle handle.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    state: Arc<AtomicU8>,
}

impl Lifecycle {
    /// Creates a lifecycle in `Built`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Whether the server is serving and not draining.
    #[must_use]
    pub fn is_serving(&self) -> bool {
        self.state() == LifecycleState::Serving
    }

    /// Moves to a new state, logging the transition.
    pub fn transition(&self, to: LifecycleState) {
        let from = self.state.swap(to as u8, Ordering::SeqCst);
        tracing::info!(
            from = LifecycleState::from_u8(from).as_str(),
            to = to.as_str(),
            "lifecycle transition"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_built() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), LifecycleState::Built);
        assert!(!lifecycle.is_serving());
    }

    #[test]
    fn test_transitions() {
        let lifecycle = Lifecycle::new();
        lifecycle.transition(LifecycleState::Binding);
        lifecycle.transition(LifecycleState::Serving);
        assert!(lifecycle.is_serving());

        lifecycle.transition(LifecycleState::Draining);
        assert!(!lifecycle.is_serving());
        assert_eq!(lifecycle.state(), LifecycleState::Draining);
    }

    #[test]
    fn test_clones_observe_transitions() {
        let lifecycle = Lifecycle::new();
        let observer = lifecycle.clone();
        lifecycle.transition(LifecycleState::Stopped);
        assert_eq!(observer.state(), LifecycleState::Stopped);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(LifecycleState::Serving.as_str(), "serving");
        assert_eq!(LifecycleState::Draining.to_string(), "draining");
    }
}
