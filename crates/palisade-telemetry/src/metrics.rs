//! The metric registry.
//!
//! Three instrument kinds:
//!
//! - [`Meter`] — monotonic event count plus mean rate (events/sec)
//! - [`Counter`] — a signed up/down counter
//! - [`Timer`] — duration accumulator reporting mean milliseconds
//!
//! Handles are `Arc`-shared and internally atomic, so the hot path (mark,
//! inc, record) is lock-free. The registry lock is only taken when an
//! instrument is first created and when a snapshot is rendered.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;

/// A monotonic event meter.
///
/// Tracks a total count and the mean rate since creation.
#[derive(Debug)]
pub struct Meter {
    count: AtomicU64,
    started: Instant,
}

impl Meter {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Records one event.
    pub fn mark(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records `n` events at once.
    pub fn mark_n(&self, n: u64) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    /// Total events recorded.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Mean events per second since the meter was created.
    #[must_use]
    pub fn mean_rate(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            0.0
        } else {
            self.count() as f64 / elapsed
        }
    }
}

/// A signed up/down counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicI64,
}

impl Counter {
    /// Increments by one.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements by one.
    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    /// Adds a signed delta.
    pub fn add(&self, delta: i64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A duration accumulator.
#[derive(Debug, Default)]
pub struct Timer {
    count: AtomicU64,
    total_nanos: AtomicU64,
}

impl Timer {
    /// Records one observed duration.
    pub fn record(&self, duration: Duration) {
        self.count.fetch_add(1, Ordering::Relaxed);
        // Saturating: ~584 years of accumulated time before overflow.
        self.total_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Number of recorded observations.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Mean observed duration in milliseconds.
    #[must_use]
    pub fn mean_ms(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            let total = self.total_nanos.load(Ordering::Relaxed) as f64;
            total / count as f64 / 1_000_000.0
        }
    }
}

#[derive(Debug, Default)]
struct Instruments {
    meters: BTreeMap<String, Arc<Meter>>,
    counters: BTreeMap<String, Arc<Counter>>,
    timers: BTreeMap<String, Arc<Timer>>,
}

/// A registry of named instruments.
///
/// Cheap to clone handles out of; intended to be owned by the server and
/// shared via `Arc`. See the [crate docs](crate) for an example.
#[derive(Debug, Default)]
pub struct MetricRegistry {
    inner: RwLock<Instruments>,
}

impl MetricRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the meter registered under `name`, creating it on first use.
    #[must_use]
    pub fn meter(&self, name: &str) -> Arc<Meter> {
        if let Some(m) = self.inner.read().expect("registry lock").meters.get(name) {
            return Arc::clone(m);
        }
        let mut inner = self.inner.write().expect("registry lock");
        Arc::clone(
            inner
                .meters
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Meter::new())),
        )
    }

    /// Returns the counter registered under `name`, creating it on first use.
    #[must_use]
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        if let Some(c) = self.inner.read().expect("registry lock").counters.get(name) {
            return Arc::clone(c);
        }
        let mut inner = self.inner.write().expect("registry lock");
        Arc::clone(
            inner
                .counters
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Counter::default())),
        )
    }

    /// Returns the timer registered under `name`, creating it on first use.
    #[must_use]
    pub fn timer(&self, name: &str) -> Arc<Timer> {
        if let Some(t) = self.inner.read().expect("registry lock").timers.get(name) {
            return Arc::clone(t);
        }
        let mut inner = self.inner.write().expect("registry lock");
        Arc::clone(
            inner
                .timers
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Timer::default())),
        )
    }

    /// Renders a point-in-time snapshot of every instrument.
    ///
    /// Rates are events/second; durations are milliseconds.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read().expect("registry lock");
        MetricsSnapshot {
            meters: inner
                .meters
                .iter()
                .map(|(name, m)| {
                    (
                        name.clone(),
                        MeterSnapshot {
                            count: m.count(),
                            mean_rate: m.mean_rate(),
                        },
                    )
                })
                .collect(),
            counters: inner
                .counters
                .iter()
                .map(|(name, c)| (name.clone(), c.value()))
                .collect(),
            timers: inner
                .timers
                .iter()
                .map(|(name, t)| {
                    (
                        name.clone(),
                        TimerSnapshot {
                            count: t.count(),
                            mean_ms: t.mean_ms(),
                        },
                    )
                })
                .collect(),
        }
    }
}

/// Point-in-time view of a [`Meter`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MeterSnapshot {
    /// Total events.
    pub count: u64,
    /// Mean events per second.
    pub mean_rate: f64,
}

/// Point-in-time view of a [`Timer`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimerSnapshot {
    /// Total observations.
    pub count: u64,
    /// Mean duration in milliseconds.
    pub mean_ms: f64,
}

/// Point-in-time view of a whole registry, serializable to JSON.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    /// All meters by name.
    pub meters: BTreeMap<String, MeterSnapshot>,
    /// All counters by name.
    pub counters: BTreeMap<String, i64>,
    /// All timers by name.
    pub timers: BTreeMap<String, TimerSnapshot>,
}
