//! Two-tier per-IP rate limiting.
//!
//! Each remote IP gets a token record with two buckets refilled lazily on
//! access: a **soft** bucket (refilled at `soft_req_per_sec`) and a
//! **hard** bucket (refilled at `hard_req_per_sec`). Both are capped at
//! `burst`. A request that finds the soft bucket empty is answered `429`
//! but the connection stays open; once the hard bucket is empty too, the
//! connection is closed after the `429`. When both would fire, hard wins.
//!
//! Records live in 16 mutex-guarded shards keyed by IP hash, so hot IPs
//! on different shards never contend. A shared global bucket gates the
//! creation of records for first-seen IPs, bounding map growth under
//! address-spraying attacks. Idle records whose buckets have logically
//! refilled to full are evicted opportunistically whenever a new record
//! is inserted into their shard.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use palisade_telemetry::{Meter, MetricRegistry};

/// Number of independently locked shards in the per-IP map.
const SHARD_COUNT: usize = 16;

/// Rate limiter thresholds.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Soft refill rate in requests/second. Exceeding it yields `429`.
    pub soft_req_per_sec: f64,
    /// Hard refill rate in requests/second. Exceeding it also closes the
    /// connection.
    pub hard_req_per_sec: f64,
    /// Bucket capacity; token counts are clamped to `[0, burst]`.
    pub burst: f64,
    /// Records idle this long (with full buckets) are eviction-eligible.
    pub idle_timeout: Duration,
    /// Refill rate of the global first-seen bucket, requests/second.
    pub global_req_per_sec: f64,
    /// Capacity of the global first-seen bucket.
    pub global_burst: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            soft_req_per_sec: 500.0,
            hard_req_per_sec: 550.0,
            burst: 100.0,
            idle_timeout: Duration::from_secs(120),
            global_req_per_sec: 2_000.0,
            global_burst: 500.0,
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Within the soft budget; serve the request.
    Admit,
    /// Soft budget exhausted; answer `429` and keep the connection.
    SoftLimited,
    /// Hard budget exhausted too; answer `429` and close the connection.
    HardLimited,
}

#[derive(Debug)]
struct TokenRecord {
    soft: f64,
    hard: f64,
    last_refill: Instant,
}

impl TokenRecord {
    fn full(burst: f64, now: Instant) -> Self {
        Self {
            soft: burst,
            hard: burst,
            last_refill: now,
        }
    }

    fn refill(&mut self, config: &RateLimiterConfig, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.soft = (self.soft + elapsed * config.soft_req_per_sec).min(config.burst);
        self.hard = (self.hard + elapsed * config.hard_req_per_sec).min(config.burst);
        self.last_refill = now;
    }

    /// Eviction eligibility without mutating the record: idle past the
    /// timeout and both buckets logically back at capacity.
    fn evictable(&self, config: &RateLimiterConfig, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed < config.idle_timeout {
            return false;
        }
        let secs = elapsed.as_secs_f64();
        self.soft + secs * config.soft_req_per_sec >= config.burst
            && self.hard + secs * config.hard_req_per_sec >= config.burst
    }
}

#[derive(Debug)]
struct GlobalBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-remote-IP request-rate admission with soft and hard tiers.
///
/// # Example
///
/// ```rust
/// use palisade_admission::{RateDecision, RateLimiterConfig, ServiceRateLimiter};
/// use palisade_telemetry::MetricRegistry;
/// use std::time::Duration;
///
/// let config = RateLimiterConfig {
///     soft_req_per_sec: 2.0,
///     hard_req_per_sec: 4.0,
///     burst: 2.0,
///     ..RateLimiterConfig::default()
/// };
/// let limiter = ServiceRateLimiter::new(&MetricRegistry::new(), config);
/// let ip = "192.0.2.1".parse().unwrap();
///
/// assert_eq!(limiter.check(ip), RateDecision::Admit);
/// assert_eq!(limiter.check(ip), RateDecision::Admit);
/// assert_eq!(limiter.check(ip), RateDecision::SoftLimited);
/// ```
#[derive(Debug)]
pub struct ServiceRateLimiter {
    shards: Vec<Mutex<HashMap<IpAddr, TokenRecord>>>,
    global: Mutex<GlobalBucket>,
    config: RateLimiterConfig,
    soft_limited: Arc<Meter>,
    hard_limited: Arc<Meter>,
}

impl ServiceRateLimiter {
    /// Creates the limiter, registering its admission meters.
    #[must_use]
    pub fn new(registry: &MetricRegistry, config: RateLimiterConfig) -> Self {
        Self {
            shards: (0..SHARD_COUNT)
                .map(|_| Mutex::new(HashMap::new()))
                .collect(),
            global: Mutex::new(GlobalBucket {
                tokens: config.global_burst,
                last_refill: Instant::now(),
            }),
            config,
            soft_limited: registry.meter("requests.softRateLimited"),
            hard_limited: registry.meter("requests.hardRateLimited"),
        }
    }

    /// Checks (and accounts) one request from `remote`.
    #[must_use]
    pub fn check(&self, remote: IpAddr) -> RateDecision {
        self.check_at(remote, Instant::now())
    }

    /// [`check`](Self::check) with an injected clock, for tests.
    #[must_use]
    pub fn check_at(&self, remote: IpAddr, now: Instant) -> RateDecision {
        let shard = &self.shards[shard_index(&remote)];
        let mut map = shard.lock().expect("rate limiter shard lock");

        if let Some(record) = map.get_mut(&remote) {
            record.refill(&self.config, now);
            return self.decide(record);
        }

        // First sight of this IP: the global bucket gates map insertion so
        // an address-spraying attack cannot grow the map without bound.
        if !self.take_global_token(now) {
            self.soft_limited.mark();
            tracing::debug!(%remote, "first-seen admission denied by global bucket");
            return RateDecision::SoftLimited;
        }

        // Opportunistic eviction of idle, fully-refilled records.
        let config = &self.config;
        map.retain(|_, record| !record.evictable(config, now));

        let mut record = TokenRecord::full(self.config.burst, now);
        let decision = self.decide(&mut record);
        map.insert(remote, record);
        decision
    }

    fn decide(&self, record: &mut TokenRecord) -> RateDecision {
        if record.soft >= 1.0 {
            record.soft -= 1.0;
            RateDecision::Admit
        } else if record.hard >= 1.0 {
            record.hard -= 1.0;
            self.soft_limited.mark();
            RateDecision::SoftLimited
        } else {
            self.hard_limited.mark();
            RateDecision::HardLimited
        }
    }

    fn take_global_token(&self, now: Instant) -> bool {
        let mut bucket = self.global.lock().expect("rate limiter global lock");
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens =
            (bucket.tokens + elapsed * self.config.global_req_per_sec).min(self.config.global_burst);
        bucket.last_refill = now;
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Number of IPs currently tracked, across all shards.
    #[must_use]
    pub fn tracked_ips(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().expect("rate limiter shard lock").len())
            .sum()
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}

fn shard_index(remote: &IpAddr) -> usize {
    let mut hasher = DefaultHasher::new();
    remote.hash(&mut hasher);
    (hasher.finish() as usize) % SHARD_COUNT
}
