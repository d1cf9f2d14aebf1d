//! Server configuration.
//!
//! Built with a fluent builder; validated once when the [`Server`] is
//! constructed. Contradictory options (a cert without a key, a hard rate
//! below the soft rate) are rejected there as configuration errors rather
//! than surfacing later at runtime.
//!
//! [`Server`]: crate::Server
//!
//! # Example
//!
//! ```rust
//! use palisade_server::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .port(8080)
//!     .max_connections(2_000)
//!     .soft_req_per_sec(500.0)
//!     .hard_req_per_sec(550.0)
//!     .burst(100.0)
//!     .deny_ip("10.0.0.0/8")
//!     .serve_admin_routes(true)
//!     .drain_timeout(Duration::from_secs(30))
//!     .build();
//!
//! assert_eq!(config.port(), 8080);
//! ```

use std::net::IpAddr;
use std::time::Duration;

use palisade_admission::RateLimiterConfig;
use palisade_middleware::stages::CorsConfig;
use palisade_telemetry::{LogConfig, ReporterConfig};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default cap on concurrently open connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 2_000;

/// Default graceful-drain timeout.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default delay before the first background health-check run, and
/// between runs.
pub const DEFAULT_HEALTH_CHECK_DELAY: Duration = Duration::from_secs(60);

/// Server configuration. Construct via [`ServerConfig::builder`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    bind_ip: IpAddr,
    port: u16,
    boss_threads: usize,
    worker_threads: Option<usize>,
    worker_name_format: String,
    max_connections: usize,
    ip_allow_list: Vec<String>,
    ip_deny_list: Vec<String>,
    rate: RateLimiterConfig,
    cert_pem: Option<String>,
    key_pem: Option<String>,
    allow_h2c: bool,
    cors: CorsConfig,
    serve_admin_routes: bool,
    run_background_health_checks: bool,
    health_check_initial_delay: Duration,
    health_check_delay: Duration,
    async_health_check_threads: usize,
    drain_timeout: Duration,
    service_name: String,
    reporters: ReporterConfig,
    log: LogConfig,
}

impl ServerConfig {
    /// Creates a configuration builder with defaults.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// IP address the listener binds.
    #[must_use]
    pub fn bind_ip(&self) -> IpAddr {
        self.bind_ip
    }

    /// Port the listener binds.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The full bind address.
    #[must_use]
    pub fn bind_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.bind_ip, self.port)
    }

    /// Advisory acceptor-thread count. The accept loop is a single task on
    /// the shared runtime; this knob exists for configuration parity and
    /// is not currently consulted.
    #[must_use]
    pub fn boss_threads(&self) -> usize {
        self.boss_threads
    }

    /// Worker thread count for [`build_runtime`](crate::build_runtime);
    /// `None` uses the tokio default (one per core).
    #[must_use]
    pub fn worker_threads(&self) -> Option<usize> {
        self.worker_threads
    }

    /// Format string for worker thread names; `{}` is replaced with the
    /// worker index.
    #[must_use]
    pub fn worker_name_format(&self) -> &str {
        &self.worker_name_format
    }

    /// Cap on concurrently open connections.
    #[must_use]
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// CIDR allow list. Non-empty means only matching peers connect.
    #[must_use]
    pub fn ip_allow_list(&self) -> &[String] {
        &self.ip_allow_list
    }

    /// CIDR deny list.
    #[must_use]
    pub fn ip_deny_list(&self) -> &[String] {
        &self.ip_deny_list
    }

    /// Rate limiter thresholds.
    #[must_use]
    pub fn rate(&self) -> &RateLimiterConfig {
        &self.rate
    }

    /// PEM certificate chain, when TLS is configured.
    #[must_use]
    pub fn cert_pem(&self) -> Option<&str> {
        self.cert_pem.as_deref()
    }

    /// PEM private key, when TLS is configured.
    #[must_use]
    pub fn key_pem(&self) -> Option<&str> {
        self.key_pem.as_deref()
    }

    /// Whether a cleartext HTTP/2 preface is accepted on a plaintext port.
    #[must_use]
    pub fn allow_h2c(&self) -> bool {
        self.allow_h2c
    }

    /// CORS configuration.
    #[must_use]
    pub fn cors(&self) -> &CorsConfig {
        &self.cors
    }

    /// Whether the admin surface is registered.
    #[must_use]
    pub fn serve_admin_routes(&self) -> bool {
        self.serve_admin_routes
    }

    /// Whether health checks run on a background schedule.
    #[must_use]
    pub fn run_background_health_checks(&self) -> bool {
        self.run_background_health_checks
    }

    /// Delay before the first background health-check run.
    #[must_use]
    pub fn health_check_initial_delay(&self) -> Duration {
        self.health_check_initial_delay
    }

    /// Delay between background health-check runs.
    #[must_use]
    pub fn health_check_delay(&self) -> Duration {
        self.health_check_delay
    }

    /// Concurrency bound for health-check execution.
    #[must_use]
    pub fn async_health_check_threads(&self) -> usize {
        self.async_health_check_threads
    }

    /// How long draining waits for in-flight connections before forcing
    /// them closed.
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Service name reported by `/info`.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Metric reporter toggles.
    #[must_use]
    pub fn reporters(&self) -> &ReporterConfig {
        &self.reporters
    }

    /// Logging configuration.
    #[must_use]
    pub fn log(&self) -> &LogConfig {
        &self.log
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self {
            config: ServerConfig {
                bind_ip: IpAddr::from([0, 0, 0, 0]),
                port: DEFAULT_PORT,
                boss_threads: 1,
                worker_threads: None,
                worker_name_format: "palisade-worker-{}".to_string(),
                max_connections: DEFAULT_MAX_CONNECTIONS,
                ip_allow_list: Vec::new(),
                ip_deny_list: Vec::new(),
                rate: RateLimiterConfig::default(),
                cert_pem: None,
                key_pem: None,
                allow_h2c: false,
                cors: CorsConfig::default(),
                serve_admin_routes: false,
                run_background_health_checks: false,
                health_check_initial_delay: DEFAULT_HEALTH_CHECK_DELAY,
                health_check_delay: DEFAULT_HEALTH_CHECK_DELAY,
                async_health_check_threads: 4,
                drain_timeout: DEFAULT_DRAIN_TIMEOUT,
                service_name: "palisade".to_string(),
                reporters: ReporterConfig::default(),
                log: LogConfig::default(),
            },
        }
    }
}

impl ServerConfigBuilder {
    /// Sets the bind IP (default `0.0.0.0`).
    #[must_use]
    pub fn bind_ip(mut self, ip: IpAddr) -> Self {
        self.config.bind_ip = ip;
        self
    }

    /// Sets the listen port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the advisory acceptor-thread count.
    #[must_use]
    pub fn boss_threads(mut self, count: usize) -> Self {
        self.config.boss_threads = count;
        self
    }

    /// Sets the worker thread count used by
    /// [`build_runtime`](crate::build_runtime).
    #[must_use]
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.worker_threads = Some(count);
        self
    }

    /// Sets the worker thread name format (`{}` becomes the index).
    #[must_use]
    pub fn worker_name_format(mut self, format: impl Into<String>) -> Self {
        self.config.worker_name_format = format.into();
        self
    }

    /// Sets the global connection cap.
    #[must_use]
    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    /// Adds a CIDR range to the allow list.
    #[must_use]
    pub fn allow_ip(mut self, cidr: impl Into<String>) -> Self {
        self.config.ip_allow_list.push(cidr.into());
        self
    }

    /// Adds a CIDR range to the deny list.
    #[must_use]
    pub fn deny_ip(mut self, cidr: impl Into<String>) -> Self {
        self.config.ip_deny_list.push(cidr.into());
        self
    }

    /// Sets the soft rate threshold (requests/second per IP).
    #[must_use]
    pub fn soft_req_per_sec(mut self, rate: f64) -> Self {
        self.config.rate.soft_req_per_sec = rate;
        self
    }

    /// Sets the hard rate threshold (requests/second per IP).
    #[must_use]
    pub fn hard_req_per_sec(mut self, rate: f64) -> Self {
        self.config.rate.hard_req_per_sec = rate;
        self
    }

    /// Sets the token bucket capacity.
    #[must_use]
    pub fn burst(mut self, burst: f64) -> Self {
        self.config.rate.burst = burst;
        self
    }

    /// Sets the rate-limiter idle eviction timeout.
    #[must_use]
    pub fn rate_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.rate.idle_timeout = timeout;
        self
    }

    /// Sets the full rate limiter configuration at once.
    #[must_use]
    pub fn rate_config(mut self, rate: RateLimiterConfig) -> Self {
        self.config.rate = rate;
        self
    }

    /// Sets the TLS certificate chain and private key, both PEM.
    #[must_use]
    pub fn tls_pem(mut self, cert_pem: impl Into<String>, key_pem: impl Into<String>) -> Self {
        self.config.cert_pem = Some(cert_pem.into());
        self.config.key_pem = Some(key_pem.into());
        self
    }

    /// Accepts the cleartext HTTP/2 preface on a plaintext port.
    #[must_use]
    pub fn allow_h2c(mut self, allow: bool) -> Self {
        self.config.allow_h2c = allow;
        self
    }

    /// Sets the CORS configuration.
    #[must_use]
    pub fn cors(mut self, cors: CorsConfig) -> Self {
        self.config.cors = cors;
        self
    }

    /// Registers the admin surface (`/info`, `/metrics`, `/health`,
    /// `/ping`, `/ready`, `/restart`, `/killkillkill`).
    #[must_use]
    pub fn serve_admin_routes(mut self, serve: bool) -> Self {
        self.config.serve_admin_routes = serve;
        self
    }

    /// Runs registered health checks on a background schedule.
    #[must_use]
    pub fn run_background_health_checks(mut self, run: bool) -> Self {
        self.config.run_background_health_checks = run;
        self
    }

    /// Sets the background health-check schedule.
    #[must_use]
    pub fn health_check_schedule(mut self, initial_delay: Duration, delay: Duration) -> Self {
        self.config.health_check_initial_delay = initial_delay;
        self.config.health_check_delay = delay;
        self
    }

    /// Bounds concurrent health-check execution.
    #[must_use]
    pub fn async_health_check_threads(mut self, count: usize) -> Self {
        self.config.async_health_check_threads = count;
        self
    }

    /// Sets the drain timeout.
    #[must_use]
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.drain_timeout = timeout;
        self
    }

    /// Sets the service name reported by `/info`.
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service_name = name.into();
        self
    }

    /// Sets the metric reporter configuration.
    #[must_use]
    pub fn reporters(mut self, reporters: ReporterConfig) -> Self {
        self.config.reporters = reporters;
        self
    }

    /// Sets the logging configuration.
    #[must_use]
    pub fn log(mut self, log: LogConfig) -> Self {
        self.config.log = log;
        self
    }

    /// Builds the configuration.
    ///
    /// Cross-field validation happens in [`Server::new`](crate::Server::new),
    /// which has the full picture.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        self.config
    }
}
