//! The server orchestrator.
//!
//! Owns the whole ingress pipeline: it freezes the route table, builds
//! the shared context and admission pieces, binds the listener, and runs
//! the accept loop until shut down. Per accepted connection the order is
//! fixed: connection-limiter gate, IP filter, then TLS handshake and
//! protocol negotiation inside the spawned connection task.
//!
//! Lifecycle: `Built → Binding → Serving → Draining → Stopped`, with
//! `/restart` looping from `Draining` back to `Binding`. The route table
//! is compiled exactly once — routes registered after
//! [`listen_and_serve`](Server::listen_and_serve) starts are ignored,
//! and a restart serves the same snapshot.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;

use palisade_admission::{ConnectionLimiter, Firewall, IpFilter, ServiceRateLimiter};
use palisade_core::{CancelToken, Error};
use palisade_middleware::stages::{CorsStage, MeteringStage, RateLimitStage};
use palisade_middleware::Pipeline;
use palisade_telemetry::{start_reporters, MetricRegistry};

use crate::admin::{register_admin_routes, AdminState, ServiceInfo};
use crate::config::ServerConfig;
use crate::conn::{handle_connection, ConnectionEnv};
use crate::context::ServerContext;
use crate::dispatch::Dispatcher;
use crate::health::{HealthCheck, HealthCheckRegistry};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::routes::Routes;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};
use crate::tls::TlsContext;

/// Accept-loop retry backoff bounds.
const ACCEPT_BACKOFF_START: Duration = Duration::from_millis(100);
const ACCEPT_BACKOFF_CAP: Duration = Duration::from_secs(1);

/// The Palisade server.
///
/// # Example
///
/// ```rust,ignore
/// use palisade_server::{Server, ServerConfig};
/// use palisade_core::{reply, RequestContext};
/// use http::StatusCode;
///
/// let mut server = Server::new(ServerConfig::builder().port(8080).build())?;
/// server.routes_mut().get("/users/{id}", |ctx: RequestContext| async move {
///     let id = ctx.param("id").unwrap_or("?").to_string();
///     Ok(reply::text(StatusCode::OK, id))
/// });
/// server.listen_and_serve().await?;
/// ```
pub struct Server {
    config: ServerConfig,
    routes: Routes,
    registry: Arc<MetricRegistry>,
    health: HealthCheckRegistry,
    tls: Option<TlsContext>,
    lifecycle: Lifecycle,
    shutdown: ShutdownSignal,
    restart_requested: Arc<AtomicBool>,
    bound_tx: watch::Sender<Option<SocketAddr>>,
    bound_rx: watch::Receiver<Option<SocketAddr>>,
}

impl Server {
    /// Creates a server, validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on contradictory options or bad TLS
    /// material.
    pub fn new(config: ServerConfig) -> Result<Self, Error> {
        validate(&config)?;

        let tls = match (config.cert_pem(), config.key_pem()) {
            (Some(cert), Some(key)) => Some(TlsContext::from_pem(cert, key)?),
            (None, None) => None,
            _ => {
                return Err(Error::config(
                    "TLS requires both a certificate and a key",
                ))
            }
        };

        let (bound_tx, bound_rx) = watch::channel(None);

        Ok(Self {
            health: HealthCheckRegistry::new(config.async_health_check_threads()),
            config,
            routes: Routes::new(),
            registry: Arc::new(MetricRegistry::new()),
            tls,
            lifecycle: Lifecycle::new(),
            shutdown: ShutdownSignal::new(),
            restart_requested: Arc::new(AtomicBool::new(false)),
            bound_tx,
            bound_rx,
        })
    }

    /// The mutable route set. Registrations only count until
    /// [`listen_and_serve`](Server::listen_and_serve) freezes the table.
    pub fn routes_mut(&mut self) -> &mut Routes {
        &mut self.routes
    }

    /// Registers a health check.
    pub fn add_health_check(&self, name: impl Into<String>, check: impl HealthCheck) {
        self.health.register(name, check);
    }

    /// The server's metric registry.
    #[must_use]
    pub fn metric_registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// A handle for observing and controlling the running server.
    #[must_use]
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: self.shutdown.clone(),
            lifecycle: self.lifecycle.clone(),
            bound: self.bound_rx.clone(),
        }
    }

    /// Binds the listener and serves until stopped.
    ///
    /// Consumes the server, so it can only run once. Blocks (as a future)
    /// until the lifecycle reaches `Stopped`: a clean `/killkillkill`
    /// shutdown returns `Ok(())`, `/restart` drains and re-binds
    /// internally without returning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for route-compilation failures and
    /// [`Error::Bind`] when the listener cannot bind.
    pub async fn listen_and_serve(mut self) -> Result<(), Error> {
        if self.config.serve_admin_routes() {
            register_admin_routes(
                &mut self.routes,
                AdminState {
                    registry: Arc::clone(&self.registry),
                    health: self.health.clone(),
                    lifecycle: self.lifecycle.clone(),
                    shutdown: self.shutdown.clone(),
                    restart_requested: Arc::clone(&self.restart_requested),
                    info: ServiceInfo::new(self.config.service_name()),
                },
            );
        }

        // Freeze the route table. Registrations after this point are gone.
        let table = Arc::new(self.routes.compile(&self.registry)?);
        let context = Arc::new(ServerContext::new(Arc::clone(&self.registry), table));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&context)));

        let rate_limiter = Arc::new(ServiceRateLimiter::new(
            &self.registry,
            self.config.rate().clone(),
        ));
        let pipeline = Arc::new(Pipeline::new(vec![
            Arc::new(MeteringStage::new(&self.registry)),
            Arc::new(CorsStage::new(self.config.cors().clone())),
            Arc::new(RateLimitStage::new(Arc::clone(&rate_limiter))),
        ]));

        let limiter = ConnectionLimiter::new(&self.registry, self.config.max_connections());
        let ip_filter = IpFilter::from_config(
            &self.registry,
            self.config.ip_allow_list(),
            self.config.ip_deny_list(),
        )?;
        let firewall = Firewall::new(&self.registry);

        let reporter_handles =
            start_reporters(Arc::clone(&self.registry), self.config.reporters());
        let health_handle = if self.config.run_background_health_checks() {
            Some(self.health.spawn_background(
                self.config.health_check_initial_delay(),
                self.config.health_check_delay(),
            ))
        } else {
            None
        };

        let result = self
            .serve_loop(&limiter, &ip_filter, &firewall, &pipeline, &dispatcher)
            .await;

        for handle in reporter_handles {
            handle.abort();
        }
        if let Some(handle) = health_handle {
            handle.abort();
        }

        result
    }

    async fn serve_loop(
        &mut self,
        limiter: &ConnectionLimiter,
        ip_filter: &IpFilter,
        firewall: &Firewall,
        pipeline: &Arc<Pipeline>,
        dispatcher: &Arc<Dispatcher>,
    ) -> Result<(), Error> {
        let addr = self.config.bind_addr();

        loop {
            self.lifecycle.transition(LifecycleState::Binding);
            let listener = TcpListener::bind(addr)
                .await
                .map_err(|e| Error::bind(addr.to_string(), e))?;
            let local_addr = listener.local_addr().map_err(Error::Io)?;

            self.lifecycle.transition(LifecycleState::Serving);
            let _ = self.bound_tx.send(Some(local_addr));
            tracing::info!(
                address = %local_addr,
                max_connections = limiter.max_connections(),
                tls = self.tls.is_some(),
                "listening"
            );

            let tracker = ConnectionTracker::new();
            let drain = ShutdownSignal::new();
            let force = CancelToken::new();
            let env = Arc::new(ConnectionEnv {
                pipeline: Arc::clone(pipeline),
                dispatcher: Arc::clone(dispatcher),
                firewall: firewall.clone(),
                drain: drain.clone(),
                tls: self.tls.as_ref().map(TlsContext::acceptor),
                allow_h2c: self.config.allow_h2c(),
            });

            let mut backoff = ACCEPT_BACKOFF_START;
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, remote)) => {
                            backoff = ACCEPT_BACKOFF_START;

                            // Limiter gate first: on refusal the socket is
                            // accepted and dropped with nothing written.
                            let Some(guard) = limiter.try_acquire() else {
                                tracing::debug!(%remote, "connection rejected: at capacity");
                                continue;
                            };
                            if !ip_filter.admit(remote.ip()) {
                                continue;
                            }

                            let conn_id = guard.connection_id();
                            let env = Arc::clone(&env);
                            let token = tracker.acquire();
                            let force = force.clone();
                            tokio::spawn(async move {
                                let _guard = guard;
                                let _token = token;
                                tokio::select! {
                                    _ = handle_connection(env, stream, remote, conn_id) => {}
                                    _ = force.cancelled() => {}
                                }
                            });
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, backoff = ?backoff, "accept failed");
                            tokio::time::sleep(backoff).await;
                            backoff = (backoff * 2).min(ACCEPT_BACKOFF_CAP);
                        }
                    },
                    _ = self.shutdown.recv() => break,
                }
            }

            // Drain: stop accepting, let in-flight connections finish.
            self.lifecycle.transition(LifecycleState::Draining);
            let _ = self.bound_tx.send(None);
            drop(listener);
            drain.trigger();

            tokio::select! {
                _ = tracker.wait_idle() => {
                    tracing::info!("drain complete");
                }
                _ = tokio::time::sleep(self.config.drain_timeout()) => {
                    tracing::warn!(
                        active = tracker.active(),
                        "drain timeout reached, forcing remaining connections closed"
                    );
                    force.cancel();
                    tracker.wait_idle().await;
                }
            }

            if self.restart_requested.swap(false, Ordering::SeqCst) {
                tracing::info!("restarting");
                self.shutdown.reset();
                continue;
            }

            self.lifecycle.transition(LifecycleState::Stopped);
            tracing::info!("stopped");
            return Ok(());
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("routes", &self.routes)
            .field("state", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}

/// Observe-and-control handle for a running server.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    shutdown: ShutdownSignal,
    lifecycle: Lifecycle,
    bound: watch::Receiver<Option<SocketAddr>>,
}

impl ServerHandle {
    /// Triggers a drain-then-stop, as `/killkillkill` does.
    pub fn trigger_shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Waits for the listener to bind and returns its local address.
    ///
    /// # Errors
    ///
    /// Returns an error if the server stops before ever binding.
    pub async fn bound_addr(&self) -> Result<SocketAddr, Error> {
        let mut bound = self.bound.clone();
        loop {
            if let Some(addr) = *bound.borrow_and_update() {
                return Ok(addr);
            }
            bound
                .changed()
                .await
                .map_err(|_| Error::config("server stopped before binding"))?;
        }
    }
}

fn validate(config: &ServerConfig) -> Result<(), Error> {
    let rate = config.rate();
    if rate.hard_req_per_sec < rate.soft_req_per_sec {
        return Err(Error::config(format!(
            "hard rate ({}) must be at least the soft rate ({})",
            rate.hard_req_per_sec, rate.soft_req_per_sec
        )));
    }
    if rate.burst < 1.0 {
        return Err(Error::config("burst must be at least 1"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use palisade_core::{reply, RequestContext};

    #[test]
    fn test_new_with_defaults() {
        let server = Server::new(ServerConfig::default()).unwrap();
        assert_eq!(server.handle().state(), LifecycleState::Built);
    }

    #[test]
    fn test_validate_rejects_hard_below_soft() {
        let config = ServerConfig::builder()
            .soft_req_per_sec(100.0)
            .hard_req_per_sec(50.0)
            .build();
        assert!(matches!(Server::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_burst() {
        let config = ServerConfig::builder().burst(0.0).build();
        assert!(matches!(Server::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_bad_cidr_fails_at_serve_time() {
        let config = ServerConfig::builder().deny_ip("not-a-cidr").build();
        let mut server = Server::new(config).unwrap();
        server.routes_mut().get("/x", |_ctx: RequestContext| async {
            Ok(reply::empty(StatusCode::OK))
        });

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let result = runtime.block_on(server.listen_and_serve());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_bind_failure_is_bind_error() {
        // Bind a socket, then configure the server on the same port.
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let config = ServerConfig::builder()
            .bind_ip("127.0.0.1".parse().unwrap())
            .port(port)
            .build();
        let server = Server::new(config).unwrap();

        let result = server.listen_and_serve().await;
        assert!(matches!(result, Err(Error::Bind { .. })));
    }

    #[tokio::test]
    async fn test_serve_and_external_shutdown() {
        let config = ServerConfig::builder()
            .bind_ip("127.0.0.1".parse().unwrap())
            .port(0)
            .drain_timeout(Duration::from_millis(200))
            .build();
        let server = Server::new(config).unwrap();
        let handle = server.handle();

        let task = tokio::spawn(server.listen_and_serve());
        let addr = handle.bound_addr().await.unwrap();
        assert_eq!(handle.state(), LifecycleState::Serving);
        assert!(addr.port() > 0);

        handle.trigger_shutdown();
        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("server should stop")
            .expect("no panic");
        assert!(result.is_ok());
        assert_eq!(handle.state(), LifecycleState::Stopped);
    }
}
