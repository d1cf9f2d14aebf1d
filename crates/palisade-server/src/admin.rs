//! The admin surface.
//!
//! Registered as ordinary routes when `serve_admin_routes` is enabled:
//!
//! | Path | Behavior |
//! |---|---|
//! | `GET /info` | Service name, version, build commit |
//! | `GET /metrics` | JSON dump of the metric registry |
//! | `GET /health` | Runs all health checks; 200 iff all healthy |
//! | `GET /ping` | `200 PONG` |
//! | `GET /ready` | 200 while serving and not draining |
//! | `GET /restart` | Drain, then bind and serve again |
//! | `GET /killkillkill` | Drain, then stop |
//!
//! `/restart` and `/killkillkill` carry no authentication of their own.
//! Operators must restrict them with the IP allow list; the server
//! exposes them unconditionally once admin routes are enabled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use http::StatusCode;
use palisade_core::{reply, RequestContext};
use palisade_telemetry::MetricRegistry;

use crate::health::HealthCheckRegistry;
use crate::lifecycle::Lifecycle;
use crate::routes::Routes;
use crate::shutdown::ShutdownSignal;

/// Identity reported by `/info`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ServiceInfo {
    /// Configured service name.
    pub service: String,
    /// Crate version baked in at build time.
    pub version: String,
    /// Build commit, when the build system provided one.
    pub commit: String,
}

impl ServiceInfo {
    /// Builds the info record for a service name.
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            commit: option_env!("PALISADE_BUILD_COMMIT")
                .unwrap_or("unknown")
                .to_string(),
        }
    }
}

/// Shared state the admin handlers close over.
#[derive(Debug, Clone)]
pub(crate) struct AdminState {
    pub registry: Arc<MetricRegistry>,
    pub health: HealthCheckRegistry,
    pub lifecycle: Lifecycle,
    pub shutdown: ShutdownSignal,
    pub restart_requested: Arc<AtomicBool>,
    pub info: ServiceInfo,
}

/// Registers the admin routes.
pub(crate) fn register_admin_routes(routes: &mut Routes, state: AdminState) {
    {
        let info = state.info.clone();
        routes.get("/info", move |_ctx: RequestContext| {
            let info = info.clone();
            async move { Ok(reply::json(StatusCode::OK, &info)) }
        });
    }

    {
        let registry = Arc::clone(&state.registry);
        routes.get("/metrics", move |_ctx: RequestContext| {
            let registry = Arc::clone(&registry);
            async move { Ok(reply::json(StatusCode::OK, &registry.snapshot())) }
        });
    }

    {
        let health = state.health.clone();
        routes.get("/health", move |_ctx: RequestContext| {
            let health = health.clone();
            async move {
                let report = health.run_all().await;
                let status = if report.all_healthy() {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                Ok(reply::json(status, &report))
            }
        });
    }

    routes.get("/ping", |_ctx: RequestContext| async {
        Ok(reply::text(StatusCode::OK, "PONG"))
    });

    {
        let lifecycle = state.lifecycle.clone();
        routes.get("/ready", move |_ctx: RequestContext| {
            let lifecycle = lifecycle.clone();
            async move {
                if lifecycle.is_serving() {
                    Ok(reply::text(StatusCode::OK, "OK"))
                } else {
                    Ok(reply::text(
                        StatusCode::SERVICE_UNAVAILABLE,
                        lifecycle.state().as_str(),
                    ))
                }
            }
        });
    }

    {
        let shutdown = state.shutdown.clone();
        let restart = Arc::clone(&state.restart_requested);
        routes.get("/restart", move |_ctx: RequestContext| {
            let shutdown = shutdown.clone();
            let restart = Arc::clone(&restart);
            async move {
                tracing::warn!("restart requested via admin route");
                restart.store(true, Ordering::SeqCst);
                shutdown.trigger();
                Ok(reply::text(StatusCode::OK, "restarting"))
            }
        });
    }

    {
        let shutdown = state.shutdown.clone();
        routes.get("/killkillkill", move |_ctx: RequestContext| {
            let shutdown = shutdown.clone();
            async move {
                tracing::warn!("shutdown requested via admin route");
                shutdown.trigger();
                Ok(reply::text(StatusCode::OK, "shutting down"))
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleState;
    use http::Method;
    use palisade_router::MatchOutcome;

    fn state() -> AdminState {
        AdminState {
            registry: Arc::new(MetricRegistry::new()),
            health: HealthCheckRegistry::new(2),
            lifecycle: Lifecycle::new(),
            shutdown: ShutdownSignal::new(),
            restart_requested: Arc::new(AtomicBool::new(false)),
            info: ServiceInfo::new("test-service"),
        }
    }

    fn admin_routes(state: AdminState) -> crate::routes::RouteTable {
        let mut routes = Routes::new();
        register_admin_routes(&mut routes, state);
        routes.compile(&MetricRegistry::new()).unwrap()
    }

    async fn invoke(table: &crate::routes::RouteTable, path: &str) -> palisade_core::Response {
        match table.match_route(&Method::GET, path) {
            MatchOutcome::Matched { route, .. } => {
                let ctx = RequestContext::builder().path(path).build();
                table.entry(route).handler.handle(ctx).await.unwrap()
            }
            other => panic!("no admin route for {path}: {other:?}"),
        }
    }

    #[test]
    fn test_all_admin_routes_registered() {
        let table = admin_routes(state());
        for path in [
            "/info",
            "/metrics",
            "/health",
            "/ping",
            "/ready",
            "/restart",
            "/killkillkill",
        ] {
            assert!(
                matches!(
                    table.match_route(&Method::GET, path),
                    MatchOutcome::Matched { .. }
                ),
                "missing admin route {path}"
            );
        }
    }

    #[tokio::test]
    async fn test_ping() {
        let table = admin_routes(state());
        let response = invoke(&table, "/ping").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_follows_lifecycle() {
        let state = state();
        let lifecycle = state.lifecycle.clone();
        let table = admin_routes(state);

        let response = invoke(&table, "/ready").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        lifecycle.transition(LifecycleState::Serving);
        let response = invoke(&table, "/ready").await;
        assert_eq!(response.status(), StatusCode::OK);

        lifecycle.transition(LifecycleState::Draining);
        let response = invoke(&table, "/ready").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_health_reflects_checks() {
        let state = state();
        state
            .health
            .register("db", || async { crate::health::HealthResult::Healthy });
        let table = admin_routes(state.clone());

        let response = invoke(&table, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        state.health.register("db", || async {
            crate::health::HealthResult::unhealthy("gone")
        });
        let response = invoke(&table, "/health").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_kill_triggers_shutdown() {
        let state = state();
        let shutdown = state.shutdown.clone();
        let restart = Arc::clone(&state.restart_requested);
        let table = admin_routes(state);

        let response = invoke(&table, "/killkillkill").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(shutdown.is_triggered());
        assert!(!restart.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_restart_sets_flag_and_triggers_shutdown() {
        let state = state();
        let shutdown = state.shutdown.clone();
        let restart = Arc::clone(&state.restart_requested);
        let table = admin_routes(state);

        let response = invoke(&table, "/restart").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(shutdown.is_triggered());
        assert!(restart.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_info_payload() {
        let table = admin_routes(state());
        let response = invoke(&table, "/info").await;
        assert_eq!(response.status(), StatusCode::OK);

        use http_body_util::BodyExt;
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload["service"], "test-service");
        assert!(payload["version"].is_string());
    }

    #[tokio::test]
    async fn test_metrics_dump() {
        let state = state();
        state.registry.meter("requests").mark();
        let table = admin_routes(state);

        let response = invoke(&table, "/metrics").await;
        use http_body_util::BodyExt;
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload["meters"]["requests"]["count"], 1);
    }
}
