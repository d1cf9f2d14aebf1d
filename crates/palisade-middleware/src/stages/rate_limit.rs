//! Request-boundary rate limiting.
//!
//! Consults the per-IP limiter for every request that gets past CORS
//! preflight handling. A soft rejection answers `429` and keeps the
//! connection; a hard rejection answers `429` and flags the connection
//! for close, which the connection driver turns into a graceful shutdown
//! (HTTP/1.1 close, HTTP/2 GOAWAY) once the response is written.

use std::sync::Arc;

use http::{header, StatusCode};
use palisade_admission::{RateDecision, ServiceRateLimiter};
use palisade_core::{reply, BoxFuture};

use crate::context::StageContext;
use crate::stage::{Next, Stage};
use crate::types::{Request, Response};

/// The rate-limit stage.
#[derive(Debug)]
pub struct RateLimitStage {
    limiter: Arc<ServiceRateLimiter>,
}

impl RateLimitStage {
    /// Creates the stage over a shared limiter.
    #[must_use]
    pub fn new(limiter: Arc<ServiceRateLimiter>) -> Self {
        Self { limiter }
    }

    fn too_many_requests() -> Response {
        let mut response = reply::text(StatusCode::TOO_MANY_REQUESTS, "Too Many Requests");
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, http::HeaderValue::from_static("1"));
        response
    }
}

impl Stage for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate-limit"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut StageContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            match self.limiter.check(ctx.remote_addr().ip()) {
                RateDecision::Admit => next.run(ctx, request).await,
                RateDecision::SoftLimited => {
                    tracing::debug!(
                        remote = %ctx.remote_addr(),
                        "request soft rate limited"
                    );
                    Self::too_many_requests()
                }
                RateDecision::HardLimited => {
                    tracing::warn!(
                        remote = %ctx.remote_addr(),
                        "request hard rate limited, closing connection"
                    );
                    ctx.flag_connection_close();
                    Self::too_many_requests()
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Endpoint;
    use bytes::Bytes;
    use palisade_admission::RateLimiterConfig;
    use palisade_core::{CancelToken, Protocol};
    use palisade_telemetry::MetricRegistry;

    fn stage(soft: f64, hard: f64, burst: f64) -> RateLimitStage {
        let config = RateLimiterConfig {
            soft_req_per_sec: soft,
            hard_req_per_sec: hard,
            burst,
            ..RateLimiterConfig::default()
        };
        RateLimitStage::new(Arc::new(ServiceRateLimiter::new(
            &MetricRegistry::new(),
            config,
        )))
    }

    fn ctx() -> StageContext {
        StageContext::new(
            "192.0.2.1:55000".parse().unwrap(),
            Protocol::Http1,
            CancelToken::new(),
        )
    }

    fn request() -> Request {
        http::Request::builder()
            .uri("/x")
            .body(Bytes::new())
            .unwrap()
    }

    struct OkEndpoint;

    impl Endpoint for OkEndpoint {
        fn call<'a>(
            &'a self,
            _ctx: &'a mut StageContext,
            _request: Request,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async { reply::text(StatusCode::OK, "served") })
        }
    }

    async fn run(stage: &RateLimitStage, ctx: &mut StageContext) -> Response {
        let endpoint = OkEndpoint;
        let next = Next::new(&[], &endpoint);
        stage.process(ctx, request(), next).await
    }

    #[tokio::test]
    async fn test_within_budget_is_served() {
        let stage = stage(100.0, 200.0, 10.0);
        let mut ctx = ctx();
        let response = run(&stage, &mut ctx).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!ctx.close_connection());
    }

    #[tokio::test]
    async fn test_soft_limit_keeps_connection() {
        // burst=1: request 1 admitted, request 2 soft-limited.
        let stage = stage(0.0, 0.0, 1.0);
        let mut ctx = ctx();

        assert_eq!(run(&stage, &mut ctx).await.status(), StatusCode::OK);
        let response = run(&stage, &mut ctx).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
        assert!(!ctx.close_connection());
    }

    #[tokio::test]
    async fn test_hard_limit_flags_close() {
        let stage = stage(0.0, 0.0, 1.0);
        let mut ctx = ctx();

        let _ = run(&stage, &mut ctx).await; // admit (soft token)
        let _ = run(&stage, &mut ctx).await; // soft (hard token)
        let response = run(&stage, &mut ctx).await; // hard

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(ctx.close_connection());
    }
}
