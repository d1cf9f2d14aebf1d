//! The stage trait and chain plumbing.
//!
//! A [`Stage`] sees the request on the way in and the response on the way
//! out. It must call [`Next::run`] exactly once to continue the chain, or
//! return its own response to short-circuit (as CORS does for preflights
//! and the rate limiter does for `429`s).

use std::sync::Arc;

use palisade_core::BoxFuture;

use crate::context::StageContext;
use crate::types::{Request, Response};

/// One stage in the request pipeline.
pub trait Stage: Send + Sync + 'static {
    /// Stable stage name, used in logs.
    fn name(&self) -> &'static str;

    /// Processes the request, forwarding via `next` or short-circuiting.
    fn process<'a>(
        &'a self,
        ctx: &'a mut StageContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response>;
}

/// The terminal element of the chain — router dispatch, in practice.
pub trait Endpoint: Send + Sync + 'static {
    /// Produces the response for a request that cleared every stage.
    fn call<'a>(&'a self, ctx: &'a mut StageContext, request: Request)
        -> BoxFuture<'a, Response>;
}

impl<F> Endpoint for F
where
    F: for<'a> Fn(&'a mut StageContext, Request) -> BoxFuture<'a, Response>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(
        &'a self,
        ctx: &'a mut StageContext,
        request: Request,
    ) -> BoxFuture<'a, Response> {
        (self)(ctx, request)
    }
}

/// The remainder of the chain from a stage's point of view.
///
/// Consumed by [`run`](Next::run), so a stage can only continue the chain
/// once.
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    pub(crate) fn new(stages: &'a [Arc<dyn Stage>], endpoint: &'a dyn Endpoint) -> Self {
        Self { stages, endpoint }
    }

    /// Runs the rest of the chain: the next stage if one remains,
    /// otherwise the endpoint.
    pub async fn run(self, ctx: &mut StageContext, request: Request) -> Response {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next::new(rest, self.endpoint);
                stage.process(ctx, request, next).await
            }
            None => self.endpoint.call(ctx, request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;
    use palisade_core::{reply, CancelToken, Protocol};

    fn ctx() -> StageContext {
        StageContext::new(
            "127.0.0.1:1234".parse().unwrap(),
            Protocol::Http1,
            CancelToken::new(),
        )
    }

    fn request() -> Request {
        http::Request::builder()
            .uri("/test")
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
            Box::pin(async { reply::text(StatusCode::OK, "endpoint") })
        }
    }

    struct Tagging(&'static str);

    impl Stage for Tagging {
        fn name(&self) -> &'static str {
            self.0
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut StageContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                let mut response = next.run(ctx, request).await;
                response
                    .headers_mut()
                    .append("x-visited", self.0.parse().unwrap());
                response
            })
        }
    }

    #[tokio::test]
    async fn test_empty_chain_hits_endpoint() {
        let endpoint = OkEndpoint;
        let next = Next::new(&[], &endpoint);
        let response = next.run(&mut ctx(), request()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(Tagging("outer")), Arc::new(Tagging("inner"))];
        let endpoint = OkEndpoint;
        let next = Next::new(&stages, &endpoint);

        let response = next.run(&mut ctx(), request()).await;
        let visited: Vec<_> = response
            .headers()
            .get_all("x-visited")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        // Responses unwind inner-first.
        assert_eq!(visited, vec!["inner", "outer"]);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_endpoint() {
        struct Block;

        impl Stage for Block {
            fn name(&self) -> &'static str {
                "block"
            }

            fn process<'a>(
                &'a self,
                _ctx: &'a mut StageContext,
                _request: Request,
                _next: Next<'a>,
            ) -> BoxFuture<'a, Response> {
                Box::pin(async { reply::text(StatusCode::FORBIDDEN, "blocked") })
            }
        }

        let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(Block)];
        let endpoint = OkEndpoint;
        let next = Next::new(&stages, &endpoint);

        let response = next.run(&mut ctx(), request()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
