//! Terminal dispatch: router lookup and handler invocation.
//!
//! The [`Dispatcher`] sits at the end of the stage pipeline. It resolves
//! the route, builds the handler's [`RequestContext`], and maps the three
//! failure shapes to their responses: no path match is `404`, a path that
//! only exists under other methods is `405` with an `Allow` header, and
//! an error escaping a handler is a logged `500`.

use std::collections::HashMap;
use std::sync::Arc;

use http::{header, StatusCode};
use palisade_core::{reply, BoxFuture, RequestContext, Response, ResponseExt};
use palisade_middleware::{Endpoint, Request, StageContext};
use palisade_router::MatchOutcome;

use crate::context::ServerContext;

/// The pipeline endpoint: routes and invokes handlers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    context: Arc<ServerContext>,
}

impl Dispatcher {
    /// Creates a dispatcher over the server context.
    #[must_use]
    pub fn new(context: Arc<ServerContext>) -> Self {
        Self { context }
    }

    async fn dispatch(&self, ctx: &mut StageContext, request: Request) -> Response {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        match self.context.table().match_route(&method, &path) {
            MatchOutcome::Matched { route, params } => {
                let entry = self.context.table().entry(route);
                entry.meter.mark();

                let (parts, body) = request.into_parts();
                let params: HashMap<String, String> = params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();

                let request_id = ctx.request_id();
                let request_ctx = RequestContext::builder()
                    .request_id(request_id)
                    .method(parts.method)
                    .path(path)
                    .headers(parts.headers)
                    .body(body)
                    .params(params)
                    .remote_addr(ctx.remote_addr())
                    .protocol(ctx.protocol())
                    .cancel_token(ctx.cancel_token().clone())
                    .extension(Arc::clone(&self.context))
                    .build();

                match entry.handler.handle(request_ctx).await {
                    Ok(response) => response,
                    Err(error) => {
                        tracing::error!(
                            request_id = %request_id,
                            route = %entry.pattern,
                            %error,
                            "handler error"
                        );
                        Response::json_error(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "INTERNAL_ERROR",
                            "internal server error",
                        )
                    }
                }
            }
            MatchOutcome::MethodNotAllowed { allow } => {
                let allow_value = allow
                    .iter()
                    .map(http::Method::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut response = reply::empty(StatusCode::METHOD_NOT_ALLOWED);
                if let Ok(value) = http::HeaderValue::from_str(&allow_value) {
                    response.headers_mut().insert(header::ALLOW, value);
                }
                response
            }
            MatchOutcome::NotFound => Response::json_error(
                StatusCode::NOT_FOUND,
                "ROUTE_NOT_FOUND",
                &format!("no route for {method} {path}"),
            ),
        }
    }
}

impl Endpoint for Dispatcher {
    fn call<'a>(
        &'a self,
        ctx: &'a mut StageContext,
        request: Request,
    ) -> BoxFuture<'a, Response> {
        Box::pin(self.dispatch(ctx, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::Routes;
    use bytes::Bytes;
    use http::Method;
    use palisade_core::{CancelToken, HandlerError, Protocol};
    use palisade_telemetry::MetricRegistry;

    fn dispatcher(routes: &Routes) -> (Dispatcher, Arc<MetricRegistry>) {
        let registry = Arc::new(MetricRegistry::new());
        let table = Arc::new(routes.compile(&registry).unwrap());
        let context = Arc::new(ServerContext::new(Arc::clone(&registry), table));
        (Dispatcher::new(context), registry)
    }

    fn stage_ctx() -> StageContext {
        StageContext::new(
            "127.0.0.1:4000".parse().unwrap(),
            Protocol::Http1,
            CancelToken::new(),
        )
    }

    fn request(method: Method, path: &str) -> Request {
        http::Request::builder()
            .method(method)
            .uri(path)
            .body(Bytes::new())
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        use http_body_util::BodyExt;
        let collected = response.into_body().collect().await.unwrap();
        String::from_utf8(collected.to_bytes().to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_matched_route_runs_handler() {
        let mut routes = Routes::new();
        routes.get("/users/{id}", |ctx: RequestContext| async move {
            let id = ctx.param("id").unwrap_or("?").to_string();
            Ok(reply::text(StatusCode::OK, id))
        });

        let (dispatcher, _) = dispatcher(&routes);
        let response = dispatcher
            .dispatch(&mut stage_ctx(), request(Method::GET, "/users/42"))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "42");
    }

    #[tokio::test]
    async fn test_route_meter_marks() {
        let mut routes = Routes::new();
        routes.get("/ping", |_ctx: RequestContext| async {
            Ok(reply::text(StatusCode::OK, "PONG"))
        });

        let (dispatcher, registry) = dispatcher(&routes);
        let _ = dispatcher
            .dispatch(&mut stage_ctx(), request(Method::GET, "/ping"))
            .await;

        assert_eq!(registry.meter("routes.GET./ping").count(), 1);
    }

    #[tokio::test]
    async fn test_not_found() {
        let (dispatcher, _) = dispatcher(&Routes::new());
        let response = dispatcher
            .dispatch(&mut stage_ctx(), request(Method::GET, "/missing"))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_method_not_allowed_with_allow_header() {
        let mut routes = Routes::new();
        routes.get("/x", |_ctx: RequestContext| async {
            Ok(reply::empty(StatusCode::OK))
        });

        let (dispatcher, _) = dispatcher(&routes);
        let response = dispatcher
            .dispatch(&mut stage_ctx(), request(Method::POST, "/x"))
            .await;

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(header::ALLOW).unwrap(), "GET");
    }

    #[tokio::test]
    async fn test_handler_error_becomes_500() {
        let mut routes = Routes::new();
        routes.get("/boom", |_ctx: RequestContext| async {
            Err::<Response, _>(HandlerError::new("database exploded"))
        });

        let (dispatcher, _) = dispatcher(&routes);
        let response = dispatcher
            .dispatch(&mut stage_ctx(), request(Method::GET, "/boom"))
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // The handler's message must not leak to the client.
        assert!(!body_string(response).await.contains("database exploded"));
    }

    #[tokio::test]
    async fn test_handler_sees_body_and_headers() {
        let mut routes = Routes::new();
        routes.post("/echo", |ctx: RequestContext| async move {
            let body = String::from_utf8(ctx.body().to_vec()).unwrap_or_default();
            Ok(reply::text(StatusCode::OK, body))
        });

        let (dispatcher, _) = dispatcher(&routes);
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/echo")
            .body(Bytes::from_static(b"hello"))
            .unwrap();

        let response = dispatcher.dispatch(&mut stage_ctx(), request).await;
        assert_eq!(body_string(response).await, "hello");
    }
}
