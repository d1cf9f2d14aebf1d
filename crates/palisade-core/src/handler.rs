//! The handler contract.
//!
//! User code satisfies [`Handler`] either by implementing the trait or by
//! registering an async function / closure, which the blanket impl
//! adapts.
//!
//! Handlers receive an owned [`RequestContext`] and must not retain it
//! after returning. An `Err` return is mapped to a `500` by the dispatch
//! stage, recorded against `responseCodes.serverError`, and logged with
//! the request ID.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::context::RequestContext;
use crate::response::Response;

/// A boxed future, as returned by handler invocations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An error escaping a user handler.
///
/// Carries an operator-facing message; the client only ever sees a
/// generic `500`.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HandlerError {
    /// Creates a handler error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a handler error wrapping a source error.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source("JSON error", err)
    }
}

/// A request handler.
///
/// # Example
///
/// ```rust
/// use palisade_core::{reply, Handler, HandlerError, RequestContext, Response};
/// use http::StatusCode;
///
/// async fn ping(_ctx: RequestContext) -> Result<Response, HandlerError> {
///     Ok(reply::text(StatusCode::OK, "PONG"))
/// }
///
/// // Async functions satisfy the trait through the blanket impl.
/// fn takes_handler(_h: impl Handler) {}
/// takes_handler(ping);
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Handles one request.
    fn handle(&self, ctx: RequestContext) -> BoxFuture<'static, Result<Response, HandlerError>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, HandlerError>> + Send + 'static,
{
    fn handle(&self, ctx: RequestContext) -> BoxFuture<'static, Result<Response, HandlerError>> {
        Box::pin((self)(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::reply;
    use http::StatusCode;
    use std::sync::Arc;

    async fn echo(ctx: RequestContext) -> Result<Response, HandlerError> {
        Ok(reply::text(StatusCode::OK, ctx.path().to_string()))
    }

    #[tokio::test]
    async fn test_async_fn_is_handler() {
        let ctx = RequestContext::builder().path("/echo").build();
        let resp = echo.handle(ctx).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_closure_is_handler() {
        let handler = |_ctx: RequestContext| async {
            Ok::<_, HandlerError>(reply::empty(StatusCode::NO_CONTENT))
        };
        let resp = handler
            .handle(RequestContext::builder().build())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_arc_dyn_handler() {
        let handler: Arc<dyn Handler> = Arc::new(echo);
        let resp = handler
            .as_ref()
            .handle(RequestContext::builder().path("/x").build())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn test_handler_error_display() {
        let err = HandlerError::new("database unavailable");
        assert_eq!(err.to_string(), "database unavailable");

        let io = std::io::Error::new(std::io::ErrorKind::Other, "broken pipe");
        let err = HandlerError::with_source("write failed", io);
        assert!(std::error::Error::source(&err).is_some());
    }
}
