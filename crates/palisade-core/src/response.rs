//! Response types and builders.

use bytes::Bytes;
use http::{header, StatusCode};
use http_body_util::Full;

/// The HTTP response type produced by handlers.
///
/// Bodies are fully buffered `Full<Bytes>` values; the server writes them
/// out in one piece.
pub type Response = http::Response<Full<Bytes>>;

/// Convenience constructors for common responses.
pub mod reply {
    use super::*;

    /// A plain-text response.
    #[must_use]
    pub fn text(status: StatusCode, body: impl Into<String>) -> Response {
        http::Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(Full::new(Bytes::from(body.into())))
            .expect("static response parts are valid")
    }

    /// A JSON response serialized from `value`.
    ///
    /// Serialization failures degrade to a 500 with a fixed body rather
    /// than panicking.
    #[must_use]
    pub fn json<T: serde::Serialize>(status: StatusCode, value: &T) -> Response {
        match serde_json::to_vec(value) {
            Ok(body) => http::Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Full::new(Bytes::from(body)))
                .expect("static response parts are valid"),
            Err(_) => text(
                StatusCode::INTERNAL_SERVER_ERROR,
                "response serialization failed",
            ),
        }
    }

    /// An empty-bodied response.
    #[must_use]
    pub fn empty(status: StatusCode) -> Response {
        http::Response::builder()
            .status(status)
            .body(Full::new(Bytes::new()))
            .expect("static response parts are valid")
    }
}

/// Extension trait for building standard error responses.
pub trait ResponseExt {
    /// A JSON error envelope: `{"error": {"code": ..., "message": ...}}`.
    fn json_error(status: StatusCode, code: &str, message: &str) -> Response;
}

impl ResponseExt for Response {
    fn json_error(status: StatusCode, code: &str, message: &str) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": code,
                "message": message,
            }
        });
        reply::json(status, &body)
    }
}
