//! Connection and request context types.
//!
//! A [`ConnectionInfo`] is built once per accepted connection and is
//! immutable afterwards. A [`RequestContext`] is built per request, after
//! routing succeeds, and is dropped once the response has been written.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use http::{HeaderMap, Method};

use crate::cancel::CancelToken;
use crate::id::RequestId;

/// The application protocol negotiated for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// HTTP/1.1 (also used when ALPN offered nothing).
    Http1,
    /// HTTP/2 over TLS (`h2`) or cleartext (`h2c`).
    Http2,
}

impl Protocol {
    /// Returns the canonical ALPN identifier for this protocol.
    #[must_use]
    pub fn as_alpn(&self) -> &'static str {
        match self {
            Self::Http1 => "http/1.1",
            Self::Http2 => "h2",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_alpn())
    }
}

/// Summary of the TLS session for a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsInfo {
    /// The negotiated TLS protocol version (e.g. "TLSv1.3").
    pub version: String,
    /// The ALPN protocol selected during the handshake, if any.
    pub alpn: Option<String>,
}

/// Immutable record of an established connection.
///
/// Created on accept, destroyed on close. The connection limiter holds its
/// slot for exactly this record's lifetime.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Unique identifier for this connection, monotonic per process.
    pub id: u64,
    /// Remote peer address.
    pub remote_addr: SocketAddr,
    /// Negotiated application protocol.
    pub protocol: Protocol,
    /// TLS session summary, `None` on plaintext ports.
    pub tls: Option<TlsInfo>,
    /// When the connection was accepted.
    pub accepted_at: Instant,
}

impl ConnectionInfo {
    /// Builds a connection record.
    #[must_use]
    pub fn new(id: u64, remote_addr: SocketAddr, protocol: Protocol, tls: Option<TlsInfo>) -> Self {
        Self {
            id,
            remote_addr,
            protocol,
            tls,
            accepted_at: Instant::now(),
        }
    }
}

/// The per-request view handed to handlers.
///
/// Constructed after routing succeeds; it carries the captured path
/// parameters alongside the request data. Handlers must not retain the
/// context after returning — it owns the body bytes and is dropped when
/// the response has been written.
///
/// # Example
///
/// ```rust
/// use palisade_core::RequestContext;
///
/// fn describe(ctx: &RequestContext) -> String {
///     format!("{} {} from {}", ctx.method(), ctx.path(), ctx.remote_addr())
/// }
/// ```
pub struct RequestContext {
    request_id: RequestId,
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
    remote_addr: SocketAddr,
    protocol: Protocol,
    cancel: CancelToken,
    started_at: Instant,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("remote_addr", &self.remote_addr)
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

impl RequestContext {
    /// Creates a request context builder.
    #[must_use]
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (no query string).
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the collected request body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error when the body is not
    /// valid JSON for `T`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Returns a captured path parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Returns all captured path parameters.
    #[must_use]
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Returns the remote peer address.
    #[must_use]
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Returns the negotiated protocol for the carrying connection.
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Returns the cancellation token for this request.
    ///
    /// The token fires when the carrying connection closes mid-request.
    /// Long-running handlers should observe it at suspension points.
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Returns `true` once the carrying connection has closed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// When the request started processing.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns a shared extension by type, if one was attached.
    ///
    /// The server attaches its process-wide context here so handlers can
    /// reach shared state without a dependency on the server crate.
    #[must_use]
    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref())
    }
}

/// Builder for [`RequestContext`].
#[derive(Default)]
pub struct RequestContextBuilder {
    request_id: Option<RequestId>,
    method: Option<Method>,
    path: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
    protocol: Option<Protocol>,
    cancel: Option<CancelToken>,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl RequestContextBuilder {
    /// Sets the request ID; a fresh one is generated if unset.
    #[must_use]
    pub fn request_id(mut self, id: RequestId) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Sets the HTTP method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets the request path.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the request headers.
    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the collected body bytes.
    #[must_use]
    pub fn body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// Sets the captured path parameters.
    #[must_use]
    pub fn params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    /// Sets the remote peer address.
    #[must_use]
    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Sets the negotiated protocol.
    #[must_use]
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Sets the cancellation token shared with the carrying connection.
    #[must_use]
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Attaches a shared extension retrievable via
    /// [`RequestContext::extension`].
    #[must_use]
    pub fn extension<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
        self
    }

    /// Builds the context. Missing fields fall back to neutral defaults
    /// (GET, "/", unspecified peer) so tests can construct contexts
    /// piecemeal.
    #[must_use]
    pub fn build(self) -> RequestContext {
        RequestContext {
            request_id: self.request_id.unwrap_or_default(),
            method: self.method.unwrap_or(Method::GET),
            path: self.path.unwrap_or_else(|| "/".to_string()),
            headers: self.headers,
            body: self.body,
            params: self.params,
            remote_addr: self
                .remote_addr
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0))),
            protocol: self.protocol.unwrap_or(Protocol::Http1),
            cancel: self.cancel.unwrap_or_default(),
            started_at: Instant::now(),
            extensions: self.extensions,
        }
    }
}
