//! CORS handling.
//!
//! Preflight `OPTIONS` requests carrying `Origin` and
//! `Access-Control-Request-Method` are answered directly by this stage —
//! they never reach the rate limiter or user handlers when a rule matches.
//! Non-preflight requests pass through and get `Access-Control-Allow-*`
//! headers stamped onto their responses when the origin is allowed.

use std::collections::HashSet;
use std::time::Duration;

use http::{header, HeaderValue, Method, StatusCode};
use palisade_core::{reply, BoxFuture};

use crate::context::StageContext;
use crate::stage::{Next, Stage};
use crate::types::{Request, Response};

const ORIGIN: &str = "origin";
const REQUEST_METHOD: &str = "access-control-request-method";
const REQUEST_HEADERS: &str = "access-control-request-headers";
const ALLOW_ORIGIN: &str = "access-control-allow-origin";
const ALLOW_METHODS: &str = "access-control-allow-methods";
const ALLOW_HEADERS: &str = "access-control-allow-headers";
const ALLOW_CREDENTIALS: &str = "access-control-allow-credentials";
const MAX_AGE: &str = "access-control-max-age";

/// The set of origins a CORS rule admits.
#[derive(Debug, Clone)]
pub enum AllowedOrigins {
    /// Any origin (`*`). Not meaningful together with credentials.
    Any,
    /// An explicit origin set.
    List(HashSet<String>),
}

impl AllowedOrigins {
    /// Whether `origin` is admitted.
    #[must_use]
    pub fn is_allowed(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(origins) => origins.contains(origin),
        }
    }

    fn header_value(&self, origin: &str) -> Option<HeaderValue> {
        match self {
            Self::Any => Some(HeaderValue::from_static("*")),
            Self::List(origins) => {
                if origins.contains(origin) {
                    HeaderValue::from_str(origin).ok()
                } else {
                    None
                }
            }
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Admitted origins. The default empty list admits nothing, which
    /// disables CORS handling entirely.
    pub allowed_origins: AllowedOrigins,
    /// Methods a preflight may request.
    pub allowed_methods: HashSet<Method>,
    /// Request headers (lowercase) a preflight may request. `*` admits any.
    pub allowed_headers: HashSet<String>,
    /// How long browsers may cache a preflight response.
    pub max_age: Option<Duration>,
    /// Whether `Access-Control-Allow-Credentials: true` is emitted.
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: AllowedOrigins::List(HashSet::new()),
            allowed_methods: HashSet::from([
                Method::GET,
                Method::HEAD,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::PATCH,
            ]),
            allowed_headers: HashSet::from([
                "content-type".to_string(),
                "authorization".to_string(),
            ]),
            max_age: Some(Duration::from_secs(86_400)),
            allow_credentials: false,
        }
    }
}

impl CorsConfig {
    /// A config admitting the given origins with the default method and
    /// header sets.
    #[must_use]
    pub fn with_origins<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_origins: AllowedOrigins::List(
                origins.into_iter().map(Into::into).collect(),
            ),
            ..Self::default()
        }
    }

    /// A config admitting any origin. Development use.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            allowed_origins: AllowedOrigins::Any,
            allowed_headers: HashSet::from(["*".to_string()]),
            ..Self::default()
        }
    }

    /// Whether any origin could ever be admitted.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        match &self.allowed_origins {
            AllowedOrigins::Any => true,
            AllowedOrigins::List(origins) => !origins.is_empty(),
        }
    }
}

/// The CORS stage.
#[derive(Debug, Clone)]
pub struct CorsStage {
    config: CorsConfig,
}

impl CorsStage {
    /// Creates the stage from a config.
    #[must_use]
    pub fn new(config: CorsConfig) -> Self {
        Self { config }
    }

    fn is_preflight(request: &Request) -> bool {
        request.method() == Method::OPTIONS
            && request.headers().contains_key(ORIGIN)
            && request.headers().contains_key(REQUEST_METHOD)
    }

    fn origin_of(request: &Request) -> Option<&str> {
        request.headers().get(ORIGIN).and_then(|v| v.to_str().ok())
    }

    fn handle_preflight(&self, request: &Request) -> Response {
        let Some(origin) = Self::origin_of(request) else {
            return reply::text(StatusCode::FORBIDDEN, "missing Origin header");
        };
        if !self.config.allowed_origins.is_allowed(origin) {
            return reply::text(StatusCode::FORBIDDEN, "origin not allowed");
        }

        if let Some(requested) = request
            .headers()
            .get(REQUEST_METHOD)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<Method>().ok())
        {
            if !self.config.allowed_methods.contains(&requested) {
                return reply::text(StatusCode::FORBIDDEN, "method not allowed");
            }
        }

        if let Some(requested) = request
            .headers()
            .get(REQUEST_HEADERS)
            .and_then(|v| v.to_str().ok())
        {
            if !self.config.allowed_headers.contains("*") {
                for name in requested.split(',').map(|h| h.trim().to_lowercase()) {
                    if !self.config.allowed_headers.contains(&name) {
                        return reply::text(
                            StatusCode::FORBIDDEN,
                            format!("header {name:?} not allowed"),
                        );
                    }
                }
            }
        }

        self.preflight_response(origin)
    }

    fn preflight_response(&self, origin: &str) -> Response {
        let mut response = reply::empty(StatusCode::NO_CONTENT);
        let headers = response.headers_mut();

        if let Some(value) = self.config.allowed_origins.header_value(origin) {
            headers.insert(ALLOW_ORIGIN, value);
        }

        let mut methods: Vec<&str> = self
            .config
            .allowed_methods
            .iter()
            .map(Method::as_str)
            .collect();
        methods.sort_unstable();
        if let Ok(value) = HeaderValue::from_str(&methods.join(", ")) {
            headers.insert(ALLOW_METHODS, value);
        }

        let mut names: Vec<&str> = self
            .config
            .allowed_headers
            .iter()
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        if let Ok(value) = HeaderValue::from_str(&names.join(", ")) {
            headers.insert(ALLOW_HEADERS, value);
        }

        if self.config.allow_credentials {
            headers.insert(ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        if let Some(max_age) = self.config.max_age {
            if let Ok(value) = HeaderValue::from_str(&max_age.as_secs().to_string()) {
                headers.insert(MAX_AGE, value);
            }
        }
        headers.insert(
            header::VARY,
            HeaderValue::from_static(
                "Origin, Access-Control-Request-Method, Access-Control-Request-Headers",
            ),
        );

        response
    }

    fn stamp_response(&self, response: &mut Response, origin: &str) {
        let headers = response.headers_mut();
        if let Some(value) = self.config.allowed_origins.header_value(origin) {
            headers.insert(ALLOW_ORIGIN, value);
        }
        if self.config.allow_credentials {
            headers.insert(ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    }
}

impl Stage for CorsStage {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut StageContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if self.config.is_enabled() && Self::is_preflight(&request) {
                return self.handle_preflight(&request);
            }

            let origin = Self::origin_of(&request).map(String::from);
            let mut response = next.run(ctx, request).await;

            if let Some(origin) = origin {
                if self.config.is_enabled() && self.config.allowed_origins.is_allowed(&origin) {
                    self.stamp_response(&mut response, &origin);
                }
            }
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Endpoint;
    use bytes::Bytes;
    use palisade_core::{CancelToken, Protocol};

    fn ctx() -> StageContext {
        StageContext::new(
            "127.0.0.1:1000".parse().unwrap(),
            Protocol::Http1,
            CancelToken::new(),
        )
    }

    struct OkEndpoint;

    impl Endpoint for OkEndpoint {
        fn call<'a>(
            &'a self,
            _ctx: &'a mut StageContext,
            _request: Request,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async { reply::text(StatusCode::OK, "handler ran") })
        }
    }

    fn preflight(origin: &str, method: &str, headers: Option<&str>) -> Request {
        let mut builder = http::Request::builder()
            .method(Method::OPTIONS)
            .uri("/api")
            .header(ORIGIN, origin)
            .header(REQUEST_METHOD, method);
        if let Some(h) = headers {
            builder = builder.header(REQUEST_HEADERS, h);
        }
        builder.body(Bytes::new()).unwrap()
    }

    fn simple(origin: Option<&str>) -> Request {
        let mut builder = http::Request::builder().method(Method::GET).uri("/api");
        if let Some(o) = origin {
            builder = builder.header(ORIGIN, o);
        }
        builder.body(Bytes::new()).unwrap()
    }

    async fn run(stage: &CorsStage, request: Request) -> Response {
        let endpoint = OkEndpoint;
        let next = Next::new(&[], &endpoint);
        stage.process(&mut ctx(), request, next).await
    }

    #[test]
    fn test_default_config_is_disabled() {
        assert!(!CorsConfig::default().is_enabled());
        assert!(CorsConfig::permissive().is_enabled());
        assert!(CorsConfig::with_origins(["https://app.example.com"]).is_enabled());
    }

    #[tokio::test]
    async fn test_preflight_allowed_origin() {
        let stage = CorsStage::new(CorsConfig::with_origins(["https://app.example.com"]));
        let response = run(&stage, preflight("https://app.example.com", "POST", None)).await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers().get(ALLOW_ORIGIN).unwrap(),
            "https://app.example.com"
        );
        assert!(response.headers().contains_key(ALLOW_METHODS));
        assert!(response.headers().contains_key(MAX_AGE));
    }

    #[tokio::test]
    async fn test_preflight_never_reaches_endpoint() {
        let stage = CorsStage::new(CorsConfig::with_origins(["https://app.example.com"]));
        let response = run(&stage, preflight("https://app.example.com", "GET", None)).await;
        // The endpoint would have returned 200 "handler ran".
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_preflight_rejected_origin() {
        let stage = CorsStage::new(CorsConfig::with_origins(["https://app.example.com"]));
        let response = run(&stage, preflight("https://evil.example", "POST", None)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_preflight_rejected_method() {
        let mut config = CorsConfig::with_origins(["https://app.example.com"]);
        config.allowed_methods = HashSet::from([Method::GET]);
        let stage = CorsStage::new(config);

        let response = run(&stage, preflight("https://app.example.com", "DELETE", None)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_preflight_rejected_header() {
        let stage = CorsStage::new(CorsConfig::with_origins(["https://app.example.com"]));
        let response = run(
            &stage,
            preflight("https://app.example.com", "POST", Some("X-Secret")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_preflight_wildcard_headers() {
        let mut config = CorsConfig::with_origins(["https://app.example.com"]);
        config.allowed_headers = HashSet::from(["*".to_string()]);
        let stage = CorsStage::new(config);

        let response = run(
            &stage,
            preflight("https://app.example.com", "POST", Some("X-Anything")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_preflight_credentials() {
        let mut config = CorsConfig::with_origins(["https://app.example.com"]);
        config.allow_credentials = true;
        let stage = CorsStage::new(config);

        let response = run(&stage, preflight("https://app.example.com", "POST", None)).await;
        assert_eq!(
            response.headers().get(ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
    }

    #[tokio::test]
    async fn test_simple_request_stamps_headers() {
        let stage = CorsStage::new(CorsConfig::with_origins(["https://app.example.com"]));
        let response = run(&stage, simple(Some("https://app.example.com"))).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(ALLOW_ORIGIN).unwrap(),
            "https://app.example.com"
        );
    }

    #[tokio::test]
    async fn test_simple_request_foreign_origin_no_headers() {
        let stage = CorsStage::new(CorsConfig::with_origins(["https://app.example.com"]));
        let response = run(&stage, simple(Some("https://evil.example"))).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn test_request_without_origin_passes_through() {
        let stage = CorsStage::new(CorsConfig::with_origins(["https://app.example.com"]));
        let response = run(&stage, simple(None)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn test_wildcard_origin() {
        let stage = CorsStage::new(CorsConfig::permissive());
        let response = run(&stage, simple(Some("https://anywhere.example"))).await;
        assert_eq!(response.headers().get(ALLOW_ORIGIN).unwrap(), "*");
    }

    #[tokio::test]
    async fn test_disabled_config_ignores_preflight() {
        // No origins configured: OPTIONS requests fall through to the
        // endpoint like any other request.
        let stage = CorsStage::new(CorsConfig::default());
        let response = run(&stage, preflight("https://app.example.com", "POST", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
