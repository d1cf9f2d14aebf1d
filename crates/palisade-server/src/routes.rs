//! Route registration and the frozen route table.
//!
//! Application code builds a [`Routes`] value — mutable, ordered — and the
//! orchestrator compiles it into an immutable [`RouteTable`] when
//! `listen_and_serve` starts. Registrations after that point are ignored:
//! the table snapshot is what every worker reads, without locks, for the
//! life of the process.
//!
//! # Example
//!
//! ```rust
//! use palisade_server::Routes;
//! use palisade_core::{reply, HandlerError, RequestContext, Response};
//! use http::StatusCode;
//!
//! async fn get_user(ctx: RequestContext) -> Result<Response, HandlerError> {
//!     let id = ctx.param("id").unwrap_or("?");
//!     Ok(reply::text(StatusCode::OK, format!("user {id}")))
//! }
//!
//! let mut routes = Routes::new();
//! routes.get("/users/{id}", get_user);
//! assert_eq!(routes.len(), 1);
//! ```

use std::sync::Arc;

use http::Method;
use palisade_core::{Error, Handler};
use palisade_router::{MatchOutcome, Router};
use palisade_telemetry::{Meter, MetricRegistry};

struct Registration {
    method: Method,
    pattern: String,
    handler: Arc<dyn Handler>,
}

/// Ordered, mutable route registrations.
#[derive(Default)]
pub struct Routes {
    entries: Vec<Registration>,
}

impl std::fmt::Debug for Routes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let routes: Vec<String> = self
            .entries
            .iter()
            .map(|r| format!("{} {}", r.method, r.pattern))
            .collect();
        f.debug_struct("Routes").field("routes", &routes).finish()
    }
}

impl Routes {
    /// Creates an empty route set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for an arbitrary method.
    pub fn route(&mut self, method: Method, pattern: impl Into<String>, handler: impl Handler) {
        self.entries.push(Registration {
            method,
            pattern: pattern.into(),
            handler: Arc::new(handler),
        });
    }

    /// Registers a GET handler.
    pub fn get(&mut self, pattern: impl Into<String>, handler: impl Handler) {
        self.route(Method::GET, pattern, handler);
    }

    /// Registers a POST handler.
    pub fn post(&mut self, pattern: impl Into<String>, handler: impl Handler) {
        self.route(Method::POST, pattern, handler);
    }

    /// Registers a PUT handler.
    pub fn put(&mut self, pattern: impl Into<String>, handler: impl Handler) {
        self.route(Method::PUT, pattern, handler);
    }

    /// Registers a DELETE handler.
    pub fn delete(&mut self, pattern: impl Into<String>, handler: impl Handler) {
        self.route(Method::DELETE, pattern, handler);
    }

    /// Registers a PATCH handler.
    pub fn patch(&mut self, pattern: impl Into<String>, handler: impl Handler) {
        self.route(Method::PATCH, pattern, handler);
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compiles the registrations into an immutable table, creating one
    /// meter per route.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a pattern fails to compile.
    pub fn compile(&self, registry: &MetricRegistry) -> Result<RouteTable, Error> {
        let mut router = Router::new();
        let mut entries = Vec::with_capacity(self.entries.len());

        for (id, registration) in self.entries.iter().enumerate() {
            router
                .insert(registration.method.clone(), &registration.pattern, id)
                .map_err(|e| {
                    Error::config(format!(
                        "route {} {}: {e}",
                        registration.method, registration.pattern
                    ))
                })?;
            let meter = registry.meter(&format!(
                "routes.{}.{}",
                registration.method, registration.pattern
            ));
            entries.push(RouteEntry {
                method: registration.method.clone(),
                pattern: registration.pattern.clone(),
                handler: Arc::clone(&registration.handler),
                meter,
            });
        }

        Ok(RouteTable { router, entries })
    }
}

/// One compiled route: pattern, handler, and its dedicated meter.
pub struct RouteEntry {
    /// Method this route serves.
    pub method: Method,
    /// The original pattern string.
    pub pattern: String,
    /// The registered handler.
    pub handler: Arc<dyn Handler>,
    /// Per-route invocation meter.
    pub meter: Arc<Meter>,
}

/// The immutable compiled route table.
pub struct RouteTable {
    router: Router,
    entries: Vec<RouteEntry>,
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.entries.len())
            .finish()
    }
}

impl RouteTable {
    /// Looks up a method + path.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> MatchOutcome {
        self.router.match_route(method, path)
    }

    /// The entry for a matched route id.
    #[must_use]
    pub fn entry(&self, route: usize) -> &RouteEntry {
        &self.entries[route]
    }

    /// Number of compiled routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use palisade_core::{reply, HandlerError, RequestContext, Response};

    async fn ok(_ctx: RequestContext) -> Result<Response, HandlerError> {
        Ok(reply::empty(StatusCode::OK))
    }

    #[test]
    fn test_register_and_compile() {
        let mut routes = Routes::new();
        routes.get("/users", ok);
        routes.post("/users", ok);
        routes.get("/users/{id}", ok);
        assert_eq!(routes.len(), 3);

        let registry = MetricRegistry::new();
        let table = routes.compile(&registry).unwrap();
        assert_eq!(table.len(), 3);

        match table.match_route(&Method::GET, "/users/42") {
            MatchOutcome::Matched { route, params } => {
                assert_eq!(route, 2);
                assert_eq!(params.get("id"), Some("42"));
                assert_eq!(table.entry(route).pattern, "/users/{id}");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_compile_creates_route_meters() {
        let mut routes = Routes::new();
        routes.get("/ping", ok);

        let registry = MetricRegistry::new();
        let table = routes.compile(&registry).unwrap();
        table.entry(0).meter.mark();

        assert_eq!(registry.meter("routes.GET./ping").count(), 1);
    }

    #[test]
    fn test_bad_pattern_is_config_error() {
        let mut routes = Routes::new();
        routes.get("/users/{}", ok);

        let result = routes.compile(&MetricRegistry::new());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_method_not_allowed_outcome() {
        let mut routes = Routes::new();
        routes.get("/x", ok);

        let table = routes.compile(&MetricRegistry::new()).unwrap();
        match table.match_route(&Method::POST, "/x") {
            MatchOutcome::MethodNotAllowed { allow } => {
                assert_eq!(allow, vec![Method::GET]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_debug_lists_routes() {
        let mut routes = Routes::new();
        routes.get("/ping", ok);
        let rendered = format!("{routes:?}");
        assert!(rendered.contains("GET /ping"));
    }
}
