//! # Palisade
//!
//! **An embeddable HTTP/1.1 + HTTP/2 application server with production
//! ingress controls.**
//!
//! Palisade is for service endpoints that need more than a router: TLS
//! termination with ALPN negotiation, a global connection cap, CIDR
//! allow/deny filtering, two-tier per-IP rate limiting, and a metrics and
//! health surface — all composed into one ingress pipeline in front of
//! your handlers.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use palisade::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::builder()
//!         .port(8080)
//!         .max_connections(2_000)
//!         .soft_req_per_sec(500.0)
//!         .hard_req_per_sec(550.0)
//!         .serve_admin_routes(true)
//!         .build();
//!
//!     let mut server = Server::new(config)?;
//!     server.routes_mut().get("/users/{id}", |ctx: RequestContext| async move {
//!         let id = ctx.param("id").unwrap_or("?").to_string();
//!         Ok(reply::text(http::StatusCode::OK, format!("user {id}")))
//!     });
//!
//!     server.listen_and_serve().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Ingress pipeline
//!
//! ```text
//! accept → connection limiter → IP filter → TLS handshake (ALPN)
//!        → metering → CORS → rate limit → router → handler
//!        → response pipeline (status metered) → write
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use palisade_admission as admission;
pub use palisade_core as core;
pub use palisade_middleware as middleware;
pub use palisade_router as router;
pub use palisade_server as server;
pub use palisade_telemetry as telemetry;

/// Convenient imports for typical applications.
pub mod prelude {
    pub use palisade_core::{
        reply, CancelToken, Handler, HandlerError, Protocol, RequestContext, RequestId, Response,
    };
    pub use palisade_server::{
        build_runtime, HealthCheck, HealthResult, Routes, Server, ServerConfig, ServerHandle,
    };
    pub use palisade_telemetry::{init_logging, LogConfig, MetricRegistry};
}
