//! # Palisade Server
//!
//! An embeddable HTTP/1.1 + HTTP/2 application server with production
//! ingress controls. The hard part lives in the composed ingress chain:
//!
//! ```text
//! accept → connection limiter → IP filter → TLS + ALPN
//!        → metering → CORS → rate limit → router → handler
//!        → response (status metered) → write
//! ```
//!
//! - TLS termination via rustls, ALPN preferring `h2` over `http/1.1`
//! - Global connection cap and CIDR allow/deny filtering before TLS
//! - Two-tier per-IP rate limiting (`429`, then `429` + close)
//! - Insertion-ordered routing with `{param}` capture
//! - Admin surface: `/info /metrics /health /ping /ready /restart
//!   /killkillkill`
//!
//! ## Example
//!
//! ```rust,ignore
//! use palisade_server::{Server, ServerConfig};
//! use palisade_core::{reply, RequestContext};
//! use http::StatusCode;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::builder()
//!         .port(8080)
//!         .serve_admin_routes(true)
//!         .build();
//!
//!     let mut server = Server::new(config)?;
//!     server.routes_mut().get("/users/{id}", |ctx: RequestContext| async move {
//!         let id = ctx.param("id").unwrap_or("?").to_string();
//!         Ok(reply::text(StatusCode::OK, format!("user {id}")))
//!     });
//!
//!     server.listen_and_serve().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod admin;
pub mod config;
mod conn;
pub mod context;
pub mod dispatch;
pub mod health;
pub mod lifecycle;
pub mod routes;
mod runtime;
pub mod server;
pub mod shutdown;
pub mod tls;

pub use admin::ServiceInfo;
pub use config::{ServerConfig, ServerConfigBuilder};
pub use context::ServerContext;
pub use health::{HealthCheck, HealthCheckRegistry, HealthReport, HealthResult};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use routes::{RouteEntry, RouteTable, Routes};
pub use runtime::build_runtime;
pub use server::{Server, ServerHandle};
pub use shutdown::{ConnectionTracker, ShutdownSignal};
pub use tls::TlsContext;
