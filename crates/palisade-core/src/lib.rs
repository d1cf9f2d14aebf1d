//! # Palisade Core
//!
//! Core types shared across the Palisade server crates:
//!
//! - [`RequestContext`] — the immutable per-request view handed to handlers
//! - [`Handler`] — the contract user code implements (or satisfies with an
//!   async closure)
//! - [`Error`] — the startup / per-connection error taxonomy
//! - [`RequestId`] — unique request identifiers
//! - [`CancelToken`] — cooperative cancellation observed at await points
//!
//! ## Example
//!
//! ```rust
//! use palisade_core::{reply, HandlerError, RequestContext, Response};
//! use http::StatusCode;
//!
//! async fn get_user(ctx: RequestContext) -> Result<Response, HandlerError> {
//!     let id = ctx.param("id").unwrap_or("unknown");
//!     Ok(reply::text(StatusCode::OK, format!("user {id}")))
//! }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cancel;
pub mod context;
pub mod error;
pub mod handler;
pub mod id;
pub mod response;

pub use cancel::CancelToken;
pub use context::{ConnectionInfo, Protocol, RequestContext, TlsInfo};
pub use error::{Error, Result};
pub use handler::{BoxFuture, Handler, HandlerError};
pub use id::RequestId;
pub use response::{reply, Response, ResponseExt};
