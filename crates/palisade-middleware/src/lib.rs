//! # Palisade Middleware
//!
//! The per-request pipeline. Every request that survives connection-level
//! admission (limiter, IP filter, TLS) flows through a fixed, linear
//! sequence of stages:
//!
//! ```text
//! Request → Metering → CORS → RateLimit → Dispatch (router + handler)
//!              │         │        │
//!              │         │        └── 429 on soft/hard exhaustion
//!              │         └── preflight short-circuit
//!              └── requests meter + response-code meters
//! ```
//!
//! The order is deliberate: metering sees everything; CORS preflights are
//! answered before they consume rate-limit tokens; rate limiting happens
//! before any routing or handler work.
//!
//! Each stage implements [`Stage`] with a single
//! `process(ctx, request, next)` capability and either short-circuits with
//! its own response or forwards to the rest of the chain via
//! [`Next::run`].

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod pipeline;
pub mod stage;
pub mod stages;
pub mod types;

pub use context::StageContext;
pub use pipeline::Pipeline;
pub use stage::{Endpoint, Next, Stage};
pub use types::{Request, Response};
