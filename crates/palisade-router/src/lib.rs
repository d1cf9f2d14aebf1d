//! Compiled path routing for Palisade.
//!
//! Patterns are sequences of literal and parameter segments
//! (`/users/{id}/orders`). At compile time each pattern becomes a list of
//! [`Segment`] matchers keyed by HTTP method. Matching is a linear scan in
//! registration order — within a method, the first registered pattern that
//! matches wins. This makes route precedence exactly the order application
//! code registered them in, with no hidden specificity rules.
//!
//! # Example
//!
//! ```rust
//! use palisade_router::{MatchOutcome, Router};
//! use http::Method;
//!
//! let mut router = Router::new();
//! router.insert(Method::GET, "/users/{id}", 0).unwrap();
//! router.insert(Method::GET, "/users/{id}/orders", 1).unwrap();
//!
//! match router.match_route(&Method::GET, "/users/42/orders") {
//!     MatchOutcome::Matched { route, params } => {
//!         assert_eq!(route, 1);
//!         assert_eq!(params.get("id"), Some("42"));
//!     }
//!     other => panic!("unexpected outcome: {other:?}"),
//! }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod params;
mod pattern;
mod router;

pub use params::Params;
pub use pattern::{parse_pattern, PatternError, Segment};
pub use router::{MatchOutcome, RouteId, Router};
