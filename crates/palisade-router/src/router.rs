//! The compiled router.
//!
//! Holds one ordered pattern list per HTTP method. Matching walks the
//! list for the request's method in registration order and returns the
//! first pattern whose segments all match. When the path matches some
//! pattern under a *different* method, the outcome is
//! [`MatchOutcome::MethodNotAllowed`] carrying the full set of allowed
//! methods for the `Allow` header.
//!
//! The router is built once, then published immutably; every worker reads
//! the same snapshot without synchronization.

use std::collections::HashMap;

use http::Method;

use crate::params::Params;
use crate::pattern::{parse_pattern, split_path, PatternError, Segment};

/// Index of a registered route, in registration order across all methods.
///
/// The server side keeps handlers and per-route meters in parallel vectors
/// indexed by this value.
pub type RouteId = usize;

/// One compiled pattern under a method.
#[derive(Debug, Clone)]
struct CompiledPattern {
    segments: Vec<Segment>,
    route: RouteId,
}

/// Outcome of a route lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// A pattern under the request's method matched.
    Matched {
        /// The matched route.
        route: RouteId,
        /// Captured path parameters.
        params: Params,
    },
    /// The path exists under other methods only. Mapped to `405` with an
    /// `Allow` header.
    MethodNotAllowed {
        /// Methods for which the path does match, sorted for a stable
        /// `Allow` header.
        allow: Vec<Method>,
    },
    /// No pattern matched under any method. Mapped to `404`.
    NotFound,
}

/// An insertion-ordered, first-match-wins router.
///
/// See the [crate docs](crate) for an example.
#[derive(Debug, Clone, Default)]
pub struct Router {
    by_method: HashMap<Method, Vec<CompiledPattern>>,
    route_count: usize,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles `pattern` and registers it under `method`.
    ///
    /// Patterns are matched in insertion order; registering a broad
    /// pattern before a narrow one shadows the narrow one.
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] when the pattern fails to compile.
    pub fn insert(
        &mut self,
        method: Method,
        pattern: &str,
        route: RouteId,
    ) -> Result<(), PatternError> {
        let segments = parse_pattern(pattern)?;
        self.by_method
            .entry(method)
            .or_default()
            .push(CompiledPattern { segments, route });
        self.route_count += 1;
        Ok(())
    }

    /// Looks up `path` under `method`.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> MatchOutcome {
        let path_segments = split_path(path);

        if let Some(patterns) = self.by_method.get(method) {
            for pattern in patterns {
                if let Some(params) = match_segments(&pattern.segments, &path_segments) {
                    return MatchOutcome::Matched {
                        route: pattern.route,
                        params,
                    };
                }
            }
        }

        // The method had no match; see whether any other method would.
        let mut allow: Vec<Method> = self
            .by_method
            .iter()
            .filter(|(m, _)| *m != method)
            .filter(|(_, patterns)| {
                patterns
                    .iter()
                    .any(|p| match_segments(&p.segments, &path_segments).is_some())
            })
            .map(|(m, _)| m.clone())
            .collect();

        if allow.is_empty() {
            MatchOutcome::NotFound
        } else {
            allow.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            MatchOutcome::MethodNotAllowed { allow }
        }
    }

    /// Number of registered routes across all methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.route_count
    }

    /// Returns `true` when no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.route_count == 0
    }
}

/// Attempts a segment-by-segment match, capturing parameters.
///
/// Requires equal segment counts. Literals compare by byte equality;
/// parameters capture the path segment verbatim.
fn match_segments(pattern: &[Segment], path: &[&str]) -> Option<Params> {
    if pattern.len() != path.len() {
        return None;
    }

    let mut params = Params::new();
    for (segment, actual) in pattern.iter().zip(path) {
        match segment {
            Segment::Literal(expected) => {
                if expected != actual {
                    return None;
                }
            }
            Segment::Param(name) => params.push(name.clone(), (*actual).to_string()),
        }
    }
    Some(params)
}
