//! Pattern compilation.
//!
//! A pattern string like `/users/{id}/orders` compiles to a deterministic
//! sequence of segment matchers. Compilation is the only place pattern
//! syntax is validated; matching never fails.

use thiserror::Error;

/// A single compiled segment matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Matches a path segment byte-for-byte.
    Literal(String),
    /// Matches any single segment and captures it under the given name.
    Param(String),
}

/// Errors raised while compiling a pattern.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    /// A `{}` parameter segment with no name.
    #[error("empty parameter name in pattern {0:?}")]
    EmptyParamName(String),

    /// A segment mixing braces with other characters, e.g. `a{b}`.
    #[error("malformed segment {segment:?} in pattern {pattern:?}")]
    MalformedSegment {
        /// The offending segment.
        segment: String,
        /// The full pattern it came from.
        pattern: String,
    },

    /// The same parameter name used twice in one pattern.
    #[error("duplicate parameter {name:?} in pattern {pattern:?}")]
    DuplicateParam {
        /// The repeated name.
        name: String,
        /// The full pattern it came from.
        pattern: String,
    },
}

/// Compiles a pattern string into segment matchers.
///
/// The leading empty segment and any trailing `/` are ignored, so `/users`
/// and `/users/` compile identically.
///
/// # Errors
///
/// Returns a [`PatternError`] on empty parameter names, segments that mix
/// braces with literal characters, or duplicate parameter names.
pub fn parse_pattern(pattern: &str) -> Result<Vec<Segment>, PatternError> {
    let mut segments = Vec::new();
    let mut seen_params: Vec<&str> = Vec::new();

    for raw in pattern.split('/').filter(|s| !s.is_empty()) {
        if let Some(name) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            if name.is_empty() {
                return Err(PatternError::EmptyParamName(pattern.to_string()));
            }
            if seen_params.contains(&name) {
                return Err(PatternError::DuplicateParam {
                    name: name.to_string(),
                    pattern: pattern.to_string(),
                });
            }
            seen_params.push(name);
            segments.push(Segment::Param(name.to_string()));
        } else if raw.contains('{') || raw.contains('}') {
            return Err(PatternError::MalformedSegment {
                segment: raw.to_string(),
                pattern: pattern.to_string(),
            });
        } else {
            segments.push(Segment::Literal(raw.to_string()));
        }
    }

    Ok(segments)
}

/// Splits a request path into its segments, ignoring the leading empty
/// segment and any trailing slash.
#[must_use]
pub(crate) fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_pattern() {
        let segs = parse_pattern("/users/list").unwrap();
        assert_eq!(
            segs,
            vec![
                Segment::Literal("users".into()),
                Segment::Literal("list".into())
            ]
        );
    }

    #[test]
    fn test_param_pattern() {
        let segs = parse_pattern("/users/{id}").unwrap();
        assert_eq!(
            segs,
            vec![
                Segment::Literal("users".into()),
                Segment::Param("id".into())
            ]
        );
    }

    #[test]
    fn test_root_pattern_is_empty() {
        assert!(parse_pattern("/").unwrap().is_empty());
        assert!(parse_pattern("").unwrap().is_empty());
    }

    #[test]
    fn test_trailing_slash_ignored() {
        assert_eq!(parse_pattern("/users/"), parse_pattern("/users"));
    }

    #[test]
    fn test_empty_param_name_rejected() {
        assert_eq!(
            parse_pattern("/users/{}"),
            Err(PatternError::EmptyParamName("/users/{}".into()))
        );
    }

    #[test]
    fn test_malformed_segment_rejected() {
        assert!(matches!(
            parse_pattern("/users/x{id}"),
            Err(PatternError::MalformedSegment { .. })
        ));
        assert!(matches!(
            parse_pattern("/users/{id"),
            Err(PatternError::MalformedSegment { .. })
        ));
    }

    #[test]
    fn test_duplicate_param_rejected() {
        assert!(matches!(
            parse_pattern("/a/{id}/b/{id}"),
            Err(PatternError::DuplicateParam { .. })
        ));
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/users/42/"), vec!["users", "42"]);
        assert!(split_path("/").is_empty());
    }
}
