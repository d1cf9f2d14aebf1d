//! Error taxonomy for the Palisade server.
//!
//! Startup errors ([`Error::Config`], [`Error::Bind`]) are fatal and
//! propagate to the caller of `listen_and_serve`. Per-connection errors
//! ([`Error::Handshake`], [`Error::Protocol`]) are logged and confined to
//! the connection that produced them; they never terminate the server.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the Palisade server.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration: bad TLS material, unparseable CIDR ranges,
    /// contradictory options. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The listener could not bind to the configured address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that could not be bound.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A per-connection TLS handshake failed. The connection is dropped.
    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    /// Malformed HTTP framing on a connection.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An I/O error outside bind/handshake contexts.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a bind error for the given address.
    pub fn bind(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::Bind {
            addr: addr.into(),
            source,
        }
    }

    /// Returns `true` if this error is fatal at startup.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Bind { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = Error::config("certificate and key do not match");
        assert_eq!(
            err.to_string(),
            "configuration error: certificate and key do not match"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_bind_error_carries_source() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        let err = Error::bind("0.0.0.0:8080", io);
        assert!(err.to_string().contains("0.0.0.0:8080"));
        assert!(err.is_fatal());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_connection_errors_not_fatal() {
        assert!(!Error::Handshake("bad record".into()).is_fatal());
        assert!(!Error::Protocol("bad frame".into()).is_fatal());
    }

    #[test]
    fn test_io_error_from() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert!(matches!(err, Error::Io(_)));
    }
}
