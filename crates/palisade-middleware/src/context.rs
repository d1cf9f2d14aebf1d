//! Per-request pipeline context.
//!
//! The [`StageContext`] is the mutable state stages share while a request
//! is in flight. It carries the connection facts a stage needs (remote
//! address, negotiated protocol) and the one piece of feedback a stage can
//! send back to the connection driver: the close-connection flag, set by
//! the rate-limit stage when the hard tier fires.

use std::net::SocketAddr;
use std::time::Instant;

use palisade_core::{CancelToken, Protocol, RequestId};

/// Mutable state threaded through the pipeline for one request.
#[derive(Debug)]
pub struct StageContext {
    request_id: RequestId,
    remote_addr: SocketAddr,
    protocol: Protocol,
    cancel: CancelToken,
    started_at: Instant,
    close_connection: bool,
}

impl StageContext {
    /// Creates a context for a request arriving on the given connection.
    #[must_use]
    pub fn new(remote_addr: SocketAddr, protocol: Protocol, cancel: CancelToken) -> Self {
        Self {
            request_id: RequestId::new(),
            remote_addr,
            protocol,
            cancel,
            started_at: Instant::now(),
            close_connection: false,
        }
    }

    /// The request ID assigned on arrival.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Remote peer address of the carrying connection.
    #[must_use]
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Negotiated protocol of the carrying connection.
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// The connection's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// When this request entered the pipeline.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Asks the connection driver to close the connection once the current
    /// response has been written.
    pub fn flag_connection_close(&mut self) {
        self.close_connection = true;
    }

    /// Whether a stage has requested the connection be closed.
    #[must_use]
    pub fn close_connection(&self) -> bool {
        self.close_connection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> StageContext {
        StageContext::new(
            "127.0.0.1:9999".parse().unwrap(),
            Protocol::Http1,
            CancelToken::new(),
        )
    }

    #[test]
    fn test_close_flag_defaults_off() {
        let ctx = ctx();
        assert!(!ctx.close_connection());
    }

    #[test]
    fn test_flag_connection_close() {
        let mut ctx = ctx();
        ctx.flag_connection_close();
        assert!(ctx.close_connection());
    }

    #[test]
    fn test_fresh_request_ids() {
        assert_ne!(ctx().request_id(), ctx().request_id());
    }
}
