//! Per-connection protocol negotiation and driving.
//!
//! After admission (limiter, IP filter) a connection lands here. On a TLS
//! port the handshake runs first and the ALPN selection picks the codec:
//! `h2` multiplexes streams through hyper's HTTP/2 connection, anything
//! else (including no ALPN) is served as HTTP/1.1. On a plaintext port a
//! non-consuming peek detects the cleartext HTTP/2 preface, which is only
//! honored when `allow_h2c` is configured — otherwise it is a protocol
//! error and the connection closes.
//!
//! Two signals can end a connection early, both via hyper's graceful
//! shutdown (HTTP/1.1 `Connection: close`, HTTP/2 GOAWAY): the per-
//! connection close flag raised by the hard rate limiter, and the
//! server-wide drain signal. In both cases the in-flight response
//! finishes before the socket closes.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::{http1, http2};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;

use palisade_admission::Firewall;
use palisade_core::{reply, CancelToken, ConnectionInfo, Protocol, Response, TlsInfo};
use palisade_middleware::{Pipeline, StageContext};

use crate::dispatch::Dispatcher;
use crate::shutdown::ShutdownSignal;

/// The cleartext HTTP/2 connection preface.
const H2_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Budget for completing a TLS handshake before the connection is dropped.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Request lines longer than this are counted by the firewall. Counting
/// only; the request is still served.
const LONG_REQUEST_LINE: usize = 4096;

/// Everything a connection task needs, shared across one serve iteration.
pub(crate) struct ConnectionEnv {
    pub pipeline: Arc<Pipeline>,
    pub dispatcher: Arc<Dispatcher>,
    pub firewall: Firewall,
    pub drain: ShutdownSignal,
    pub tls: Option<TlsAcceptor>,
    pub allow_h2c: bool,
}

/// Handles one accepted connection to completion.
pub(crate) async fn handle_connection(
    env: Arc<ConnectionEnv>,
    stream: TcpStream,
    remote: SocketAddr,
    conn_id: u64,
) {
    match env.tls.clone() {
        Some(acceptor) => {
            let accept = acceptor.accept(stream);
            let tls_stream = match tokio::time::timeout(HANDSHAKE_TIMEOUT, accept).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    tracing::debug!(%remote, error = %e, "TLS handshake failed");
                    return;
                }
                Err(_) => {
                    tracing::debug!(%remote, "TLS handshake timed out");
                    return;
                }
            };

            let (_, session) = tls_stream.get_ref();
            let protocol = match session.alpn_protocol() {
                Some(b"h2") => Protocol::Http2,
                _ => Protocol::Http1,
            };
            let info = ConnectionInfo::new(
                conn_id,
                remote,
                protocol,
                Some(TlsInfo {
                    version: session
                        .protocol_version()
                        .map_or_else(|| "unknown".to_string(), |v| format!("{v:?}")),
                    alpn: session
                        .alpn_protocol()
                        .map(|p| String::from_utf8_lossy(p).into_owned()),
                }),
            );
            tracing::debug!(
                conn_id = info.id,
                %remote,
                protocol = %protocol,
                "TLS connection established"
            );

            drive(env, tls_stream, protocol, remote).await;
        }
        None => {
            let protocol = match peek_for_h2_preface(&stream).await {
                Ok(Some(true)) => {
                    if env.allow_h2c {
                        Protocol::Http2
                    } else {
                        env.firewall.malformed_frame();
                        tracing::debug!(
                            %remote,
                            "cleartext HTTP/2 preface rejected (h2c not enabled)"
                        );
                        return;
                    }
                }
                Ok(Some(false)) => Protocol::Http1,
                Ok(None) => return, // closed before sending anything
                Err(e) => {
                    tracing::debug!(%remote, error = %e, "peek failed");
                    return;
                }
            };

            tracing::debug!(conn_id, %remote, protocol = %protocol, "connection established");
            drive(env, stream, protocol, remote).await;
        }
    }
}

/// Peeks the first bytes without consuming them. `Ok(Some(true))` means
/// the peer is speaking the cleartext HTTP/2 preface.
async fn peek_for_h2_preface(stream: &TcpStream) -> std::io::Result<Option<bool>> {
    let mut buf = [0u8; H2_PREFACE.len()];
    let n = stream.peek(&mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    // A partial read can only be preface-compatible if it is a prefix.
    Ok(Some(n >= 3 && H2_PREFACE.starts_with(&buf[..n])))
}

/// Serves requests on a negotiated connection until it ends, is drained,
/// or is flagged for close by the rate limiter.
async fn drive<T>(env: Arc<ConnectionEnv>, io: T, protocol: Protocol, remote: SocketAddr)
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let cancel = CancelToken::new();
    let close = ShutdownSignal::new();

    let service = {
        let env = Arc::clone(&env);
        let cancel = cancel.clone();
        let close = close.clone();
        service_fn(move |request: hyper::Request<Incoming>| {
            let env = Arc::clone(&env);
            let cancel = cancel.clone();
            let close = close.clone();
            async move {
                let response = serve_request(&env, request, remote, protocol, cancel).await;
                Ok::<_, Infallible>(match response {
                    ServedOrClose::Served(response) => response,
                    ServedOrClose::CloseAfter(response) => {
                        close.trigger();
                        response
                    }
                })
            }
        })
    };

    match protocol {
        Protocol::Http1 => {
            let conn = http1::Builder::new().serve_connection(TokioIo::new(io), service);
            let mut conn = std::pin::pin!(conn);
            let mut shutting_down = false;
            loop {
                tokio::select! {
                    result = conn.as_mut() => {
                        if let Err(e) = result {
                            record_protocol_error(&env.firewall, &e);
                            tracing::debug!(%remote, error = %e, "HTTP/1.1 connection ended with error");
                        }
                        break;
                    }
                    _ = close_requested(&close, &env.drain), if !shutting_down => {
                        conn.as_mut().graceful_shutdown();
                        shutting_down = true;
                    }
                }
            }
        }
        Protocol::Http2 => {
            let conn =
                http2::Builder::new(TokioExecutor::new()).serve_connection(TokioIo::new(io), service);
            let mut conn = std::pin::pin!(conn);
            let mut shutting_down = false;
            loop {
                tokio::select! {
                    result = conn.as_mut() => {
                        if let Err(e) = result {
                            record_protocol_error(&env.firewall, &e);
                            tracing::debug!(%remote, error = %e, "HTTP/2 connection ended with error");
                        }
                        break;
                    }
                    _ = close_requested(&close, &env.drain), if !shutting_down => {
                        conn.as_mut().graceful_shutdown();
                        shutting_down = true;
                    }
                }
            }
        }
    }

    // Anything still running on this connection is now cancelled.
    cancel.cancel();
}

enum ServedOrClose {
    Served(Response),
    CloseAfter(Response),
}

async fn serve_request(
    env: &ConnectionEnv,
    request: hyper::Request<Incoming>,
    remote: SocketAddr,
    protocol: Protocol,
    cancel: CancelToken,
) -> ServedOrClose {
    if request.uri().path().len() > LONG_REQUEST_LINE {
        env.firewall.request_line_too_long();
    }

    let (parts, body) = request.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::debug!(%remote, error = %e, "failed to read request body");
            return ServedOrClose::Served(reply::text(
                http::StatusCode::BAD_REQUEST,
                "bad request body",
            ));
        }
    };
    let request = http::Request::from_parts(parts, body);

    let mut ctx = StageContext::new(remote, protocol, cancel);
    let response = env
        .pipeline
        .process(&mut ctx, request, env.dispatcher.as_ref())
        .await;

    if ctx.close_connection() {
        ServedOrClose::CloseAfter(response)
    } else {
        ServedOrClose::Served(response)
    }
}

/// Completes when either the per-connection close flag or the server
/// drain fires.
async fn close_requested(close: &ShutdownSignal, drain: &ShutdownSignal) {
    tokio::select! {
        _ = close.recv() => {}
        _ = drain.recv() => {}
    }
}

fn record_protocol_error(firewall: &Firewall, error: &hyper::Error) {
    if error.is_parse_too_large() {
        firewall.oversized_header();
    } else if error.is_parse() {
        firewall.malformed_frame();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preface_prefix_detection() {
        // Full preface.
        assert!(H2_PREFACE.starts_with(&H2_PREFACE[..24]));
        // An HTTP/1.1 request line diverges at the first byte.
        assert!(!H2_PREFACE.starts_with(b"GET"));
        // A partial preface read is still a prefix.
        assert!(H2_PREFACE.starts_with(b"PRI * HT"));
    }
}
