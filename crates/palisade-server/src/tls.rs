//! TLS termination.
//!
//! Loads PEM certificate/key material once at startup and hands out a
//! `tokio-rustls` acceptor for per-connection handshakes. The acceptor
//! advertises ALPN `h2` then `http/1.1`, in that preference order, and
//! negotiates TLS 1.2 as the floor. Bad material is a fatal
//! [`Error::Config`] at construction; a failed handshake is logged by the
//! caller and only costs that one connection.

use std::io::BufReader;
use std::sync::Arc;

use palisade_core::Error;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

/// ALPN protocols advertised during the handshake, in preference order.
const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

/// Certificate/key holder producing per-connection TLS acceptors.
#[derive(Clone)]
pub struct TlsContext {
    acceptor: TlsAcceptor,
}

impl std::fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsContext").finish_non_exhaustive()
    }
}

impl TlsContext {
    /// Builds a TLS context from PEM-encoded certificate chain and key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the PEM cannot be parsed, contains
    /// no certificates or key, or the key does not match the certificate.
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self, Error> {
        let certs = load_certs(cert_pem)?;
        let key = load_key(key_pem)?;

        let mut config = rustls::ServerConfig::builder_with_protocol_versions(&[
            &rustls::version::TLS13,
            &rustls::version::TLS12,
        ])
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::config(format!("certificate/key rejected: {e}")))?;

        config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();

        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(config)),
        })
    }

    /// Builds a TLS context from PEM files on disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a file cannot be read or the
    /// material is invalid.
    pub fn from_pem_files(cert_path: &str, key_path: &str) -> Result<Self, Error> {
        let cert_pem = std::fs::read_to_string(cert_path)
            .map_err(|e| Error::config(format!("cannot read certificate {cert_path:?}: {e}")))?;
        let key_pem = std::fs::read_to_string(key_path)
            .map_err(|e| Error::config(format!("cannot read key {key_path:?}: {e}")))?;
        Self::from_pem(&cert_pem, &key_pem)
    }

    /// The acceptor used to handshake each connection.
    #[must_use]
    pub fn acceptor(&self) -> TlsAcceptor {
        self.acceptor.clone()
    }
}

fn load_certs(cert_pem: &str) -> Result<Vec<CertificateDer<'static>>, Error> {
    let certs: Vec<CertificateDer> = rustls_pemfile::certs(&mut BufReader::new(cert_pem.as_bytes()))
        .collect::<Result<_, _>>()
        .map_err(|e| Error::config(format!("invalid certificate PEM: {e}")))?;
    if certs.is_empty() {
        return Err(Error::config("no certificates found in PEM"));
    }
    Ok(certs)
}

fn load_key(key_pem: &str) -> Result<PrivateKeyDer<'static>, Error> {
    rustls_pemfile::private_key(&mut BufReader::new(key_pem.as_bytes()))
        .map_err(|e| Error::config(format!("invalid key PEM: {e}")))?
        .ok_or_else(|| Error::config("no private key found in PEM"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed() -> (String, String) {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .expect("generate certificate");
        (cert.cert.pem(), cert.key_pair.serialize_pem())
    }

    #[test]
    fn test_valid_material() {
        let (cert, key) = self_signed();
        let context = TlsContext::from_pem(&cert, &key).unwrap();
        let _ = context.acceptor();
    }

    #[test]
    fn test_garbage_cert_rejected() {
        let (_, key) = self_signed();
        let result = TlsContext::from_pem("not a certificate", &key);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_garbage_key_rejected() {
        let (cert, _) = self_signed();
        let result = TlsContext::from_pem(&cert, "not a key");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_files_rejected() {
        let result = TlsContext::from_pem_files("/nonexistent/cert.pem", "/nonexistent/key.pem");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
