// packages/mockserver/src/transport/tls_handler.rs
//! TLS handler for HTTPS servers
//!
//! Builds a rustls acceptor from PEM files, or from a self-signed pair
//! generated on the fly for `localhost` / `127.0.0.1` when no files are
//! configured. The generated pair is created once per process.

use crate::utils::config::TlsConfig;
use crate::utils::errors::{MockServerError, Result};
use once_cell::sync::OnceCell;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::fs;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info};

/// Names the generated certificate is valid for
pub const SELF_SIGNED_NAMES: [&str; 2] = ["localhost", "127.0.0.1"];

static SELF_SIGNED: OnceCell<CertificateData> = OnceCell::new();

/// PEM encoded certificate chain and private key
#[derive(Debug, Clone)]
pub struct CertificateData {
    pub cert_pem: String,
    pub key_pem: String,
}

/// TLS handler for HTTPS termination
pub struct TlsHandler {
    config: TlsConfig,
}

impl TlsHandler {
    pub fn new(config: TlsConfig) -> Self {
        Self { config }
    }

    /// Build the acceptor used for every accepted connection
    pub fn acceptor(&self) -> Result<TlsAcceptor> {
        let pem = self.load_pem()?;
        let certs = parse_certs(&pem.cert_pem)?;
        let key = parse_key(&pem.key_pem)?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut server_config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| MockServerError::Tls(format!("Protocol setup failed: {}", e)))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| MockServerError::Tls(format!("Invalid certificate or key: {}", e)))?;
        server_config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(TlsAcceptor::from(Arc::new(server_config)))
    }

    fn load_pem(&self) -> Result<CertificateData> {
        match (&self.config.cert_path, &self.config.key_path) {
            (Some(cert_path), key_path) => {
                debug!("Using certfile: {:?}", cert_path);
                debug!("Using keyfile: {:?}", key_path);

                let cert_pem = read_pem(cert_path)?;
                // The certificate file may bundle the key
                let key_pem = match key_path {
                    Some(key_path) => read_pem(key_path)?,
                    None => cert_pem.clone(),
                };

                Ok(CertificateData { cert_pem, key_pem })
            }
            (None, Some(_)) => Err(MockServerError::Tls(
                "A key path was given without a certificate path".to_string(),
            )),
            (None, None) => self_signed().cloned(),
        }
    }
}

/// Self-signed certificate for local testing, generated once
pub fn self_signed() -> Result<&'static CertificateData> {
    SELF_SIGNED.get_or_try_init(|| {
        info!("Generating self-signed certificate for {:?}", SELF_SIGNED_NAMES);

        let names: Vec<String> = SELF_SIGNED_NAMES.iter().map(|n| n.to_string()).collect();
        let certified = rcgen::generate_simple_self_signed(names)
            .map_err(|e| MockServerError::Tls(format!("Certificate generation failed: {}", e)))?;

        Ok(CertificateData {
            cert_pem: certified.cert.pem(),
            key_pem: certified.key_pair.serialize_pem(),
        })
    })
}

fn read_pem(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| MockServerError::Tls(format!("Failed to read {:?}: {}", path, e)))
}

fn parse_certs(pem: &str) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(pem.as_bytes()))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| MockServerError::Tls(format!("Malformed certificate PEM: {}", e)))?;

    if certs.is_empty() {
        return Err(MockServerError::Tls("No certificate found".to_string()));
    }
    Ok(certs)
}

fn parse_key(pem: &str) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut BufReader::new(pem.as_bytes()))
        .map_err(|e| MockServerError::Tls(format!("Malformed key PEM: {}", e)))?
        .ok_or_else(|| MockServerError::Tls("No private key found".to_string()))
}
