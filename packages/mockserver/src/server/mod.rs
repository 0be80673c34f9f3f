// packages/mockserver/src/server/mod.rs
//! Server handles and convenience constructors
//!
//! A server handle starts listening on construction and keeps serving in the
//! background until [`HttpServer::stop`] / [`SmtpServer::stop`] is called or
//! the handle is dropped.

pub mod http;
pub mod smtp;
mod worker;

pub use http::HttpServer;
pub use smtp::SmtpServer;

use crate::utils::config::{HttpServerConfig, ListenConfig, SmtpServerConfig, TlsConfig};
use crate::utils::errors::{MockServerError, Result};
use std::path::Path;
use tracing::info;

/// Bind synchronously so the address is known before `start` returns
pub(crate) fn bind(listen: &ListenConfig) -> Result<std::net::TcpListener> {
    let addr = format!("{}:{}", listen.host, listen.port);
    let listener = std::net::TcpListener::bind((listen.host.as_str(), listen.port))
        .map_err(|source| MockServerError::Bind { addr, source })?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Start a plain HTTP server; `None` picks `127.0.0.1` and a free port
pub fn start_server(host: Option<&str>, port: Option<u16>) -> Result<HttpServer> {
    HttpServer::start(HttpServerConfig {
        listen: ListenConfig::new(host, port),
        ..Default::default()
    })
}

/// Start an HTTPS server
///
/// Without a certificate a self-signed one for `localhost` is used. A
/// certificate file without a key file must contain the key as well.
pub fn start_tls_server(
    host: Option<&str>,
    port: Option<u16>,
    cert_path: Option<&Path>,
    key_path: Option<&Path>,
) -> Result<HttpServer> {
    HttpServer::start(HttpServerConfig {
        listen: ListenConfig::new(host, port),
        tls: Some(TlsConfig {
            cert_path: cert_path.map(Path::to_path_buf),
            key_path: key_path.map(Path::to_path_buf),
        }),
        ..Default::default()
    })
}

pub fn start_smtp_server(host: Option<&str>, port: Option<u16>) -> Result<SmtpServer> {
    SmtpServer::start(SmtpServerConfig {
        listen: ListenConfig::new(host, port),
        ..Default::default()
    })
}

/// Run `f` against a fresh HTTP server, stopping it afterwards
///
/// The server is also stopped when `f` panics.
pub fn http_server<R>(f: impl FnOnce(&HttpServer) -> R) -> Result<R> {
    let server = start_server(None, None)?;
    let result = f(&server);
    server.stop();
    info!("Scoped HTTP server stopped");
    Ok(result)
}

/// Run `f` against a fresh HTTPS server with a self-signed certificate
pub fn https_server<R>(f: impl FnOnce(&HttpServer) -> R) -> Result<R> {
    let server = start_tls_server(None, None, None, None)?;
    let result = f(&server);
    server.stop();
    info!("Scoped HTTPS server stopped");
    Ok(result)
}

pub fn smtp_server<R>(f: impl FnOnce(&SmtpServer) -> R) -> Result<R> {
    let server = start_smtp_server(None, None)?;
    let result = f(&server);
    server.stop();
    info!("Scoped SMTP server stopped");
    Ok(result)
}
