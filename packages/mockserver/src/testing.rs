// packages/mockserver/src/testing.rs
//! Test fixtures
//!
//! A fixture owns one started server for a whole group of test cases and
//! wipes its state between cases with `setup()`.
//!
//! ```no_run
//! use sentra_lab_mockserver::testing::HttpTestServer;
//!
//! let server = HttpTestServer::http().unwrap();
//! server.setup();
//! server.set("response_status", 204);
//! // issue a request against server.default_url() ...
//! assert!(server.history().len() <= 1);
//! ```

use crate::server::{start_server, start_smtp_server, start_tls_server, HttpServer, SmtpServer};
use crate::utils::errors::Result;
use std::ops::Deref;

/// Path used by [`HttpTestServer::default_url`]
pub const DEFAULT_PATH: &str = "/testing/this";

/// An HTTP or HTTPS server owned by a test
#[derive(Debug)]
pub struct HttpTestServer {
    server: HttpServer,
}

impl HttpTestServer {
    pub fn http() -> Result<Self> {
        Ok(Self {
            server: start_server(None, None)?,
        })
    }

    /// HTTPS with a self-signed certificate
    pub fn https() -> Result<Self> {
        Ok(Self {
            server: start_tls_server(None, None, None, None)?,
        })
    }

    pub fn url(&self, path: &str) -> String {
        self.server.url(path)
    }

    pub fn default_url(&self) -> String {
        self.server.url(DEFAULT_PATH)
    }

    /// Start a test case from a clean state
    pub fn setup(&self) {
        self.server.reset();
    }

    pub fn into_inner(self) -> HttpServer {
        self.server
    }
}

impl Deref for HttpTestServer {
    type Target = HttpServer;

    fn deref(&self) -> &HttpServer {
        &self.server
    }
}

/// An SMTP server owned by a test
#[derive(Debug)]
pub struct SmtpTestServer {
    server: SmtpServer,
}

impl SmtpTestServer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            server: start_smtp_server(None, None)?,
        })
    }

    /// `host:port` to point an SMTP client at
    pub fn address(&self) -> String {
        self.server.local_addr().to_string()
    }

    pub fn setup(&self) {
        self.server.reset();
    }
}

impl Deref for SmtpTestServer {
    type Target = SmtpServer;

    fn deref(&self) -> &SmtpServer {
        &self.server
    }
}
