// packages/mockserver/src/lib.rs
//! Sentra Lab Mock Server Library
//!
//! Controllable HTTP, HTTPS and SMTP servers for tests that need to assert
//! on the traffic a program sends. Each server records every request or
//! message it receives, answers according to directives the test sets, and
//! can run callbacks at fixed points of the request lifecycle.
//!
//! # Architecture
//!
//! - **state**: Thread-safe store of live data, history and hooks
//! - **lifecycle**: Capture lifecycle, hook pipeline and response resolver
//! - **transport**: hyper HTTP/1, TLS and SMTP adapters
//! - **server**: Server handles running on background workers
//! - **testing**: Fixtures for test suites
//! - **observability**: Tracing and metrics setup
//! - **utils**: Errors and configuration
//!
//! # Example
//!
//! ```no_run
//! use sentra_lab_mockserver::{http_server, Hook};
//!
//! http_server(|server| {
//!     server.set("response_status", 201);
//!     server.set("response_content", "created");
//!     server
//!         .register_hook("before_response", Hook::request(|snapshot| {
//!             println!("{} {:?}", snapshot["command"].as_str().unwrap_or(""), snapshot.get("path"));
//!         }))
//!         .unwrap();
//!
//!     // point the code under test at server.url("/things") ...
//!
//!     for request in server.history() {
//!         assert_eq!(request["command"], "POST");
//!     }
//! })
//! .unwrap();
//! ```

pub mod lifecycle;
pub mod observability;
pub mod server;
pub mod state;
pub mod testing;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use lifecycle::hooks::{Hook, HookStage};
pub use lifecycle::mail::MailMessage;
pub use lifecycle::resolver::{keys, HttpResponse};
pub use server::{
    http_server, https_server, smtp_server, start_server, start_smtp_server, start_tls_server,
    HttpServer, SmtpServer,
};
pub use state::{Data, Directive, Snapshot, StateStore, Value};
pub use utils::config::{HttpServerConfig, RunnerConfig, SmtpServerConfig};
pub use utils::errors::{MockServerError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Mock server build information
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rustc_version: env!("RUSTC_VERSION"),
        }
    }
}
