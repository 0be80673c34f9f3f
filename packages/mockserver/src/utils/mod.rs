// packages/mockserver/src/utils/mod.rs
//! Common utilities
//!
//! - **errors**: Error taxonomy shared by every component
//! - **config**: Server and runner configuration

pub mod config;
pub mod errors;

pub use config::{
    HttpServerConfig, ListenConfig, ObservabilityConfig, RunnerConfig, SmtpServerConfig,
    TlsConfig,
};
pub use errors::{MockServerError, Result};
