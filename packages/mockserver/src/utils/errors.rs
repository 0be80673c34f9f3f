// packages/mockserver/src/utils/errors.rs
//! Error types for the mock server
//!
//! Configuration mistakes (unknown hook stage, wrong hook arity) are
//! returned synchronously to the caller. Everything that happens while a
//! connection is being handled is reported to the transport layer, which
//! logs it and ends that one connection.

use crate::lifecycle::hooks::HookStage;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, MockServerError>;

/// Mock server errors
#[derive(Debug, Error)]
pub enum MockServerError {
    /// Listening socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Socket level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Certificate loading or handshake failure
    #[error("TLS error: {0}")]
    Tls(String),

    /// Hook registered under a name that is not a lifecycle stage
    #[error("Unknown hook stage: {0}")]
    UnknownHook(String),

    /// Hook callable does not take the arguments its stage passes
    #[error("Hook for {stage} must be {expected}")]
    HookSignature {
        stage: HookStage,
        expected: &'static str,
    },

    /// Response directive holds a value of the wrong type or range
    #[error("Invalid directive {key}: expected {expected}")]
    InvalidDirective { key: String, expected: &'static str },

    /// Body-bearing request without a usable Content-Length
    #[error("Missing or malformed Content-Length on {method} request")]
    ContentLength { method: String },

    /// Request body could not be read
    #[error("Body read error: {0}")]
    Body(String),

    /// Response could not be assembled
    #[error("HTTP error: {0}")]
    Http(String),

    /// Received mail could not be parsed
    #[error("Mail parse error: {0}")]
    MailParse(String),

    /// SMTP dialogue failure
    #[error("SMTP protocol error: {0}")]
    Protocol(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Background worker could not be started
    #[error("Worker error: {0}")]
    Worker(String),
}

impl From<config::ConfigError> for MockServerError {
    fn from(err: config::ConfigError) -> Self {
        MockServerError::Config(err.to_string())
    }
}

impl From<mailparse::MailParseError> for MockServerError {
    fn from(err: mailparse::MailParseError) -> Self {
        MockServerError::MailParse(err.to_string())
    }
}
