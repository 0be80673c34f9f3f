// packages/mockserver/src/transport/mod.rs
//! Network adapters feeding the capture lifecycle

pub mod http_listener;
pub mod smtp_listener;
pub mod tls_handler;

pub use http_listener::HttpListener;
pub use smtp_listener::SmtpListener;
pub use tls_handler::TlsHandler;
