// packages/mockserver/src/utils/config.rs
//! Server and runner configuration
//!
//! Library users build these structs directly. The runner binary loads a
//! [`RunnerConfig`] from an optional `mockserver.toml` and `MOCKSERVER__*`
//! environment variables.

use crate::utils::errors::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Loopback
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Random port
pub const DEFAULT_PORT: u16 = 0;

/// Environment variable naming the runner config file
pub const CONFIG_PATH_ENV: &str = "MOCKSERVER_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "mockserver";
const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 100;

/// Address a server listens on
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Host or IP to bind
    pub host: String,

    /// Port to bind, 0 picks a free one
    pub port: u16,
}

impl ListenConfig {
    pub fn new(host: Option<&str>, port: Option<u16>) -> Self {
        Self {
            host: host.unwrap_or(DEFAULT_HOST).to_string(),
            port: port.unwrap_or(DEFAULT_PORT),
        }
    }
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Certificate material for HTTPS
///
/// With no paths a self-signed pair is generated. With only a certificate
/// path the private key is read from the same file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM file with the certificate chain (and optionally the key)
    pub cert_path: Option<PathBuf>,

    /// PEM file with the private key
    pub key_path: Option<PathBuf>,
}

/// HTTP/HTTPS server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpServerConfig {
    /// Listen address
    pub listen: ListenConfig,

    /// TLS termination, `None` serves plain HTTP
    pub tls: Option<TlsConfig>,

    /// Runtime worker threads handling connections
    pub worker_threads: usize,

    /// Time in-flight connections get to finish on stop (milliseconds)
    pub shutdown_grace_ms: u64,
}

impl HttpServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            tls: None,
            worker_threads: 2,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

/// SMTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmtpServerConfig {
    /// Listen address
    pub listen: ListenConfig,

    /// Name announced in the greeting and EHLO reply
    pub hostname: String,

    /// Time in-flight sessions get to finish on stop (milliseconds)
    pub shutdown_grace_ms: u64,
}

impl SmtpServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for SmtpServerConfig {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            hostname: "localhost".to_string(),
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Tracing and metrics configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Output format of the tracing subscriber
    pub log_format: LogFormat,

    /// Filter used when `RUST_LOG` is unset
    pub log_level: String,

    /// Prometheus exporter listen address, disabled when unset
    pub metrics_addr: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            log_level: "info".to_string(),
            metrics_addr: None,
        }
    }
}

/// Configuration of the standalone runner
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Plain HTTP server, if any
    pub http: Option<HttpServerConfig>,

    /// HTTPS server, if any (its `tls` defaults to a generated pair)
    pub https: Option<HttpServerConfig>,

    /// SMTP server, if any
    pub smtp: Option<SmtpServerConfig>,

    /// Log the captured history as JSON on shutdown
    pub dump_history: bool,

    pub observability: ObservabilityConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            http: Some(HttpServerConfig::default()),
            https: None,
            smtp: None,
            dump_history: false,
            observability: ObservabilityConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Load from `$MOCKSERVER_CONFIG` (or `./mockserver.*`) and the environment
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        debug!("Loading configuration from {:?}", path);

        let config = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(config::Environment::with_prefix("MOCKSERVER").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_defaults() {
        let listen = ListenConfig::default();
        assert_eq!(listen.host, "127.0.0.1");
        assert_eq!(listen.port, 0);

        let listen = ListenConfig::new(Some("0.0.0.0"), Some(2525));
        assert_eq!(listen.host, "0.0.0.0");
        assert_eq!(listen.port, 2525);
    }

    #[test]
    fn test_runner_default_starts_http_only() {
        let config = RunnerConfig::default();
        assert!(config.http.is_some());
        assert!(config.https.is_none());
        assert!(config.smtp.is_none());
    }

    #[test]
    fn test_deserialize_partial_toml() {
        let config: RunnerConfig = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                dump_history = true

                [smtp]
                hostname = "mail.test"

                [smtp.listen]
                port = 2525

                [observability]
                log_format = "json"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(config.dump_history);
        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.hostname, "mail.test");
        assert_eq!(smtp.listen.port, 2525);
        assert_eq!(smtp.listen.host, "127.0.0.1");
        assert_eq!(smtp.shutdown_grace(), Duration::from_millis(100));
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
