// packages/mockserver/src/observability/mod.rs
//! Logging and metrics setup
//!
//! The library only emits `tracing` events and `metrics` counters; installing
//! a subscriber or exporter is left to the embedding test suite or to the
//! runner binary through the functions below.
//!
//! # Counters
//!
//! - `mockserver_http_requests_total`: HTTP exchanges captured
//! - `mockserver_smtp_messages_total`: SMTP messages captured
//! - `mockserver_hook_invocations_total`: hooks run, labelled by stage
//! - `mockserver_resets_total`: full state resets

use crate::utils::config::{LogFormat, ObservabilityConfig};
use crate::utils::errors::{MockServerError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const HTTP_REQUESTS_TOTAL: &str = "mockserver_http_requests_total";
pub const SMTP_MESSAGES_TOTAL: &str = "mockserver_smtp_messages_total";
pub const HOOK_INVOCATIONS_TOTAL: &str = "mockserver_hook_invocations_total";
pub const RESETS_TOTAL: &str = "mockserver_resets_total";

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| MockServerError::Config(format!("Invalid log filter: {}", e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.log_format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };

    result.map_err(|e| MockServerError::Config(format!("Tracing already initialised: {}", e)))
}

/// Install the Prometheus exporter if a listen address is configured
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let Some(addr) = &config.metrics_addr else {
        return Ok(());
    };

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| MockServerError::Config(format!("Invalid metrics address {}: {}", addr, e)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MockServerError::Config(format!("Failed to install exporter: {}", e)))?;

    info!("Prometheus exporter listening on {}", addr);
    Ok(())
}
