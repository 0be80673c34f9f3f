// packages/mockserver/src/main.rs
//! Sentra Lab Mock Server
//!
//! Standalone runner: starts the configured HTTP, HTTPS and SMTP mock
//! servers, logs every captured exchange and shuts down on Ctrl-C.

use anyhow::{Context, Result};
use sentra_lab_mockserver::observability::{init_metrics, init_tracing};
use sentra_lab_mockserver::utils::config::RunnerConfig;
use sentra_lab_mockserver::{BuildInfo, Hook, HttpResponse, HttpServer, Snapshot, SmtpServer};
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = RunnerConfig::load().context("Failed to load configuration")?;

    init_tracing(&config.observability)?;
    init_metrics(&config.observability)?;

    let build = BuildInfo::current();
    info!(
        "Starting Sentra Lab Mock Server v{} ({})",
        build.version, build.git_hash
    );
    info!("Configuration loaded: {:?}", config);

    let https = config.https.clone().map(|mut https| {
        https.tls.get_or_insert_with(Default::default);
        https
    });

    let mut http_servers = Vec::new();
    for server_config in [config.http.clone(), https].into_iter().flatten() {
        let server = HttpServer::start(server_config).context("Failed to start HTTP server")?;
        server.register_hook("after_request", Hook::exchange(log_exchange))?;
        info!("Serving {}", server.url("/"));
        http_servers.push(server);
    }

    let smtp = match config.smtp.clone() {
        Some(smtp_config) => {
            let server = SmtpServer::start(smtp_config).context("Failed to start SMTP server")?;
            info!("Accepting mail on {}", server.local_addr());
            Some(server)
        }
        None => None,
    };

    if http_servers.is_empty() && smtp.is_none() {
        error!("No server configured, nothing to do");
        return Ok(());
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install CTRL+C signal handler")?;
    info!("Received shutdown signal, cleaning up...");

    for server in &http_servers {
        server.stop();
        if config.dump_history {
            dump_history(&server.url(""), &server.history());
        }
    }
    if let Some(server) = &smtp {
        server.stop();
        if config.dump_history {
            dump_history(&server.local_addr().to_string(), &server.history());
        }
    }

    info!("Servers stopped gracefully");
    Ok(())
}

fn log_exchange(snapshot: &Snapshot, response: &HttpResponse) {
    match snapshot.to_json() {
        Ok(json) => info!(status = response.status(), "Captured request: {}", json),
        Err(e) => error!("Failed to serialize captured request: {}", e),
    }
}

fn dump_history(server: &str, history: &[Snapshot]) {
    info!("{} captured {} entries", server, history.len());
    for (index, snapshot) in history.iter().enumerate() {
        match snapshot.to_json() {
            Ok(json) => info!("[{}] #{}: {}", server, index, json),
            Err(e) => error!("[{}] #{}: {}", server, index, e),
        }
    }
}
