// packages/mockserver/src/server/smtp.rs
//! SMTP server handle

use crate::lifecycle::mail::MailRecorder;
use crate::server::bind;
use crate::server::worker::Worker;
use crate::state::store::StateStore;
use crate::state::value::{Data, Directive, Snapshot, Value};
use crate::transport::smtp_listener::SmtpListener;
use crate::utils::config::SmtpServerConfig;
use crate::utils::errors::{MockServerError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// A running SMTP sink
///
/// Messages are recorded, never relayed. Sessions are served one at a time
/// by a single-threaded runtime.
pub struct SmtpServer {
    local_addr: SocketAddr,
    state: StateStore,
    worker: Worker,
}

impl SmtpServer {
    /// Bind and start accepting mail in the background
    pub fn start(config: SmtpServerConfig) -> Result<Self> {
        let std_listener = bind(&config.listen)?;
        let local_addr = std_listener.local_addr()?;

        let state = StateStore::new();
        let listener = Arc::new(SmtpListener::new(
            MailRecorder::new(state.clone()),
            config.hostname.as_str(),
            local_addr,
        ));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| MockServerError::Worker(format!("Failed to build runtime: {}", e)))?;

        let grace = config.shutdown_grace();
        let name = format!("mockserver-smtp-{}", local_addr.port());
        let worker = Worker::spawn(&name, runtime, move |cancel| async move {
            match TcpListener::from_std(std_listener) {
                Ok(tcp) => listener.run(tcp, cancel, grace).await,
                Err(e) => error!("Failed to register listener: {}", e),
            }
        })?;

        info!("Started SMTP server at {}", local_addr);

        Ok(Self {
            local_addr,
            state,
            worker,
        })
    }

    pub fn host(&self) -> String {
        self.local_addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Copy of the live data: fields of the last message plus user entries
    pub fn data(&self) -> Data {
        self.state.get_data()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.state.set(key, Directive::literal(value));
    }

    pub fn set_deferred<F, V>(&self, key: impl Into<String>, producer: F)
    where
        F: Fn() -> V + Send + Sync + 'static,
        V: Into<Value>,
    {
        self.state.set(key, Directive::deferred(producer));
    }

    pub fn update_data<I, K>(&self, partial: I)
    where
        I: IntoIterator<Item = (K, Directive)>,
        K: Into<String>,
    {
        self.state.update_data(partial);
    }

    pub fn remove(&self, key: &str) -> Option<Directive> {
        self.state.remove(key)
    }

    /// Every received message, oldest first
    pub fn history(&self) -> Vec<Snapshot> {
        self.state.get_history()
    }

    pub fn reset(&self) {
        self.state.reset();
    }

    pub fn state(&self) -> StateStore {
        self.state.clone()
    }

    pub fn stop(&self) {
        info!("Stopping SMTP server at {}", self.local_addr);
        self.worker.stop();
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }
}

impl std::fmt::Debug for SmtpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpServer")
            .field("addr", &self.local_addr)
            .field("running", &self.is_running())
            .finish()
    }
}
