// packages/mockserver/src/server/http.rs
//! HTTP/HTTPS server handle

use crate::lifecycle::controller::HttpLifecycle;
use crate::lifecycle::hooks::{Hook, HookStage};
use crate::server::bind;
use crate::server::worker::Worker;
use crate::state::store::StateStore;
use crate::state::value::{Data, Directive, Snapshot, Value};
use crate::transport::http_listener::HttpListener;
use crate::transport::tls_handler::TlsHandler;
use crate::utils::config::HttpServerConfig;
use crate::utils::errors::{MockServerError, Result};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// A running HTTP or HTTPS mock server
///
/// Every request is recorded into the history and answered from the
/// `response_*` directives in [`HttpServer::data`]. All methods may be
/// called from any thread while the server is serving.
pub struct HttpServer {
    scheme: &'static str,
    local_addr: SocketAddr,
    state: StateStore,
    worker: Worker,
}

impl HttpServer {
    /// Bind and start serving in the background
    pub fn start(config: HttpServerConfig) -> Result<Self> {
        let acceptor = config
            .tls
            .as_ref()
            .map(|tls| TlsHandler::new(tls.clone()).acceptor())
            .transpose()?;

        let std_listener = bind(&config.listen)?;
        let local_addr = std_listener.local_addr()?;

        let state = StateStore::new();
        let listener = Arc::new(HttpListener::new(
            HttpLifecycle::new(state.clone()),
            acceptor,
            local_addr,
        ));
        let scheme = listener.scheme();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name(format!("mockserver-{}", scheme))
            .enable_all()
            .build()
            .map_err(|e| MockServerError::Worker(format!("Failed to build runtime: {}", e)))?;

        let grace = config.shutdown_grace();
        let name = format!("mockserver-{}-{}", scheme, local_addr.port());
        let worker = Worker::spawn(&name, runtime, move |cancel| async move {
            match TcpListener::from_std(std_listener) {
                Ok(tcp) => listener.run(tcp, cancel, grace).await,
                Err(e) => error!("Failed to register listener: {}", e),
            }
        })?;

        info!("Started {} server at {}", scheme, local_addr);

        Ok(Self {
            scheme,
            local_addr,
            state,
            worker,
        })
    }

    /// `scheme://host:port` followed by `path`
    pub fn url(&self, path: &str) -> String {
        format!("{}://{}{}", self.scheme, self.local_addr, path)
    }

    pub fn scheme(&self) -> &'static str {
        self.scheme
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

    /// Copy of the live data: last request fields plus directives
    pub fn data(&self) -> Data {
        self.state.get_data()
    }

    /// Set one literal entry
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.state.set(key, Directive::literal(value));
    }

    /// Set an entry computed when the next history entry is saved
    pub fn set_deferred<F, V>(&self, key: impl Into<String>, producer: F)
    where
        F: Fn() -> V + Send + Sync + 'static,
        V: Into<Value>,
    {
        self.state.set(key, Directive::deferred(producer));
    }

    /// Merge several entries at once
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

    /// Every recorded request, oldest first
    pub fn history(&self) -> Vec<Snapshot> {
        self.state.get_history()
    }

    pub fn hooks(&self) -> BTreeMap<HookStage, Hook> {
        self.state.hooks()
    }

    /// Register `hook` under a stage name such as `before_request`
    pub fn register_hook(&self, name: &str, hook: Hook) -> Result<()> {
        let stage: HookStage = name.parse()?;
        self.state.register_hook(stage, hook)
    }

    /// Clear data, history and hooks
    pub fn reset(&self) {
        self.state.reset();
    }

    /// Handle to the underlying state, e.g. for use inside hooks
    pub fn state(&self) -> StateStore {
        self.state.clone()
    }

    /// Stop accepting and shut the worker down; idempotent
    pub fn stop(&self) {
        info!("Stopping {} server at {}", self.scheme, self.local_addr);
        self.worker.stop();
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("url", &self.url(""))
            .field("running", &self.is_running())
            .finish()
    }
}
