// packages/mockserver/src/transport/http_listener.rs
//! HTTP/HTTPS transport adapter
//!
//! Owns the accept loop of an HTTP server. Every accepted connection runs as
//! its own task, optionally behind TLS, and is served by hyper's HTTP/1
//! implementation with a single entry point for every method. One request is
//! served per connection; once hyper is done with the connection the
//! lifecycle's `after_request` stage and cleanup run, even if writing the
//! response failed.

use crate::lifecycle::controller::{BodySource, Exchange, HttpLifecycle, RequestHead};
use crate::lifecycle::resolver::HttpResponse;
use crate::utils::errors::{MockServerError, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::http::request::Parts;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

impl BodySource for Incoming {
    fn read_body(self, len: usize) -> impl Future<Output = Result<Bytes>> + Send {
        async move {
            let body = self
                .collect()
                .await
                .map_err(|e| MockServerError::Body(e.to_string()))?
                .to_bytes();

            if body.len() != len {
                return Err(MockServerError::Body(format!(
                    "expected {} bytes, got {}",
                    len,
                    body.len()
                )));
            }
            Ok(body)
        }
    }
}

/// Accept loop and connection handling of one HTTP server
pub struct HttpListener {
    lifecycle: HttpLifecycle,
    acceptor: Option<TlsAcceptor>,
    local_addr: SocketAddr,
}

impl HttpListener {
    pub fn new(
        lifecycle: HttpLifecycle,
        acceptor: Option<TlsAcceptor>,
        local_addr: SocketAddr,
    ) -> Self {
        Self {
            lifecycle,
            acceptor,
            local_addr,
        }
    }

    pub fn scheme(&self) -> &'static str {
        if self.acceptor.is_some() {
            "https"
        } else {
            "http"
        }
    }

    /// Accept connections until `cancel` fires
    ///
    /// In-flight connections get `grace` to finish once accepting stops.
    pub async fn run(
        self: Arc<Self>,
        listener: TcpListener,
        cancel: CancellationToken,
        grace: Duration,
    ) {
        info!("Server listening on {}://{}", self.scheme(), self.local_addr);
        let tracker = TaskTracker::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let this = Arc::clone(&self);
                        tracker.spawn(async move {
                            debug!("Accepted connection from {}", peer);
                            if let Err(e) = this.handle_connection(stream, peer).await {
                                warn!("Connection from {} failed: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
        }

        drop(listener);
        tracker.close();
        if tokio::time::timeout(grace, tracker.wait()).await.is_err() {
            warn!(
                "{} connection(s) still in flight after {:?}, dropping them",
                tracker.len(),
                grace
            );
        }

        info!("Stopping server at {}", self.local_addr);
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        match &self.acceptor {
            Some(acceptor) => {
                let stream = acceptor.accept(stream).await.map_err(|e| {
                    MockServerError::Tls(format!("Handshake with {} failed: {}", peer, e))
                })?;
                self.serve_http(stream, peer).await
            }
            None => self.serve_http(stream, peer).await,
        }
    }

    async fn serve_http<IO>(&self, io: IO, peer: SocketAddr) -> Result<()>
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let handled: Arc<Mutex<Option<Exchange>>> = Arc::new(Mutex::new(None));

        let service = service_fn({
            let lifecycle = self.lifecycle.clone();
            let handled = Arc::clone(&handled);
            let local_addr = self.local_addr;
            let scheme = self.scheme();

            move |req: Request<Incoming>| {
                let lifecycle = lifecycle.clone();
                let handled = Arc::clone(&handled);

                async move {
                    let (parts, body) = req.into_parts();
                    let head = request_head(&parts, peer, local_addr, scheme);

                    let exchange = lifecycle.handle(head, body).await?;
                    let response = to_hyper_response(&exchange.response)?;
                    *handled.lock() = Some(exchange);

                    Ok::<_, MockServerError>(response)
                }
            }
        });

        let served = http1::Builder::new()
            .keep_alive(false)
            .serve_connection(TokioIo::new(io), service)
            .await;

        // The request was recorded, so its cleanup runs whatever happened to the response
        let exchange = handled.lock().take();
        if let Some(exchange) = exchange {
            if let Err(e) = &served {
                debug!("Response to {} not delivered: {}", peer, e);
            }
            self.lifecycle.complete(&exchange);
        }

        served.map_err(|e| MockServerError::Http(format!("Connection error: {}", e)))
    }
}

fn request_head(
    parts: &Parts,
    client_address: SocketAddr,
    server_address: SocketAddr,
    scheme: &'static str,
) -> RequestHead {
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.to_string());

    RequestHead {
        method: parts.method.as_str().to_string(),
        path,
        version: format!("{:?}", parts.version),
        headers: parts
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect(),
        client_address,
        server_address,
        scheme,
    }
}

/// Status line, then every header pair in order, then the body
fn to_hyper_response(response: &HttpResponse) -> Result<Response<Full<Bytes>>> {
    let status = StatusCode::from_u16(response.status()).map_err(|e| {
        MockServerError::Http(format!("Invalid status {}: {}", response.status(), e))
    })?;

    let mut builder = Response::builder().status(status);
    for (field, value) in response.headers() {
        builder = builder.header(field.as_str(), value.as_str());
    }

    builder
        .body(Full::new(response.content().cloned().unwrap_or_default()))
        .map_err(|e| MockServerError::Http(format!("Invalid response: {}", e)))
}
