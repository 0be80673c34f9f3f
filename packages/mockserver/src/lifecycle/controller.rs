// packages/mockserver/src/lifecycle/controller.rs
//! HTTP request lifecycle
//!
//! Drives one request through a fixed sequence of steps:
//!
//! ```text
//! RECEIVED → SNAPSHOT_TAKEN → BODY_READ → HISTORY_SAVED → (response_timeout)
//!   → before_request → before_response → RESPONSE_BUILT → after_response
//!   ── transport sends ──
//!   → after_request → CLEANED_UP
//! ```
//!
//! [`HttpLifecycle::handle`] runs everything up to the built response; the
//! transport writes it and then calls [`HttpLifecycle::complete`].

use crate::lifecycle::hooks::HookStage;
use crate::lifecycle::resolver::{keys, HttpResponse, ResponseDirectives};
use crate::observability::{HOOK_INVOCATIONS_TOTAL, HTTP_REQUESTS_TOTAL};
use crate::state::store::StateStore;
use crate::state::value::{Snapshot, Value};
use crate::utils::errors::{MockServerError, Result};
use bytes::Bytes;
use std::future::Future;
use std::net::SocketAddr;
use tracing::{debug, info};

/// Methods whose body is read into the snapshot
pub const BODY_METHODS: [&str; 3] = ["POST", "PUT", "PATCH"];

/// Transport fields of a request, available before the body is read
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: String,

    /// Path plus query string, as sent
    pub path: String,

    /// Protocol version, e.g. `HTTP/1.1`
    pub version: String,

    /// Received headers in arrival order
    pub headers: Vec<(String, String)>,

    pub client_address: SocketAddr,
    pub server_address: SocketAddr,

    /// `http` or `https`
    pub scheme: &'static str,
}

impl RequestHead {
    pub fn requestline(&self) -> String {
        format!("{} {} {}", self.method, self.path, self.version)
    }

    pub fn carries_body(&self) -> bool {
        BODY_METHODS.contains(&self.method.as_str())
    }

    /// Declared body length; missing or malformed is a protocol error
    pub fn content_length(&self) -> Result<usize> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse().ok())
            .ok_or_else(|| MockServerError::ContentLength {
                method: self.method.clone(),
            })
    }

    fn to_fields(&self) -> Snapshot {
        let mut fields = Snapshot::new();
        fields.insert(keys::COMMAND, self.method.as_str());
        fields.insert(keys::PATH, self.path.as_str());
        fields.insert(keys::REQUEST_VERSION, self.version.as_str());
        fields.insert(keys::REQUESTLINE, self.requestline());
        fields.insert(keys::HEADERS, Value::Headers(self.headers.clone()));
        fields.insert(keys::CLIENT_ADDRESS, self.client_address);
        fields.insert(keys::SERVER_ADDRESS, self.server_address);
        fields.insert(keys::SCHEME, self.scheme);
        fields
    }
}

/// Where the request body comes from
pub trait BodySource: Send {
    /// Read exactly `len` bytes
    fn read_body(self, len: usize) -> impl Future<Output = Result<Bytes>> + Send;
}

impl BodySource for Bytes {
    fn read_body(self, len: usize) -> impl Future<Output = Result<Bytes>> + Send {
        async move {
            if self.len() < len {
                return Err(MockServerError::Body(format!(
                    "expected {} bytes, got {}",
                    len,
                    self.len()
                )));
            }
            Ok(self.slice(..len))
        }
    }
}

/// Snapshot and response of one handled request
#[derive(Debug, Clone)]
pub struct Exchange {
    pub snapshot: Snapshot,
    pub response: HttpResponse,
}

/// Runs the capture lifecycle of HTTP requests against one state store
#[derive(Clone)]
pub struct HttpLifecycle {
    store: StateStore,
}

impl HttpLifecycle {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Record the request and build its response
    pub async fn handle<B: BodySource>(&self, head: RequestHead, body: B) -> Result<Exchange> {
        info!("Processing {} request", head.method);

        let mut fields = head.to_fields();
        if head.carries_body() {
            let len = head.content_length()?;
            debug!("Content-Length: {}", len);
            let body = body.read_body(len).await?;
            fields.insert(keys::BODY, Value::Bytes(body));
        }

        // A body left over from an earlier request must not leak into this one
        let snapshot = self.store.save_history(fields, &[keys::BODY]);
        metrics::counter!(HTTP_REQUESTS_TOTAL).increment(1);

        let directives = ResponseDirectives::from_data(&self.store.get_data())?;
        if let Some(delay) = directives.timeout {
            info!("Server sleeping for: {:?}", delay);
            tokio::time::sleep(delay).await;
        }

        self.run_hook(HookStage::BeforeRequest, &snapshot, None);
        self.run_hook(HookStage::BeforeResponse, &snapshot, None);

        // Hooks may have changed the directives
        let response = ResponseDirectives::from_data(&self.store.get_data())?.build_response();

        self.run_hook(HookStage::AfterResponse, &snapshot, Some(&response));

        info!("Server returning status code {}", response.status());
        for (field, value) in response.headers() {
            info!("Server setting response header {}: {}", field, value);
        }
        if let Some(content) = response.content() {
            info!("Server sending content: {} bytes", content.len());
        }

        Ok(Exchange { snapshot, response })
    }

    /// Run `after_request` and apply the one-shot cleanup directives
    pub fn complete(&self, exchange: &Exchange) {
        self.run_hook(
            HookStage::AfterRequest,
            &exchange.snapshot,
            Some(&exchange.response),
        );

        let data = self.store.get_data();
        let flag = |key: &str| data.get(key).and_then(Value::as_bool).unwrap_or(false);
        let (clear, reset) = (flag(keys::RESPONSE_CLEAR), flag(keys::RESPONSE_RESET));

        if reset {
            debug!("Resetting server state after response");
            self.store.reset();
        } else if clear {
            debug!("Clearing response directives after response");
            self.store.clear_response_directives();
        }
    }

    fn run_hook(&self, stage: HookStage, snapshot: &Snapshot, response: Option<&HttpResponse>) {
        if let Some(hook) = self.store.hook(stage) {
            debug!("Running {} hook", stage);
            metrics::counter!(HOOK_INVOCATIONS_TOTAL, "stage" => stage.as_str()).increment(1);
            hook.call(snapshot, response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::hooks::Hook;
    use crate::state::value::Directive;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn head(method: &str, path: &str, headers: Vec<(&str, &str)>) -> RequestHead {
        RequestHead {
            method: method.to_string(),
            path: path.to_string(),
            version: "HTTP/1.1".to_string(),
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            client_address: "127.0.0.1:50000".parse().unwrap(),
            server_address: "127.0.0.1:8080".parse().unwrap(),
            scheme: "http",
        }
    }

    #[tokio::test]
    async fn test_get_is_captured() {
        let lifecycle = HttpLifecycle::new(StateStore::new());

        let exchange = lifecycle
            .handle(head("GET", "/first?q=1", vec![("key", "value")]), Bytes::new())
            .await
            .unwrap();

        let snapshot = &exchange.snapshot;
        assert_eq!(snapshot[keys::COMMAND], "GET");
        assert_eq!(snapshot[keys::PATH], "/first?q=1");
        assert_eq!(snapshot[keys::REQUEST_VERSION], "HTTP/1.1");
        assert_eq!(snapshot[keys::REQUESTLINE], "GET /first?q=1 HTTP/1.1");
        assert_eq!(snapshot.header("key"), Some("value"));
        assert!(!snapshot.contains_key(keys::BODY));
        assert_eq!(exchange.response.status(), 200);
        assert_eq!(lifecycle.store().get_history(), vec![snapshot.clone()]);
    }

    #[tokio::test]
    async fn test_post_body_is_read() {
        let lifecycle = HttpLifecycle::new(StateStore::new());

        let exchange = lifecycle
            .handle(
                head("POST", "/second", vec![("Content-Length", "4")]),
                Bytes::from_static(b"data"),
            )
            .await
            .unwrap();

        assert_eq!(exchange.snapshot[keys::BODY], b"data");
    }

    #[tokio::test]
    async fn test_body_without_content_length_fails() {
        let lifecycle = HttpLifecycle::new(StateStore::new());

        let result = lifecycle
            .handle(head("PUT", "/x", vec![]), Bytes::from_static(b"data"))
            .await;

        assert!(matches!(result, Err(MockServerError::ContentLength { method }) if method == "PUT"));
        assert!(lifecycle.store().get_history().is_empty());
    }

    #[tokio::test]
    async fn test_stale_body_not_carried_over() {
        let lifecycle = HttpLifecycle::new(StateStore::new());
        lifecycle
            .handle(
                head("POST", "/a", vec![("content-length", "1")]),
                Bytes::from_static(b"x"),
            )
            .await
            .unwrap();

        let exchange = lifecycle.handle(head("GET", "/b", vec![]), Bytes::new()).await.unwrap();

        assert!(!exchange.snapshot.contains_key(keys::BODY));
    }

    #[tokio::test]
    async fn test_response_from_directives() {
        let store = StateStore::new();
        store.set(keys::RESPONSE_STATUS, Directive::deferred(|| 201));
        store.set(keys::RESPONSE_HEADERS, Value::from(vec![("k", "1"), ("k", "2")]));
        store.set(keys::RESPONSE_CONTENT, Value::from(b"content"));
        let lifecycle = HttpLifecycle::new(store.clone());

        let exchange = lifecycle.handle(head("GET", "/", vec![]), Bytes::new()).await.unwrap();

        assert_eq!(exchange.response.status(), 201);
        assert_eq!(exchange.response.headers().len(), 2);
        assert_eq!(exchange.response.content().map(|c| c.as_ref()), Some(&b"content"[..]));
        assert_eq!(store.get_history()[0][keys::RESPONSE_STATUS], 201i64);
    }

    #[tokio::test]
    async fn test_hooks_run_in_order() {
        let store = StateStore::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let record = |name: &'static str| {
            let calls = Arc::clone(&calls);
            move || calls.lock().push(name)
        };
        let before_request = record("before_request");
        let before_response = record("before_response");
        let after_response = record("after_response");
        let after_request = record("after_request");

        store
            .register_hook(HookStage::AfterRequest, Hook::exchange(move |_, _| after_request()))
            .unwrap();
        store
            .register_hook(HookStage::BeforeRequest, Hook::no_args(before_request))
            .unwrap();
        store
            .register_hook(HookStage::AfterResponse, Hook::exchange(move |_, _| after_response()))
            .unwrap();
        store
            .register_hook(HookStage::BeforeResponse, Hook::request(move |_| before_response()))
            .unwrap();

        let lifecycle = HttpLifecycle::new(store);
        let exchange = lifecycle.handle(head("GET", "/", vec![]), Bytes::new()).await.unwrap();
        assert_eq!(
            *calls.lock(),
            vec!["before_request", "before_response", "after_response"]
        );

        lifecycle.complete(&exchange);
        assert_eq!(calls.lock().last(), Some(&"after_request"));
    }

    #[tokio::test]
    async fn test_before_response_hook_can_change_response() {
        let store = StateStore::new();
        store
            .register_hook(
                HookStage::BeforeResponse,
                Hook::request({
                    let store = store.clone();
                    move |_| store.set(keys::RESPONSE_STATUS, Value::from(418))
                }),
            )
            .unwrap();

        let lifecycle = HttpLifecycle::new(store);
        let exchange = lifecycle.handle(head("GET", "/", vec![]), Bytes::new()).await.unwrap();

        assert_eq!(exchange.response.status(), 418);
    }

    #[tokio::test]
    async fn test_timeout_delays_response() {
        let store = StateStore::new();
        store.set(keys::RESPONSE_TIMEOUT, Value::from(0.05));
        let lifecycle = HttpLifecycle::new(store.clone());

        let started = Instant::now();
        lifecycle.handle(head("GET", "/", vec![]), Bytes::new()).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_clear_after_response() {
        let store = StateStore::new();
        store.set(keys::RESPONSE_STATUS, Value::from(301));
        store.set(keys::RESPONSE_CLEAR, Value::from(true));
        let lifecycle = HttpLifecycle::new(store.clone());

        let exchange = lifecycle.handle(head("GET", "/", vec![]), Bytes::new()).await.unwrap();
        lifecycle.complete(&exchange);

        let data = store.get_data();
        assert!(!data.contains_key(keys::RESPONSE_STATUS));
        assert!(!data.contains_key(keys::RESPONSE_CLEAR));
        assert_eq!(data[keys::PATH], "/");
        assert_eq!(store.history_len(), 1);

        let next = lifecycle.handle(head("GET", "/", vec![]), Bytes::new()).await.unwrap();
        assert_eq!(next.response.status(), 200);
    }

    #[tokio::test]
    async fn test_reset_after_response_wins_over_clear() {
        let store = StateStore::new();
        store.set(keys::RESPONSE_CLEAR, Value::from(true));
        store.set(keys::RESPONSE_RESET, Value::from(true));
        store
            .register_hook(HookStage::BeforeRequest, Hook::no_args(|| {}))
            .unwrap();
        let lifecycle = HttpLifecycle::new(store.clone());

        let exchange = lifecycle.handle(head("GET", "/", vec![]), Bytes::new()).await.unwrap();
        lifecycle.complete(&exchange);

        assert!(store.get_data().is_empty());
        assert!(store.get_history().is_empty());
        assert!(store.hooks().is_empty());
    }

    struct Delayed {
        started: tokio::sync::oneshot::Sender<()>,
        body: tokio::sync::oneshot::Receiver<Bytes>,
    }

    impl BodySource for Delayed {
        fn read_body(self, len: usize) -> impl Future<Output = Result<Bytes>> + Send {
            async move {
                let _ = self.started.send(());
                let body = self
                    .body
                    .await
                    .map_err(|e| MockServerError::Body(e.to_string()))?;
                body.read_body(len).await
            }
        }
    }

    #[tokio::test]
    async fn test_overlapping_requests_keep_their_own_fields() {
        let lifecycle = HttpLifecycle::new(StateStore::new());
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let (body_tx, body_rx) = tokio::sync::oneshot::channel();

        let slow = tokio::spawn({
            let lifecycle = lifecycle.clone();
            async move {
                lifecycle
                    .handle(
                        head("POST", "/a", vec![("Content-Length", "4")]),
                        Delayed {
                            started: started_tx,
                            body: body_rx,
                        },
                    )
                    .await
            }
        });
        started_rx.await.unwrap();

        let fast = lifecycle.handle(head("GET", "/b", vec![]), Bytes::new()).await.unwrap();
        body_tx.send(Bytes::from_static(b"aaaa")).unwrap();
        let slow = slow.await.unwrap().unwrap();

        assert_eq!(fast.snapshot[keys::COMMAND], "GET");
        assert_eq!(fast.snapshot[keys::PATH], "/b");
        assert!(!fast.snapshot.contains_key(keys::BODY));

        assert_eq!(slow.snapshot[keys::COMMAND], "POST");
        assert_eq!(slow.snapshot[keys::PATH], "/a");
        assert_eq!(slow.snapshot[keys::BODY], b"aaaa");

        assert_eq!(
            lifecycle.store().get_history(),
            vec![fast.snapshot, slow.snapshot]
        );
    }
}
