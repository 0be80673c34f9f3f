// packages/mockserver/src/server/worker.rs
//! Background worker owning a server's runtime
//!
//! Each server runs its accept loop on a tokio runtime that lives on a
//! dedicated OS thread, so the thread that started the server stays free to
//! drive requests and assert on state.

use crate::utils::errors::{MockServerError, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

pub(crate) struct Worker {
    name: String,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
}

impl Worker {
    /// Run `task` to completion on `runtime` in a new thread
    ///
    /// The task receives the token that [`Worker::stop`] cancels.
    pub(crate) fn spawn<F, Fut>(name: &str, runtime: Runtime, task: F) -> Result<Self>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()>,
    {
        let cancel = CancellationToken::new();
        let running = Arc::new(AtomicBool::new(true));

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn({
                let cancel = cancel.clone();
                let running = Arc::clone(&running);
                move || {
                    runtime.block_on(task(cancel));
                    drop(runtime);
                    running.store(false, Ordering::SeqCst);
                }
            })
            .map_err(|e| MockServerError::Worker(format!("Failed to spawn {}: {}", name, e)))?;

        debug!("Worker {} started", name);

        Ok(Self {
            name: name.to_string(),
            cancel,
            handle: Mutex::new(Some(handle)),
            running,
        })
    }

    /// Cancel the task and wait for the thread to exit; idempotent
    pub(crate) fn stop(&self) {
        self.cancel.cancel();

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Worker {} panicked", self.name);
            }
            self.running.store(false, Ordering::SeqCst);
            debug!("Worker {} stopped", self.name);
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}
