// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cooperative scheduler abstraction. Runs on top of a Tokio runtime;
//! `build_runtime` covers launching the runtime in either executor mode,
//! `TaskManager` itself covers task bookkeeping and bounded shutdown.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// How the executor is hosted: a worker pool, or the current thread
/// (used by service hosts that already own the main thread).
pub enum ExecutorMode {
    /// `0` means "number of hardware threads", matching Tokio's own
    /// multi-thread runtime default.
    ThreadPool(usize),
    SingleThread,
}

/// Builds the underlying Tokio runtime for the chosen [`ExecutorMode`].
pub fn build_runtime(mode: ExecutorMode) -> std::io::Result<tokio::runtime::Runtime> {
    match mode {
        ExecutorMode::ThreadPool(n) => {
            let mut builder = tokio::runtime::Builder::new_multi_thread();
            if n > 0 {
                builder.worker_threads(n);
            }
            builder.enable_all().build()
        }
        ExecutorMode::SingleThread => tokio::runtime::Builder::new_current_thread().enable_all().build(),
    }
}

/// Tracks every long-lived task the agent enqueues, by id, so `stop()` can
/// request cancellation and wait for all of them with a bounded timeout.
pub struct TaskManager {
    cancel: CancellationToken,
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self { cancel: CancellationToken::new(), handles: Mutex::new(Vec::new()) }
    }

    /// The `keepRunning` signal threaded through every long-lived task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawns a cooperative task. `id` is unique and used for shutdown
    /// diagnostics.
    pub async fn enqueue_task<F>(&self, id: impl Into<String>, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = id.into();
        let handle = tokio::spawn(fut);
        self.handles.lock().await.push((id, handle));
    }

    /// Requests cancellation of every enqueued task and waits for all of
    /// them to finish, up to `timeout`. Tasks that don't finish in time are
    /// logged and abandoned.
    pub async fn stop(&self, timeout: Duration) {
        self.cancel.cancel();
        let handles = std::mem::take(&mut *self.handles.lock().await);
        let deadline = tokio::time::Instant::now() + timeout;

        for (id, handle) in handles {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(task = %id, error = %e, "task panicked during shutdown"),
                Err(_) => warn!(task = %id, "task did not observe shutdown in time, abandoning"),
            }
        }
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}
