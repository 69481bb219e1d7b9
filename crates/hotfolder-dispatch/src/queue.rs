//! Bounded-concurrency dispatch queue.
//!
//! # Design
//! - A FIFO-fair semaphore bounds how many pipelines run at once; submissions
//!   beyond that wait for a slot instead of blocking the caller.
//! - Pipelines are blocking (stability sleeps, file copies) and run on the
//!   blocking thread pool.
//! - No deduplication: the same path submitted twice runs twice.
//! - `shutdown` stops intake then waits for queued and running work; it never
//!   abandons a copy mid-write.
//! - A panicking pipeline is logged and counted as failed; the queue keeps going.

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hotfolder_telemetry::Metrics;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error};

use crate::error::{DispatchError, DispatchResult};
use crate::executor::TransferExecutor;
use crate::model::FileTask;

/// Accepts file tasks and runs them through a shared [`TransferExecutor`].
pub struct DispatchQueue {
    executor: Arc<TransferExecutor>,
    permits: Arc<Semaphore>,
    threads: usize,
    metrics: Metrics,
    runtime: Handle,
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    closed: bool,
    tasks: JoinSet<()>,
}

impl DispatchQueue {
    /// Create a queue running at most `threads` pipelines at once (at least one).
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::RuntimeUnavailable`] when called outside a
    /// Tokio runtime.
    pub fn new(
        executor: Arc<TransferExecutor>,
        threads: usize,
        metrics: Metrics,
    ) -> DispatchResult<Self> {
        let runtime = Handle::try_current().map_err(|_| DispatchError::RuntimeUnavailable)?;
        let threads = threads.max(1);
        Ok(Self {
            executor,
            permits: Arc::new(Semaphore::new(threads)),
            threads,
            metrics,
            runtime,
            state: Mutex::new(QueueState::default()),
        })
    }

    /// Queue `task` for dispatch. Returns without waiting for a worker slot.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::QueueClosed`] once [`Self::shutdown`] was called.
    pub fn submit(&self, task: FileTask) -> DispatchResult<()> {
        let mut state = self.lock_state();
        if state.closed {
            return Err(DispatchError::QueueClosed {
                path: task.path().to_path_buf(),
            });
        }
        while let Some(result) = state.tasks.try_join_next() {
            self.log_join(result);
        }

        self.metrics.attempt_queued();
        debug!(path = %task.path().display(), "file queued for dispatch");
        let permits = Arc::clone(&self.permits);
        let executor = Arc::clone(&self.executor);
        let metrics = self.metrics.clone();
        state.tasks.spawn_on(
            async move {
                // The semaphore is never closed.
                let Ok(permit) = permits.acquire_owned().await else {
                    return;
                };
                metrics.worker_started();
                let path = task.path().to_path_buf();
                let result = tokio::task::spawn_blocking(move || executor.execute(&task)).await;
                drop(permit);
                metrics.worker_finished();
                if let Err(err) = result {
                    error!(path = %path.display(), error = %err, "dispatch worker panicked");
                    metrics.inc_dispatch("failed");
                }
            },
            &self.runtime,
        );
        drop(state);
        Ok(())
    }

    /// Stop accepting work and wait until every queued and running pipeline finished.
    ///
    /// Calling it again after the drain completed returns immediately.
    pub async fn shutdown(&self) {
        let mut tasks = {
            let mut state = self.lock_state();
            state.closed = true;
            mem::take(&mut state.tasks)
        };
        let pending = tasks.len();
        if pending > 0 {
            debug!(pending, "draining dispatch queue");
        }
        while let Some(result) = tasks.join_next().await {
            self.log_join(result);
        }
    }

    /// Pipelines currently holding a worker slot.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.threads
            .saturating_sub(self.permits.available_permits())
    }

    /// Worker pool size.
    #[must_use]
    pub const fn threads(&self) -> usize {
        self.threads
    }

    fn log_join(&self, result: Result<(), JoinError>) {
        if let Err(err) = result {
            error!(error = %err, "dispatch task aborted");
            self.metrics.inc_dispatch("failed");
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
