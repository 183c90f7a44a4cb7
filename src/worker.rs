//! Supervised pool for fire-and-forget background work.
//!
//! Callers hand off a future and return immediately; the pool keeps the
//! handle so that shutdown can wait for in-flight callbacks instead of
//! dropping them.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;

use crate::error::{BecknError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    pub completed: usize,
    pub aborted: usize,
}

#[derive(Default)]
pub struct WorkerPool {
    tasks: Mutex<JoinSet<()>>,
    closed: AtomicBool,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `task` onto the current runtime. Fails once the pool is closed.
    pub fn spawn<F>(&self, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        if self.is_closed() {
            return Err(BecknError::ShuttingDown);
        }
        while let Some(finished) = tasks.try_join_next() {
            log_join_error(finished);
        }
        tasks.spawn(task);
        Ok(())
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("Worker pool closed to new work");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the pool and waits up to `timeout` for in-flight tasks; the rest are aborted.
    pub async fn drain(&self, timeout: Duration) -> DrainReport {
        let mut tasks = {
            let mut guard = self.tasks.lock();
            self.close();
            std::mem::take(&mut *guard)
        };
        let deadline = Instant::now() + timeout;
        let mut report = DrainReport::default();

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(finished)) => {
                    log_join_error(finished);
                    report.completed += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    report.aborted = tasks.len();
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    tracing::warn!("Aborted {} background tasks still running at shutdown", report.aborted);
                    break;
                }
            }
        }

        tracing::info!(
            completed = report.completed,
            aborted = report.aborted,
            "Worker pool drained"
        );
        report
    }
}

fn log_join_error(result: std::result::Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            tracing::error!("Background task panicked: {}", e);
        }
    }
}
