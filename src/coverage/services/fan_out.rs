//! Bounded, fault-isolated fan-out over per-endpoint tasks.
//!
//! Every item runs on its own Tokio task, so a panic in one item surfaces as
//! that item's failure instead of unwinding through its siblings. A shared
//! semaphore caps how many items talk to the control plane at once.

use futures::future::join_all;
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Why a fanned-out task produced no value.
#[derive(Debug, Error)]
pub enum TaskFailure<E>
where
    E: fmt::Display,
{
    /// The task ran and returned an error.
    #[error("{0}")]
    Failed(E),

    /// The task panicked or was cancelled.
    #[error("task aborted: {0}")]
    Aborted(String),

    /// The concurrency limiter was closed before the task could start.
    #[error("concurrency limiter closed")]
    LimiterClosed,
}

/// Settled outcome of one fanned-out task, keyed by its input.
pub type Settled<K, T, E> = (K, Result<T, TaskFailure<E>>);

/// Semaphore-gated "settle all" executor.
#[derive(Debug, Clone)]
pub struct FanOut {
    permits: Arc<Semaphore>,
    limit: NonZeroUsize,
}

impl FanOut {
    /// Creates an executor running at most `limit` tasks at once.
    #[must_use]
    pub fn new(limit: NonZeroUsize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit.get())),
            limit,
        }
    }

    /// Returns the concurrency bound.
    #[must_use]
    pub const fn limit(&self) -> NonZeroUsize {
        self.limit
    }

    /// Runs `task` for every key and waits for all of them to settle.
    ///
    /// Results are returned in input order, one per key.
    pub async fn settle_all<K, T, E, F, Fut>(&self, keys: Vec<K>, task: F) -> Vec<Settled<K, T, E>>
    where
        K: Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
        F: Fn(&K) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let handles = keys.iter().map(|key| {
            let permits = Arc::clone(&self.permits);
            let future = task(key);
            tokio::spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return Err(TaskFailure::LimiterClosed);
                };
                future.await.map_err(TaskFailure::Failed)
            })
        });
        let joined = join_all(handles).await;

        keys.into_iter()
            .zip(joined)
            .map(|(key, outcome)| {
                let settled = match outcome {
                    Ok(result) => result,
                    Err(join_err) => Err(TaskFailure::Aborted(join_err.to_string())),
                };
                (key, settled)
            })
            .collect()
    }
}
