//! Supervised background task running periodic sync passes.

use super::reconciler::{CoverageReconciler, SyncError};
use crate::coverage::ports::{CoverageRepository, OrchestrationClient};
use mockable::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};

/// Live counters of the periodic sync task.
#[derive(Debug, Default)]
pub struct SyncTaskMetrics {
    passes: AtomicU64,
    failures: AtomicU64,
    endpoints_added: AtomicU64,
}

impl SyncTaskMetrics {
    /// Returns a point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> SyncTaskSnapshot {
        SyncTaskSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            endpoints_added: self.endpoints_added.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`SyncTaskMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncTaskSnapshot {
    /// Sync passes attempted.
    pub passes: u64,
    /// Passes that failed.
    pub failures: u64,
    /// Endpoints discovered across all passes.
    pub endpoints_added: u64,
}

/// Non-zero period of the background sync task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SyncPeriod(Duration);

impl SyncPeriod {
    /// Wraps `period`, rejecting zero.
    #[must_use]
    pub const fn new(period: Duration) -> Option<Self> {
        if period.is_zero() {
            None
        } else {
            Some(Self(period))
        }
    }

    /// Builds a period of `secs` seconds, clamped to at least one second.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(if secs == 0 { 1 } else { secs }))
    }

    /// Returns the period.
    #[must_use]
    pub const fn get(self) -> Duration {
        self.0
    }
}

/// Spawns a task that runs [`CoverageReconciler::sync`] every `period`
/// until `shutdown` turns `true` or its sender is dropped.
///
/// The first pass runs immediately. Failed passes are logged and forwarded
/// on `errors`; they never stop the task. A full or closed error channel
/// drops the error.
pub fn spawn_periodic_sync<O, R, C>(
    reconciler: CoverageReconciler<O, R, C>,
    period: SyncPeriod,
    mut shutdown: watch::Receiver<bool>,
    errors: mpsc::Sender<SyncError>,
) -> JoinHandle<Arc<SyncTaskMetrics>>
where
    O: OrchestrationClient + 'static,
    R: CoverageRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let metrics = Arc::new(SyncTaskMetrics::default());
        let mut ticker = interval(period.get());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period = ?period.get(), "periodic coverage sync started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    run_pass(&reconciler, &metrics, &errors).await;
                }
            }
        }

        let snapshot = metrics.snapshot();
        info!(
            passes = snapshot.passes,
            failures = snapshot.failures,
            endpoints_added = snapshot.endpoints_added,
            "periodic coverage sync stopped"
        );
        metrics
    })
}

async fn run_pass<O, R, C>(
    reconciler: &CoverageReconciler<O, R, C>,
    metrics: &SyncTaskMetrics,
    errors: &mpsc::Sender<SyncError>,
) where
    O: OrchestrationClient + 'static,
    R: CoverageRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    metrics.passes.fetch_add(1, Ordering::Relaxed);
    match reconciler.sync().await {
        Ok(outcome) => {
            metrics
                .endpoints_added
                .fetch_add(u64::try_from(outcome.added).unwrap_or(u64::MAX), Ordering::Relaxed);
        }
        Err(err) => {
            metrics.failures.fetch_add(1, Ordering::Relaxed);
            error!(error = %err, "periodic coverage sync failed");
            if errors.try_send(err).is_err() {
                warn!("sync error channel unavailable, error dropped");
            }
        }
    }
}
