//! Fleet-wide coverage synchronization.

use super::{
    detector::AgentDetector,
    fan_out::{FanOut, TaskFailure},
};
use crate::coverage::{
    domain::{
        AgentImage, CoverageStatus, Endpoint, EndpointId, EndpointObservation, EndpointStatus,
        EndpointType,
    },
    ports::{CoverageRepository, CoverageRepositoryError, OrchestrationClient, OrchestrationError},
};
use mockable::Clock;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};

/// Tunables for a sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerSettings {
    /// Agent image probed for.
    pub image: AgentImage,
    /// Timeout for the inventory call and for each probe.
    pub probe_timeout: Duration,
    /// Maximum concurrent probes.
    pub max_concurrency: NonZeroUsize,
}

impl ReconcilerSettings {
    /// Builds settings from runtime configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::config::ConfigError`] when the agent image is
    /// invalid.
    pub fn from_config(
        config: &crate::config::CoverageConfig,
    ) -> Result<Self, crate::config::ConfigError> {
        Ok(Self {
            image: config.agent_image()?,
            probe_timeout: config.probe_timeout(),
            max_concurrency: config.max_concurrency(),
        })
    }
}

/// Counters describing one sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncOutcome {
    /// Endpoints seen for the first time.
    pub added: usize,
    /// Existing records whose name or status changed.
    pub updated: usize,
    /// Endpoints probed for the agent.
    pub probed: usize,
    /// Probes whose task aborted; those endpoints stay unclassified.
    pub probe_failures: usize,
}

/// Errors that abort a sync pass before anything is written.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The endpoint inventory could not be fetched.
    #[error("failed to list endpoints: {0}")]
    Inventory(#[from] OrchestrationError),

    /// The endpoint inventory call timed out.
    #[error("endpoint inventory timed out after {0:?}")]
    InventoryTimeout(Duration),

    /// The batch could not be written; nothing was applied.
    #[error(transparent)]
    Repository(#[from] CoverageRepositoryError),
}

/// Result type for sync passes.
pub type SyncResult<T> = Result<T, SyncError>;

/// Folds live agent detection across the fleet into the coverage store.
pub struct CoverageReconciler<O, R, C>
where
    O: OrchestrationClient,
    R: CoverageRepository,
    C: Clock + Send + Sync,
{
    orchestrator: Arc<O>,
    detector: AgentDetector<O>,
    repository: Arc<R>,
    clock: Arc<C>,
    fan_out: FanOut,
    probe_timeout: Duration,
}

impl<O, R, C> Clone for CoverageReconciler<O, R, C>
where
    O: OrchestrationClient,
    R: CoverageRepository,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
            detector: self.detector.clone(),
            repository: Arc::clone(&self.repository),
            clock: Arc::clone(&self.clock),
            fan_out: self.fan_out.clone(),
            probe_timeout: self.probe_timeout,
        }
    }
}

impl<O, R, C> CoverageReconciler<O, R, C>
where
    O: OrchestrationClient + 'static,
    R: CoverageRepository,
    C: Clock + Send + Sync,
{
    /// Creates a reconciler.
    #[must_use]
    pub fn new(
        orchestrator: Arc<O>,
        repository: Arc<R>,
        clock: Arc<C>,
        settings: ReconcilerSettings,
    ) -> Self {
        let detector = AgentDetector::new(
            Arc::clone(&orchestrator),
            settings.image,
            settings.probe_timeout,
        );
        Self {
            orchestrator,
            detector,
            repository,
            clock,
            fan_out: FanOut::new(settings.max_concurrency),
            probe_timeout: settings.probe_timeout,
        }
    }

    /// Runs one sync pass over the whole fleet.
    ///
    /// Reachable, compatible endpoints are probed concurrently; the others
    /// are classified from the inventory alone. All observations are then
    /// written in one atomic batch that leaves operator-set statuses alone.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the inventory cannot be fetched or the
    /// batch cannot be written. A failed pass writes nothing.
    pub async fn sync(&self) -> SyncResult<SyncOutcome> {
        let endpoints = timeout(self.probe_timeout, self.orchestrator.list_endpoints())
            .await
            .map_err(|_| SyncError::InventoryTimeout(self.probe_timeout))??;

        let probe_targets: Vec<(EndpointId, EndpointType)> = endpoints
            .iter()
            .filter(|endpoint| endpoint.is_probeable())
            .map(|endpoint| (endpoint.id, endpoint.endpoint_type))
            .collect();
        let probed = probe_targets.len();

        let detector = self.detector.clone();
        let settled = self
            .fan_out
            .settle_all(probe_targets, |&(endpoint_id, endpoint_type)| {
                let task_detector = detector.clone();
                async move {
                    Ok::<_, Infallible>(
                        task_detector
                            .detect(endpoint_id, Some(endpoint_type))
                            .await,
                    )
                }
            })
            .await;

        let mut probe_failures = 0;
        let mut detected = BTreeMap::new();
        for ((endpoint_id, _), outcome) in settled {
            match outcome {
                Ok(result) => {
                    detected.insert(endpoint_id, CoverageStatus::from(result));
                }
                Err(failure) => {
                    probe_failures += 1;
                    log_probe_failure(endpoint_id, &failure);
                }
            }
        }

        let observations: Vec<EndpointObservation> = endpoints
            .iter()
            .map(|endpoint| EndpointObservation {
                endpoint_id: endpoint.id,
                endpoint_name: endpoint.name.clone(),
                status: if endpoint.is_probeable() {
                    detected.get(&endpoint.id).copied()
                } else {
                    classify_unprobed(endpoint)
                },
            })
            .collect();

        let batch = self
            .repository
            .apply_sync_batch(&observations, self.clock.utc())
            .await?;
        let outcome = SyncOutcome {
            added: batch.added,
            updated: batch.updated,
            probed,
            probe_failures,
        };
        info!(
            endpoints = endpoints.len(),
            probed = outcome.probed,
            added = outcome.added,
            updated = outcome.updated,
            probe_failures = outcome.probe_failures,
            "coverage sync finished"
        );
        Ok(outcome)
    }
}

/// Status of an endpoint that was not probed this pass.
fn classify_unprobed(endpoint: &Endpoint) -> Option<CoverageStatus> {
    if !endpoint.endpoint_type.supports_agent() {
        return Some(CoverageStatus::Incompatible);
    }
    match endpoint.status {
        EndpointStatus::Down => Some(CoverageStatus::Unreachable),
        EndpointStatus::Up | EndpointStatus::Unknown => None,
    }
}

fn log_probe_failure(endpoint_id: EndpointId, failure: &TaskFailure<Infallible>) {
    warn!(endpoint_id = %endpoint_id, error = %failure, "agent probe task aborted");
}
