//! Service layer for agent lifecycle actions on endpoints.

use super::{
    detector::select_agent,
    fan_out::{FanOut, Settled},
};
use crate::coverage::{
    domain::{
        AgentContainerSpec, AgentDeployOptions, AgentImage, Container, ContainerId,
        CoverageStatus, Endpoint, EndpointId, LifecycleWrite, is_managed_agent,
    },
    ports::{
        CoverageRepository, CoverageRepositoryError, OrchestrationClient, OrchestrationError,
        OrchestrationResult,
    },
};
use mockable::Clock;
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Tunables for lifecycle actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// Agent image to deploy.
    pub image: AgentImage,
    /// Name given to newly created agent containers.
    pub container_name: String,
    /// Timeout applied to each control-plane call.
    pub action_timeout: Duration,
    /// Maximum concurrent actions in bulk operations.
    pub max_concurrency: NonZeroUsize,
}

impl LifecycleSettings {
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
            container_name: config.agent_container_name.clone(),
            action_timeout: config.action_timeout(),
            max_concurrency: config.max_concurrency(),
        })
    }
}

/// What a lifecycle action did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleOutcome {
    /// A new agent container was created and started.
    Deployed,
    /// The agent was already running; nothing was mutated.
    AlreadyDeployed,
    /// A stopped agent was started.
    Enabled,
    /// A running agent was stopped.
    Disabled,
    /// The agent was already stopped.
    AlreadyDisabled,
    /// The agent container was removed.
    Removed,
}

impl LifecycleOutcome {
    /// Returns the outcome label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deployed => "deployed",
            Self::AlreadyDeployed => "already_deployed",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::AlreadyDisabled => "already_disabled",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for LifecycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-endpoint result of a bulk action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkActionResult {
    /// Endpoint the action targeted.
    pub endpoint_id: EndpointId,
    /// Whether the action succeeded.
    pub success: bool,
    /// Outcome label on success, error text on failure.
    pub message: String,
}

/// Service-level errors for lifecycle actions.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The endpoint is not in the inventory.
    #[error("endpoint {0} not found")]
    EndpointNotFound(EndpointId),

    /// The endpoint has no agent container.
    #[error("no agent container found on endpoint {0}")]
    AgentNotFound(EndpointId),

    /// The endpoint type cannot host the agent.
    #[error("endpoint {endpoint_id} of type {endpoint_type} cannot host the agent")]
    IncompatibleEndpoint {
        /// Endpoint identifier.
        endpoint_id: EndpointId,
        /// Control-plane type code.
        endpoint_type: i32,
    },

    /// A control-plane call exceeded the action timeout.
    #[error("control plane call timed out after {0:?}")]
    Timeout(Duration),

    /// The control plane rejected or failed a call.
    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    /// The coverage write failed after the action was performed.
    #[error(transparent)]
    Repository(#[from] CoverageRepositoryError),
}

/// Result type for lifecycle actions.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Agent lifecycle orchestration service.
pub struct AgentLifecycleService<O, R, C>
where
    O: OrchestrationClient,
    R: CoverageRepository,
    C: Clock + Send + Sync,
{
    orchestrator: Arc<O>,
    repository: Arc<R>,
    clock: Arc<C>,
    settings: Arc<LifecycleSettings>,
    fan_out: FanOut,
}

impl<O, R, C> Clone for AgentLifecycleService<O, R, C>
where
    O: OrchestrationClient,
    R: CoverageRepository,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
            repository: Arc::clone(&self.repository),
            clock: Arc::clone(&self.clock),
            settings: Arc::clone(&self.settings),
            fan_out: self.fan_out.clone(),
        }
    }
}

impl<O, R, C> AgentLifecycleService<O, R, C>
where
    O: OrchestrationClient + 'static,
    R: CoverageRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a new lifecycle service.
    #[must_use]
    pub fn new(
        orchestrator: Arc<O>,
        repository: Arc<R>,
        clock: Arc<C>,
        settings: LifecycleSettings,
    ) -> Self {
        let fan_out = FanOut::new(settings.max_concurrency);
        Self {
            orchestrator,
            repository,
            clock,
            settings: Arc::new(settings),
            fan_out,
        }
    }

    /// Deploys the agent on an endpoint.
    ///
    /// A running agent is left untouched, a stopped one is started, and a
    /// missing one is pulled, created and started as a managed container.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::EndpointNotFound`] when the endpoint cannot
    /// be resolved, [`LifecycleError::IncompatibleEndpoint`] for endpoint
    /// types that cannot host the agent, or control-plane and persistence
    /// errors.
    pub async fn deploy(
        &self,
        endpoint_id: EndpointId,
        options: &AgentDeployOptions,
    ) -> LifecycleResult<LifecycleOutcome> {
        let endpoint = self.resolve_endpoint(endpoint_id).await?;
        if !endpoint.endpoint_type.supports_agent() {
            return Err(LifecycleError::IncompatibleEndpoint {
                endpoint_id,
                endpoint_type: endpoint.endpoint_type.code(),
            });
        }

        let outcome = match self.find_agent(endpoint_id).await? {
            Some(agent) if agent.is_running() => {
                self.record(&endpoint, CoverageStatus::Deployed, true, Some(&agent))
                    .await?;
                LifecycleOutcome::AlreadyDeployed
            }
            Some(agent) => {
                self.call(self.orchestrator.start_container(endpoint_id, &agent.id))
                    .await?;
                self.record(&endpoint, CoverageStatus::Deployed, true, Some(&agent))
                    .await?;
                LifecycleOutcome::Enabled
            }
            None => {
                let container_id = self.create_agent(endpoint_id, options).await?;
                self.write(
                    &endpoint,
                    CoverageStatus::Deployed,
                    true,
                    Some(container_id),
                    true,
                )
                .await?;
                LifecycleOutcome::Deployed
            }
        };
        info!(endpoint_id = %endpoint_id, outcome = %outcome, "agent deploy finished");
        Ok(outcome)
    }

    /// Starts an existing agent container.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::AgentNotFound`] when the endpoint has no
    /// agent container, or control-plane and persistence errors.
    pub async fn enable(&self, endpoint_id: EndpointId) -> LifecycleResult<LifecycleOutcome> {
        let endpoint = self.resolve_endpoint(endpoint_id).await?;
        let agent = self.require_agent(endpoint_id).await?;
        if !agent.is_running() {
            self.call(self.orchestrator.start_container(endpoint_id, &agent.id))
                .await?;
        }
        self.record(&endpoint, CoverageStatus::Deployed, true, Some(&agent))
            .await?;
        info!(endpoint_id = %endpoint_id, "agent enabled");
        Ok(LifecycleOutcome::Enabled)
    }

    /// Stops an existing agent container.
    ///
    /// The record moves to `failed`, the state for a known agent that is not
    /// running.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::AgentNotFound`] when the endpoint has no
    /// agent container, or control-plane and persistence errors.
    pub async fn disable(&self, endpoint_id: EndpointId) -> LifecycleResult<LifecycleOutcome> {
        let endpoint = self.resolve_endpoint(endpoint_id).await?;
        let agent = self.require_agent(endpoint_id).await?;
        let outcome = if agent.is_running() {
            self.call(self.orchestrator.stop_container(endpoint_id, &agent.id))
                .await?;
            LifecycleOutcome::Disabled
        } else {
            LifecycleOutcome::AlreadyDisabled
        };
        self.record(&endpoint, CoverageStatus::Failed, false, Some(&agent))
            .await?;
        info!(endpoint_id = %endpoint_id, outcome = %outcome, "agent disable finished");
        Ok(outcome)
    }

    /// Removes the agent container.
    ///
    /// A running agent is stopped first. With `force`, a failed stop is
    /// logged and removal proceeds as a forced remove.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::AgentNotFound`] when the endpoint has no
    /// agent container, the stop error when stopping fails without `force`,
    /// or control-plane and persistence errors.
    pub async fn remove(
        &self,
        endpoint_id: EndpointId,
        force: bool,
    ) -> LifecycleResult<LifecycleOutcome> {
        let endpoint = self.resolve_endpoint(endpoint_id).await?;
        let agent = self.require_agent(endpoint_id).await?;
        if agent.is_running() {
            let stopped = self
                .call(self.orchestrator.stop_container(endpoint_id, &agent.id))
                .await;
            match stopped {
                Ok(()) => {}
                Err(err) if force => {
                    warn!(
                        endpoint_id = %endpoint_id,
                        error = %err,
                        "agent stop failed, forcing removal"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        self.call(
            self.orchestrator
                .remove_container(endpoint_id, &agent.id, force),
        )
        .await?;
        self.write(&endpoint, CoverageStatus::NotDeployed, false, None, false)
            .await?;
        info!(endpoint_id = %endpoint_id, force, "agent removed");
        Ok(LifecycleOutcome::Removed)
    }

    /// Deploys the agent on every endpoint concurrently.
    ///
    /// Returns one result per endpoint, in input order; a failure on one
    /// endpoint never affects the others.
    pub async fn deploy_bulk(
        &self,
        endpoint_ids: &[EndpointId],
        options: &AgentDeployOptions,
    ) -> Vec<BulkActionResult> {
        let shared_options = Arc::new(options.clone());
        self.run_bulk("deploy", endpoint_ids, move |service, endpoint_id| {
            let task_options = Arc::clone(&shared_options);
            async move { service.deploy(endpoint_id, &task_options).await }
        })
        .await
    }

    /// Removes the agent from every endpoint concurrently.
    pub async fn remove_bulk(
        &self,
        endpoint_ids: &[EndpointId],
        force: bool,
    ) -> Vec<BulkActionResult> {
        self.run_bulk("remove", endpoint_ids, move |service, endpoint_id| async move {
            service.remove(endpoint_id, force).await
        })
        .await
    }

    /// Enables the agent on every endpoint concurrently.
    pub async fn enable_bulk(&self, endpoint_ids: &[EndpointId]) -> Vec<BulkActionResult> {
        self.run_bulk("enable", endpoint_ids, |service, endpoint_id| async move {
            service.enable(endpoint_id).await
        })
        .await
    }

    /// Disables the agent on every endpoint concurrently.
    pub async fn disable_bulk(&self, endpoint_ids: &[EndpointId]) -> Vec<BulkActionResult> {
        self.run_bulk("disable", endpoint_ids, |service, endpoint_id| async move {
            service.disable(endpoint_id).await
        })
        .await
    }

    async fn run_bulk<F, Fut>(
        &self,
        action: &'static str,
        endpoint_ids: &[EndpointId],
        task: F,
    ) -> Vec<BulkActionResult>
    where
        F: Fn(Self, EndpointId) -> Fut,
        Fut: Future<Output = LifecycleResult<LifecycleOutcome>> + Send + 'static,
    {
        let settled = self
            .fan_out
            .settle_all(endpoint_ids.to_vec(), |endpoint_id| {
                task(self.clone(), *endpoint_id)
            })
            .await;
        let results: Vec<BulkActionResult> = settled.into_iter().map(to_bulk_result).collect();
        let failed = results.iter().filter(|result| !result.success).count();
        info!(
            action,
            total = results.len(),
            failed,
            "bulk agent action finished"
        );
        results
    }

    async fn create_agent(
        &self,
        endpoint_id: EndpointId,
        options: &AgentDeployOptions,
    ) -> LifecycleResult<ContainerId> {
        let image = &self.settings.image;
        self.call(
            self.orchestrator
                .pull_image(endpoint_id, image.repository(), image.tag()),
        )
        .await?;
        let spec = AgentContainerSpec::for_endpoint(endpoint_id, image, options);
        let container_id = self
            .call(self.orchestrator.create_container(
                endpoint_id,
                &spec,
                &self.settings.container_name,
            ))
            .await?;
        self.call(self.orchestrator.start_container(endpoint_id, &container_id))
            .await?;
        Ok(container_id)
    }

    async fn resolve_endpoint(&self, endpoint_id: EndpointId) -> LifecycleResult<Endpoint> {
        match self.call(self.orchestrator.get_endpoint(endpoint_id)).await {
            Err(LifecycleError::Orchestration(OrchestrationError::EndpointNotFound(_))) => {
                Err(LifecycleError::EndpointNotFound(endpoint_id))
            }
            other => other,
        }
    }

    async fn find_agent(&self, endpoint_id: EndpointId) -> LifecycleResult<Option<Container>> {
        let containers = self
            .call(self.orchestrator.list_containers(endpoint_id, true))
            .await?;
        Ok(select_agent(&self.settings.image, &containers).cloned())
    }

    async fn require_agent(&self, endpoint_id: EndpointId) -> LifecycleResult<Container> {
        self.find_agent(endpoint_id)
            .await?
            .ok_or(LifecycleError::AgentNotFound(endpoint_id))
    }

    async fn call<T>(
        &self,
        request: impl Future<Output = OrchestrationResult<T>>,
    ) -> LifecycleResult<T> {
        let limit = self.settings.action_timeout;
        Ok(timeout(limit, request)
            .await
            .map_err(|_| LifecycleError::Timeout(limit))??)
    }

    async fn record(
        &self,
        endpoint: &Endpoint,
        status: CoverageStatus,
        agent_enabled: bool,
        agent: Option<&Container>,
    ) -> LifecycleResult<()> {
        let managed = agent.is_some_and(is_managed_agent);
        let container_id = agent.map(|container| container.id.clone());
        self.write(endpoint, status, agent_enabled, container_id, managed)
            .await
    }

    async fn write(
        &self,
        endpoint: &Endpoint,
        status: CoverageStatus,
        agent_enabled: bool,
        agent_container_id: Option<ContainerId>,
        agent_managed: bool,
    ) -> LifecycleResult<()> {
        let write = LifecycleWrite {
            endpoint_id: endpoint.id,
            endpoint_name: endpoint.name.clone(),
            status,
            agent_enabled,
            agent_container_id,
            agent_managed,
            recorded_at: self.clock.utc(),
        };
        if !self.repository.record_lifecycle(&write).await? {
            debug!(
                endpoint_id = %endpoint.id,
                "no coverage record yet, lifecycle result left for the next sync"
            );
        }
        Ok(())
    }
}

fn to_bulk_result(
    (endpoint_id, settled): Settled<EndpointId, LifecycleOutcome, LifecycleError>,
) -> BulkActionResult {
    match settled {
        Ok(outcome) => BulkActionResult {
            endpoint_id,
            success: true,
            message: outcome.as_str().to_owned(),
        },
        Err(failure) => {
            warn!(endpoint_id = %endpoint_id, error = %failure, "bulk agent action failed");
            BulkActionResult {
                endpoint_id,
                success: false,
                message: failure.to_string(),
            }
        }
    }
}
