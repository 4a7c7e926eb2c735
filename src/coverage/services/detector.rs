//! Agent presence detection on a single endpoint.

use crate::coverage::{
    domain::{AgentImage, Container, DetectionResult, EndpointId, EndpointType},
    ports::OrchestrationClient,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Answers whether the agent is deployed and running on an endpoint.
///
/// Detection never fails: unreachable endpoints are a result, not an error.
pub struct AgentDetector<O>
where
    O: OrchestrationClient,
{
    orchestrator: Arc<O>,
    image: AgentImage,
    probe_timeout: Duration,
}

impl<O> Clone for AgentDetector<O>
where
    O: OrchestrationClient,
{
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
            image: self.image.clone(),
            probe_timeout: self.probe_timeout,
        }
    }
}

impl<O> AgentDetector<O>
where
    O: OrchestrationClient,
{
    /// Creates a detector for the given agent image.
    #[must_use]
    pub const fn new(orchestrator: Arc<O>, image: AgentImage, probe_timeout: Duration) -> Self {
        Self {
            orchestrator,
            image,
            probe_timeout,
        }
    }

    /// Returns the agent image this detector looks for.
    #[must_use]
    pub const fn image(&self) -> &AgentImage {
        &self.image
    }

    /// Detects the agent on an endpoint.
    ///
    /// When `endpoint_type` is known and cannot host the agent, the result is
    /// [`DetectionResult::Incompatible`] and no remote call is made.
    pub async fn detect(
        &self,
        endpoint_id: EndpointId,
        endpoint_type: Option<EndpointType>,
    ) -> DetectionResult {
        if endpoint_type.is_some_and(|kind| !kind.supports_agent()) {
            return DetectionResult::Incompatible;
        }

        let listing = timeout(
            self.probe_timeout,
            self.orchestrator.list_containers(endpoint_id, true),
        )
        .await;
        let result = match listing {
            Ok(Ok(containers)) => match select_agent(&self.image, &containers) {
                Some(agent) if agent.is_running() => DetectionResult::Deployed,
                Some(_) => DetectionResult::Failed,
                None => DetectionResult::NotFound,
            },
            Ok(Err(err)) => {
                warn!(endpoint_id = %endpoint_id, error = %err, "agent probe failed");
                DetectionResult::Unreachable
            }
            Err(_) => {
                warn!(
                    endpoint_id = %endpoint_id,
                    timeout_secs = self.probe_timeout.as_secs(),
                    "agent probe timed out"
                );
                DetectionResult::Unreachable
            }
        };
        debug!(endpoint_id = %endpoint_id, result = %result, "agent detection finished");
        result
    }
}

/// Picks the agent container out of an endpoint's containers.
///
/// A running agent wins over a stopped one.
pub(crate) fn select_agent<'a>(
    image: &AgentImage,
    containers: &'a [Container],
) -> Option<&'a Container> {
    let mut agents = containers
        .iter()
        .filter(|container| image.is_agent_container(container));
    let first = agents.next()?;
    if first.is_running() {
        return Some(first);
    }
    Some(agents.find(|container| container.is_running()).unwrap_or(first))
}
