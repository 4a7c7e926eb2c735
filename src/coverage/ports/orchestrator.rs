//! Orchestration control-plane port for endpoint inventory and containers.

use crate::coverage::domain::{AgentContainerSpec, Container, ContainerId, Endpoint, EndpointId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for orchestration client operations.
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

/// Remote control-plane contract consumed by coverage services.
///
/// Every call is a network round trip; callers bound them with timeouts.
#[async_trait]
pub trait OrchestrationClient: Send + Sync {
    /// Lists the full endpoint inventory.
    async fn list_endpoints(&self) -> OrchestrationResult<Vec<Endpoint>>;

    /// Resolves one endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::EndpointNotFound`] when the endpoint is
    /// not in the inventory.
    async fn get_endpoint(&self, endpoint_id: EndpointId) -> OrchestrationResult<Endpoint>;

    /// Lists containers on an endpoint; `all` includes stopped containers.
    async fn list_containers(
        &self,
        endpoint_id: EndpointId,
        all: bool,
    ) -> OrchestrationResult<Vec<Container>>;

    /// Pulls an image onto an endpoint.
    async fn pull_image(
        &self,
        endpoint_id: EndpointId,
        name: &str,
        tag: &str,
    ) -> OrchestrationResult<()>;

    /// Creates a container and returns its identity.
    async fn create_container(
        &self,
        endpoint_id: EndpointId,
        spec: &AgentContainerSpec,
        name: &str,
    ) -> OrchestrationResult<ContainerId>;

    /// Starts a container.
    async fn start_container(
        &self,
        endpoint_id: EndpointId,
        container_id: &ContainerId,
    ) -> OrchestrationResult<()>;

    /// Stops a container.
    async fn stop_container(
        &self,
        endpoint_id: EndpointId,
        container_id: &ContainerId,
    ) -> OrchestrationResult<()>;

    /// Removes a container; `force` removes it even while running.
    async fn remove_container(
        &self,
        endpoint_id: EndpointId,
        container_id: &ContainerId,
        force: bool,
    ) -> OrchestrationResult<()>;
}

/// Errors returned by orchestration client adapters.
#[derive(Debug, Clone, Error)]
pub enum OrchestrationError {
    /// The endpoint is not in the inventory.
    #[error("endpoint {0} not found")]
    EndpointNotFound(EndpointId),

    /// The container does not exist on the endpoint.
    #[error("container {container_id} not found on endpoint {endpoint_id}")]
    ContainerNotFound {
        /// Endpoint identifier.
        endpoint_id: EndpointId,
        /// Container identifier.
        container_id: ContainerId,
    },

    /// The control plane rejected the request.
    #[error("control plane rejected request ({status}): {message}")]
    Api {
        /// HTTP-style status code.
        status: u16,
        /// Error message from the control plane.
        message: String,
    },

    /// The request could not be delivered.
    #[error("control plane transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),
}

impl OrchestrationError {
    /// Wraps a transport-level failure.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }

    /// Creates an API rejection.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }
}
