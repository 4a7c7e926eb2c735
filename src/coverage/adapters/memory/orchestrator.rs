//! In-memory orchestration client for coverage tests.

use crate::coverage::{
    domain::{
        AgentContainerSpec, Container, ContainerId, ContainerState, Endpoint, EndpointId,
    },
    ports::{OrchestrationClient, OrchestrationError, OrchestrationResult},
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Remote operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrchestrationOperation {
    /// `list_containers`.
    ListContainers,
    /// `pull_image`.
    PullImage,
    /// `create_container`.
    CreateContainer,
    /// `start_container`.
    StartContainer,
    /// `stop_container`.
    StopContainer,
    /// `remove_container`.
    RemoveContainer,
}

/// Container created through the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedContainer {
    /// Endpoint the container was created on.
    pub endpoint_id: EndpointId,
    /// Assigned container identity.
    pub container_id: ContainerId,
    /// Requested container name.
    pub name: String,
    /// Create request body.
    pub spec: AgentContainerSpec,
}

/// In-memory orchestration control plane.
///
/// This adapter models an endpoint inventory and per-endpoint containers
/// without talking to a real control plane. Endpoints can be marked
/// unreachable, individual operations can be made to fail, and calls can be
/// delayed to exercise timeouts.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrchestrationClient {
    state: Arc<RwLock<InMemoryControlPlane>>,
}

#[derive(Debug, Default)]
struct InMemoryControlPlane {
    endpoints: BTreeMap<EndpointId, Endpoint>,
    containers: HashMap<EndpointId, Vec<Container>>,
    unreachable: HashSet<EndpointId>,
    failures: HashMap<(EndpointId, OrchestrationOperation), String>,
    latency: HashMap<EndpointId, Duration>,
    inventory_failure: Option<String>,
    created: Vec<CreatedContainer>,
    pulled_images: Vec<(EndpointId, String)>,
    next_container: u64,
}

impl InMemoryControlPlane {
    fn check(
        &self,
        endpoint_id: EndpointId,
        operation: OrchestrationOperation,
    ) -> OrchestrationResult<()> {
        if !self.endpoints.contains_key(&endpoint_id) {
            return Err(OrchestrationError::EndpointNotFound(endpoint_id));
        }
        if self.unreachable.contains(&endpoint_id) {
            return Err(OrchestrationError::transport(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("endpoint {endpoint_id} is unreachable"),
            )));
        }
        if let Some(message) = self.failures.get(&(endpoint_id, operation)) {
            return Err(OrchestrationError::api(500, message.clone()));
        }
        Ok(())
    }

    fn container_mut(
        &mut self,
        endpoint_id: EndpointId,
        container_id: &ContainerId,
    ) -> OrchestrationResult<&mut Container> {
        self.containers
            .get_mut(&endpoint_id)
            .and_then(|containers| {
                containers
                    .iter_mut()
                    .find(|container| container.id == *container_id)
            })
            .ok_or_else(|| OrchestrationError::ContainerNotFound {
                endpoint_id,
                container_id: container_id.clone(),
            })
    }
}

impl InMemoryOrchestrationClient {
    /// Creates an empty control plane.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an endpoint in the inventory.
    ///
    /// # Errors
    ///
    /// Returns transport errors when lock acquisition fails.
    pub fn add_endpoint(&self, endpoint: Endpoint) -> OrchestrationResult<()> {
        self.write()?.endpoints.insert(endpoint.id, endpoint);
        Ok(())
    }

    /// Places a container on an endpoint.
    ///
    /// # Errors
    ///
    /// Returns transport errors when lock acquisition fails.
    pub fn add_container(
        &self,
        endpoint_id: EndpointId,
        container: Container,
    ) -> OrchestrationResult<()> {
        self.write()?
            .containers
            .entry(endpoint_id)
            .or_default()
            .push(container);
        Ok(())
    }

    /// Makes every container call on an endpoint fail at the transport level.
    ///
    /// # Errors
    ///
    /// Returns transport errors when lock acquisition fails.
    pub fn set_unreachable(&self, endpoint_id: EndpointId) -> OrchestrationResult<()> {
        self.write()?.unreachable.insert(endpoint_id);
        Ok(())
    }

    /// Makes one operation on an endpoint fail with an API error.
    ///
    /// # Errors
    ///
    /// Returns transport errors when lock acquisition fails.
    pub fn fail_operation(
        &self,
        endpoint_id: EndpointId,
        operation: OrchestrationOperation,
        message: impl Into<String>,
    ) -> OrchestrationResult<()> {
        self.write()?
            .failures
            .insert((endpoint_id, operation), message.into());
        Ok(())
    }

    /// Delays every container call on an endpoint.
    ///
    /// # Errors
    ///
    /// Returns transport errors when lock acquisition fails.
    pub fn set_latency(&self, endpoint_id: EndpointId, delay: Duration) -> OrchestrationResult<()> {
        self.write()?.latency.insert(endpoint_id, delay);
        Ok(())
    }

    /// Makes inventory listing fail.
    ///
    /// # Errors
    ///
    /// Returns transport errors when lock acquisition fails.
    pub fn fail_inventory(&self, message: impl Into<String>) -> OrchestrationResult<()> {
        self.write()?.inventory_failure = Some(message.into());
        Ok(())
    }

    /// Returns the containers currently on an endpoint.
    ///
    /// # Errors
    ///
    /// Returns transport errors when lock acquisition fails.
    pub fn containers(&self, endpoint_id: EndpointId) -> OrchestrationResult<Vec<Container>> {
        Ok(self
            .read()?
            .containers
            .get(&endpoint_id)
            .cloned()
            .unwrap_or_default())
    }

    /// Returns every container created through the client.
    ///
    /// # Errors
    ///
    /// Returns transport errors when lock acquisition fails.
    pub fn created_containers(&self) -> OrchestrationResult<Vec<CreatedContainer>> {
        Ok(self.read()?.created.clone())
    }

    /// Returns every `(endpoint, image)` pull performed.
    ///
    /// # Errors
    ///
    /// Returns transport errors when lock acquisition fails.
    pub fn pulled_images(&self) -> OrchestrationResult<Vec<(EndpointId, String)>> {
        Ok(self.read()?.pulled_images.clone())
    }

    fn read(&self) -> OrchestrationResult<RwLockReadGuard<'_, InMemoryControlPlane>> {
        self.state
            .read()
            .map_err(|err| OrchestrationError::transport(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> OrchestrationResult<RwLockWriteGuard<'_, InMemoryControlPlane>> {
        self.state
            .write()
            .map_err(|err| OrchestrationError::transport(std::io::Error::other(err.to_string())))
    }

    async fn simulate_latency(&self, endpoint_id: EndpointId) -> OrchestrationResult<()> {
        let delay = self.read()?.latency.get(&endpoint_id).copied();
        if let Some(duration) = delay {
            tokio::time::sleep(duration).await;
        }
        Ok(())
    }
}

#[async_trait]
impl OrchestrationClient for InMemoryOrchestrationClient {
    async fn list_endpoints(&self) -> OrchestrationResult<Vec<Endpoint>> {
        let state = self.read()?;
        if let Some(message) = &state.inventory_failure {
            return Err(OrchestrationError::api(503, message.clone()));
        }
        Ok(state.endpoints.values().cloned().collect())
    }

    async fn get_endpoint(&self, endpoint_id: EndpointId) -> OrchestrationResult<Endpoint> {
        self.read()?
            .endpoints
            .get(&endpoint_id)
            .cloned()
            .ok_or(OrchestrationError::EndpointNotFound(endpoint_id))
    }

    async fn list_containers(
        &self,
        endpoint_id: EndpointId,
        all: bool,
    ) -> OrchestrationResult<Vec<Container>> {
        self.simulate_latency(endpoint_id).await?;
        let state = self.read()?;
        state.check(endpoint_id, OrchestrationOperation::ListContainers)?;
        Ok(state
            .containers
            .get(&endpoint_id)
            .map(|containers| {
                containers
                    .iter()
                    .filter(|container| all || container.is_running())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn pull_image(
        &self,
        endpoint_id: EndpointId,
        name: &str,
        tag: &str,
    ) -> OrchestrationResult<()> {
        self.simulate_latency(endpoint_id).await?;
        let mut state = self.write()?;
        state.check(endpoint_id, OrchestrationOperation::PullImage)?;
        state
            .pulled_images
            .push((endpoint_id, format!("{name}:{tag}")));
        Ok(())
    }

    async fn create_container(
        &self,
        endpoint_id: EndpointId,
        spec: &AgentContainerSpec,
        name: &str,
    ) -> OrchestrationResult<ContainerId> {
        self.simulate_latency(endpoint_id).await?;
        let mut state = self.write()?;
        state.check(endpoint_id, OrchestrationOperation::CreateContainer)?;
        state.next_container += 1;
        let container_id = ContainerId::new(format!("agent-{:04}", state.next_container))
            .map_err(OrchestrationError::transport)?;

        let mut container = Container::new(
            container_id.clone(),
            spec.image.clone(),
            ContainerState::Created,
        );
        container.labels.clone_from(&spec.labels);
        state
            .containers
            .entry(endpoint_id)
            .or_default()
            .push(container);
        state.created.push(CreatedContainer {
            endpoint_id,
            container_id: container_id.clone(),
            name: name.to_owned(),
            spec: spec.clone(),
        });
        Ok(container_id)
    }

    async fn start_container(
        &self,
        endpoint_id: EndpointId,
        container_id: &ContainerId,
    ) -> OrchestrationResult<()> {
        self.simulate_latency(endpoint_id).await?;
        let mut state = self.write()?;
        state.check(endpoint_id, OrchestrationOperation::StartContainer)?;
        state.container_mut(endpoint_id, container_id)?.state = ContainerState::Running;
        Ok(())
    }

    async fn stop_container(
        &self,
        endpoint_id: EndpointId,
        container_id: &ContainerId,
    ) -> OrchestrationResult<()> {
        self.simulate_latency(endpoint_id).await?;
        let mut state = self.write()?;
        state.check(endpoint_id, OrchestrationOperation::StopContainer)?;
        state.container_mut(endpoint_id, container_id)?.state = ContainerState::Exited;
        Ok(())
    }

    async fn remove_container(
        &self,
        endpoint_id: EndpointId,
        container_id: &ContainerId,
        force: bool,
    ) -> OrchestrationResult<()> {
        self.simulate_latency(endpoint_id).await?;
        let mut state = self.write()?;
        state.check(endpoint_id, OrchestrationOperation::RemoveContainer)?;
        if state.container_mut(endpoint_id, container_id)?.is_running() && !force {
            return Err(OrchestrationError::api(
                409,
                format!("container {container_id} is running; stop it or force removal"),
            ));
        }
        if let Some(containers) = state.containers.get_mut(&endpoint_id) {
            containers.retain(|container| container.id != *container_id);
        }
        Ok(())
    }
}
