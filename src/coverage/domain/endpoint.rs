//! Endpoint inventory and container views reported by the control plane.

use super::{ContainerId, EndpointId, ParseContainerStateError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Orchestration mode of an endpoint, as numbered by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointType {
    /// Local Docker socket.
    Docker,
    /// Docker host reached through an agent.
    DockerAgent,
    /// Azure container instances.
    Azure,
    /// Docker host reached through an edge agent.
    DockerEdgeAgent,
    /// Local Kubernetes cluster.
    KubernetesLocal,
    /// Kubernetes cluster reached through an agent.
    KubernetesAgent,
    /// Kubernetes cluster reached through an edge agent.
    KubernetesEdgeAgent,
    /// A type code this crate does not recognise.
    Other(i32),
}

impl EndpointType {
    /// Decodes the control plane's numeric endpoint type.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Docker,
            2 => Self::DockerAgent,
            3 => Self::Azure,
            4 => Self::DockerEdgeAgent,
            5 => Self::KubernetesLocal,
            6 => Self::KubernetesAgent,
            7 => Self::KubernetesEdgeAgent,
            other => Self::Other(other),
        }
    }

    /// Returns the control plane's numeric endpoint type.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Docker => 1,
            Self::DockerAgent => 2,
            Self::Azure => 3,
            Self::DockerEdgeAgent => 4,
            Self::KubernetesLocal => 5,
            Self::KubernetesAgent => 6,
            Self::KubernetesEdgeAgent => 7,
            Self::Other(code) => code,
        }
    }

    /// Returns whether the agent container can run on this endpoint type.
    ///
    /// Only Docker-backed modes expose the privileged container API the agent
    /// needs.
    #[must_use]
    pub const fn supports_agent(self) -> bool {
        matches!(
            self,
            Self::Docker | Self::DockerAgent | Self::DockerEdgeAgent
        )
    }
}

/// Reachability of an endpoint according to the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    /// The control plane can reach the endpoint.
    Up,
    /// The control plane reports the endpoint as down.
    Down,
    /// The inventory does not classify the endpoint.
    Unknown,
}

impl EndpointStatus {
    /// Decodes the control plane's numeric endpoint status.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Up,
            2 => Self::Down,
            _ => Self::Unknown,
        }
    }
}

/// One endpoint from the control-plane inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Endpoint identifier.
    pub id: EndpointId,
    /// Display name.
    pub name: String,
    /// Orchestration mode.
    pub endpoint_type: EndpointType,
    /// Reachability.
    pub status: EndpointStatus,
}

impl Endpoint {
    /// Creates an endpoint view.
    #[must_use]
    pub fn new(
        id: EndpointId,
        name: impl Into<String>,
        endpoint_type: EndpointType,
        status: EndpointStatus,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            endpoint_type,
            status,
        }
    }

    /// Returns whether the endpoint should be probed for the agent.
    #[must_use]
    pub const fn is_probeable(&self) -> bool {
        self.endpoint_type.supports_agent() && matches!(self.status, EndpointStatus::Up)
    }
}

/// Runtime state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    /// Created but never started.
    Created,
    /// Running.
    Running,
    /// Paused.
    Paused,
    /// Restarting.
    Restarting,
    /// Being removed.
    Removing,
    /// Stopped.
    Exited,
    /// Dead.
    Dead,
}

impl ContainerState {
    /// Returns the canonical representation used by the container API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Removing => "removing",
            Self::Exited => "exited",
            Self::Dead => "dead",
        }
    }

    /// Returns whether the container counts as running.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ContainerState {
    type Error = ParseContainerStateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "created" => Ok(Self::Created),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "restarting" => Ok(Self::Restarting),
            "removing" => Ok(Self::Removing),
            "exited" => Ok(Self::Exited),
            "dead" => Ok(Self::Dead),
            _ => Err(ParseContainerStateError(value.to_owned())),
        }
    }
}

/// Container summary returned when listing an endpoint's containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Container identity.
    pub id: ContainerId,
    /// Image reference the container was created from.
    pub image: String,
    /// Runtime state.
    pub state: ContainerState,
    /// Container labels.
    pub labels: BTreeMap<String, String>,
}

impl Container {
    /// Creates a container summary without labels.
    #[must_use]
    pub fn new(id: ContainerId, image: impl Into<String>, state: ContainerState) -> Self {
        Self {
            id,
            image: image.into(),
            state,
            labels: BTreeMap::new(),
        }
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Returns a label value.
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Returns whether the container is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.state.is_running()
    }
}
