//! Domain model for agent coverage across the endpoint fleet.
//!
//! The coverage domain models endpoint and container views reported by the
//! control plane, the agent container contract, coverage statuses and the
//! per-endpoint coverage record with its write models. Infrastructure
//! concerns remain outside this boundary.

mod agent;
mod endpoint;
mod error;
mod ids;
mod record;
mod status;
mod summary;

pub use agent::{
    AGENT_COMPONENT_LABEL, AGENT_COMPONENT_VALUE, AGENT_MANAGED_LABEL, AgentContainerSpec,
    AgentDeployOptions, AgentHostConfig, AgentImage, DEFAULT_OPEN_PORTS,
    ENDPOINT_RESOURCE_ATTRIBUTE, RestartPolicy, is_managed_agent,
};
pub use endpoint::{Container, ContainerState, Endpoint, EndpointStatus, EndpointType};
pub use error::{CoverageDomainError, ParseContainerStateError, ParseCoverageStatusError};
pub use ids::{ContainerId, EndpointId};
pub use record::{
    CoverageRecord, EndpointObservation, LifecycleWrite, OperatorStatusUpdate,
    PersistedCoverageData, VerificationWrite,
};
pub use status::{CoverageStatus, DetectionResult};
pub use summary::CoverageSummary;
