//! Agent image identity and the container contract used on deploy.

use super::{Container, CoverageDomainError, EndpointId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label marking a container as the tracing agent.
pub const AGENT_COMPONENT_LABEL: &str = "io.fleetwatch.component";

/// Value of [`AGENT_COMPONENT_LABEL`] on agent containers.
pub const AGENT_COMPONENT_VALUE: &str = "ebpf-agent";

/// Label set on agent containers created by this crate.
pub const AGENT_MANAGED_LABEL: &str = "io.fleetwatch.managed";

/// Ports instrumented by the agent when no explicit list is given.
pub const DEFAULT_OPEN_PORTS: &str = "80,443,3000,5000,8000,8080,8443,9090";

/// Resource attribute carrying the endpoint identifier on emitted spans.
pub const ENDPOINT_RESOURCE_ATTRIBUTE: &str = "fleetwatch.endpoint_id";

const HOST_MOUNTS: [&str; 3] = [
    "/sys/kernel/security:/sys/kernel/security:ro",
    "/sys/fs/cgroup:/sys/fs/cgroup:ro",
    "/sys/kernel/debug:/sys/kernel/debug",
];

/// Image the agent runs from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentImage {
    repository: String,
    tag: String,
}

impl AgentImage {
    /// Creates an agent image reference.
    ///
    /// A blank tag falls back to `latest`.
    ///
    /// # Errors
    ///
    /// Returns [`CoverageDomainError::EmptyAgentImage`] when the repository
    /// is blank.
    pub fn new(
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Result<Self, CoverageDomainError> {
        let normalized_repository = repository.into().trim().to_owned();
        if normalized_repository.is_empty() {
            return Err(CoverageDomainError::EmptyAgentImage);
        }
        let normalized_tag = tag.into().trim().to_owned();
        Ok(Self {
            repository: normalized_repository,
            tag: if normalized_tag.is_empty() {
                String::from("latest")
            } else {
                normalized_tag
            },
        })
    }

    /// Returns the image repository.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Returns the image tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Returns the full `repository:tag` reference.
    #[must_use]
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }

    /// Returns whether an image reference names this image's repository,
    /// ignoring tag, digest and registry prefix.
    #[must_use]
    pub fn matches_image(&self, image: &str) -> bool {
        let name = strip_tag(image);
        name == self.repository || name.ends_with(&format!("/{}", self.repository))
    }

    /// Returns whether a container is the agent, by image or component label.
    #[must_use]
    pub fn is_agent_container(&self, container: &Container) -> bool {
        self.matches_image(&container.image)
            || container.label(AGENT_COMPONENT_LABEL) == Some(AGENT_COMPONENT_VALUE)
    }
}

fn strip_tag(image: &str) -> &str {
    let without_digest = image.split_once('@').map_or(image, |(name, _)| name);
    match without_digest.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => name,
        _ => without_digest,
    }
}

/// Returns whether an agent container was created by this crate.
#[must_use]
pub fn is_managed_agent(container: &Container) -> bool {
    container.label(AGENT_MANAGED_LABEL) == Some("true")
}

/// Operator-supplied settings for a newly created agent container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDeployOptions {
    otlp_endpoint: String,
    api_key: Option<String>,
    open_ports: Option<String>,
}

impl AgentDeployOptions {
    /// Creates deploy options exporting to the given OTLP endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`CoverageDomainError::EmptyOtlpEndpoint`] when the endpoint
    /// is blank.
    pub fn new(otlp_endpoint: impl Into<String>) -> Result<Self, CoverageDomainError> {
        let normalized = otlp_endpoint.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(CoverageDomainError::EmptyOtlpEndpoint);
        }
        Ok(Self {
            otlp_endpoint: normalized,
            api_key: None,
            open_ports: None,
        })
    }

    /// Sets the API key sent with every OTLP export. Blank keys are ignored.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let normalized = api_key.into().trim().to_owned();
        self.api_key = (!normalized.is_empty()).then_some(normalized);
        self
    }

    /// Sets the instrumented port list, e.g. `80,443,8000-8100`.
    ///
    /// # Errors
    ///
    /// Returns [`CoverageDomainError::InvalidOpenPort`] when an entry is not a
    /// port or ascending port range.
    pub fn with_open_ports(mut self, open_ports: &str) -> Result<Self, CoverageDomainError> {
        let entries = open_ports
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(validate_port_entry)
            .collect::<Result<Vec<_>, _>>()?;
        self.open_ports = (!entries.is_empty()).then(|| entries.join(","));
        Ok(self)
    }

    /// Returns the OTLP endpoint.
    #[must_use]
    pub fn otlp_endpoint(&self) -> &str {
        &self.otlp_endpoint
    }

    /// Returns the API key, if any.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Returns the instrumented port list, falling back to
    /// [`DEFAULT_OPEN_PORTS`].
    #[must_use]
    pub fn open_ports(&self) -> &str {
        self.open_ports.as_deref().unwrap_or(DEFAULT_OPEN_PORTS)
    }
}

fn validate_port_entry(entry: &str) -> Result<&str, CoverageDomainError> {
    let invalid = || CoverageDomainError::InvalidOpenPort(entry.to_owned());
    match entry.split_once('-') {
        Some((low, high)) => {
            let low_port = low.trim().parse::<u16>().map_err(|_| invalid())?;
            let high_port = high.trim().parse::<u16>().map_err(|_| invalid())?;
            if low_port == 0 || low_port > high_port {
                return Err(invalid());
            }
        }
        None => {
            let port = entry.parse::<u16>().map_err(|_| invalid())?;
            if port == 0 {
                return Err(invalid());
            }
        }
    }
    Ok(entry)
}

/// Restart policy of the agent container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestartPolicy {
    /// Policy name understood by the container API.
    pub name: String,
}

/// Host-level settings of the agent container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentHostConfig {
    /// eBPF probes need a privileged container.
    pub privileged: bool,
    /// PID namespace mode; `host` lets the agent see every process.
    pub pid_mode: String,
    /// Host paths mounted into the container.
    pub binds: Vec<String>,
    /// Restart policy.
    pub restart_policy: RestartPolicy,
}

/// Create request body for the agent container, in container-API field
/// naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentContainerSpec {
    /// Image reference.
    pub image: String,
    /// `KEY=value` environment entries.
    pub env: Vec<String>,
    /// Container labels.
    pub labels: BTreeMap<String, String>,
    /// Host configuration.
    pub host_config: AgentHostConfig,
}

impl AgentContainerSpec {
    /// Builds the fixed agent container contract for one endpoint.
    #[must_use]
    pub fn for_endpoint(
        endpoint_id: EndpointId,
        image: &AgentImage,
        options: &AgentDeployOptions,
    ) -> Self {
        let mut env = vec![
            format!("OTEL_EXPORTER_OTLP_ENDPOINT={}", options.otlp_endpoint()),
            String::from("OTEL_EXPORTER_OTLP_PROTOCOL=http/protobuf"),
            format!("BEYLA_OPEN_PORT={}", options.open_ports()),
            format!("OTEL_RESOURCE_ATTRIBUTES={ENDPOINT_RESOURCE_ATTRIBUTE}={endpoint_id}"),
        ];
        if let Some(api_key) = options.api_key() {
            env.push(format!("OTEL_EXPORTER_OTLP_HEADERS=x-api-key={api_key}"));
        }

        let labels = BTreeMap::from([
            (
                AGENT_COMPONENT_LABEL.to_owned(),
                AGENT_COMPONENT_VALUE.to_owned(),
            ),
            (AGENT_MANAGED_LABEL.to_owned(), String::from("true")),
        ]);

        Self {
            image: image.reference(),
            env,
            labels,
            host_config: AgentHostConfig {
                privileged: true,
                pid_mode: String::from("host"),
                binds: HOST_MOUNTS.iter().map(|mount| (*mount).to_owned()).collect(),
                restart_policy: RestartPolicy {
                    name: String::from("unless-stopped"),
                },
            },
        }
    }

    /// Returns the value of an environment entry.
    #[must_use]
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env.iter().find_map(|entry| {
            entry
                .split_once('=')
                .and_then(|(name, value)| (name == key).then_some(value))
        })
    }
}
