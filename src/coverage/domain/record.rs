//! Coverage record read model and the write models that mutate it.

use super::{ContainerId, CoverageDomainError, CoverageStatus, EndpointId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-endpoint agent coverage record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageRecord {
    endpoint_id: EndpointId,
    endpoint_name: String,
    status: CoverageStatus,
    agent_enabled: bool,
    agent_container_id: Option<ContainerId>,
    agent_managed: bool,
    exclusion_reason: Option<String>,
    deployment_profile: Option<String>,
    last_trace_at: Option<DateTime<Utc>>,
    last_verified_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted coverage record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedCoverageData {
    /// Endpoint identifier.
    pub endpoint_id: EndpointId,
    /// Denormalized endpoint name.
    pub endpoint_name: String,
    /// Coverage status.
    pub status: CoverageStatus,
    /// Whether the agent should be running.
    pub agent_enabled: bool,
    /// Live agent container, if known.
    pub agent_container_id: Option<ContainerId>,
    /// Whether this crate created the agent container.
    pub agent_managed: bool,
    /// Operator-supplied exclusion reason.
    pub exclusion_reason: Option<String>,
    /// Reserved deployment preset name.
    pub deployment_profile: Option<String>,
    /// Most recent agent span.
    pub last_trace_at: Option<DateTime<Utc>>,
    /// Last verification time.
    pub last_verified_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Status observed for one endpoint during a sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointObservation {
    /// Endpoint identifier.
    pub endpoint_id: EndpointId,
    /// Endpoint name as currently reported by the inventory.
    pub endpoint_name: String,
    /// Observed status; `None` leaves the endpoint unclassified this pass.
    pub status: Option<CoverageStatus>,
}

/// State written after a lifecycle action completed.
///
/// Lifecycle writes are unconditional: they describe an action that was just
/// performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleWrite {
    /// Endpoint identifier.
    pub endpoint_id: EndpointId,
    /// Endpoint name as resolved for the action.
    pub endpoint_name: String,
    /// Resulting coverage status.
    pub status: CoverageStatus,
    /// Resulting agent intent.
    pub agent_enabled: bool,
    /// Resulting agent container, `None` after removal.
    pub agent_container_id: Option<ContainerId>,
    /// Whether the container is managed by this crate.
    pub agent_managed: bool,
    /// Time of the action.
    pub recorded_at: DateTime<Utc>,
}

/// Result of a telemetry cross-check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationWrite {
    /// Endpoint identifier.
    pub endpoint_id: EndpointId,
    /// Status to apply if the current one is system-managed.
    pub observed_status: Option<CoverageStatus>,
    /// Latest span seen in the lookback window.
    pub last_trace_at: Option<DateTime<Utc>>,
    /// Time of the verification.
    pub verified_at: DateTime<Utc>,
}

/// Explicit operator change of a record's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorStatusUpdate {
    status: CoverageStatus,
    exclusion_reason: Option<String>,
}

impl OperatorStatusUpdate {
    /// Creates an operator update.
    ///
    /// The exclusion reason is kept only for `excluded`.
    ///
    /// # Errors
    ///
    /// Returns [`CoverageDomainError::StatusNotOperatorSettable`] for
    /// statuses that only detection or lifecycle actions may set.
    pub fn new(
        status: CoverageStatus,
        exclusion_reason: Option<String>,
    ) -> Result<Self, CoverageDomainError> {
        if !status.is_operator_settable() {
            return Err(CoverageDomainError::StatusNotOperatorSettable(
                status.as_str().to_owned(),
            ));
        }
        let reason = exclusion_reason
            .map(|reason| reason.trim().to_owned())
            .filter(|reason| !reason.is_empty() && status == CoverageStatus::Excluded);
        Ok(Self {
            status,
            exclusion_reason: reason,
        })
    }

    /// Returns the requested status.
    #[must_use]
    pub const fn status(&self) -> CoverageStatus {
        self.status
    }

    /// Returns the exclusion reason.
    #[must_use]
    pub fn exclusion_reason(&self) -> Option<&str> {
        self.exclusion_reason.as_deref()
    }
}

impl CoverageRecord {
    /// Creates the record for a newly observed endpoint.
    ///
    /// Undetectable endpoints start as `unknown`.
    #[must_use]
    pub fn observed(observation: &EndpointObservation, observed_at: DateTime<Utc>) -> Self {
        let status = observation.status.unwrap_or(CoverageStatus::Unknown);
        Self {
            endpoint_id: observation.endpoint_id,
            endpoint_name: observation.endpoint_name.clone(),
            status,
            agent_enabled: status == CoverageStatus::Deployed,
            agent_container_id: None,
            agent_managed: false,
            exclusion_reason: None,
            deployment_profile: None,
            last_trace_at: None,
            last_verified_at: None,
            created_at: observed_at,
            updated_at: observed_at,
        }
    }

    /// Reconstructs a record from persistence.
    #[must_use]
    pub fn from_persisted(data: PersistedCoverageData) -> Self {
        Self {
            endpoint_id: data.endpoint_id,
            endpoint_name: data.endpoint_name,
            status: data.status,
            agent_enabled: data.agent_enabled,
            agent_container_id: data.agent_container_id,
            agent_managed: data.agent_managed,
            exclusion_reason: data.exclusion_reason,
            deployment_profile: data.deployment_profile,
            last_trace_at: data.last_trace_at,
            last_verified_at: data.last_verified_at,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the endpoint identifier.
    #[must_use]
    pub const fn endpoint_id(&self) -> EndpointId {
        self.endpoint_id
    }

    /// Returns the endpoint name.
    #[must_use]
    pub fn endpoint_name(&self) -> &str {
        &self.endpoint_name
    }

    /// Returns the coverage status.
    #[must_use]
    pub const fn status(&self) -> CoverageStatus {
        self.status
    }

    /// Returns whether the agent should be running.
    #[must_use]
    pub const fn agent_enabled(&self) -> bool {
        self.agent_enabled
    }

    /// Returns the live agent container, if known.
    #[must_use]
    pub const fn agent_container_id(&self) -> Option<&ContainerId> {
        self.agent_container_id.as_ref()
    }

    /// Returns whether this crate created the agent container.
    #[must_use]
    pub const fn agent_managed(&self) -> bool {
        self.agent_managed
    }

    /// Returns the exclusion reason.
    #[must_use]
    pub fn exclusion_reason(&self) -> Option<&str> {
        self.exclusion_reason.as_deref()
    }

    /// Returns the reserved deployment profile.
    #[must_use]
    pub fn deployment_profile(&self) -> Option<&str> {
        self.deployment_profile.as_deref()
    }

    /// Returns the most recent agent span time.
    #[must_use]
    pub const fn last_trace_at(&self) -> Option<DateTime<Utc>> {
        self.last_trace_at
    }

    /// Returns the last verification time.
    #[must_use]
    pub const fn last_verified_at(&self) -> Option<DateTime<Utc>> {
        self.last_verified_at
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns whether declared intent and observed status disagree.
    ///
    /// Computed on every call and never stored.
    #[must_use]
    pub const fn drifted(&self) -> bool {
        self.agent_enabled && !self.status.satisfies_enabled_intent()
    }

    /// Folds a sync observation into an existing record.
    ///
    /// The name is refreshed when it changed. The status is overwritten only
    /// when the current status is system-managed. Returns whether anything
    /// changed.
    pub fn apply_observation(
        &mut self,
        observation: &EndpointObservation,
        observed_at: DateTime<Utc>,
    ) -> bool {
        let mut changed = false;
        if self.endpoint_name != observation.endpoint_name {
            self.endpoint_name.clone_from(&observation.endpoint_name);
            changed = true;
        }
        if let Some(status) = observation.status {
            changed |= self.overwrite_system_managed_status(status);
        }
        if changed {
            self.updated_at = observed_at;
        }
        changed
    }

    /// Applies the outcome of a lifecycle action unconditionally.
    pub fn apply_lifecycle(&mut self, write: &LifecycleWrite) {
        self.endpoint_name.clone_from(&write.endpoint_name);
        self.status = write.status;
        self.agent_enabled = write.agent_enabled;
        self.agent_container_id.clone_from(&write.agent_container_id);
        self.agent_managed = write.agent_managed;
        self.exclusion_reason = None;
        self.updated_at = write.recorded_at;
    }

    /// Applies a telemetry cross-check.
    ///
    /// A known trace time is never regressed to `None`.
    pub fn apply_verification(&mut self, write: &VerificationWrite) {
        if let Some(status) = write.observed_status {
            self.overwrite_system_managed_status(status);
        }
        if write.last_trace_at.is_some() {
            self.last_trace_at = write.last_trace_at;
        }
        self.last_verified_at = Some(write.verified_at);
        self.updated_at = write.verified_at;
    }

    /// Applies an explicit operator status change.
    pub fn apply_operator_status(&mut self, update: &OperatorStatusUpdate, at: DateTime<Utc>) {
        self.status = update.status();
        self.exclusion_reason = update.exclusion_reason().map(str::to_owned);
        self.updated_at = at;
    }

    fn overwrite_system_managed_status(&mut self, status: CoverageStatus) -> bool {
        if !self.status.is_system_managed() || self.status == status {
            return false;
        }
        self.status = status;
        true
    }
}
