//! Coverage status and detection result types.

use super::ParseCoverageStatusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Persisted coverage state of the tracing agent on one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageStatus {
    /// An operator intends to deploy the agent here.
    Planned,
    /// The agent container exists and is running.
    Deployed,
    /// An operator excluded this endpoint from coverage.
    Excluded,
    /// The agent container exists but is not running.
    Failed,
    /// Coverage has not been determined.
    Unknown,
    /// No agent container exists on the endpoint.
    NotDeployed,
    /// The endpoint could not be probed.
    Unreachable,
    /// The endpoint type cannot host the agent.
    Incompatible,
}

impl CoverageStatus {
    /// Every status, in canonical order.
    pub const ALL: [Self; 8] = [
        Self::Planned,
        Self::Deployed,
        Self::Excluded,
        Self::Failed,
        Self::Unknown,
        Self::NotDeployed,
        Self::Unreachable,
        Self::Incompatible,
    ];

    /// Statuses that automated reconciliation may overwrite.
    pub const SYSTEM_MANAGED: [Self; 6] = [
        Self::Unknown,
        Self::Deployed,
        Self::Failed,
        Self::NotDeployed,
        Self::Unreachable,
        Self::Incompatible,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Deployed => "deployed",
            Self::Excluded => "excluded",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
            Self::NotDeployed => "not_deployed",
            Self::Unreachable => "unreachable",
            Self::Incompatible => "incompatible",
        }
    }

    /// Returns whether automated processes may rewrite this status.
    ///
    /// `planned` and `excluded` record operator intent and are only changed
    /// by lifecycle actions or explicit operator updates.
    #[must_use]
    pub const fn is_system_managed(self) -> bool {
        match self {
            Self::Planned | Self::Excluded => false,
            Self::Deployed
            | Self::Failed
            | Self::Unknown
            | Self::NotDeployed
            | Self::Unreachable
            | Self::Incompatible => true,
        }
    }

    /// Returns whether an operator may set this status directly.
    #[must_use]
    pub const fn is_operator_settable(self) -> bool {
        matches!(self, Self::Planned | Self::Excluded | Self::Unknown)
    }

    /// Returns whether this status satisfies an enabled agent intent.
    ///
    /// An enabled record in any other status is drifted.
    #[must_use]
    pub const fn satisfies_enabled_intent(self) -> bool {
        matches!(self, Self::Deployed | Self::Excluded | Self::Incompatible)
    }

    /// Storage representations of [`Self::SYSTEM_MANAGED`].
    #[must_use]
    pub fn system_managed_strs() -> Vec<&'static str> {
        Self::SYSTEM_MANAGED
            .iter()
            .map(|status| status.as_str())
            .collect()
    }
}

impl fmt::Display for CoverageStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for CoverageStatus {
    type Error = ParseCoverageStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "planned" => Ok(Self::Planned),
            "deployed" => Ok(Self::Deployed),
            "excluded" => Ok(Self::Excluded),
            "failed" => Ok(Self::Failed),
            "unknown" => Ok(Self::Unknown),
            "not_deployed" => Ok(Self::NotDeployed),
            "unreachable" => Ok(Self::Unreachable),
            "incompatible" => Ok(Self::Incompatible),
            _ => Err(ParseCoverageStatusError(value.to_owned())),
        }
    }
}

/// Outcome of probing one endpoint for the agent container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionResult {
    /// The agent container exists and is running.
    Deployed,
    /// The agent container exists but is not running.
    Failed,
    /// No agent container exists.
    NotFound,
    /// The endpoint could not be queried.
    Unreachable,
    /// The endpoint type cannot host the agent.
    Incompatible,
}

impl DetectionResult {
    /// Every detection result.
    pub const ALL: [Self; 5] = [
        Self::Deployed,
        Self::Failed,
        Self::NotFound,
        Self::Unreachable,
        Self::Incompatible,
    ];

    /// Maps a detection result onto the persisted coverage status.
    #[must_use]
    pub const fn coverage_status(self) -> CoverageStatus {
        match self {
            Self::Deployed => CoverageStatus::Deployed,
            Self::Failed => CoverageStatus::Failed,
            Self::NotFound => CoverageStatus::NotDeployed,
            Self::Unreachable => CoverageStatus::Unreachable,
            Self::Incompatible => CoverageStatus::Incompatible,
        }
    }

    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deployed => "deployed",
            Self::Failed => "failed",
            Self::NotFound => "not_found",
            Self::Unreachable => "unreachable",
            Self::Incompatible => "incompatible",
        }
    }
}

impl From<DetectionResult> for CoverageStatus {
    fn from(value: DetectionResult) -> Self {
        value.coverage_status()
    }
}

impl fmt::Display for DetectionResult {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
