//! Error types for coverage domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing coverage domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoverageDomainError {
    /// A container identifier is blank.
    #[error("container identifier must not be empty")]
    EmptyContainerId,

    /// The agent image repository is blank.
    #[error("agent image repository must not be empty")]
    EmptyAgentImage,

    /// The OTLP endpoint used by a deployed agent is blank.
    #[error("OTLP endpoint must not be empty")]
    EmptyOtlpEndpoint,

    /// The open-port list contains an entry that is not a port or port range.
    #[error("invalid open-port entry '{0}' (expected a port or a range such as 8000-8100)")]
    InvalidOpenPort(String),

    /// Operator updates may only set operator-owned statuses or hand a row
    /// back to automation with `unknown`.
    #[error("status '{0}' cannot be set by an operator")]
    StatusNotOperatorSettable(String),
}

/// Error returned while parsing a coverage status from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown coverage status: {0}")]
pub struct ParseCoverageStatusError(pub String);

/// Error returned while parsing a container state reported by an endpoint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown container state: {0}")]
pub struct ParseContainerStateError(pub String);
