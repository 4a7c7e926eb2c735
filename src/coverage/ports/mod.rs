//! Port contracts for agent coverage tracking.

mod orchestrator;
mod repository;
mod telemetry;

pub use orchestrator::{OrchestrationClient, OrchestrationError, OrchestrationResult};
pub use repository::{
    CoverageRepository, CoverageRepositoryError, CoverageRepositoryResult, SyncBatchOutcome,
};
pub use telemetry::{SpanQuery, TelemetryError, TelemetryResult, TelemetryStore};
