//! In-memory adapters for coverage ports.

mod orchestrator;
mod repository;
mod telemetry;

pub use orchestrator::{CreatedContainer, InMemoryOrchestrationClient, OrchestrationOperation};
pub use repository::InMemoryCoverageRepository;
pub use telemetry::InMemoryTelemetryStore;
