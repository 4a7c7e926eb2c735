//! `PostgreSQL` adapters for coverage persistence and span lookup.

mod models;
mod repository;
mod schema;
mod telemetry;

pub use repository::{CoveragePgPool, PostgresCoverageRepository};
pub use telemetry::PostgresTelemetryStore;
