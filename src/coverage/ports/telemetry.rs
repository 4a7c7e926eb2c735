//! Telemetry store port used to cross-check agent health.

use crate::coverage::domain::EndpointId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for telemetry store operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Lookup of the newest agent span for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanQuery {
    /// Endpoint the span must be attributed to.
    pub endpoint_id: EndpointId,
    /// Trace source emitted by the agent.
    pub source: String,
    /// Lower bound of the lookback window.
    pub since: DateTime<Utc>,
}

/// Read access to stored spans.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Returns the start time of the newest matching span.
    ///
    /// A missing span table is not an error and yields `None`.
    async fn most_recent_span(
        &self,
        query: &SpanQuery,
    ) -> TelemetryResult<Option<DateTime<Utc>>>;
}

/// Errors returned by telemetry store adapters.
#[derive(Debug, Clone, Error)]
pub enum TelemetryError {
    /// Query failure.
    #[error("telemetry query error: {0}")]
    Query(Arc<dyn std::error::Error + Send + Sync>),
}

impl TelemetryError {
    /// Wraps a query failure.
    pub fn query(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Query(Arc::new(err))
    }
}
