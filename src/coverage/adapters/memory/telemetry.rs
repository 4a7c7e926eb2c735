//! In-memory telemetry store.

use crate::coverage::{
    domain::EndpointId,
    ports::{SpanQuery, TelemetryError, TelemetryResult, TelemetryStore},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[derive(Debug, Clone)]
struct RecordedSpan {
    endpoint_id: EndpointId,
    source: String,
    start_time: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct InMemoryTelemetryState {
    spans: Vec<RecordedSpan>,
    table_missing: bool,
    latency: Option<Duration>,
}

/// Thread-safe in-memory span store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTelemetryStore {
    state: Arc<RwLock<InMemoryTelemetryState>>,
}

impl InMemoryTelemetryStore {
    /// Creates an empty span store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a span emitted by `source` for an endpoint.
    ///
    /// # Errors
    ///
    /// Returns query errors when lock acquisition fails.
    pub fn record_span(
        &self,
        endpoint_id: EndpointId,
        source: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> TelemetryResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|err| TelemetryError::query(std::io::Error::other(err.to_string())))?;
        state.spans.push(RecordedSpan {
            endpoint_id,
            source: source.into(),
            start_time,
        });
        Ok(())
    }

    /// Simulates a deployment where the span table was never created.
    ///
    /// # Errors
    ///
    /// Returns query errors when lock acquisition fails.
    pub fn drop_span_table(&self) -> TelemetryResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|err| TelemetryError::query(std::io::Error::other(err.to_string())))?;
        state.spans.clear();
        state.table_missing = true;
        Ok(())
    }

    /// Delays every span lookup by `delay`.
    ///
    /// # Errors
    ///
    /// Returns query errors when lock acquisition fails.
    pub fn set_latency(&self, delay: Duration) -> TelemetryResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|err| TelemetryError::query(std::io::Error::other(err.to_string())))?;
        state.latency = Some(delay);
        Ok(())
    }
}

#[async_trait]
impl TelemetryStore for InMemoryTelemetryStore {
    async fn most_recent_span(
        &self,
        query: &SpanQuery,
    ) -> TelemetryResult<Option<DateTime<Utc>>> {
        let delay = self
            .state
            .read()
            .map_err(|err| TelemetryError::query(std::io::Error::other(err.to_string())))?
            .latency;
        if let Some(duration) = delay {
            tokio::time::sleep(duration).await;
        }
        let state = self
            .state
            .read()
            .map_err(|err| TelemetryError::query(std::io::Error::other(err.to_string())))?;
        if state.table_missing {
            return Ok(None);
        }
        Ok(state
            .spans
            .iter()
            .filter(|span| {
                span.endpoint_id == query.endpoint_id
                    && span.source == query.source
                    && span.start_time >= query.since
            })
            .map(|span| span.start_time)
            .max())
    }
}
