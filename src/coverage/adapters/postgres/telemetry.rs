//! `PostgreSQL` span store adapter.
//!
//! Spans are expected in an `otel_spans` table written by the trace
//! ingestion pipeline, with at least `start_time TIMESTAMPTZ`,
//! `source TEXT` and `endpoint_id BIGINT` columns. The table may not exist on
//! installations without trace ingestion.

use super::repository::CoveragePgPool;
use crate::coverage::ports::{SpanQuery, TelemetryError, TelemetryResult, TelemetryStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Bool, Nullable, Text, Timestamptz};

#[derive(Debug, QueryableByName)]
struct SpanTablePresence {
    #[diesel(sql_type = Bool)]
    present: bool,
}

#[derive(Debug, QueryableByName)]
struct LatestSpanRow {
    #[diesel(sql_type = Nullable<Timestamptz>)]
    last_span_at: Option<DateTime<Utc>>,
}

/// `PostgreSQL`-backed telemetry store.
#[derive(Debug, Clone)]
pub struct PostgresTelemetryStore {
    pool: CoveragePgPool,
}

impl PostgresTelemetryStore {
    /// Creates a store from a `PostgreSQL` pool.
    #[must_use]
    pub const fn new(pool: CoveragePgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TelemetryStore for PostgresTelemetryStore {
    async fn most_recent_span(
        &self,
        query: &SpanQuery,
    ) -> TelemetryResult<Option<DateTime<Utc>>> {
        let pool = self.pool.clone();
        let source = query.source.clone();
        let endpoint_id = query.endpoint_id.value();
        let since = query.since;

        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(TelemetryError::query)?;
            let table = diesel::sql_query(
                "SELECT to_regclass('otel_spans') IS NOT NULL AS present",
            )
            .get_result::<SpanTablePresence>(&mut connection)
            .map_err(TelemetryError::query)?;
            if !table.present {
                return Ok(None);
            }

            diesel::sql_query(concat!(
                "SELECT max(start_time) AS last_span_at FROM otel_spans ",
                "WHERE source = $1 AND endpoint_id = $2 AND start_time >= $3",
            ))
            .bind::<Text, _>(source)
            .bind::<BigInt, _>(endpoint_id)
            .bind::<Timestamptz, _>(since)
            .get_result::<LatestSpanRow>(&mut connection)
            .map(|row| row.last_span_at)
            .map_err(TelemetryError::query)
        })
        .await
        .map_err(TelemetryError::query)?
    }
}
