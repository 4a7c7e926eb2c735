//! Shared helpers for `PostgreSQL` coverage adapter tests.

pub use super::cluster::{BoxError, PostgresCluster, postgres_cluster};
use super::cluster::TemporaryDatabase;
use chrono::{DateTime, TimeZone, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use fleetwatch::coverage::{
    adapters::postgres::{CoveragePgPool, PostgresCoverageRepository, PostgresTelemetryStore},
    domain::{CoverageStatus, EndpointId, EndpointObservation},
};
use rstest::fixture;
use uuid::Uuid;

/// Schema of the coverage table.
pub const CREATE_COVERAGE_SQL: &str =
    include_str!("../../migrations/2026-10-01-000000_create_agent_coverage/up.sql");

/// Minimal span table as written by the trace ingestion pipeline.
pub const CREATE_SPANS_SQL: &str = concat!(
    "CREATE TABLE otel_spans (",
    "span_id BIGSERIAL PRIMARY KEY, ",
    "source TEXT NOT NULL, ",
    "endpoint_id BIGINT NOT NULL, ",
    "start_time TIMESTAMPTZ NOT NULL)",
);

/// Template database name for the pre-migrated schema.
pub const TEMPLATE_DB: &str = "fleetwatch_test_template";

/// Trace source used by span fixtures.
pub const TRACE_SOURCE: &str = "beyla";

/// Fresh database with both adapters wired to it.
pub struct CoverageDb {
    /// Coverage record adapter.
    pub repository: PostgresCoverageRepository,
    /// Span lookup adapter.
    pub telemetry: PostgresTelemetryStore,
    temp_db: TemporaryDatabase,
}

impl CoverageDb {
    /// Runs raw SQL against the test database.
    pub async fn execute(&self, sql: &'static str) -> Result<(), BoxError> {
        let url = self.temp_db.url().to_owned();
        tokio::task::spawn_blocking(move || {
            let mut conn = PgConnection::establish(&url).map_err(|err| Box::new(err) as BoxError)?;
            conn.batch_execute(sql)
                .map_err(|err| Box::new(err) as BoxError)
        })
        .await
        .map_err(|err| Box::new(err) as BoxError)?
    }

    /// Inserts one agent span.
    pub async fn insert_span(
        &self,
        endpoint_id: EndpointId,
        source: &str,
        start_time: DateTime<Utc>,
    ) -> Result<(), BoxError> {
        let url = self.temp_db.url().to_owned();
        let source = source.to_owned();
        tokio::task::spawn_blocking(move || {
            let mut conn = PgConnection::establish(&url).map_err(|err| Box::new(err) as BoxError)?;
            diesel::sql_query(
                "INSERT INTO otel_spans (source, endpoint_id, start_time) VALUES ($1, $2, $3)",
            )
            .bind::<diesel::sql_types::Text, _>(source)
            .bind::<diesel::sql_types::BigInt, _>(endpoint_id.value())
            .bind::<diesel::sql_types::Timestamptz, _>(start_time)
            .execute(&mut conn)
            .map_err(|err| Box::new(err) as BoxError)?;
            Ok(())
        })
        .await
        .map_err(|err| Box::new(err) as BoxError)?
    }
}

fn apply_migrations(url: &str) -> Result<(), BoxError> {
    let mut conn = PgConnection::establish(url).map_err(|err| Box::new(err) as BoxError)?;
    conn.batch_execute(CREATE_COVERAGE_SQL)
        .map_err(|err| Box::new(err) as BoxError)
}

async fn setup(cluster: PostgresCluster) -> Result<CoverageDb, BoxError> {
    tokio::task::spawn_blocking(move || {
        cluster.ensure_template_exists(TEMPLATE_DB, apply_migrations)?;
        let temp_db = cluster.temporary_database_from_template(
            &format!("coverage_{}", Uuid::new_v4().simple()),
            TEMPLATE_DB,
        )?;
        let pool: CoveragePgPool = Pool::builder()
            .max_size(1)
            .build(ConnectionManager::<PgConnection>::new(temp_db.url()))
            .map_err(|err| Box::new(err) as BoxError)?;
        Ok(CoverageDb {
            repository: PostgresCoverageRepository::new(pool.clone()),
            telemetry: PostgresTelemetryStore::new(pool),
            temp_db,
        })
    })
    .await
    .map_err(|err| Box::new(err) as BoxError)?
}

/// Provides a migrated database, or `None` when no cluster is available.
#[fixture]
pub async fn coverage_db(
    postgres_cluster: Option<PostgresCluster>,
) -> Result<Option<CoverageDb>, BoxError> {
    match postgres_cluster {
        Some(cluster) => setup(cluster).await.map(Some),
        None => Ok(None),
    }
}

/// Fixed whole-minute timestamp that round-trips through `timestamptz`.
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 1, hour, minute, 0)
        .single()
        .expect("fixed timestamp should be valid")
}

/// Builds a sync observation.
pub fn observation(id: i64, name: &str, status: Option<CoverageStatus>) -> EndpointObservation {
    EndpointObservation {
        endpoint_id: EndpointId::new(id),
        endpoint_name: name.to_owned(),
        status,
    }
}
