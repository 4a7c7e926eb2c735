//! `PostgreSQL` repository implementation for coverage records.

use super::{
    models::{CoverageRow, NewCoverageRow},
    schema::agent_coverage,
};
use crate::coverage::{
    domain::{
        ContainerId, CoverageRecord, CoverageStatus, EndpointId, EndpointObservation,
        LifecycleWrite, OperatorStatusUpdate, PersistedCoverageData, VerificationWrite,
    },
    ports::{
        CoverageRepository, CoverageRepositoryError, CoverageRepositoryResult, SyncBatchOutcome,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_types::{Array, BigInt, Nullable, Text, Timestamptz};

/// `PostgreSQL` connection pool type for coverage adapters.
pub type CoveragePgPool = Pool<ConnectionManager<PgConnection>>;

/// `PostgreSQL`-backed repository for coverage records.
#[derive(Debug, Clone)]
pub struct PostgresCoverageRepository {
    pool: CoveragePgPool,
}

impl PostgresCoverageRepository {
    /// Creates a new repository from a `PostgreSQL` pool.
    #[must_use]
    pub const fn new(pool: CoveragePgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, operation: F) -> CoverageRepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> CoverageRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(CoverageRepositoryError::persistence)?;
            operation(&mut connection)
        })
        .await
        .map_err(CoverageRepositoryError::persistence)?
    }
}

impl From<diesel::result::Error> for CoverageRepositoryError {
    fn from(err: diesel::result::Error) -> Self {
        Self::persistence(err)
    }
}

#[async_trait]
impl CoverageRepository for PostgresCoverageRepository {
    async fn find_by_endpoint(
        &self,
        endpoint_id: EndpointId,
    ) -> CoverageRepositoryResult<Option<CoverageRecord>> {
        self.run_blocking(move |connection| {
            let row = agent_coverage::table
                .filter(agent_coverage::endpoint_id.eq(endpoint_id.value()))
                .select(CoverageRow::as_select())
                .first::<CoverageRow>(connection)
                .optional()?;
            row.map(row_to_record).transpose()
        })
        .await
    }

    async fn list_all(&self) -> CoverageRepositoryResult<Vec<CoverageRecord>> {
        self.run_blocking(move |connection| {
            let rows = agent_coverage::table
                .order(agent_coverage::endpoint_id.asc())
                .select(CoverageRow::as_select())
                .load::<CoverageRow>(connection)?;
            rows.into_iter().map(row_to_record).collect()
        })
        .await
    }

    async fn apply_sync_batch(
        &self,
        observations: &[EndpointObservation],
        observed_at: DateTime<Utc>,
    ) -> CoverageRepositoryResult<SyncBatchOutcome> {
        let batch = observations.to_vec();
        self.run_blocking(move |connection| {
            connection.transaction::<_, CoverageRepositoryError, _>(|tx_conn| {
                let mut outcome = SyncBatchOutcome::default();
                for observation in &batch {
                    let record = CoverageRecord::observed(observation, observed_at);
                    let inserted = diesel::insert_into(agent_coverage::table)
                        .values(&to_new_row(&record))
                        .on_conflict(agent_coverage::endpoint_id)
                        .do_nothing()
                        .execute(tx_conn)?;
                    if inserted > 0 {
                        outcome.added += 1;
                    } else if refresh_existing(tx_conn, observation, observed_at)? {
                        outcome.updated += 1;
                    }
                }
                Ok(outcome)
            })
        })
        .await
    }

    async fn record_lifecycle(&self, write: &LifecycleWrite) -> CoverageRepositoryResult<bool> {
        let endpoint_id = write.endpoint_id.value();
        let endpoint_name = write.endpoint_name.clone();
        let status = write.status.as_str().to_owned();
        let agent_enabled = write.agent_enabled;
        let agent_container_id = write
            .agent_container_id
            .as_ref()
            .map(|container_id| container_id.as_str().to_owned());
        let agent_managed = write.agent_managed;
        let recorded_at = write.recorded_at;
        self.run_blocking(move |connection| {
            let updated = diesel::update(
                agent_coverage::table.filter(agent_coverage::endpoint_id.eq(endpoint_id)),
            )
            .set((
                agent_coverage::endpoint_name.eq(&endpoint_name),
                agent_coverage::status.eq(&status),
                agent_coverage::agent_enabled.eq(agent_enabled),
                agent_coverage::agent_container_id.eq(&agent_container_id),
                agent_coverage::agent_managed.eq(agent_managed),
                agent_coverage::exclusion_reason.eq(None::<String>),
                agent_coverage::updated_at.eq(recorded_at),
            ))
            .execute(connection)?;
            Ok(updated > 0)
        })
        .await
    }

    async fn record_verification(
        &self,
        write: &VerificationWrite,
    ) -> CoverageRepositoryResult<bool> {
        let endpoint_id = write.endpoint_id.value();
        let observed_status = write.observed_status.map(|status| status.as_str().to_owned());
        let last_trace_at = write.last_trace_at;
        let verified_at = write.verified_at;
        self.run_blocking(move |connection| {
            let updated = diesel::sql_query(concat!(
                "UPDATE agent_coverage SET ",
                "status = CASE WHEN $2 IS NOT NULL AND status = ANY($3) THEN $2 ELSE status END, ",
                "last_trace_at = COALESCE($4, last_trace_at), ",
                "last_verified_at = $5, ",
                "updated_at = $5 ",
                "WHERE endpoint_id = $1",
            ))
            .bind::<BigInt, _>(endpoint_id)
            .bind::<Nullable<Text>, _>(observed_status)
            .bind::<Array<Text>, _>(system_managed_values())
            .bind::<Nullable<Timestamptz>, _>(last_trace_at)
            .bind::<Timestamptz, _>(verified_at)
            .execute(connection)?;
            Ok(updated > 0)
        })
        .await
    }

    async fn update_operator_status(
        &self,
        endpoint_id: EndpointId,
        update: &OperatorStatusUpdate,
        updated_at: DateTime<Utc>,
    ) -> CoverageRepositoryResult<CoverageRecord> {
        let status = update.status().as_str().to_owned();
        let reason = update.exclusion_reason().map(str::to_owned);
        self.run_blocking(move |connection| {
            let row = diesel::update(
                agent_coverage::table.filter(agent_coverage::endpoint_id.eq(endpoint_id.value())),
            )
            .set((
                agent_coverage::status.eq(&status),
                agent_coverage::exclusion_reason.eq(&reason),
                agent_coverage::updated_at.eq(updated_at),
            ))
            .returning(CoverageRow::as_returning())
            .get_result::<CoverageRow>(connection)
            .optional()?
            .ok_or(CoverageRepositoryError::NotFound(endpoint_id))?;
            row_to_record(row)
        })
        .await
    }
}

fn system_managed_values() -> Vec<String> {
    CoverageStatus::system_managed_strs()
        .into_iter()
        .map(str::to_owned)
        .collect()
}

/// Refreshes the name and, for system-managed rows, the status of an
/// existing record. Rows already matching the observation are not touched.
fn refresh_existing(
    connection: &mut PgConnection,
    observation: &EndpointObservation,
    observed_at: DateTime<Utc>,
) -> CoverageRepositoryResult<bool> {
    let endpoint_id = observation.endpoint_id.value();
    let renamed = diesel::update(
        agent_coverage::table
            .filter(agent_coverage::endpoint_id.eq(endpoint_id))
            .filter(agent_coverage::endpoint_name.ne(&observation.endpoint_name)),
    )
    .set((
        agent_coverage::endpoint_name.eq(&observation.endpoint_name),
        agent_coverage::updated_at.eq(observed_at),
    ))
    .execute(connection)?;

    let Some(status) = observation.status else {
        return Ok(renamed > 0);
    };
    let restated = diesel::update(
        agent_coverage::table
            .filter(agent_coverage::endpoint_id.eq(endpoint_id))
            .filter(agent_coverage::status.eq_any(system_managed_values()))
            .filter(agent_coverage::status.ne(status.as_str())),
    )
    .set((
        agent_coverage::status.eq(status.as_str()),
        agent_coverage::updated_at.eq(observed_at),
    ))
    .execute(connection)?;

    Ok(renamed > 0 || restated > 0)
}

fn to_new_row(record: &CoverageRecord) -> NewCoverageRow {
    NewCoverageRow {
        endpoint_id: record.endpoint_id().value(),
        endpoint_name: record.endpoint_name().to_owned(),
        status: record.status().as_str().to_owned(),
        agent_enabled: record.agent_enabled(),
        agent_container_id: record
            .agent_container_id()
            .map(|container_id| container_id.as_str().to_owned()),
        agent_managed: record.agent_managed(),
        created_at: record.created_at(),
        updated_at: record.updated_at(),
    }
}

fn row_to_record(row: CoverageRow) -> CoverageRepositoryResult<CoverageRecord> {
    let CoverageRow {
        endpoint_id,
        endpoint_name,
        status,
        agent_enabled,
        agent_container_id,
        agent_managed,
        exclusion_reason,
        deployment_profile,
        last_trace_at,
        last_verified_at,
        created_at,
        updated_at,
    } = row;

    let parsed_status = CoverageStatus::try_from(status.as_str())
        .map_err(CoverageRepositoryError::invalid_persisted_data)?;
    let parsed_container_id = agent_container_id
        .map(ContainerId::new)
        .transpose()
        .map_err(CoverageRepositoryError::invalid_persisted_data)?;

    Ok(CoverageRecord::from_persisted(PersistedCoverageData {
        endpoint_id: EndpointId::new(endpoint_id),
        endpoint_name,
        status: parsed_status,
        agent_enabled,
        agent_container_id: parsed_container_id,
        agent_managed,
        exclusion_reason,
        deployment_profile,
        last_trace_at,
        last_verified_at,
        created_at,
        updated_at,
    }))
}
