//! In-memory repository for coverage records.

use crate::coverage::{
    domain::{
        CoverageRecord, EndpointId, EndpointObservation, LifecycleWrite, OperatorStatusUpdate,
        VerificationWrite,
    },
    ports::{
        CoverageRepository, CoverageRepositoryError, CoverageRepositoryResult, SyncBatchOutcome,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Thread-safe in-memory coverage repository.
///
/// Sync batches are staged on a copy of the table and swapped in only when
/// every observation applied, matching the all-or-nothing contract of the
/// `PostgreSQL` adapter.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCoverageRepository {
    state: Arc<RwLock<InMemoryCoverageState>>,
}

#[derive(Debug, Default)]
struct InMemoryCoverageState {
    records: BTreeMap<EndpointId, CoverageRecord>,
    fail_batch_at: Option<usize>,
}

impl InMemoryCoverageRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next sync batch fail when it reaches the observation at
    /// `index`.
    ///
    /// # Errors
    ///
    /// Returns persistence errors when lock acquisition fails.
    pub fn fail_next_batch_at(&self, index: usize) -> CoverageRepositoryResult<()> {
        self.write()?.fail_batch_at = Some(index);
        Ok(())
    }

    fn read(&self) -> CoverageRepositoryResult<RwLockReadGuard<'_, InMemoryCoverageState>> {
        self.state.read().map_err(|err| {
            CoverageRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn write(&self) -> CoverageRepositoryResult<RwLockWriteGuard<'_, InMemoryCoverageState>> {
        self.state.write().map_err(|err| {
            CoverageRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }
}

#[async_trait]
impl CoverageRepository for InMemoryCoverageRepository {
    async fn find_by_endpoint(
        &self,
        endpoint_id: EndpointId,
    ) -> CoverageRepositoryResult<Option<CoverageRecord>> {
        Ok(self.read()?.records.get(&endpoint_id).cloned())
    }

    async fn list_all(&self) -> CoverageRepositoryResult<Vec<CoverageRecord>> {
        Ok(self.read()?.records.values().cloned().collect())
    }

    async fn apply_sync_batch(
        &self,
        observations: &[EndpointObservation],
        observed_at: DateTime<Utc>,
    ) -> CoverageRepositoryResult<SyncBatchOutcome> {
        let mut state = self.write()?;
        let fail_at = state.fail_batch_at.take();
        let mut staged = state.records.clone();
        let mut outcome = SyncBatchOutcome::default();

        for (index, observation) in observations.iter().enumerate() {
            if fail_at == Some(index) {
                return Err(CoverageRepositoryError::persistence(std::io::Error::other(
                    format!("injected failure at observation {index}"),
                )));
            }

            match staged.entry(observation.endpoint_id) {
                Entry::Occupied(mut entry) => {
                    if entry.get_mut().apply_observation(observation, observed_at) {
                        outcome.updated += 1;
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(CoverageRecord::observed(observation, observed_at));
                    outcome.added += 1;
                }
            }
        }

        state.records = staged;
        Ok(outcome)
    }

    async fn record_lifecycle(&self, write: &LifecycleWrite) -> CoverageRepositoryResult<bool> {
        let mut state = self.write()?;
        let Some(record) = state.records.get_mut(&write.endpoint_id) else {
            return Ok(false);
        };
        record.apply_lifecycle(write);
        Ok(true)
    }

    async fn record_verification(
        &self,
        write: &VerificationWrite,
    ) -> CoverageRepositoryResult<bool> {
        let mut state = self.write()?;
        let Some(record) = state.records.get_mut(&write.endpoint_id) else {
            return Ok(false);
        };
        record.apply_verification(write);
        Ok(true)
    }

    async fn update_operator_status(
        &self,
        endpoint_id: EndpointId,
        update: &OperatorStatusUpdate,
        updated_at: DateTime<Utc>,
    ) -> CoverageRepositoryResult<CoverageRecord> {
        let mut state = self.write()?;
        let record = state
            .records
            .get_mut(&endpoint_id)
            .ok_or(CoverageRepositoryError::NotFound(endpoint_id))?;
        record.apply_operator_status(update, updated_at);
        Ok(record.clone())
    }
}
