//! Repository port for coverage record persistence.

use crate::coverage::domain::{
    CoverageRecord, EndpointId, EndpointObservation, LifecycleWrite, OperatorStatusUpdate,
    VerificationWrite,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for coverage repository operations.
pub type CoverageRepositoryResult<T> = Result<T, CoverageRepositoryError>;

/// Outcome of applying one sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncBatchOutcome {
    /// Endpoints seen for the first time.
    pub added: usize,
    /// Existing records whose name or status changed.
    pub updated: usize,
}

/// Persistence contract for coverage records.
///
/// Each write is atomic per row; [`CoverageRepository::apply_sync_batch`] is
/// atomic for the whole batch.
#[async_trait]
pub trait CoverageRepository: Send + Sync {
    /// Finds the record of one endpoint.
    async fn find_by_endpoint(
        &self,
        endpoint_id: EndpointId,
    ) -> CoverageRepositoryResult<Option<CoverageRecord>>;

    /// Returns every record.
    async fn list_all(&self) -> CoverageRepositoryResult<Vec<CoverageRecord>>;

    /// Applies a sync pass in one transaction.
    ///
    /// Absent endpoints are inserted. For existing endpoints the name is
    /// refreshed and the status is overwritten only when the stored status is
    /// system-managed.
    ///
    /// # Errors
    ///
    /// On error no observation of the batch is applied.
    async fn apply_sync_batch(
        &self,
        observations: &[EndpointObservation],
        observed_at: DateTime<Utc>,
    ) -> CoverageRepositoryResult<SyncBatchOutcome>;

    /// Records the result of a lifecycle action, overwriting the status and
    /// clearing the exclusion reason. Records are only created by sync, so
    /// a missing record is left absent.
    ///
    /// Returns whether a record was updated.
    async fn record_lifecycle(&self, write: &LifecycleWrite) -> CoverageRepositoryResult<bool>;

    /// Records a telemetry cross-check. Missing records are left absent.
    ///
    /// Returns whether a record was updated.
    async fn record_verification(
        &self,
        write: &VerificationWrite,
    ) -> CoverageRepositoryResult<bool>;

    /// Applies an explicit operator status change.
    ///
    /// # Errors
    ///
    /// Returns [`CoverageRepositoryError::NotFound`] when no record exists.
    async fn update_operator_status(
        &self,
        endpoint_id: EndpointId,
        update: &OperatorStatusUpdate,
        updated_at: DateTime<Utc>,
    ) -> CoverageRepositoryResult<CoverageRecord>;
}

/// Errors returned by coverage repository implementations.
#[derive(Debug, Clone, Error)]
pub enum CoverageRepositoryError {
    /// No record exists for the endpoint.
    #[error("coverage record not found for endpoint {0}")]
    NotFound(EndpointId),

    /// Persisted data could not be reconstructed into domain types.
    #[error("invalid persisted coverage data: {0}")]
    InvalidPersistedData(Arc<dyn std::error::Error + Send + Sync>),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl CoverageRepositoryError {
    /// Wraps persisted-data decoding or validation failures.
    pub fn invalid_persisted_data(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::InvalidPersistedData(Arc::new(err))
    }

    /// Wraps a persistence-layer failure.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
