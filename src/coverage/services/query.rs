//! Read paths and operator updates over the coverage store.

use crate::coverage::{
    domain::{
        CoverageDomainError, CoverageRecord, CoverageStatus, CoverageSummary, EndpointId,
        OperatorStatusUpdate,
    },
    ports::{CoverageRepository, CoverageRepositoryError},
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors raised by coverage queries and operator updates.
#[derive(Debug, Error)]
pub enum CoverageQueryError {
    /// The requested status cannot be set by an operator.
    #[error(transparent)]
    Domain(#[from] CoverageDomainError),

    /// No record exists for the endpoint.
    #[error("no coverage record for endpoint {0}")]
    NotFound(EndpointId),

    /// The coverage store failed.
    #[error(transparent)]
    Repository(CoverageRepositoryError),
}

impl From<CoverageRepositoryError> for CoverageQueryError {
    fn from(err: CoverageRepositoryError) -> Self {
        match err {
            CoverageRepositoryError::NotFound(endpoint_id) => Self::NotFound(endpoint_id),
            other => Self::Repository(other),
        }
    }
}

/// Result type for coverage queries.
pub type CoverageQueryResult<T> = Result<T, CoverageQueryError>;

/// Dashboard-facing access to coverage records.
pub struct CoverageQueryService<R, C>
where
    R: CoverageRepository,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    clock: Arc<C>,
}

impl<R, C> Clone for CoverageQueryService<R, C>
where
    R: CoverageRepository,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<R, C> CoverageQueryService<R, C>
where
    R: CoverageRepository,
    C: Clock + Send + Sync,
{
    /// Creates a query service.
    #[must_use]
    pub const fn new(repository: Arc<R>, clock: Arc<C>) -> Self {
        Self { repository, clock }
    }

    /// Aggregates every record into dashboard counters.
    ///
    /// # Errors
    ///
    /// Returns persistence errors from the repository.
    pub async fn summarize(&self) -> CoverageQueryResult<CoverageSummary> {
        let records = self.repository.list_all().await?;
        Ok(CoverageSummary::from_records(&records))
    }

    /// Lists every record ordered by endpoint.
    ///
    /// # Errors
    ///
    /// Returns persistence errors from the repository.
    pub async fn list(&self) -> CoverageQueryResult<Vec<CoverageRecord>> {
        let mut records = self.repository.list_all().await?;
        records.sort_by_key(CoverageRecord::endpoint_id);
        Ok(records)
    }

    /// Finds the record of one endpoint.
    ///
    /// # Errors
    ///
    /// Returns persistence errors from the repository.
    pub async fn find(
        &self,
        endpoint_id: EndpointId,
    ) -> CoverageQueryResult<Option<CoverageRecord>> {
        Ok(self.repository.find_by_endpoint(endpoint_id).await?)
    }

    /// Sets an operator status on an existing record.
    ///
    /// `planned` and `excluded` are kept by automated passes; `unknown`
    /// hands the record back to automation. A reason is kept only for
    /// `excluded`.
    ///
    /// # Errors
    ///
    /// Returns [`CoverageQueryError::Domain`] for statuses an operator cannot
    /// set, [`CoverageQueryError::NotFound`] when no record exists, or
    /// persistence errors.
    pub async fn set_operator_status(
        &self,
        endpoint_id: EndpointId,
        status: CoverageStatus,
        exclusion_reason: Option<String>,
    ) -> CoverageQueryResult<CoverageRecord> {
        let update = OperatorStatusUpdate::new(status, exclusion_reason)?;
        let record = self
            .repository
            .update_operator_status(endpoint_id, &update, self.clock.utc())
            .await?;
        info!(endpoint_id = %endpoint_id, status = %status, "operator status set");
        Ok(record)
    }
}
