//! Service layer for agent coverage tracking.

mod detector;
mod fan_out;
mod lifecycle;
mod query;
mod reconciler;
mod scheduler;
mod verifier;

pub use detector::AgentDetector;
pub use fan_out::{FanOut, Settled, TaskFailure};
pub use lifecycle::{
    AgentLifecycleService, BulkActionResult, LifecycleError, LifecycleOutcome, LifecycleResult,
    LifecycleSettings,
};
pub use query::{CoverageQueryError, CoverageQueryResult, CoverageQueryService};
pub use reconciler::{
    CoverageReconciler, ReconcilerSettings, SyncError, SyncOutcome, SyncResult,
};
pub use scheduler::{SyncPeriod, SyncTaskMetrics, SyncTaskSnapshot, spawn_periodic_sync};
pub use verifier::{CoverageVerifier, VerificationReport, VerifierSettings, VerifyError};
