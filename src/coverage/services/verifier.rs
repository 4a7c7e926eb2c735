//! Telemetry cross-check of agent health.

use super::detector::AgentDetector;
use crate::coverage::{
    domain::{AgentImage, DetectionResult, EndpointId, VerificationWrite},
    ports::{
        CoverageRepository, CoverageRepositoryError, OrchestrationClient, SpanQuery,
        TelemetryError, TelemetryStore,
    },
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Tunables for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierSettings {
    /// Agent image probed for.
    pub image: AgentImage,
    /// Timeout for the live probe, reused for the span lookup.
    pub probe_timeout: Duration,
    /// Telemetry source that identifies agent spans.
    pub trace_source: String,
    /// How far back a span still counts as recent.
    pub lookback: chrono::Duration,
}

impl VerifierSettings {
    /// Builds settings from runtime configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::config::ConfigError`] when the agent image or the
    /// lookback window is invalid.
    pub fn from_config(
        config: &crate::config::CoverageConfig,
    ) -> Result<Self, crate::config::ConfigError> {
        Ok(Self {
            image: config.agent_image()?,
            probe_timeout: config.probe_timeout(),
            trace_source: config.trace_source.clone(),
            lookback: config.trace_lookback_window()?,
        })
    }
}

/// Result of verifying one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationReport {
    /// Endpoint verified.
    pub endpoint_id: EndpointId,
    /// Whether the agent is observably running or recently sent spans.
    pub verified: bool,
    /// Newest agent span inside the lookback window.
    pub last_trace_at: Option<DateTime<Utc>>,
    /// Whether the live probe found a running agent.
    pub agent_running: bool,
}

/// Errors raised while verifying an endpoint.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The span lookup failed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// The span lookup did not answer in time.
    #[error("telemetry lookup timed out after {0:?}")]
    TelemetryTimeout(Duration),

    /// The verification could not be recorded.
    #[error(transparent)]
    Repository(#[from] CoverageRepositoryError),
}

/// Cross-checks live detection against recent agent telemetry.
pub struct CoverageVerifier<O, T, R, C>
where
    O: OrchestrationClient,
    T: TelemetryStore,
    R: CoverageRepository,
    C: Clock + Send + Sync,
{
    detector: AgentDetector<O>,
    telemetry: Arc<T>,
    repository: Arc<R>,
    clock: Arc<C>,
    trace_source: String,
    lookback: chrono::Duration,
    lookup_timeout: Duration,
}

impl<O, T, R, C> CoverageVerifier<O, T, R, C>
where
    O: OrchestrationClient,
    T: TelemetryStore,
    R: CoverageRepository,
    C: Clock + Send + Sync,
{
    /// Creates a verifier.
    #[must_use]
    pub fn new(
        orchestrator: Arc<O>,
        telemetry: Arc<T>,
        repository: Arc<R>,
        clock: Arc<C>,
        settings: VerifierSettings,
    ) -> Self {
        Self {
            detector: AgentDetector::new(orchestrator, settings.image, settings.probe_timeout),
            telemetry,
            repository,
            clock,
            trace_source: settings.trace_source,
            lookback: settings.lookback,
            lookup_timeout: settings.probe_timeout,
        }
    }

    /// Verifies one endpoint and records the result.
    ///
    /// A deployed or failed probe result refreshes a system-managed status;
    /// operator statuses are kept. The trace time never regresses to empty.
    /// Endpoints without a coverage record are reported but not persisted.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError`] when the span lookup fails or times out, or
    /// when the write fails.
    pub async fn verify(&self, endpoint_id: EndpointId) -> Result<VerificationReport, VerifyError> {
        let detection = self.detector.detect(endpoint_id, None).await;
        let agent_running = detection == DetectionResult::Deployed;

        let now = self.clock.utc();
        let query = SpanQuery {
            endpoint_id,
            source: self.trace_source.clone(),
            since: now.checked_sub_signed(self.lookback).unwrap_or(now),
        };
        let last_trace_at = timeout(self.lookup_timeout, self.telemetry.most_recent_span(&query))
            .await
            .map_err(|_| {
                warn!(
                    endpoint_id = %endpoint_id,
                    timeout_secs = self.lookup_timeout.as_secs(),
                    "telemetry lookup timed out"
                );
                VerifyError::TelemetryTimeout(self.lookup_timeout)
            })??;

        let observed_status = match detection {
            DetectionResult::Deployed | DetectionResult::Failed => Some(detection.coverage_status()),
            DetectionResult::NotFound
            | DetectionResult::Unreachable
            | DetectionResult::Incompatible => None,
        };
        let persisted = self
            .repository
            .record_verification(&VerificationWrite {
                endpoint_id,
                observed_status,
                last_trace_at,
                verified_at: now,
            })
            .await?;
        if !persisted {
            debug!(endpoint_id = %endpoint_id, "no coverage record, verification not persisted");
        }

        let report = VerificationReport {
            endpoint_id,
            verified: agent_running || last_trace_at.is_some(),
            last_trace_at,
            agent_running,
        };
        info!(
            endpoint_id = %endpoint_id,
            verified = report.verified,
            agent_running,
            detection = %detection,
            "agent verification finished"
        );
        Ok(report)
    }
}
