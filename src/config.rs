//! Runtime configuration for coverage services.
//!
//! Values are read from `FLEETWATCH_*` environment variables. Every field
//! has a default, so an empty environment yields a working configuration.

use crate::coverage::domain::{AgentImage, CoverageDomainError};
use crate::coverage::services::SyncPeriod;
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::time::Duration;
use thiserror::Error;

/// Environment variable prefix for every configuration field.
pub const ENV_PREFIX: &str = "FLEETWATCH_";

/// Coverage service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    /// Per-endpoint detection call timeout in seconds.
    pub probe_timeout_secs: u64,
    /// Per-call timeout for lifecycle mutations in seconds.
    pub action_timeout_secs: u64,
    /// Upper bound on concurrent per-endpoint tasks in any fan-out.
    pub max_concurrency: usize,
    /// Period of the background sync task in seconds.
    pub sync_interval_secs: u64,
    /// Verifier telemetry lookback window in seconds.
    pub trace_lookback_secs: u64,
    /// Agent image repository.
    pub agent_image: String,
    /// Agent image tag.
    pub agent_tag: String,
    /// Container name used when creating the agent.
    pub agent_container_name: String,
    /// Telemetry source that identifies agent spans.
    pub trace_source: String,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: 5,
            action_timeout_secs: 120,
            max_concurrency: 16,
            sync_interval_secs: 300,
            trace_lookback_secs: 600,
            agent_image: String::from("grafana/beyla"),
            agent_tag: String::from("latest"),
            agent_container_name: String::from("fleetwatch-ebpf-agent"),
            trace_source: String::from("beyla"),
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    #[error("failed to load configuration from {ENV_PREFIX}* variables: {0}")]
    Environment(#[from] envy::Error),

    /// A value parsed but is outside its accepted range.
    #[error("invalid value for {name}: {reason}")]
    InvalidValue {
        /// Field name.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The agent image reference is invalid.
    #[error(transparent)]
    Domain(#[from] CoverageDomainError),
}

impl CoverageConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable cannot be parsed or a value is
    /// out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Loads configuration from explicit key/value pairs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable cannot be parsed or a value is
    /// out of range.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::prefixed(ENV_PREFIX).from_iter(vars)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for zero timeouts, intervals or
    /// concurrency, and [`ConfigError::Domain`] for an invalid agent image.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("max_concurrency", self.max_concurrency)?;
        ensure_positive("probe_timeout_secs", self.probe_timeout_secs)?;
        ensure_positive("action_timeout_secs", self.action_timeout_secs)?;
        ensure_positive("sync_interval_secs", self.sync_interval_secs)?;
        self.trace_lookback_window()?;
        self.agent_image()?;
        if self.agent_container_name.trim().is_empty() {
            return Err(invalid("agent_container_name", "must not be empty"));
        }
        if self.trace_source.trim().is_empty() {
            return Err(invalid("trace_source", "must not be empty"));
        }
        Ok(())
    }

    /// Returns the detection call timeout.
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Returns the lifecycle call timeout.
    #[must_use]
    pub const fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    /// Returns the background sync period, clamped to at least one second.
    #[must_use]
    pub const fn sync_period(&self) -> SyncPeriod {
        SyncPeriod::from_secs(self.sync_interval_secs)
    }

    /// Returns the fan-out bound, clamped to at least one.
    #[must_use]
    pub fn max_concurrency(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_concurrency).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the verifier lookback window.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the window is zero or does
    /// not fit a timestamp offset.
    pub fn trace_lookback_window(&self) -> Result<chrono::Duration, ConfigError> {
        ensure_positive("trace_lookback_secs", self.trace_lookback_secs)?;
        chrono::Duration::from_std(Duration::from_secs(self.trace_lookback_secs))
            .map_err(|err| invalid("trace_lookback_secs", err.to_string()))
    }

    /// Returns the configured agent image.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Domain`] when the repository or tag is empty.
    pub fn agent_image(&self) -> Result<AgentImage, ConfigError> {
        Ok(AgentImage::new(
            self.agent_image.as_str(),
            self.agent_tag.as_str(),
        )?)
    }
}

fn ensure_positive<T>(name: &'static str, value: T) -> Result<(), ConfigError>
where
    T: Default + PartialEq,
{
    if value == T::default() {
        return Err(invalid(name, "must be greater than zero"));
    }
    Ok(())
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        name,
        reason: reason.into(),
    }
}
