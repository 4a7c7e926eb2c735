//! Diesel row models for coverage persistence.

use super::schema::agent_coverage;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

/// Query result row for coverage records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = agent_coverage)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CoverageRow {
    /// Endpoint identifier.
    pub endpoint_id: i64,
    /// Endpoint name.
    pub endpoint_name: String,
    /// Coverage status.
    pub status: String,
    /// Agent intent.
    pub agent_enabled: bool,
    /// Agent container identifier.
    pub agent_container_id: Option<String>,
    /// Managed flag.
    pub agent_managed: bool,
    /// Exclusion reason.
    pub exclusion_reason: Option<String>,
    /// Deployment profile.
    pub deployment_profile: Option<String>,
    /// Most recent agent span.
    pub last_trace_at: Option<DateTime<Utc>>,
    /// Last verification time.
    pub last_verified_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Insert model for coverage records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = agent_coverage)]
pub struct NewCoverageRow {
    /// Endpoint identifier.
    pub endpoint_id: i64,
    /// Endpoint name.
    pub endpoint_name: String,
    /// Coverage status.
    pub status: String,
    /// Agent intent.
    pub agent_enabled: bool,
    /// Agent container identifier.
    pub agent_container_id: Option<String>,
    /// Managed flag.
    pub agent_managed: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}
