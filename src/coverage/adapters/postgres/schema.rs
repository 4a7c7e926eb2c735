//! Diesel schema for coverage persistence.

diesel::table! {
    /// Per-endpoint agent coverage records.
    agent_coverage (endpoint_id) {
        /// Control-plane endpoint identifier.
        endpoint_id -> BigInt,
        /// Denormalized endpoint name.
        #[max_length = 255]
        endpoint_name -> Varchar,
        /// Coverage status (`planned`, `deployed`, `excluded`, ...).
        #[max_length = 32]
        status -> Varchar,
        /// Whether the agent should be running.
        agent_enabled -> Bool,
        /// Live agent container identifier.
        #[max_length = 128]
        agent_container_id -> Nullable<Varchar>,
        /// Whether this crate created the agent container.
        agent_managed -> Bool,
        /// Operator-supplied exclusion reason.
        exclusion_reason -> Nullable<Text>,
        /// Reserved deployment preset name.
        #[max_length = 100]
        deployment_profile -> Nullable<Varchar>,
        /// Most recent agent span.
        last_trace_at -> Nullable<Timestamptz>,
        /// Last telemetry cross-check.
        last_verified_at -> Nullable<Timestamptz>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}
