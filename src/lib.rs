//! Fleetwatch: eBPF tracing-agent coverage for container fleets.
//!
//! This crate tracks, for every endpoint managed by a container
//! orchestration control plane, whether the tracing agent is deployed,
//! running and producing telemetry. It deploys, enables, disables and
//! removes the agent on demand, one endpoint at a time or in bulk.
//!
//! # Architecture
//!
//! Fleetwatch follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (database, in-memory)
//! - **Services**: Reconciliation, lifecycle and verification workflows
//!
//! # Modules
//!
//! - [`coverage`]: Coverage records, detection and agent lifecycle
//! - [`config`]: Environment-driven runtime configuration

pub mod config;
pub mod coverage;
