//! Agent coverage tracking across the endpoint fleet.
//!
//! This module records, per endpoint, whether the eBPF tracing agent is
//! deployed, running and producing telemetry. Sync passes fold live
//! detection into the store without overriding operator intent, lifecycle
//! actions mutate the agent container and record the result, and
//! verification cross-checks container state against recent spans.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
