//! Adapter implementations for coverage ports.

pub mod memory;
pub mod postgres;
