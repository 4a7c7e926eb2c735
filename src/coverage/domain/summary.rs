//! Fleet-wide coverage counters for dashboards.

use super::{CoverageRecord, CoverageStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregated coverage counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageSummary {
    counts: BTreeMap<CoverageStatus, u64>,
    total: u64,
    coverage_percent: u64,
    drifted: u64,
}

impl CoverageSummary {
    /// Aggregates a set of coverage records.
    #[must_use]
    pub fn from_records(records: &[CoverageRecord]) -> Self {
        let drifted = records.iter().filter(|record| record.drifted()).count();
        let mut summary = Self::from_statuses(records.iter().map(CoverageRecord::status));
        summary.drifted = u64::try_from(drifted).unwrap_or(u64::MAX);
        summary
    }

    /// Aggregates a sequence of statuses.
    #[must_use]
    pub fn from_statuses(statuses: impl IntoIterator<Item = CoverageStatus>) -> Self {
        let mut counts = BTreeMap::new();
        for status in statuses {
            *counts.entry(status).or_insert(0_u64) += 1;
        }
        let total = counts.values().sum();
        let deployed = counts.get(&CoverageStatus::Deployed).copied().unwrap_or(0);
        Self {
            counts,
            total,
            coverage_percent: rounded_percent(deployed, total),
            drifted: 0,
        }
    }

    /// Returns the number of records in a status.
    #[must_use]
    pub fn count(&self, status: CoverageStatus) -> u64 {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    /// Returns per-status counts; statuses with no records are absent.
    #[must_use]
    pub const fn counts(&self) -> &BTreeMap<CoverageStatus, u64> {
        &self.counts
    }

    /// Returns the number of records.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Returns the share of deployed records, rounded half up, as a
    /// percentage. Zero when there are no records.
    #[must_use]
    pub const fn coverage_percent(&self) -> u64 {
        self.coverage_percent
    }

    /// Returns the number of drifted records.
    #[must_use]
    pub const fn drifted(&self) -> u64 {
        self.drifted
    }
}

fn rounded_percent(part: u64, total: u64) -> u64 {
    let numerator = part.saturating_mul(200).saturating_add(total);
    numerator
        .checked_div(total.saturating_mul(2))
        .unwrap_or(0)
}
