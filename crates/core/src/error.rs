//! Abort-severity failures.
//!
//! Anything in here fails the whole run and no output table is published.
//! Row-level defects are not errors; they travel in [`crate::quarantine`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::quarantine::Source;

/// Two or more capacities recorded for the same physical section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityConflict {
    pub venue_id: String,
    pub section: String,
    /// Distinct capacities seen, ascending
    pub capacities: Vec<i64>,
}

impl std::fmt::Display for CapacityConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} {:?}",
            self.venue_id, self.section, self.capacities
        )
    }
}

/// A venue mapped to more than one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueMarketConflict {
    pub venue_id: String,
    pub markets: Vec<String>,
}

impl std::fmt::Display for VenueMarketConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {:?}", self.venue_id, self.markets)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Section capacity is not constant for a (venue_id, section).
    #[error("section capacity conflict on {} key(s): {}", .0.len(), join(.0))]
    CapacityConflict(Vec<CapacityConflict>),

    /// venue_id -> market is not a function.
    #[error("venue maps to multiple markets on {} venue(s): {}", .0.len(), join(.0))]
    VenueMarketConflict(Vec<VenueMarketConflict>),

    /// More than one row for the same key in a table that requires a unique grain.
    #[error("duplicate grain in {table}: {}", .keys.join(", "))]
    DuplicateGrain { table: String, keys: Vec<String> },

    /// A key referenced by one table is missing from the table it points to.
    #[error("{table} references {key} which is missing from {referenced}")]
    ReferentialIntegrity {
        table: String,
        referenced: String,
        key: String,
    },

    #[error("negative {metric} in {table} at {key}: {value}")]
    NegativeMetric {
        table: String,
        key: String,
        metric: String,
        value: String,
    },

    /// A total changed between two stages that must preserve it.
    #[error("{metric} not conserved from {from} to {to}: {expected} != {actual}")]
    Conservation {
        metric: String,
        from: String,
        to: String,
        expected: String,
        actual: String,
    },

    /// A reference row has a blank or unreadable contractual value.
    #[error("{input} row {origin} ({key}) has no usable {field}")]
    IncompleteReference {
        input: Source,
        origin: String,
        key: String,
        field: String,
    },

    /// A reference table is missing contractual columns.
    #[error("{input} is missing required columns: {}", .columns.join(", "))]
    MissingColumns { input: Source, columns: Vec<String> },

    #[error("analysis window start {start} is after end {end}")]
    InvalidWindow { start: NaiveDate, end: NaiveDate },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("pipeline task failed: {0}")]
    Task(String),
}

impl PipelineError {
    /// Short machine-readable name for run summaries.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CapacityConflict(_) => "capacity_conflict",
            Self::VenueMarketConflict(_) => "venue_market_conflict",
            Self::DuplicateGrain { .. } => "duplicate_grain",
            Self::ReferentialIntegrity { .. } => "referential_integrity",
            Self::NegativeMetric { .. } => "negative_metric",
            Self::Conservation { .. } => "conservation",
            Self::IncompleteReference { .. } => "incomplete_reference",
            Self::MissingColumns { .. } => "missing_columns",
            Self::InvalidWindow { .. } => "invalid_window",
            Self::Config(_) => "config",
            Self::Task(_) => "task",
        }
    }
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
