//! Row-level quarantine side channel.
//!
//! Cleaners and the join engine return a [`Cleaned`] value carrying the
//! accepted rows together with every rejected row and the rule it broke.
//! Quarantine never fails the run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Where a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    TicketSales,
    SectionCapacity,
    Weather,
    Integration,
}

impl Source {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TicketSales => "ticket_sales",
            Self::SectionCapacity => "section_capacity",
            Self::Weather => "weather",
            Self::Integration => "integration",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The rule a quarantined record violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// A contractual field is absent or blank
    MissingField,
    /// The row's bytes are not valid text
    InvalidEncoding,
    /// A numeric field did not parse
    InvalidNumber,
    /// A date or timestamp did not parse
    InvalidDate,
    /// tickets_sold < 0
    NegativeTickets,
    /// revenue < 0
    NegativeRevenue,
    /// section_capacity <= 0
    NonPositiveCapacity,
    /// A weather reading outside its physical range
    OutOfRange,
    UnknownVenue,
    UnknownMarket,
    /// Section label not present in the canonical lookup
    UnmappedSection,
    /// Event date outside the analysis window
    OutsideWindow,
    /// Same partial key, differing values
    AmbiguousDuplicate,
    /// Sale row with no capacity row for its (venue_id, section)
    NoCapacityReference,
}

impl Rule {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingField => "missing_field",
            Self::InvalidEncoding => "invalid_encoding",
            Self::InvalidNumber => "invalid_number",
            Self::InvalidDate => "invalid_date",
            Self::NegativeTickets => "negative_tickets",
            Self::NegativeRevenue => "negative_revenue",
            Self::NonPositiveCapacity => "non_positive_capacity",
            Self::OutOfRange => "out_of_range",
            Self::UnknownVenue => "unknown_venue",
            Self::UnknownMarket => "unknown_market",
            Self::UnmappedSection => "unmapped_section",
            Self::OutsideWindow => "outside_window",
            Self::AmbiguousDuplicate => "ambiguous_duplicate",
            Self::NoCapacityReference => "no_capacity_reference",
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A rejected record with enough context to reproduce the decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantinedRow {
    pub source: Source,
    /// Originating batch and line (e.g. "sales_jan.csv:14"), when known
    pub origin: Option<String>,
    pub rule: Rule,
    /// Best-effort natural key of the record (e.g. "2025-02-01/V1/Club")
    pub key: String,
    /// The offending field and value (e.g. "tickets_sold=-3")
    pub value: String,
    /// The whole record as received
    pub record: String,
}

/// Accepted rows plus the quarantine side channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cleaned<T> {
    pub rows: Vec<T>,
    pub quarantined: Vec<QuarantinedRow>,
}

impl<T> Default for Cleaned<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            quarantined: Vec::new(),
        }
    }
}

impl<T> Cleaned<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, row: T) {
        self.rows.push(row);
    }

    /// Records a quarantined row and logs it.
    pub fn quarantine(&mut self, row: QuarantinedRow) {
        warn!(
            source = %row.source,
            origin = row.origin.as_deref().unwrap_or("-"),
            rule = %row.rule,
            key = %row.key,
            value = %row.value,
            "Quarantined record"
        );
        self.quarantined.push(row);
    }

    /// Splits into accepted rows and quarantined rows.
    #[must_use]
    pub fn into_parts(self) -> (Vec<T>, Vec<QuarantinedRow>) {
        (self.rows, self.quarantined)
    }

    #[must_use]
    pub fn quarantine_counts(&self) -> BTreeMap<Rule, usize> {
        count_by_rule(&self.quarantined)
    }
}

#[must_use]
pub fn count_by_rule(rows: &[QuarantinedRow]) -> BTreeMap<Rule, usize> {
    let mut counts = BTreeMap::new();
    for row in rows {
        *counts.entry(row.rule).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(rule: Rule) -> QuarantinedRow {
        QuarantinedRow {
            source: Source::TicketSales,
            origin: Some("sales.csv:3".to_string()),
            rule,
            key: "2025-02-01/V1/Club".to_string(),
            value: "tickets_sold=-3".to_string(),
            record: "2025-02-01,V1,Club,-3,10.00".to_string(),
        }
    }

    #[test]
    fn cleaned_tracks_rows_and_quarantine() {
        let mut cleaned: Cleaned<u32> = Cleaned::new();
        cleaned.accept(1);
        cleaned.accept(2);
        cleaned.quarantine(sample(Rule::NegativeTickets));
        cleaned.quarantine(sample(Rule::NegativeTickets));
        cleaned.quarantine(sample(Rule::InvalidNumber));

        let counts = cleaned.quarantine_counts();
        assert_eq!(counts.get(&Rule::NegativeTickets), Some(&2));
        assert_eq!(counts.get(&Rule::InvalidNumber), Some(&1));

        let (rows, quarantined) = cleaned.into_parts();
        assert_eq!(rows, vec![1, 2]);
        assert_eq!(quarantined.len(), 3);
    }

    #[test]
    fn rule_serializes_snake_case() {
        let json = serde_json::to_string(&Rule::NoCapacityReference).unwrap();
        assert_eq!(json, "\"no_capacity_reference\"");
        assert_eq!(Rule::NoCapacityReference.to_string(), "no_capacity_reference");
    }
}
