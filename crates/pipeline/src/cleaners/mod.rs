//! Per-source cleaners.
//!
//! Each cleaner is a stateless transform from raw records to a
//! [`Cleaned`](ticket_etl_core::Cleaned) table. Cleaners share nothing
//! mutable, so the three sources can be cleaned concurrently.

pub mod section_capacity;
pub mod ticket_sales;
pub mod weather;

pub use section_capacity::SectionCapacityCleaner;
pub use ticket_sales::TicketSalesCleaner;
pub use weather::{aggregate_daily, WeatherCleaner};

use rust_decimal::Decimal;
use std::str::FromStr;
use ticket_etl_core::{QuarantinedRow, Rule, Source};

/// A field-level rejection, turned into a [`QuarantinedRow`] by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Reject {
    pub rule: Rule,
    pub field: String,
    pub value: String,
}

impl Reject {
    pub(crate) fn new(rule: Rule, field: &str, value: impl std::fmt::Display) -> Self {
        Self {
            rule,
            field: field.to_string(),
            value: format!("{field}={value}"),
        }
    }

    pub(crate) fn into_row(
        self,
        source: Source,
        origin: Option<&str>,
        key: String,
        record: String,
    ) -> QuarantinedRow {
        QuarantinedRow {
            source,
            origin: origin.map(ToString::to_string),
            rule: self.rule,
            key,
            value: self.value,
            record,
        }
    }
}

/// Trimmed non-blank value of a contractual field.
pub(crate) fn required<'a>(field: &str, value: &'a Option<String>) -> Result<&'a str, Reject> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Reject::new(Rule::MissingField, field, "")),
    }
}

/// Rejects a row the reader could not decode.
pub(crate) fn decoded(defect: Option<&str>) -> Result<(), Reject> {
    match defect {
        Some(reason) => Err(Reject::new(Rule::InvalidEncoding, "record", reason)),
        None => Ok(()),
    }
}

/// Whole number. "12" and "12.0" are accepted, "12.5" is not.
pub(crate) fn parse_count(field: &str, raw: &str) -> Result<i64, Reject> {
    if let Ok(n) = raw.parse::<i64>() {
        return Ok(n);
    }
    Decimal::from_str(raw)
        .ok()
        .filter(|d| d.fract().is_zero())
        .and_then(|d| i64::try_from(d).ok())
        .ok_or_else(|| Reject::new(Rule::InvalidNumber, field, raw))
}

/// Exact decimal amount. A leading currency symbol and thousands separators are tolerated.
pub(crate) fn parse_amount(field: &str, raw: &str) -> Result<Decimal, Reject> {
    let cleaned: String = raw
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    Decimal::from_str(cleaned.trim()).map_err(|_| Reject::new(Rule::InvalidNumber, field, raw))
}

/// Finite float.
pub(crate) fn parse_measure(field: &str, raw: &str) -> Result<f64, Reject> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Reject::new(Rule::InvalidNumber, field, raw))
}

/// Field value for building a best-effort key out of possibly-invalid input.
pub(crate) fn key_part(value: &Option<String>) -> &str {
    value.as_deref().map_or("?", str::trim)
}
