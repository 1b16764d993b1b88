//! Dataset-level checks run at stage boundaries.
//!
//! Every check either passes or returns an abort-severity
//! [`PipelineError`] naming the offending keys. Row-level problems never
//! reach this module; the cleaners and the join quarantine them.

use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use ticket_etl_core::{CapacityConflict, PipelineError, VenueMarketConflict};
use ticket_etl_data::{DimSection, DimVenue, FactTicketSales, IntegratedRecord, StarSchema};
use tracing::{debug, error};

/// Section capacity must be a single value per (venue_id, section).
///
/// # Errors
/// Returns [`PipelineError::CapacityConflict`] listing every violating key
pub fn check_constant_capacity(rows: &[DimSection]) -> Result<(), PipelineError> {
    let mut seen: BTreeMap<(&str, &str), BTreeSet<i64>> = BTreeMap::new();
    for row in rows {
        seen.entry((row.venue_id.as_str(), row.section.as_str()))
            .or_default()
            .insert(row.section_capacity);
    }

    let conflicts: Vec<CapacityConflict> = seen
        .into_iter()
        .filter(|(_, capacities)| capacities.len() > 1)
        .map(|((venue_id, section), capacities)| CapacityConflict {
            venue_id: venue_id.to_string(),
            section: section.to_string(),
            capacities: capacities.into_iter().collect(),
        })
        .collect();

    if conflicts.is_empty() {
        Ok(())
    } else {
        error!(conflicts = conflicts.len(), "Non-constant section capacity");
        Err(PipelineError::CapacityConflict(conflicts))
    }
}

/// venue_id -> market must be a function.
///
/// # Errors
/// Returns [`PipelineError::VenueMarketConflict`] listing every venue seen
/// under more than one market
pub fn check_venue_market_function(rows: &[DimVenue]) -> Result<(), PipelineError> {
    let mut seen: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for row in rows {
        seen.entry(row.venue_id.as_str())
            .or_default()
            .insert(row.market.as_str());
    }

    let conflicts: Vec<VenueMarketConflict> = seen
        .into_iter()
        .filter(|(_, markets)| markets.len() > 1)
        .map(|(venue_id, markets)| VenueMarketConflict {
            venue_id: venue_id.to_string(),
            markets: markets.into_iter().map(ToString::to_string).collect(),
        })
        .collect();

    if conflicts.is_empty() {
        Ok(())
    } else {
        error!(conflicts = conflicts.len(), "Venue maps to multiple markets");
        Err(PipelineError::VenueMarketConflict(conflicts))
    }
}

/// Each key may appear at most once.
///
/// # Errors
/// Returns [`PipelineError::DuplicateGrain`] with every repeated key
pub fn check_unique_grain<K, I>(table: &str, keys: I) -> Result<(), PipelineError>
where
    K: Ord + Display,
    I: IntoIterator<Item = K>,
{
    let mut seen = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    for key in keys {
        if seen.contains(&key) {
            duplicates.insert(key);
        } else {
            seen.insert(key);
        }
    }

    if duplicates.is_empty() {
        debug!(table, rows = seen.len(), "Grain is unique");
        Ok(())
    } else {
        error!(table, duplicates = duplicates.len(), "Duplicate grain");
        Err(PipelineError::DuplicateGrain {
            table: table.to_string(),
            keys: duplicates.iter().map(ToString::to_string).collect(),
        })
    }
}

/// No fact metric may be negative. Utilization may exceed 1.
///
/// # Errors
/// Returns [`PipelineError::NegativeMetric`] for the first offending row
pub fn check_fact_metrics(table: &str, facts: &[FactTicketSales]) -> Result<(), PipelineError> {
    for fact in facts {
        let metrics = [
            ("tickets_sold", Some(Decimal::from(fact.tickets_sold))),
            ("revenue", Some(fact.revenue)),
            ("avg_price", fact.avg_price),
            ("section_capacity", Some(Decimal::from(fact.section_capacity))),
            ("utilization", fact.utilization),
        ];
        for (metric, value) in metrics {
            if let Some(value) = value.filter(|v| *v < Decimal::ZERO) {
                error!(table, key = %fact.key(), metric, %value, "Negative fact metric");
                return Err(PipelineError::NegativeMetric {
                    table: table.to_string(),
                    key: fact.key(),
                    metric: metric.to_string(),
                    value: value.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Every foreign key in the schema resolves to a dimension row.
///
/// # Errors
/// Returns [`PipelineError::ReferentialIntegrity`] for the first dangling key
pub fn check_referential(schema: &StarSchema) -> Result<(), PipelineError> {
    let sections: BTreeSet<(&str, &str)> = schema
        .dim_section
        .iter()
        .map(|s| (s.venue_id.as_str(), s.section.as_str()))
        .collect();
    let venues: BTreeSet<&str> = schema.dim_venue.iter().map(|v| v.venue_id.as_str()).collect();
    let markets: BTreeSet<&str> = schema.dim_market.iter().map(|m| m.market.as_str()).collect();
    let dates: BTreeSet<chrono::NaiveDate> = schema.dim_date.iter().map(|d| d.date).collect();

    let dangling = |table: &str, referenced: &str, key: String| {
        error!(table, referenced, key = %key, "Dangling reference");
        PipelineError::ReferentialIntegrity {
            table: table.to_string(),
            referenced: referenced.to_string(),
            key,
        }
    };

    for fact in &schema.fact_ticket_sales {
        if !sections.contains(&(fact.venue_id.as_str(), fact.section.as_str())) {
            return Err(dangling(
                "fact_ticket_sales",
                "dim_section",
                format!("{}/{}", fact.venue_id, fact.section),
            ));
        }
        if !venues.contains(fact.venue_id.as_str()) {
            return Err(dangling("fact_ticket_sales", "dim_venue", fact.venue_id.clone()));
        }
        if !dates.contains(&fact.event_date) {
            return Err(dangling(
                "fact_ticket_sales",
                "dim_date",
                fact.event_date.to_string(),
            ));
        }
    }
    for venue in &schema.dim_venue {
        if !markets.contains(venue.market.as_str()) {
            return Err(dangling("dim_venue", "dim_market", venue.market.clone()));
        }
    }
    for day in &schema.dim_weather {
        if !markets.contains(day.market.as_str()) {
            return Err(dangling("dim_weather", "dim_market", day.market.clone()));
        }
    }

    debug!("Referential checks passed");
    Ok(())
}

/// Aggregation must neither drop nor invent tickets or revenue.
///
/// # Errors
/// Returns [`PipelineError::Conservation`] if either total differs
pub fn check_conservation(
    integrated: &[IntegratedRecord],
    facts: &[FactTicketSales],
) -> Result<(), PipelineError> {
    let tickets_in: i64 = integrated.iter().map(|r| r.tickets_sold).sum();
    let tickets_out: i64 = facts.iter().map(|f| f.tickets_sold).sum();
    conserved("tickets_sold", tickets_in, tickets_out)?;

    let revenue_in: Decimal = integrated.iter().map(|r| r.revenue).sum();
    let revenue_out: Decimal = facts.iter().map(|f| f.revenue).sum();
    conserved("revenue", revenue_in, revenue_out)
}

fn conserved<T: PartialEq + Display>(metric: &str, expected: T, actual: T) -> Result<(), PipelineError> {
    if expected == actual {
        return Ok(());
    }
    error!(metric, %expected, %actual, "Total not conserved by aggregation");
    Err(PipelineError::Conservation {
        metric: metric.to_string(),
        from: "integrated".to_string(),
        to: "fact_ticket_sales".to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}
