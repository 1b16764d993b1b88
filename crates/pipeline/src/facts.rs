//! Fact aggregation to (event_date, venue_id, section).

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;
use ticket_etl_core::{CapacityConflict, PipelineError};
use ticket_etl_data::{DailyWeather, FactSalesWithWeather, FactTicketSales, IntegratedRecord};
use tracing::{info, warn};

const AVG_PRICE_DP: u32 = 2;
const UTILIZATION_DP: u32 = 4;

/// The fact table and its weather-enriched wide form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactTables {
    /// Sorted by (event_date, venue_id, section)
    pub fact_ticket_sales: Vec<FactTicketSales>,
    /// Sorted by (event_date, market, venue_id, section)
    pub fact_sales_with_weather: Vec<FactSalesWithWeather>,
}

impl FactTables {
    /// Rows with utilization above 1.
    #[must_use]
    pub fn over_capacity_rows(&self) -> usize {
        self.fact_ticket_sales
            .iter()
            .filter(|f| f.is_over_capacity())
            .count()
    }
}

struct Group<'a> {
    first: &'a IntegratedRecord,
    tickets_sold: i64,
    revenue: Decimal,
}

pub struct FactAggregator;

impl FactAggregator {
    /// Sums tickets and revenue per grain and derives the ratio metrics.
    ///
    /// # Errors
    /// Returns [`PipelineError::CapacityConflict`] if records sharing a grain
    /// disagree on capacity
    pub fn aggregate(records: &[IntegratedRecord]) -> Result<FactTables, PipelineError> {
        let mut groups: BTreeMap<(NaiveDate, &str, &str), Group<'_>> = BTreeMap::new();
        let mut conflicts: BTreeMap<(&str, &str), Vec<i64>> = BTreeMap::new();

        for record in records {
            let key = (
                record.event_date,
                record.venue_id.as_str(),
                record.section.as_str(),
            );
            let group = groups.entry(key).or_insert(Group {
                first: record,
                tickets_sold: 0,
                revenue: Decimal::ZERO,
            });
            if group.first.section_capacity != record.section_capacity {
                let seen = conflicts.entry((key.1, key.2)).or_default();
                seen.extend([group.first.section_capacity, record.section_capacity]);
            }
            group.tickets_sold += record.tickets_sold;
            group.revenue += record.revenue;
        }

        if !conflicts.is_empty() {
            return Err(PipelineError::CapacityConflict(
                conflicts
                    .into_iter()
                    .map(|((venue_id, section), mut capacities)| {
                        capacities.sort_unstable();
                        capacities.dedup();
                        CapacityConflict {
                            venue_id: venue_id.to_string(),
                            section: section.to_string(),
                            capacities,
                        }
                    })
                    .collect(),
            ));
        }

        let mut tables = FactTables::default();
        for ((event_date, venue_id, section), group) in groups {
            let fact = FactTicketSales {
                event_date,
                venue_id: venue_id.to_string(),
                section: section.to_string(),
                tickets_sold: group.tickets_sold,
                revenue: group.revenue,
                avg_price: avg_price(group.revenue, group.tickets_sold),
                section_capacity: group.first.section_capacity,
                utilization: utilization(group.tickets_sold, group.first.section_capacity),
            };
            if fact.is_over_capacity() {
                warn!(
                    key = %fact.key(),
                    tickets_sold = fact.tickets_sold,
                    section_capacity = fact.section_capacity,
                    "Tickets sold exceed section capacity"
                );
            }
            tables
                .fact_sales_with_weather
                .push(widen(&fact, group.first));
            tables.fact_ticket_sales.push(fact);
        }
        tables.fact_sales_with_weather.sort_by(|a, b| {
            (a.event_date, &a.market, &a.venue_id, &a.section)
                .cmp(&(b.event_date, &b.market, &b.venue_id, &b.section))
        });

        info!(
            records = records.len(),
            facts = tables.fact_ticket_sales.len(),
            over_capacity = tables.over_capacity_rows(),
            "Aggregated fact table"
        );
        Ok(tables)
    }
}

fn widen(fact: &FactTicketSales, record: &IntegratedRecord) -> FactSalesWithWeather {
    let w: Option<&DailyWeather> = record.weather.as_ref();
    FactSalesWithWeather {
        event_date: fact.event_date,
        market: record.market.clone(),
        venue_id: fact.venue_id.clone(),
        venue: record.venue.clone(),
        section: fact.section.clone(),
        tickets_sold: fact.tickets_sold,
        revenue: fact.revenue,
        avg_price: fact.avg_price,
        section_capacity: fact.section_capacity,
        utilization: fact.utilization,
        avg_temp_c: w.map(|w| w.avg_temp_c),
        min_temp_c: w.map(|w| w.min_temp_c),
        max_temp_c: w.map(|w| w.max_temp_c),
        avg_rh_pct: w.map(|w| w.avg_rh_pct),
        avg_wind_mps: w.map(|w| w.avg_wind_mps),
        total_precip_mm: w.map(|w| w.total_precip_mm),
        windy_hours: w.map(|w| w.windy_hours),
        rainy_hours: w.map(|w| w.rainy_hours),
        freezing_hours: w.map(|w| w.freezing_hours),
        hours_observed: w.map(|w| w.hours_observed),
    }
}

/// `numerator / denominator`, or `None` when the denominator is zero.
#[must_use]
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Option<Decimal> {
    if denominator.is_zero() {
        return None;
    }
    numerator.checked_div(denominator)
}

/// Revenue per ticket to the cent; `None` when no tickets were sold.
#[must_use]
pub fn avg_price(revenue: Decimal, tickets_sold: i64) -> Option<Decimal> {
    safe_div(revenue, Decimal::from(tickets_sold))
        .map(|p| p.round_dp_with_strategy(AVG_PRICE_DP, RoundingStrategy::MidpointAwayFromZero))
}

/// Share of capacity sold, unclamped; `None` only for zero capacity.
#[must_use]
pub fn utilization(tickets_sold: i64, section_capacity: i64) -> Option<Decimal> {
    safe_div(Decimal::from(tickets_sold), Decimal::from(section_capacity)).map(|u| {
        u.round_dp_with_strategy(UTILIZATION_DP, RoundingStrategy::MidpointAwayFromZero)
    })
}
