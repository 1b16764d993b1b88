//! Integration join engine.
//!
//! Sale-row preserving join: every cleaned sale either becomes exactly one
//! [`IntegratedRecord`] or is quarantined for a missing capacity reference.
//! Capacity is an inner join on (venue_id, section); weather is a left join
//! on (market, event_date).

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use ticket_etl_core::{CapacityConflict, Cleaned, PipelineError, QuarantinedRow, Rule, Source};
use ticket_etl_data::{DailyWeather, IntegratedRecord, SectionCapacity, TicketSale};
use tracing::{error, info};

use crate::keys::KeyNormalizer;

/// Capacity lookup by (venue_id, section), one capacity per key.
#[derive(Debug, Clone, Default)]
pub struct CapacityIndex {
    capacities: BTreeMap<(String, String), i64>,
}

impl CapacityIndex {
    /// Indexes cleaned capacity rows.
    ///
    /// # Errors
    /// Returns [`PipelineError::CapacityConflict`] naming every
    /// (venue_id, section) recorded with more than one capacity
    pub fn build(rows: &[SectionCapacity]) -> Result<Self, PipelineError> {
        let mut seen: BTreeMap<(String, String), BTreeSet<i64>> = BTreeMap::new();
        for row in rows {
            seen.entry((row.venue_id.clone(), row.section.clone()))
                .or_default()
                .insert(row.section_capacity);
        }

        let conflicts: Vec<CapacityConflict> = seen
            .iter()
            .filter(|(_, capacities)| capacities.len() > 1)
            .map(|((venue_id, section), capacities)| CapacityConflict {
                venue_id: venue_id.clone(),
                section: section.clone(),
                capacities: capacities.iter().copied().collect(),
            })
            .collect();
        if !conflicts.is_empty() {
            for conflict in &conflicts {
                error!(
                    venue_id = %conflict.venue_id,
                    section = %conflict.section,
                    capacities = ?conflict.capacities,
                    "Section capacity is not constant"
                );
            }
            return Err(PipelineError::CapacityConflict(conflicts));
        }

        let capacities = seen
            .into_iter()
            .filter_map(|(key, capacities)| capacities.first().map(|c| (key, *c)))
            .collect();
        Ok(Self { capacities })
    }

    #[must_use]
    pub fn get(&self, venue_id: &str, section: &str) -> Option<i64> {
        self.capacities
            .get(&(venue_id.to_string(), section.to_string()))
            .copied()
    }

    /// Indexed rows in (venue_id, section) order.
    #[must_use]
    pub fn rows(&self) -> Vec<SectionCapacity> {
        self.capacities
            .iter()
            .map(|((venue_id, section), capacity)| SectionCapacity {
                venue_id: venue_id.clone(),
                section: section.clone(),
                section_capacity: *capacity,
            })
            .collect()
    }
}

/// Daily weather lookup by (market, event_date).
#[derive(Debug, Clone, Default)]
pub struct WeatherIndex {
    days: BTreeMap<(String, NaiveDate), DailyWeather>,
}

impl WeatherIndex {
    #[must_use]
    pub fn build(days: &[DailyWeather]) -> Self {
        Self {
            days: days
                .iter()
                .map(|d| ((d.market.clone(), d.event_date), d.clone()))
                .collect(),
        }
    }

    #[must_use]
    pub fn get(&self, market: &str, event_date: NaiveDate) -> Option<&DailyWeather> {
        self.days.get(&(market.to_string(), event_date))
    }
}

pub struct IntegrationEngine {
    keys: Arc<KeyNormalizer>,
}

impl IntegrationEngine {
    #[must_use]
    pub fn new(keys: Arc<KeyNormalizer>) -> Self {
        Self { keys }
    }

    /// Joins sales to capacity and weather, in sale order.
    #[must_use]
    pub fn integrate(
        &self,
        sales: &[TicketSale],
        capacity: &CapacityIndex,
        weather: &WeatherIndex,
    ) -> Cleaned<IntegratedRecord> {
        let mut out = Cleaned::new();
        let mut with_weather = 0usize;

        for sale in sales {
            let Some(venue) = self.keys.venue(&sale.venue_id) else {
                out.quarantine(reject(sale, Rule::UnknownVenue, "venue_id", &sale.venue_id));
                continue;
            };
            let Some(section_capacity) = capacity.get(&sale.venue_id, &sale.section) else {
                out.quarantine(reject(
                    sale,
                    Rule::NoCapacityReference,
                    "venue_id/section",
                    &format!("{}/{}", sale.venue_id, sale.section),
                ));
                continue;
            };

            let weather = weather.get(&venue.market, sale.event_date).cloned();
            if weather.is_some() {
                with_weather += 1;
            }
            out.accept(IntegratedRecord {
                event_date: sale.event_date,
                market: venue.market.clone(),
                venue_id: sale.venue_id.clone(),
                venue: venue.venue.clone(),
                section: sale.section.clone(),
                tickets_sold: sale.tickets_sold,
                revenue: sale.revenue,
                section_capacity,
                weather,
            });
        }

        info!(
            sales = sales.len(),
            integrated = out.rows.len(),
            with_weather,
            quarantined = out.quarantined.len(),
            "Integrated ticket sales"
        );
        out
    }
}

fn reject(sale: &TicketSale, rule: Rule, field: &str, value: &str) -> QuarantinedRow {
    QuarantinedRow {
        source: Source::Integration,
        origin: sale.origin.clone(),
        rule,
        key: sale.key(),
        value: format!("{field}={value}"),
        record: format!(
            "{},{},{},{},{}",
            sale.event_date, sale.venue_id, sale.section, sale.tickets_sold, sale.revenue
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::tests::normalizer;
    use rust_decimal_macros::dec;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn capacity(venue: &str, section: &str, cap: i64) -> SectionCapacity {
        SectionCapacity {
            venue_id: venue.to_string(),
            section: section.to_string(),
            section_capacity: cap,
        }
    }

    fn sale(venue: &str, section: &str, d: u32, tickets: i64) -> TicketSale {
        TicketSale {
            event_date: date(d),
            venue_id: venue.to_string(),
            section: section.to_string(),
            tickets_sold: tickets,
            revenue: dec!(10) * rust_decimal::Decimal::from(tickets),
            transaction_id: None,
            origin: None,
        }
    }

    fn day(market: &str, d: u32) -> DailyWeather {
        DailyWeather {
            market: market.to_string(),
            event_date: date(d),
            avg_temp_c: -3.0,
            min_temp_c: -6.0,
            max_temp_c: 1.0,
            avg_rh_pct: 70.0,
            avg_wind_mps: 4.0,
            total_precip_mm: 0.0,
            windy_hours: 0,
            rainy_hours: 0,
            freezing_hours: 20,
            hours_observed: 24,
        }
    }

    #[test]
    fn conflicting_capacities_abort_with_every_key() {
        let err = CapacityIndex::build(&[
            capacity("V1", "Upper Bowl", 5000),
            capacity("V1", "Upper Bowl", 4800),
            capacity("V1", "Club", 200),
        ])
        .unwrap_err();

        match err {
            PipelineError::CapacityConflict(conflicts) => {
                assert_eq!(
                    conflicts,
                    vec![CapacityConflict {
                        venue_id: "V1".to_string(),
                        section: "Upper Bowl".to_string(),
                        capacities: vec![4800, 5000],
                    }]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn join_preserves_every_sale_with_capacity() {
        let capacity = CapacityIndex::build(&[
            capacity("V1", "Club", 200),
            capacity("V2", "Club", 150),
        ])
        .unwrap();
        let weather = WeatherIndex::build(&[day("BOS", 15)]);
        let engine = IntegrationEngine::new(Arc::new(normalizer()));

        let sales = vec![
            sale("V1", "Club", 15, 100),
            sale("V1", "Club", 15, 50),
            sale("V2", "Club", 15, 10),
            sale("V1", "Upper Bowl", 15, 5),
        ];
        let out = engine.integrate(&sales, &capacity, &weather);

        assert_eq!(out.rows.len(), 3);
        assert_eq!(out.quarantined.len(), 1);
        assert_eq!(out.quarantined[0].rule, Rule::NoCapacityReference);
        assert_eq!(out.quarantined[0].source, Source::Integration);
        assert_eq!(out.quarantined[0].key, "2025-01-15/V1/Upper Bowl");

        assert_eq!(out.rows[0].market, "BOS");
        assert_eq!(out.rows[0].venue, "Arena One");
        assert_eq!(out.rows[0].section_capacity, 200);
        assert!(out.rows[0].weather.is_some());
        assert_eq!(out.rows[2].market, "TOR");
        assert!(out.rows[2].weather.is_none());
    }

    #[test]
    fn missing_weather_never_drops_a_sale() {
        let capacity = CapacityIndex::build(&[capacity("V1", "Club", 200)]).unwrap();
        let engine = IntegrationEngine::new(Arc::new(normalizer()));

        let out = engine.integrate(&[sale("V1", "Club", 15, 100)], &capacity, &WeatherIndex::default());

        assert_eq!(out.rows.len(), 1);
        assert!(out.rows[0].weather.is_none());
        assert_eq!(out.rows[0].tickets_sold, 100);
    }
}
