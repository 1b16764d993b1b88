//! Dimension materializer.
//!
//! Each dimension is deduplicated on its natural key and sorted by it, after
//! its invariant has been checked. DimDate is generated from the configured
//! window alone.

use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::BTreeMap;
use std::sync::Arc;
use ticket_etl_core::{AnalysisWindow, PipelineError};
use ticket_etl_data::{
    DailyWeather, DimDate, DimMarket, DimSection, DimVenue, DimWeather, IntegratedRecord,
    SectionCapacity,
};
use tracing::info;
use uuid::Uuid;

use crate::keys::KeyNormalizer;
use crate::validation::{check_constant_capacity, check_venue_market_function};

/// Namespace for market identifiers, so the same name always yields the same id.
const MARKET_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_9b3d_4c57_8e21_5a0d_7c93_b4e8);

/// All dimensions of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dimensions {
    pub dim_market: Vec<DimMarket>,
    pub dim_venue: Vec<DimVenue>,
    pub dim_section: Vec<DimSection>,
    pub dim_date: Vec<DimDate>,
    pub dim_weather: Vec<DimWeather>,
}

pub struct DimensionMaterializer {
    keys: Arc<KeyNormalizer>,
}

impl DimensionMaterializer {
    #[must_use]
    pub fn new(keys: Arc<KeyNormalizer>) -> Self {
        Self { keys }
    }

    /// Builds every dimension.
    ///
    /// # Errors
    /// Fails fast on a non-constant capacity, a venue under two markets, or
    /// an inverted window
    pub fn materialize(
        &self,
        window: &AnalysisWindow,
        capacity: &[SectionCapacity],
        weather: &[DailyWeather],
        records: &[IntegratedRecord],
    ) -> Result<Dimensions, PipelineError> {
        let dims = Dimensions {
            dim_market: self.dim_market(),
            dim_venue: self.dim_venue(records)?,
            dim_section: dim_section(capacity, records)?,
            dim_date: build_dim_date(window)?,
            dim_weather: dim_weather(weather),
        };

        info!(
            markets = dims.dim_market.len(),
            venues = dims.dim_venue.len(),
            sections = dims.dim_section.len(),
            dates = dims.dim_date.len(),
            weather_days = dims.dim_weather.len(),
            "Materialized dimensions"
        );
        Ok(dims)
    }

    /// One row per configured market, in market-name order.
    #[must_use]
    pub fn dim_market(&self) -> Vec<DimMarket> {
        let mut rows: Vec<DimMarket> = self
            .keys
            .markets()
            .map(|(code, market)| {
                let name = market.name.trim();
                DimMarket {
                    market_id: market_id(name),
                    market_name: name.to_string(),
                    market: code.to_string(),
                    country: market.country.trim().to_string(),
                    venue: market.venue.trim().to_string(),
                    venue_id: KeyNormalizer::venue_id(&market.venue_id),
                }
            })
            .collect();
        rows.sort_by(|a, b| a.market_name.cmp(&b.market_name));
        rows
    }

    /// Configured venues plus every venue seen in the integrated records.
    ///
    /// # Errors
    /// Returns [`PipelineError::VenueMarketConflict`] if any venue resolves
    /// to two markets
    pub fn dim_venue(&self, records: &[IntegratedRecord]) -> Result<Vec<DimVenue>, PipelineError> {
        let mut candidates: Vec<DimVenue> = self
            .keys
            .venues()
            .map(|v| DimVenue {
                venue_id: v.venue_id.clone(),
                venue: v.venue.clone(),
                market: v.market.clone(),
            })
            .collect();
        candidates.extend(records.iter().map(|r| DimVenue {
            venue_id: r.venue_id.clone(),
            venue: r.venue.clone(),
            market: r.market.clone(),
        }));
        check_venue_market_function(&candidates)?;

        Ok(dedup_by_key(candidates, |v| v.venue_id.clone()))
    }
}

/// Capacity reference rows plus every (venue_id, section) in the records.
///
/// # Errors
/// Returns [`PipelineError::CapacityConflict`] if capacity is not constant
pub fn dim_section(
    capacity: &[SectionCapacity],
    records: &[IntegratedRecord],
) -> Result<Vec<DimSection>, PipelineError> {
    let candidates: Vec<DimSection> = capacity
        .iter()
        .map(|c| DimSection {
            venue_id: c.venue_id.clone(),
            section: c.section.clone(),
            section_capacity: c.section_capacity,
        })
        .chain(records.iter().map(|r| DimSection {
            venue_id: r.venue_id.clone(),
            section: r.section.clone(),
            section_capacity: r.section_capacity,
        }))
        .collect();
    check_constant_capacity(&candidates)?;

    Ok(dedup_by_key(candidates, |s| {
        (s.venue_id.clone(), s.section.clone())
    }))
}

/// One row per market-day with observations.
#[must_use]
pub fn dim_weather(days: &[DailyWeather]) -> Vec<DimWeather> {
    let rows: Vec<DimWeather> = days
        .iter()
        .map(|d| DimWeather {
            weather_id: weather_id(&d.market, d.event_date),
            market: d.market.clone(),
            event_date: d.event_date,
            avg_temp_c: d.avg_temp_c,
            min_temp_c: d.min_temp_c,
            max_temp_c: d.max_temp_c,
            avg_rh_pct: d.avg_rh_pct,
            avg_wind_mps: d.avg_wind_mps,
            total_precip_mm: d.total_precip_mm,
            windy_hours: d.windy_hours,
            rainy_hours: d.rainy_hours,
            freezing_hours: d.freezing_hours,
            hours_observed: d.hours_observed,
        })
        .collect();
    dedup_by_key(rows, |w| (w.market.clone(), w.event_date))
}

/// Dense calendar over the window, both endpoints included.
///
/// # Errors
/// Returns [`PipelineError::InvalidWindow`] if `start > end`
pub fn build_dim_date(window: &AnalysisWindow) -> Result<Vec<DimDate>, PipelineError> {
    if window.start > window.end {
        return Err(PipelineError::InvalidWindow {
            start: window.start,
            end: window.end,
        });
    }

    Ok(window
        .start
        .iter_days()
        .take_while(|d| *d <= window.end)
        .map(dim_date_row)
        .collect())
}

fn dim_date_row(date: NaiveDate) -> DimDate {
    let weekday = date.weekday();
    DimDate {
        date_key: date_key(date),
        date,
        year: date.year(),
        quarter: (date.month() - 1) / 3 + 1,
        month: date.month(),
        month_name: date.format("%B").to_string(),
        day: date.day(),
        day_of_week: weekday.number_from_monday(),
        day_name: date.format("%A").to_string(),
        week_of_year: date.iso_week().week(),
        is_weekend: matches!(weekday, Weekday::Sat | Weekday::Sun),
    }
}

/// YYYYMMDD as an integer.
#[must_use]
pub fn date_key(date: NaiveDate) -> i32 {
    date.year() * 10_000 + i32::try_from(date.month() * 100 + date.day()).unwrap_or(0)
}

/// Stable identifier for a market name.
#[must_use]
pub fn market_id(market_name: &str) -> String {
    Uuid::new_v5(&MARKET_NAMESPACE, market_name.as_bytes()).to_string()
}

#[must_use]
pub fn weather_id(market: &str, event_date: NaiveDate) -> String {
    format!("{market}-{}", date_key(event_date))
}

/// Keeps the first row per key, sorted by key.
fn dedup_by_key<T, K: Ord>(rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut unique: BTreeMap<K, T> = BTreeMap::new();
    for row in rows {
        unique.entry(key(&row)).or_insert(row);
    }
    unique.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::tests::normalizer;
    use rust_decimal_macros::dec;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn record(venue_id: &str, market: &str, section: &str, capacity: i64) -> IntegratedRecord {
        IntegratedRecord {
            event_date: date(2, 1),
            market: market.to_string(),
            venue_id: venue_id.to_string(),
            venue: "Arena One".to_string(),
            section: section.to_string(),
            tickets_sold: 10,
            revenue: dec!(100),
            section_capacity: capacity,
            weather: None,
        }
    }

    fn capacity(venue_id: &str, section: &str, cap: i64) -> SectionCapacity {
        SectionCapacity {
            venue_id: venue_id.to_string(),
            section: section.to_string(),
            section_capacity: cap,
        }
    }

    #[test]
    fn dim_date_spans_window_inclusive() {
        let dates = build_dim_date(&AnalysisWindow::new(date(1, 30), date(2, 2))).unwrap();
        assert_eq!(dates.len(), 4);
        assert_eq!(dates[0].date_key, 20_250_130);
        assert_eq!(dates[3].date, date(2, 2));

        let feb1 = &dates[2];
        assert_eq!(feb1.month_name, "February");
        assert_eq!(feb1.day_name, "Saturday");
        assert_eq!(feb1.day_of_week, 6);
        assert_eq!(feb1.quarter, 1);
        assert!(feb1.is_weekend);
        assert!(!dates[0].is_weekend);
    }

    #[test]
    fn single_day_window_has_one_row() {
        let dates = build_dim_date(&AnalysisWindow::new(date(3, 1), date(3, 1))).unwrap();
        assert_eq!(dates.len(), 1);
    }

    #[test]
    fn inverted_window_is_rejected() {
        let err = build_dim_date(&AnalysisWindow::new(date(3, 1), date(2, 1))).unwrap_err();
        assert_eq!(err.kind(), "invalid_window");
    }

    #[test]
    fn market_id_is_deterministic() {
        assert_eq!(market_id("Boston"), market_id("Boston"));
        assert_ne!(market_id("Boston"), market_id("Toronto"));
    }

    #[test]
    fn dim_market_has_one_row_per_configured_market() {
        let dims = DimensionMaterializer::new(Arc::new(normalizer()));
        let markets = dims.dim_market();
        let codes: Vec<&str> = markets.iter().map(|m| m.market.as_str()).collect();
        assert_eq!(codes, vec!["BOS", "TOR"]);
        assert_eq!(markets[0].market_id, market_id("Boston"));
        assert_eq!(markets[0].venue_id, "V1");
    }

    #[test]
    fn dim_venue_rejects_venue_under_two_markets() {
        let dims = DimensionMaterializer::new(Arc::new(normalizer()));
        assert_eq!(dims.dim_venue(&[record("V1", "BOS", "Club", 200)]).unwrap().len(), 2);

        let err = dims
            .dim_venue(&[record("V1", "TOR", "Club", 200)])
            .unwrap_err();
        assert_eq!(err.kind(), "venue_market_conflict");
    }

    #[test]
    fn dim_section_dedups_and_checks_capacity() {
        let sections = dim_section(
            &[capacity("V1", "Club", 200), capacity("V1", "Lower Bowl", 900)],
            &[record("V1", "BOS", "Club", 200), record("V1", "BOS", "Club", 200)],
        )
        .unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].section, "Club");

        let err = dim_section(
            &[capacity("V1", "Club", 200)],
            &[record("V1", "BOS", "Club", 250)],
        )
        .unwrap_err();
        assert_eq!(err.kind(), "capacity_conflict");
    }

    #[test]
    fn weather_id_combines_market_and_date() {
        assert_eq!(weather_id("BOS", date(1, 15)), "BOS-20250115");
    }
}
