//! Star schema rows: dimensions and facts as flat records.
//!
//! Field names here are the column names written for the load collaborators.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DimMarket {
    /// Deterministic identifier derived from `market_name`
    pub market_id: String,
    pub market_name: String,
    /// Market code (e.g. "BOS")
    pub market: String,
    pub country: String,
    pub venue: String,
    pub venue_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DimVenue {
    pub venue_id: String,
    pub venue: String,
    pub market: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DimSection {
    pub venue_id: String,
    pub section: String,
    pub section_capacity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DimDate {
    /// YYYYMMDD
    pub date_key: i32,
    pub date: NaiveDate,
    pub year: i32,
    pub quarter: u32,
    pub month: u32,
    pub month_name: String,
    pub day: u32,
    /// ISO weekday, Monday = 1
    pub day_of_week: u32,
    pub day_name: String,
    /// ISO week number
    pub week_of_year: u32,
    pub is_weekend: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimWeather {
    pub weather_id: String,
    pub market: String,
    pub event_date: NaiveDate,
    pub avg_temp_c: f64,
    pub min_temp_c: f64,
    pub max_temp_c: f64,
    pub avg_rh_pct: f64,
    pub avg_wind_mps: f64,
    pub total_precip_mm: f64,
    pub windy_hours: u32,
    pub rainy_hours: u32,
    pub freezing_hours: u32,
    pub hours_observed: u32,
}

/// One row per (event_date, venue_id, section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactTicketSales {
    pub event_date: NaiveDate,
    pub venue_id: String,
    pub section: String,
    pub tickets_sold: i64,
    pub revenue: Decimal,
    /// revenue / tickets_sold, 2 decimals; `None` when no tickets were sold
    pub avg_price: Option<Decimal>,
    pub section_capacity: i64,
    /// tickets_sold / section_capacity, 4 decimals, never clamped
    pub utilization: Option<Decimal>,
}

impl FactTicketSales {
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.event_date, self.venue_id, self.section)
    }

    /// More tickets sold than the section holds.
    #[must_use]
    pub fn is_over_capacity(&self) -> bool {
        self.utilization.is_some_and(|u| u > Decimal::ONE)
    }
}

/// Fact row widened with its market and that market-day's weather.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactSalesWithWeather {
    pub event_date: NaiveDate,
    pub market: String,
    pub venue_id: String,
    pub venue: String,
    pub section: String,
    pub tickets_sold: i64,
    pub revenue: Decimal,
    pub avg_price: Option<Decimal>,
    pub section_capacity: i64,
    pub utilization: Option<Decimal>,
    pub avg_temp_c: Option<f64>,
    pub min_temp_c: Option<f64>,
    pub max_temp_c: Option<f64>,
    pub avg_rh_pct: Option<f64>,
    pub avg_wind_mps: Option<f64>,
    pub total_precip_mm: Option<f64>,
    pub windy_hours: Option<u32>,
    pub rainy_hours: Option<u32>,
    pub freezing_hours: Option<u32>,
    pub hours_observed: Option<u32>,
}
