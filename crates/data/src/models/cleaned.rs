//! Typed, validated source records produced by the cleaners.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A cleaned ticket-sale row keyed on canonical identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketSale {
    pub event_date: NaiveDate,
    pub venue_id: String,
    pub section: String,
    pub tickets_sold: i64,
    pub revenue: Decimal,
    pub transaction_id: Option<String>,
    #[serde(skip)]
    pub origin: Option<String>,
}

impl TicketSale {
    /// Grain key rendered as "date/venue/section".
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.event_date, self.venue_id, self.section)
    }
}

/// A cleaned capacity reference row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectionCapacity {
    pub venue_id: String,
    pub section: String,
    pub section_capacity: i64,
}

/// A cleaned sub-daily weather reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    /// Market code (e.g. "BOS")
    pub market: String,
    /// Local wall-clock time of the reading
    pub timestamp: NaiveDateTime,
    /// °C
    pub temperature: f64,
    /// Percent, 0-100
    pub relative_humidity: f64,
    /// mm
    pub precipitation: f64,
    /// m/s
    pub wind_speed: f64,
}

impl WeatherReading {
    #[must_use]
    pub fn event_date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// Weather aggregated to one market-day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyWeather {
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
