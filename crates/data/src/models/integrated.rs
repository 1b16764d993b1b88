use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::cleaned::DailyWeather;

/// One cleaned sale joined to its capacity (required) and its market-day
/// weather (optional).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegratedRecord {
    pub event_date: NaiveDate,
    /// Market code derived from the venue, never read from the sale
    pub market: String,
    pub venue_id: String,
    pub venue: String,
    pub section: String,
    pub tickets_sold: i64,
    pub revenue: Decimal,
    pub section_capacity: i64,
    pub weather: Option<DailyWeather>,
}

impl IntegratedRecord {
    /// Fact grain key.
    #[must_use]
    pub fn grain(&self) -> (NaiveDate, String, String) {
        (self.event_date, self.venue_id.clone(), self.section.clone())
    }
}
