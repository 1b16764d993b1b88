//! Untyped records as received from the ingestion collaborators.
//!
//! Every contractual field is an `Option<String>`: a missing column or a blank
//! cell is `None`, and typing happens in the cleaners so that a bad value
//! quarantines one row instead of failing the whole read.

use serde::{Deserialize, Serialize};

/// Common behaviour of the raw record types read from CSV batches.
pub trait RawRecord {
    /// Contractual column names, after header normalization.
    const REQUIRED_COLUMNS: &'static [&'static str];

    fn set_origin(&mut self, origin: String);

    /// Marks a row whose bytes could not be decoded; the cleaner quarantines it.
    fn set_defect(&mut self, defect: String);

    fn defect(&self) -> Option<&str>;
}

/// One recorded ticket transaction (or pre-aggregated batch of transactions).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTicketSale {
    #[serde(skip)]
    pub origin: Option<String>,
    /// Decode failure for this row, if any
    #[serde(skip)]
    pub defect: Option<String>,
    pub event_date: Option<String>,
    pub venue_id: Option<String>,
    pub section: Option<String>,
    pub tickets_sold: Option<String>,
    pub revenue: Option<String>,
    /// Optional per-ticket price, used only for the spend integrity warning
    pub ticket_price: Option<String>,
    /// Optional transaction identity for ambiguous-duplicate detection
    pub transaction_id: Option<String>,
}

impl RawTicketSale {
    /// Comma-joined field values for quarantine reports.
    #[must_use]
    pub fn render(&self) -> String {
        render(&[
            &self.event_date,
            &self.venue_id,
            &self.section,
            &self.tickets_sold,
            &self.revenue,
            &self.ticket_price,
            &self.transaction_id,
        ])
    }
}

impl RawRecord for RawTicketSale {
    const REQUIRED_COLUMNS: &'static [&'static str] =
        &["event_date", "venue_id", "section", "tickets_sold", "revenue"];

    fn set_origin(&mut self, origin: String) {
        self.origin = Some(origin);
    }

    fn set_defect(&mut self, defect: String) {
        self.defect = Some(defect);
    }

    fn defect(&self) -> Option<&str> {
        self.defect.as_deref()
    }
}

/// One physical section of a venue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSectionCapacity {
    #[serde(skip)]
    pub origin: Option<String>,
    /// Decode failure for this row, if any
    #[serde(skip)]
    pub defect: Option<String>,
    pub venue_id: Option<String>,
    pub section: Option<String>,
    pub section_capacity: Option<String>,
}

impl RawSectionCapacity {
    #[must_use]
    pub fn render(&self) -> String {
        render(&[&self.venue_id, &self.section, &self.section_capacity])
    }
}

impl RawRecord for RawSectionCapacity {
    const REQUIRED_COLUMNS: &'static [&'static str] = &["venue_id", "section", "section_capacity"];

    fn set_origin(&mut self, origin: String) {
        self.origin = Some(origin);
    }

    fn set_defect(&mut self, defect: String) {
        self.defect = Some(defect);
    }

    fn defect(&self) -> Option<&str> {
        self.defect.as_deref()
    }
}

/// One sub-daily weather reading for a market.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct RawWeatherObservation {
    #[serde(skip)]
    pub origin: Option<String>,
    /// Decode failure for this row, if any
    #[serde(skip)]
    pub defect: Option<String>,
    pub market: Option<String>,
    pub timestamp: Option<String>,
    pub temperature: Option<String>,
    pub relative_humidity: Option<String>,
    pub precipitation: Option<String>,
    pub wind_speed: Option<String>,
}

impl RawWeatherObservation {
    #[must_use]
    pub fn render(&self) -> String {
        render(&[
            &self.market,
            &self.timestamp,
            &self.temperature,
            &self.relative_humidity,
            &self.precipitation,
            &self.wind_speed,
        ])
    }
}

impl RawRecord for RawWeatherObservation {
    const REQUIRED_COLUMNS: &'static [&'static str] = &[
        "market",
        "timestamp",
        "temperature",
        "relative_humidity",
        "precipitation",
        "wind_speed",
    ];

    fn set_origin(&mut self, origin: String) {
        self.origin = Some(origin);
    }

    fn set_defect(&mut self, defect: String) {
        self.defect = Some(defect);
    }

    fn defect(&self) -> Option<&str> {
        self.defect.as_deref()
    }
}

fn render(fields: &[&Option<String>]) -> String {
    fields
        .iter()
        .map(|f| f.as_deref().unwrap_or(""))
        .collect::<Vec<_>>()
        .join(",")
}
