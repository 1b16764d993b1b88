//! Canonical join keys shared by every source.
//!
//! The normalizer is built once from configuration and injected into the
//! cleaners behind an `Arc`; its lookup tables never change during a run.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use ticket_etl_core::{
    MarketConfig, PipelineConfig, PipelineError, SectionConfig, VenueMarketConflict,
};
use tracing::debug;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// A venue and the market it belongs to, from the configured market list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueRef {
    pub venue_id: String,
    pub venue: String,
    /// Market code
    pub market: String,
    pub market_name: String,
    pub country: String,
}

/// The key tuple every downstream join uses.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CanonicalKey {
    pub market: String,
    pub venue_id: String,
    pub section: String,
    pub event_date: NaiveDate,
}

/// Why a key could not be derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyError {
    UnknownVenue,
    UnmappedSection,
    InvalidDate,
}

#[derive(Debug, Clone)]
pub struct KeyNormalizer {
    /// folded market name or code -> market code
    market_codes: BTreeMap<String, String>,
    /// venue_id -> venue
    venues: BTreeMap<String, VenueRef>,
    /// folded section spelling -> canonical label
    sections: BTreeMap<String, String>,
    /// configured market code -> configured market, first venue wins
    markets: BTreeMap<String, MarketConfig>,
}

impl KeyNormalizer {
    /// Builds the lookup tables from configuration.
    ///
    /// # Errors
    /// Returns [`PipelineError::VenueMarketConflict`] if one venue is listed
    /// under two markets, or [`PipelineError::Config`] for empty identifiers,
    /// aliases pointing at unknown market codes, or a section spelling that
    /// resolves to two labels
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        Self::new(&config.markets, &config.market_code_table(), &config.sections)
    }

    /// # Errors
    /// See [`KeyNormalizer::from_config`]
    pub fn new(
        markets: &[MarketConfig],
        market_code_table: &BTreeMap<String, String>,
        sections: &[SectionConfig],
    ) -> Result<Self, PipelineError> {
        let mut configured: BTreeMap<String, MarketConfig> = BTreeMap::new();
        let mut venue_markets: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut venues = BTreeMap::new();

        for market in markets {
            let code = Self::code(&market.code);
            let venue_id = Self::venue_id(&market.venue_id);
            if code.is_empty() || venue_id.is_empty() || market.name.trim().is_empty() {
                return Err(PipelineError::Config(format!(
                    "market entry needs name, code and venue_id: {market:?}"
                )));
            }

            venue_markets
                .entry(venue_id.clone())
                .or_default()
                .insert(code.clone());
            venues.entry(venue_id.clone()).or_insert_with(|| VenueRef {
                venue_id,
                venue: market.venue.trim().to_string(),
                market: code.clone(),
                market_name: market.name.trim().to_string(),
                country: market.country.trim().to_string(),
            });
            configured.entry(code).or_insert_with(|| market.clone());
        }

        let conflicts: Vec<VenueMarketConflict> = venue_markets
            .into_iter()
            .filter(|(_, markets)| markets.len() > 1)
            .map(|(venue_id, markets)| VenueMarketConflict {
                venue_id,
                markets: markets.into_iter().collect(),
            })
            .collect();
        if !conflicts.is_empty() {
            return Err(PipelineError::VenueMarketConflict(conflicts));
        }

        let mut market_codes = BTreeMap::new();
        for (name, code) in market_code_table {
            let code = Self::code(code);
            if !configured.contains_key(&code) {
                return Err(PipelineError::Config(format!(
                    "market alias {name:?} maps to unconfigured code {code:?}"
                )));
            }
            market_codes.insert(fold(name), code);
        }

        let mut section_lookup: BTreeMap<String, String> = BTreeMap::new();
        for section in sections {
            let label = collapse_whitespace(&section.label);
            for spelling in std::iter::once(&section.label).chain(section.aliases.iter()) {
                let folded = fold(spelling);
                if let Some(existing) = section_lookup.get(&folded) {
                    if *existing != label {
                        return Err(PipelineError::Config(format!(
                            "section spelling {spelling:?} resolves to both {existing:?} and {label:?}"
                        )));
                    }
                }
                section_lookup.insert(folded, label.clone());
            }
        }

        debug!(
            markets = configured.len(),
            venues = venues.len(),
            section_spellings = section_lookup.len(),
            "Built key normalizer"
        );

        Ok(Self {
            market_codes,
            venues,
            sections: section_lookup,
            markets: configured,
        })
    }

    /// Market code for a market name or code, if it is in scope.
    #[must_use]
    pub fn market_code(&self, raw: &str) -> Option<String> {
        self.market_codes.get(&fold(raw)).cloned()
    }

    /// Trimmed, uppercased venue identifier.
    #[must_use]
    pub fn venue_id(raw: &str) -> String {
        raw.trim().to_uppercase()
    }

    fn code(raw: &str) -> String {
        raw.trim().to_uppercase()
    }

    #[must_use]
    pub fn venue(&self, venue_id: &str) -> Option<&VenueRef> {
        self.venues.get(venue_id)
    }

    /// Configured venues in venue_id order.
    pub fn venues(&self) -> impl Iterator<Item = &VenueRef> {
        self.venues.values()
    }

    /// Configured markets in code order.
    pub fn markets(&self) -> impl Iterator<Item = (&str, &MarketConfig)> {
        self.markets.iter().map(|(code, m)| (code.as_str(), m))
    }

    /// Canonical label for a section spelling.
    #[must_use]
    pub fn section(&self, raw: &str) -> Option<&str> {
        self.sections.get(&fold(raw)).map(String::as_str)
    }

    /// Calendar date with no time component. Timestamps keep their date part.
    #[must_use]
    pub fn event_date(raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
            .or_else(|| Self::timestamp(raw).map(|ts| ts.date()))
    }

    /// Local wall-clock timestamp. RFC 3339 values keep their local time.
    #[must_use]
    pub fn timestamp(raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();
        TIMESTAMP_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .or_else(|| {
                DateTime::parse_from_rfc3339(raw)
                    .ok()
                    .map(|dt| dt.naive_local())
            })
    }

    /// Derives the full canonical key for a sale-like record.
    ///
    /// # Errors
    /// Returns the first [`KeyError`] encountered, checked in venue, section,
    /// date order
    pub fn canonical_key(
        &self,
        venue_id: &str,
        section: &str,
        event_date: &str,
    ) -> Result<CanonicalKey, KeyError> {
        let venue_id = Self::venue_id(venue_id);
        let venue = self.venue(&venue_id).ok_or(KeyError::UnknownVenue)?;
        let section = self.section(section).ok_or(KeyError::UnmappedSection)?;
        let event_date = Self::event_date(event_date).ok_or(KeyError::InvalidDate)?;

        Ok(CanonicalKey {
            market: venue.market.clone(),
            venue_id,
            section: section.to_string(),
            event_date,
        })
    }
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Case- and whitespace-insensitive lookup form.
fn fold(raw: &str) -> String {
    collapse_whitespace(raw).to_lowercase()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn market(name: &str, code: &str, venue: &str, venue_id: &str) -> MarketConfig {
        MarketConfig {
            name: name.to_string(),
            code: code.to_string(),
            venue: venue.to_string(),
            venue_id: venue_id.to_string(),
            country: "US".to_string(),
        }
    }

    pub(crate) fn section(label: &str, aliases: &[&str]) -> SectionConfig {
        SectionConfig {
            label: label.to_string(),
            aliases: aliases.iter().map(ToString::to_string).collect(),
        }
    }

    fn code_table(markets: &[MarketConfig]) -> BTreeMap<String, String> {
        let mut table = BTreeMap::new();
        for m in markets {
            table.insert(m.name.clone(), m.code.clone());
            table.insert(m.code.clone(), m.code.clone());
        }
        table
    }

    pub(crate) fn normalizer() -> KeyNormalizer {
        let markets = vec![
            market("Boston", "BOS", "Arena One", "V1"),
            market("Toronto", "TOR", "Arena Two", "V2"),
        ];
        let sections = vec![
            section("Upper Bowl", &["UB"]),
            section("Lower Bowl", &[]),
            section("Club", &["club seats"]),
        ];
        KeyNormalizer::new(&markets, &code_table(&markets), &sections).unwrap()
    }

    #[test]
    fn market_names_and_codes_resolve_to_codes() {
        let keys = normalizer();
        assert_eq!(keys.market_code("Boston").as_deref(), Some("BOS"));
        assert_eq!(keys.market_code("  boston ").as_deref(), Some("BOS"));
        assert_eq!(keys.market_code("bos").as_deref(), Some("BOS"));
        assert_eq!(keys.market_code("Seattle"), None);
    }

    #[test]
    fn section_variants_resolve_to_one_label() {
        let keys = normalizer();
        assert_eq!(keys.section("upper bowl"), Some("Upper Bowl"));
        assert_eq!(keys.section("Upper  Bowl "), Some("Upper Bowl"));
        assert_eq!(keys.section("UB"), Some("Upper Bowl"));
        assert_eq!(keys.section("Club Seats"), Some("Club"));
        assert_eq!(keys.section("Mezzanine"), None);
    }

    #[test]
    fn event_date_drops_time_component() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 15);
        assert_eq!(KeyNormalizer::event_date("2025-01-15"), expected);
        assert_eq!(KeyNormalizer::event_date("01/15/2025"), expected);
        assert_eq!(KeyNormalizer::event_date("2025-01-15T19:30"), expected);
        assert_eq!(KeyNormalizer::event_date("2025-01-15 19:30:00"), expected);
        assert_eq!(KeyNormalizer::event_date("2025-01-15T23:30:00-05:00"), expected);
        assert_eq!(KeyNormalizer::event_date("not a date"), None);
    }

    #[test]
    fn canonical_key_derives_market_from_venue() {
        let keys = normalizer();
        let key = keys.canonical_key(" v1 ", "upper bowl", "2025-01-15").unwrap();
        assert_eq!(key.market, "BOS");
        assert_eq!(key.venue_id, "V1");
        assert_eq!(key.section, "Upper Bowl");

        assert_eq!(
            keys.canonical_key("V9", "Club", "2025-01-15"),
            Err(KeyError::UnknownVenue)
        );
        assert_eq!(
            keys.canonical_key("V1", "Mezzanine", "2025-01-15"),
            Err(KeyError::UnmappedSection)
        );
        assert_eq!(
            keys.canonical_key("V1", "Club", "15th Jan"),
            Err(KeyError::InvalidDate)
        );
    }

    #[test]
    fn venue_listed_under_two_markets_is_rejected() {
        let markets = vec![
            market("Boston", "BOS", "Arena One", "V1"),
            market("Toronto", "TOR", "Arena One", "V1"),
        ];
        let err = KeyNormalizer::new(&markets, &code_table(&markets), &[]).unwrap_err();
        match err {
            PipelineError::VenueMarketConflict(conflicts) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].venue_id, "V1");
                assert_eq!(conflicts[0].markets, vec!["BOS", "TOR"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn alias_to_unknown_code_is_a_config_error() {
        let markets = vec![market("Boston", "BOS", "Arena One", "V1")];
        let mut table = code_table(&markets);
        table.insert("Seattle".to_string(), "SEA".to_string());
        assert!(matches!(
            KeyNormalizer::new(&markets, &table, &[]),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn ambiguous_section_spelling_is_a_config_error() {
        let sections = vec![section("Club", &["premium"]), section("Suite", &["Premium"])];
        assert!(matches!(
            KeyNormalizer::new(&[], &BTreeMap::new(), &sections),
            Err(PipelineError::Config(_))
        ));
    }
}
