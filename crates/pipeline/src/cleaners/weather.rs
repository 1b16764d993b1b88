//! Weather cleaner and daily aggregation.
//!
//! Readings are typed, checked against physical ranges and keyed on
//! (market code, local timestamp). Two readings with the same key but
//! different values are both dropped as ambiguous. Surviving readings are
//! then folded into one [`DailyWeather`] per market-day.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use ticket_etl_core::{AnalysisWindow, Cleaned, Rule, Source, WeatherThresholds};
use ticket_etl_data::{DailyWeather, RawWeatherObservation, WeatherReading};
use tracing::{debug, info};

use super::{decoded, key_part, parse_measure, required, Reject};
use crate::keys::KeyNormalizer;

const HUMIDITY_RANGE: (f64, f64) = (0.0, 100.0);
const TEMPERATURE_RANGE: (f64, f64) = (-90.0, 60.0);

pub struct WeatherCleaner {
    keys: Arc<KeyNormalizer>,
    window: AnalysisWindow,
    thresholds: WeatherThresholds,
}

impl WeatherCleaner {
    #[must_use]
    pub fn new(
        keys: Arc<KeyNormalizer>,
        window: AnalysisWindow,
        thresholds: WeatherThresholds,
    ) -> Self {
        Self {
            keys,
            window,
            thresholds,
        }
    }

    /// Cleans sub-daily readings. Output is sorted by (market, timestamp).
    #[must_use]
    pub fn clean(&self, raw: &[RawWeatherObservation]) -> Cleaned<WeatherReading> {
        let mut out = Cleaned::new();
        let mut typed: Vec<(WeatherReading, &RawWeatherObservation)> = Vec::new();
        let mut seen = HashSet::new();

        for row in raw {
            match self.type_row(row) {
                Ok(reading) => {
                    if seen.insert(identity(&reading)) {
                        typed.push((reading, row));
                    }
                }
                Err(reject) => out.quarantine(reject.into_row(
                    Source::Weather,
                    row.origin.as_deref(),
                    format!("{}/{}", key_part(&row.market), key_part(&row.timestamp)),
                    row.render(),
                )),
            }
        }

        let mut per_key: HashMap<(String, chrono::NaiveDateTime), usize> = HashMap::new();
        for (reading, _) in &typed {
            *per_key
                .entry((reading.market.clone(), reading.timestamp))
                .or_insert(0) += 1;
        }

        for (reading, row) in typed {
            let count = per_key
                .get(&(reading.market.clone(), reading.timestamp))
                .copied()
                .unwrap_or(0);
            if count > 1 {
                out.quarantine(
                    Reject::new(Rule::AmbiguousDuplicate, "timestamp", reading.timestamp)
                        .into_row(
                            Source::Weather,
                            row.origin.as_deref(),
                            format!("{}/{}", reading.market, reading.timestamp),
                            row.render(),
                        ),
                );
            } else {
                out.accept(reading);
            }
        }
        out.rows.sort_by(|a, b| {
            (a.market.as_str(), a.timestamp).cmp(&(b.market.as_str(), b.timestamp))
        });

        info!(
            read = raw.len(),
            accepted = out.rows.len(),
            quarantined = out.quarantined.len(),
            "Cleaned weather readings"
        );
        out
    }

    /// Folds cleaned readings into market-days with this cleaner's thresholds.
    #[must_use]
    pub fn aggregate(&self, readings: &[WeatherReading]) -> Vec<DailyWeather> {
        aggregate_daily(readings, &self.thresholds)
    }

    fn type_row(&self, row: &RawWeatherObservation) -> Result<WeatherReading, Reject> {
        decoded(row.defect.as_deref())?;
        let market_raw = required("market", &row.market)?;
        let timestamp_raw = required("timestamp", &row.timestamp)?;
        let temperature = parse_measure("temperature", required("temperature", &row.temperature)?)?;
        let relative_humidity = parse_measure(
            "relative_humidity",
            required("relative_humidity", &row.relative_humidity)?,
        )?;
        let precipitation =
            parse_measure("precipitation", required("precipitation", &row.precipitation)?)?;
        let wind_speed = parse_measure("wind_speed", required("wind_speed", &row.wind_speed)?)?;

        let market = self
            .keys
            .market_code(market_raw)
            .ok_or_else(|| Reject::new(Rule::UnknownMarket, "market", market_raw))?;
        let timestamp = KeyNormalizer::timestamp(timestamp_raw)
            .ok_or_else(|| Reject::new(Rule::InvalidDate, "timestamp", timestamp_raw))?;

        if !in_range(temperature, TEMPERATURE_RANGE) {
            return Err(Reject::new(Rule::OutOfRange, "temperature", temperature));
        }
        if !in_range(relative_humidity, HUMIDITY_RANGE) {
            return Err(Reject::new(
                Rule::OutOfRange,
                "relative_humidity",
                relative_humidity,
            ));
        }
        if precipitation < 0.0 {
            return Err(Reject::new(Rule::OutOfRange, "precipitation", precipitation));
        }
        if wind_speed < 0.0 {
            return Err(Reject::new(Rule::OutOfRange, "wind_speed", wind_speed));
        }
        if !self.window.contains(timestamp.date()) {
            return Err(Reject::new(Rule::OutsideWindow, "timestamp", timestamp));
        }

        Ok(WeatherReading {
            market,
            timestamp,
            temperature,
            relative_humidity,
            precipitation,
            wind_speed,
        })
    }
}

/// Folds readings into one row per (market, date), ordered by market then
/// date. A market-day without readings has no row.
#[must_use]
pub fn aggregate_daily(
    readings: &[WeatherReading],
    thresholds: &WeatherThresholds,
) -> Vec<DailyWeather> {
    let mut groups: BTreeMap<(&str, chrono::NaiveDate), Vec<&WeatherReading>> = BTreeMap::new();
    for reading in readings {
        groups
            .entry((reading.market.as_str(), reading.event_date()))
            .or_default()
            .push(reading);
    }

    let days: Vec<DailyWeather> = groups
        .into_iter()
        .filter_map(|((market, event_date), mut group)| {
            group.sort_by_key(|r| r.timestamp);
            summarize(market, event_date, &group, thresholds)
        })
        .collect();

    debug!(
        readings = readings.len(),
        market_days = days.len(),
        "Aggregated daily weather"
    );
    days
}

fn summarize(
    market: &str,
    event_date: chrono::NaiveDate,
    readings: &[&WeatherReading],
    thresholds: &WeatherThresholds,
) -> Option<DailyWeather> {
    let first = readings.first()?;
    let n = readings.len() as f64;

    let mut min_temp = first.temperature;
    let mut max_temp = first.temperature;
    let (mut temp, mut rh, mut wind, mut precip) = (0.0, 0.0, 0.0, 0.0);
    for r in readings {
        min_temp = min_temp.min(r.temperature);
        max_temp = max_temp.max(r.temperature);
        temp += r.temperature;
        rh += r.relative_humidity;
        wind += r.wind_speed;
        precip += r.precipitation;
    }

    Some(DailyWeather {
        market: market.to_string(),
        event_date,
        avg_temp_c: round2(temp / n),
        min_temp_c: round2(min_temp),
        max_temp_c: round2(max_temp),
        avg_rh_pct: round2(rh / n),
        avg_wind_mps: round2(wind / n),
        total_precip_mm: round2(precip),
        windy_hours: hours_where(readings, |r| r.wind_speed >= thresholds.windy_wind_speed),
        rainy_hours: hours_where(readings, |r| {
            r.precipitation > thresholds.rainy_precipitation
        }),
        freezing_hours: hours_where(readings, |r| {
            r.temperature <= thresholds.freezing_temperature
        }),
        hours_observed: u32::try_from(readings.len()).unwrap_or(u32::MAX),
    })
}

fn hours_where(readings: &[&WeatherReading], pred: impl Fn(&WeatherReading) -> bool) -> u32 {
    let hits = readings.iter().filter(|r| pred(r)).count();
    u32::try_from(hits).unwrap_or(u32::MAX)
}

/// Two decimals, with negative zero folded to zero so output text is stable.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0 + 0.0
}

fn in_range(value: f64, (lo, hi): (f64, f64)) -> bool {
    value >= lo && value <= hi
}

fn identity(r: &WeatherReading) -> (String, chrono::NaiveDateTime, [u64; 4]) {
    (
        r.market.clone(),
        r.timestamp,
        [
            r.temperature.to_bits(),
            r.relative_humidity.to_bits(),
            r.precipitation.to_bits(),
            r.wind_speed.to_bits(),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::tests::normalizer;
    use chrono::NaiveDate;

    fn cleaner() -> WeatherCleaner {
        WeatherCleaner::new(
            Arc::new(normalizer()),
            AnalysisWindow::new(
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(),
            ),
            WeatherThresholds::default(),
        )
    }

    fn raw(market: &str, ts: &str, temp: &str, rh: &str, precip: &str, wind: &str) -> RawWeatherObservation {
        RawWeatherObservation {
            origin: Some("weather.csv:2".to_string()),
            defect: None,
            market: Some(market.to_string()),
            timestamp: Some(ts.to_string()),
            temperature: Some(temp.to_string()),
            relative_humidity: Some(rh.to_string()),
            precipitation: Some(precip.to_string()),
            wind_speed: Some(wind.to_string()),
        }
    }

    #[test]
    fn market_names_resolve_to_codes() {
        let out = cleaner().clean(&[raw("boston", "2025-01-15T10:00", "-1", "80", "0", "3")]);
        assert_eq!(out.rows[0].market, "BOS");
        assert!(out.quarantined.is_empty());
    }

    #[test]
    fn out_of_scope_and_invalid_readings_are_quarantined() {
        let out = cleaner().clean(&[
            raw("Seattle", "2025-01-15T10:00", "5", "80", "0", "3"),
            raw("BOS", "yesterday", "5", "80", "0", "3"),
            raw("BOS", "2025-01-15T10:00", "warm", "80", "0", "3"),
            raw("BOS", "2025-01-15T11:00", "5", "140", "0", "3"),
            raw("BOS", "2025-01-15T12:00", "5", "80", "-0.2", "3"),
            raw("BOS", "2025-03-15T10:00", "5", "80", "0", "3"),
        ]);
        let rules: Vec<Rule> = out.quarantined.iter().map(|q| q.rule).collect();
        assert_eq!(
            rules,
            vec![
                Rule::UnknownMarket,
                Rule::InvalidDate,
                Rule::InvalidNumber,
                Rule::OutOfRange,
                Rule::OutOfRange,
                Rule::OutsideWindow,
            ]
        );
        assert!(out.rows.is_empty());
    }

    #[test]
    fn undecodable_reading_is_quarantined() {
        let mut bad = raw("BOS", "2025-01-15T10:00", "1", "80", "0", "3");
        bad.defect = Some("invalid utf-8 in field 1".to_string());

        let out = cleaner().clean(&[bad]);
        assert!(out.rows.is_empty());
        assert_eq!(out.quarantined[0].rule, Rule::InvalidEncoding);
        assert_eq!(out.quarantined[0].source, Source::Weather);
    }

    #[test]
    fn conflicting_readings_for_one_hour_are_ambiguous() {
        let out = cleaner().clean(&[
            raw("BOS", "2025-01-15T10:00", "1", "80", "0", "3"),
            raw("BOS", "2025-01-15T10:00", "1", "80", "0", "3"),
            raw("BOS", "2025-01-15T11:00", "1", "80", "0", "3"),
            raw("BOS", "2025-01-15T11:00", "2", "80", "0", "3"),
        ]);
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.quarantined.len(), 2);
        assert!(out
            .quarantined
            .iter()
            .all(|q| q.rule == Rule::AmbiguousDuplicate));
    }

    #[test]
    fn daily_aggregation_means_sums_and_counts() {
        let cleaner = cleaner();
        let readings = cleaner.clean(&[
            raw("BOS", "2025-01-15T00:00", "-2", "70", "0", "9"),
            raw("BOS", "2025-01-15T01:00", "0", "80", "0.4", "8"),
            raw("BOS", "2025-01-15T02:00", "3", "90", "0.3", "2"),
            raw("TOR", "2025-01-16T00:00", "1", "50", "0", "1"),
        ]);
        let days = cleaner.aggregate(&readings.rows);

        assert_eq!(days.len(), 2);
        let bos = &days[0];
        assert_eq!(bos.market, "BOS");
        assert!((bos.avg_temp_c - 0.33).abs() < 1e-9);
        assert!((bos.min_temp_c + 2.0).abs() < 1e-9);
        assert!((bos.max_temp_c - 3.0).abs() < 1e-9);
        assert!((bos.avg_rh_pct - 80.0).abs() < 1e-9);
        assert!((bos.avg_wind_mps - 6.33).abs() < 1e-9);
        assert!((bos.total_precip_mm - 0.7).abs() < 1e-9);
        assert_eq!(bos.windy_hours, 2);
        assert_eq!(bos.rainy_hours, 2);
        assert_eq!(bos.freezing_hours, 2);
        assert_eq!(bos.hours_observed, 3);
        assert_eq!(days[1].market, "TOR");
    }

    #[test]
    fn days_without_readings_have_no_row() {
        let days = aggregate_daily(&[], &WeatherThresholds::default());
        assert!(days.is_empty());
    }

    #[test]
    fn negative_zero_is_normalized() {
        assert_eq!(round2(-0.001).to_string(), "0");
        assert!((round2(2.345_6) - 2.35).abs() < 1e-9);
    }
}
