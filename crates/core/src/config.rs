use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub window: AnalysisWindow,
    pub markets: Vec<MarketConfig>,
    #[serde(default)]
    pub market_aliases: BTreeMap<String, String>,
    pub sections: Vec<SectionConfig>,
    #[serde(default)]
    pub weather: WeatherThresholds,
    #[serde(default)]
    pub inputs: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Inclusive analysis window. Both endpoints are part of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl AnalysisWindow {
    #[must_use]
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Number of calendar days in the window, 0 when `start > end`.
    #[must_use]
    pub fn len_days(&self) -> usize {
        let days = (self.end - self.start).num_days() + 1;
        usize::try_from(days).unwrap_or(0)
    }
}

/// One in-scope market and the venue it plays in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Human-readable market name (e.g. "Boston")
    pub name: String,
    /// Short market code (e.g. "BOS")
    pub code: String,
    pub venue: String,
    pub venue_id: String,
    #[serde(default)]
    pub country: String,
}

/// Canonical section label plus the spellings that resolve to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionConfig {
    pub label: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Hourly thresholds used to count windy, rainy and freezing hours.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeatherThresholds {
    /// Wind speed in m/s at or above which an hour is windy
    #[serde(default = "default_windy_wind_speed")]
    pub windy_wind_speed: f64,
    /// Precipitation in mm above which an hour is rainy
    #[serde(default)]
    pub rainy_precipitation: f64,
    /// Temperature in °C at or below which an hour is freezing
    #[serde(default)]
    pub freezing_temperature: f64,
}

fn default_windy_wind_speed() -> f64 {
    8.0
}

impl Default for WeatherThresholds {
    fn default() -> Self {
        Self {
            windy_wind_speed: default_windy_wind_speed(),
            rainy_precipitation: 0.0,
            freezing_temperature: 0.0,
        }
    }
}

/// Raw input files. Each source may be split across several batch files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default)]
    pub ticket_sales: Vec<PathBuf>,
    #[serde(default)]
    pub section_capacity: Vec<PathBuf>,
    #[serde(default)]
    pub weather: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Parquet,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Parquet => write!(f, "parquet"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub dir: PathBuf,
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/warehouse"),
            format: OutputFormat::Csv,
        }
    }
}

impl PipelineConfig {
    /// Market-name-to-code table: every configured market's name and code,
    /// plus the explicit aliases. Keys are as written; callers normalize.
    #[must_use]
    pub fn market_code_table(&self) -> BTreeMap<String, String> {
        let mut table = BTreeMap::new();
        for market in &self.markets {
            table.insert(market.name.clone(), market.code.clone());
            table.insert(market.code.clone(), market.code.clone());
        }
        for (alias, code) in &self.market_aliases {
            table.insert(alias.clone(), code.clone());
        }
        table
    }
}
