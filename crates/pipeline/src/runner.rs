//! Pipeline runner: clean, integrate, materialize, aggregate, validate.
//!
//! A run either returns a complete [`PipelineOutput`] or an abort error; there
//! is no partial output. Nothing in a run reads the clock, so identical inputs
//! give identical outputs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use ticket_etl_core::{
    count_by_rule, AnalysisWindow, Cleaned, InputConfig, PipelineConfig, PipelineError,
    QuarantinedRow, Rule, Source,
};
use ticket_etl_data::{
    CsvStorage, DailyWeather, RawSectionCapacity, RawTicketSale, RawWeatherObservation,
    SectionCapacity, StarSchema, TicketSale, WarehouseWriter, WeatherReading,
};
use tracing::{error, info};

use crate::cleaners::{SectionCapacityCleaner, TicketSalesCleaner, WeatherCleaner};
use crate::dimensions::DimensionMaterializer;
use crate::facts::FactAggregator;
use crate::integrate::{CapacityIndex, IntegrationEngine, WeatherIndex};
use crate::keys::KeyNormalizer;
use crate::validation::{check_conservation, check_fact_metrics, check_referential, check_unique_grain};

/// Raw records of all three sources, as read from their batch files.
#[derive(Debug, Clone, Default)]
pub struct RawInputs {
    pub ticket_sales: Vec<RawTicketSale>,
    pub section_capacity: Vec<RawSectionCapacity>,
    pub weather: Vec<RawWeatherObservation>,
}

impl RawInputs {
    /// Reads every configured batch file, in configured order.
    ///
    /// # Errors
    /// Returns error if a file cannot be read or a capacity file lacks its
    /// contractual columns
    pub fn load(inputs: &InputConfig) -> Result<Self> {
        let mut raw = Self::default();
        for path in &inputs.ticket_sales {
            raw.ticket_sales.extend(CsvStorage::read_ticket_sales(path)?);
        }
        for path in &inputs.section_capacity {
            raw.section_capacity
                .extend(CsvStorage::read_section_capacity(path)?);
        }
        for path in &inputs.weather {
            raw.weather.extend(CsvStorage::read_weather(path)?);
        }

        info!(
            ticket_sales = raw.ticket_sales.len(),
            section_capacity = raw.section_capacity.len(),
            weather = raw.weather.len(),
            "Loaded raw inputs"
        );
        Ok(raw)
    }
}

/// Row counts for one source. `read == accepted + quarantined`, except that
/// exact duplicates collapse without being counted as either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    pub source: Source,
    pub read: usize,
    pub accepted: usize,
    pub quarantined: usize,
}

/// Counts describing one successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub window: AnalysisWindow,
    pub sources: Vec<SourceStats>,
    pub quarantined_by_rule: BTreeMap<Rule, usize>,
    pub integrated_rows: usize,
    /// Market-days aggregated from the accepted weather readings
    pub weather_days: usize,
    pub facts_with_weather: usize,
    pub over_capacity_rows: usize,
    pub tables: BTreeMap<String, usize>,
}

/// Every quarantined row of a run, with totals per rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineReport {
    pub total: usize,
    pub by_rule: BTreeMap<Rule, usize>,
    pub rows: Vec<QuarantinedRow>,
}

impl QuarantineReport {
    #[must_use]
    pub fn new(rows: Vec<QuarantinedRow>) -> Self {
        Self {
            total: rows.len(),
            by_rule: count_by_rule(&rows),
            rows,
        }
    }
}

/// The load-ready result of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub schema: StarSchema,
    pub quarantine: QuarantineReport,
    pub summary: RunSummary,
}

impl PipelineOutput {
    /// Writes tables, metadata, quarantine report and summary.
    ///
    /// # Errors
    /// Returns error if any output file cannot be written
    pub fn publish(&self, writer: &WarehouseWriter) -> Result<Vec<PathBuf>> {
        writer
            .publish(&self.schema, &self.quarantine, &self.summary)
            .context("Failed to publish warehouse tables")
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    keys: Arc<KeyNormalizer>,
}

impl Pipeline {
    /// Builds the lookup tables and checks the window.
    ///
    /// # Errors
    /// Returns error for an inverted window or inconsistent market and
    /// section configuration
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        if config.window.start > config.window.end {
            return Err(PipelineError::InvalidWindow {
                start: config.window.start,
                end: config.window.end,
            });
        }
        let keys = Arc::new(KeyNormalizer::from_config(&config)?);
        info!(
            start = %config.window.start,
            end = %config.window.end,
            days = config.window.len_days(),
            markets = config.markets.len(),
            "Pipeline configured"
        );
        Ok(Self { config, keys })
    }

    /// Runs every stage on the calling thread.
    ///
    /// # Errors
    /// Returns the first abort-severity failure; no output is produced
    pub fn run(&self, inputs: &RawInputs) -> Result<PipelineOutput, PipelineError> {
        let sales = self.clean_sales(&inputs.ticket_sales);
        let capacity = self.clean_capacity(&inputs.section_capacity);
        let weather = self.clean_weather(&inputs.weather);
        self.finish(inputs, sales, capacity, weather)
    }

    /// Cleans the three sources as independent blocking tasks, then runs the
    /// remaining stages. Output is identical to [`Pipeline::run`].
    ///
    /// # Errors
    /// Returns [`PipelineError::Task`] if a cleaning task panics, or any
    /// abort-severity failure of the later stages
    pub async fn run_concurrent(
        self: Arc<Self>,
        inputs: Arc<RawInputs>,
    ) -> Result<PipelineOutput, PipelineError> {
        let sales = tokio::task::spawn_blocking({
            let pipeline = Arc::clone(&self);
            let inputs = Arc::clone(&inputs);
            move || pipeline.clean_sales(&inputs.ticket_sales)
        });
        let capacity = tokio::task::spawn_blocking({
            let pipeline = Arc::clone(&self);
            let inputs = Arc::clone(&inputs);
            move || pipeline.clean_capacity(&inputs.section_capacity)
        });
        let weather = tokio::task::spawn_blocking({
            let pipeline = Arc::clone(&self);
            let inputs = Arc::clone(&inputs);
            move || pipeline.clean_weather(&inputs.weather)
        });

        let (sales, capacity, weather) = tokio::try_join!(sales, capacity, weather)
            .map_err(|e| PipelineError::Task(e.to_string()))?;
        self.finish(&inputs, sales, capacity, weather)
    }

    fn clean_sales(&self, raw: &[RawTicketSale]) -> Cleaned<TicketSale> {
        TicketSalesCleaner::new(Arc::clone(&self.keys), self.config.window).clean(raw)
    }

    fn clean_capacity(
        &self,
        raw: &[RawSectionCapacity],
    ) -> Result<Cleaned<SectionCapacity>, PipelineError> {
        SectionCapacityCleaner::new(Arc::clone(&self.keys)).clean(raw)
    }

    fn clean_weather(&self, raw: &[RawWeatherObservation]) -> CleanedWeather {
        let cleaner = WeatherCleaner::new(
            Arc::clone(&self.keys),
            self.config.window,
            self.config.weather,
        );
        let readings = cleaner.clean(raw);
        let days = cleaner.aggregate(&readings.rows);
        CleanedWeather { readings, days }
    }

    fn finish(
        &self,
        inputs: &RawInputs,
        sales: Cleaned<TicketSale>,
        capacity: Result<Cleaned<SectionCapacity>, PipelineError>,
        weather: CleanedWeather,
    ) -> Result<PipelineOutput, PipelineError> {
        let result = self.assemble(inputs, sales, capacity, weather);
        if let Err(e) = &result {
            error!(kind = e.kind(), error = %e, "Pipeline run aborted");
        }
        result
    }

    fn assemble(
        &self,
        inputs: &RawInputs,
        sales: Cleaned<TicketSale>,
        capacity: Result<Cleaned<SectionCapacity>, PipelineError>,
        weather: CleanedWeather,
    ) -> Result<PipelineOutput, PipelineError> {
        let capacity = capacity?;
        let CleanedWeather { readings, days } = weather;
        let window = self.config.window;
        let mut sources = vec![
            stats(Source::TicketSales, inputs.ticket_sales.len(), &sales),
            stats(Source::SectionCapacity, inputs.section_capacity.len(), &capacity),
            stats(Source::Weather, inputs.weather.len(), &readings),
        ];

        let capacity_index = CapacityIndex::build(&capacity.rows)?;
        let weather_index = WeatherIndex::build(&days);
        let integrated = IntegrationEngine::new(Arc::clone(&self.keys)).integrate(
            &sales.rows,
            &capacity_index,
            &weather_index,
        );
        sources.push(stats(Source::Integration, sales.rows.len(), &integrated));

        let dims = DimensionMaterializer::new(Arc::clone(&self.keys)).materialize(
            &window,
            &capacity_index.rows(),
            &days,
            &integrated.rows,
        )?;
        let facts = FactAggregator::aggregate(&integrated.rows)?;

        check_unique_grain(
            "fact_ticket_sales",
            facts.fact_ticket_sales.iter().map(|f| f.key()),
        )?;
        check_unique_grain(
            "fact_sales_with_weather",
            facts
                .fact_sales_with_weather
                .iter()
                .map(|f| format!("{}/{}/{}", f.event_date, f.venue_id, f.section)),
        )?;
        check_fact_metrics("fact_ticket_sales", &facts.fact_ticket_sales)?;
        check_conservation(&integrated.rows, &facts.fact_ticket_sales)?;

        let over_capacity_rows = facts.over_capacity_rows();
        let facts_with_weather = facts
            .fact_sales_with_weather
            .iter()
            .filter(|f| f.hours_observed.is_some())
            .count();
        let integrated_rows = integrated.rows.len();

        let schema = StarSchema {
            dim_market: dims.dim_market,
            dim_venue: dims.dim_venue,
            dim_section: dims.dim_section,
            dim_date: dims.dim_date,
            dim_weather: dims.dim_weather,
            fact_ticket_sales: facts.fact_ticket_sales,
            fact_sales_with_weather: facts.fact_sales_with_weather,
        };
        check_referential(&schema)?;

        let mut quarantined = sales.quarantined;
        quarantined.extend(capacity.quarantined);
        quarantined.extend(readings.quarantined);
        quarantined.extend(integrated.quarantined);
        let quarantine = QuarantineReport::new(quarantined);

        let summary = RunSummary {
            window,
            sources,
            quarantined_by_rule: quarantine.by_rule.clone(),
            integrated_rows,
            weather_days: days.len(),
            facts_with_weather,
            over_capacity_rows,
            tables: schema
                .metadata()
                .into_iter()
                .map(|m| (m.name, m.row_count))
                .collect(),
        };

        info!(
            facts = schema.fact_ticket_sales.len(),
            quarantined = quarantine.total,
            over_capacity = over_capacity_rows,
            "Pipeline run complete"
        );
        Ok(PipelineOutput {
            schema,
            quarantine,
            summary,
        })
    }
}

/// Accepted hourly readings plus the market-days folded from them.
struct CleanedWeather {
    readings: Cleaned<WeatherReading>,
    days: Vec<DailyWeather>,
}

fn stats<T>(source: Source, read: usize, cleaned: &Cleaned<T>) -> SourceStats {
    SourceStats {
        source,
        read,
        accepted: cleaned.rows.len(),
        quarantined: cleaned.quarantined.len(),
    }
}

