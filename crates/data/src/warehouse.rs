//! The load-ready table set and its metadata hints.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use ticket_etl_core::OutputFormat;
use tracing::{debug, info};

use crate::csv_storage::CsvStorage;
use crate::json_storage::JsonStorage;
use crate::parquet_storage::{ArrowTable, ParquetStorage};
use crate::models::{
    DimDate, DimMarket, DimSection, DimVenue, DimWeather, FactSalesWithWeather, FactTicketSales,
};

pub const DIM_MARKET: &str = "dim_market";
pub const DIM_VENUE: &str = "dim_venue";
pub const DIM_SECTION: &str = "dim_section";
pub const DIM_DATE: &str = "dim_date";
pub const DIM_WEATHER: &str = "dim_weather";
pub const FACT_TICKET_SALES: &str = "fact_ticket_sales";
pub const FACT_SALES_WITH_WEATHER: &str = "fact_sales_with_weather";
pub const TABLE_METADATA_FILE: &str = "table_metadata.json";
pub const QUARANTINE_REPORT_FILE: &str = "quarantine_report.json";
pub const RUN_SUMMARY_FILE: &str = "run_summary.json";

const STAGING_DIR: &str = ".staging";

const TABLES: &[&str] = &[
    DIM_MARKET,
    DIM_VENUE,
    DIM_SECTION,
    DIM_DATE,
    DIM_WEATHER,
    FACT_TICKET_SALES,
    FACT_SALES_WITH_WEATHER,
];

/// Every output table of one successful run, each sorted by its natural key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StarSchema {
    pub dim_market: Vec<DimMarket>,
    pub dim_venue: Vec<DimVenue>,
    pub dim_section: Vec<DimSection>,
    pub dim_date: Vec<DimDate>,
    pub dim_weather: Vec<DimWeather>,
    pub fact_ticket_sales: Vec<FactTicketSales>,
    pub fact_sales_with_weather: Vec<FactSalesWithWeather>,
}

impl StarSchema {
    /// Metadata for every table, in write order.
    #[must_use]
    pub fn metadata(&self) -> Vec<TableMetadata> {
        vec![
            TableMetadata::dimension(DIM_MARKET, &["market_id"], self.dim_market.len()),
            TableMetadata::dimension(DIM_VENUE, &["venue_id"], self.dim_venue.len()),
            TableMetadata::dimension(
                DIM_SECTION,
                &["venue_id", "section"],
                self.dim_section.len(),
            ),
            TableMetadata::dimension(DIM_DATE, &["date_key"], self.dim_date.len()),
            TableMetadata::dimension(
                DIM_WEATHER,
                &["market", "event_date"],
                self.dim_weather.len(),
            ),
            TableMetadata::fact(
                FACT_TICKET_SALES,
                &["event_date", "venue_id", "section"],
                self.fact_ticket_sales.len(),
            ),
            TableMetadata::fact(
                FACT_SALES_WITH_WEATHER,
                &["event_date", "venue_id", "section"],
                self.fact_sales_with_weather.len(),
            ),
        ]
    }
}

/// Natural key plus partition/cluster hints for the load collaborator.
/// Hints are advisory; nothing here enforces them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    pub natural_key: Vec<String>,
    pub partition_key: Option<String>,
    pub cluster_keys: Vec<String>,
    pub row_count: usize,
}

impl TableMetadata {
    fn dimension(name: &str, natural_key: &[&str], row_count: usize) -> Self {
        Self {
            name: name.to_string(),
            natural_key: natural_key.iter().map(ToString::to_string).collect(),
            partition_key: None,
            cluster_keys: Vec::new(),
            row_count,
        }
    }

    fn fact(name: &str, natural_key: &[&str], row_count: usize) -> Self {
        Self {
            partition_key: Some("event_date".to_string()),
            cluster_keys: vec!["venue_id".to_string(), "section".to_string()],
            ..Self::dimension(name, natural_key, row_count)
        }
    }
}

/// Publishes a finished run into an output directory.
///
/// Everything is first written into a staging directory and only moved into
/// place once every file was written, so a failed write never leaves a mixed
/// set of old and new tables behind. Existing files of the same name are
/// overwritten and tables left by a run in another format are removed: each
/// run replaces the previous one wholesale.
pub struct WarehouseWriter {
    dir: PathBuf,
    format: OutputFormat,
}

impl WarehouseWriter {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    /// Writes all tables, table metadata, the quarantine report and the run
    /// summary. Returns the published paths.
    ///
    /// # Errors
    /// Returns error if any file cannot be written or moved into place
    pub fn publish<Q, S>(
        &self,
        schema: &StarSchema,
        quarantine_report: &Q,
        run_summary: &S,
    ) -> Result<Vec<PathBuf>>
    where
        Q: Serialize + ?Sized,
        S: Serialize + ?Sized,
    {
        let staging = self.dir.join(STAGING_DIR);
        if staging.exists() {
            fs::remove_dir_all(&staging).with_context(|| {
                format!("Failed to clear staging directory: {}", staging.display())
            })?;
        }
        fs::create_dir_all(&staging)
            .with_context(|| format!("Failed to create staging directory: {}", staging.display()))?;

        let mut staged = vec![
            self.stage_table(&staging, DIM_MARKET, &schema.dim_market)?,
            self.stage_table(&staging, DIM_VENUE, &schema.dim_venue)?,
            self.stage_table(&staging, DIM_SECTION, &schema.dim_section)?,
            self.stage_table(&staging, DIM_DATE, &schema.dim_date)?,
            self.stage_table(&staging, DIM_WEATHER, &schema.dim_weather)?,
            self.stage_table(&staging, FACT_TICKET_SALES, &schema.fact_ticket_sales)?,
            self.stage_table(
                &staging,
                FACT_SALES_WITH_WEATHER,
                &schema.fact_sales_with_weather,
            )?,
        ];

        for (file, value) in [
            (TABLE_METADATA_FILE, serde_json::to_value(schema.metadata())?),
            (QUARANTINE_REPORT_FILE, serde_json::to_value(quarantine_report)?),
            (RUN_SUMMARY_FILE, serde_json::to_value(run_summary)?),
        ] {
            let path = staging.join(file);
            JsonStorage::write(&path, &value)?;
            staged.push(path);
        }

        self.remove_other_formats()?;

        let mut published = Vec::with_capacity(staged.len());
        for path in staged {
            let Some(name) = path.file_name() else {
                continue;
            };
            let target = self.dir.join(name);
            fs::rename(&path, &target).with_context(|| {
                format!("Failed to publish {} to {}", path.display(), target.display())
            })?;
            published.push(target);
        }
        fs::remove_dir_all(&staging)?;

        info!(
            dir = %self.dir.display(),
            format = %self.format,
            files = published.len(),
            "Published warehouse tables"
        );
        Ok(published)
    }

    fn remove_other_formats(&self) -> Result<()> {
        for format in [OutputFormat::Csv, OutputFormat::Parquet] {
            if format == self.format {
                continue;
            }
            for table in TABLES {
                let stale = self.dir.join(format!("{table}.{format}"));
                if stale.exists() {
                    fs::remove_file(&stale).with_context(|| {
                        format!("Failed to remove stale table: {}", stale.display())
                    })?;
                    debug!(path = %stale.display(), "Removed table from previous format");
                }
            }
        }
        Ok(())
    }

    fn stage_table<T: Serialize + ArrowTable>(
        &self,
        staging: &Path,
        name: &str,
        rows: &[T],
    ) -> Result<PathBuf> {
        let path = staging.join(format!("{name}.{}", self.format));
        match self.format {
            OutputFormat::Csv => CsvStorage::write_table(&path, rows)?,
            OutputFormat::Parquet => ParquetStorage::write_table(&path, rows)?,
        }
        Ok(path)
    }
}
