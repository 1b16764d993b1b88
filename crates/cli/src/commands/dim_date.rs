//! Dim-date command: writes the calendar dimension on its own.

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use std::path::PathBuf;
use ticket_etl_core::AnalysisWindow;
use ticket_etl_data::{CsvStorage, ParquetStorage};
use ticket_etl_pipeline::build_dim_date;

/// Arguments for the dim-date command.
#[derive(Args, Debug, Clone)]
pub struct DimDateArgs {
    /// First day of the window (YYYY-MM-DD)
    #[arg(long)]
    pub start: NaiveDate,

    /// Last day of the window, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub end: NaiveDate,

    /// Output file; a `.parquet` extension writes Parquet, anything else CSV
    #[arg(short, long, default_value = "dim_date.csv")]
    pub output: PathBuf,
}

/// Writes one DimDate row per day of the window.
///
/// # Errors
/// Returns an error if the window is inverted or the file cannot be written
pub fn run_dim_date(args: &DimDateArgs) -> Result<()> {
    let rows = build_dim_date(&AnalysisWindow::new(args.start, args.end))?;

    if args.output.extension().is_some_and(|ext| ext == "parquet") {
        ParquetStorage::write_table(&args.output, &rows)?;
    } else {
        CsvStorage::write_table(&args.output, &rows)?;
    }

    tracing::info!(
        rows = rows.len(),
        output = %args.output.display(),
        "Wrote dim_date"
    );
    Ok(())
}
