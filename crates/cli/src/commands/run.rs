//! Run command: full pipeline plus publish.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use ticket_etl_data::WarehouseWriter;
use ticket_etl_pipeline::{Pipeline, RawInputs};

use super::load_config;

/// Arguments for the run command.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/Pipeline.toml")]
    pub config: PathBuf,

    /// Profile overlay (reads `<config stem>.<profile>.toml` next to the config)
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Output directory, overriding `output.dir`
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Runs the pipeline with concurrent cleaning and publishes every table.
///
/// # Errors
/// Returns an error if configuration or inputs cannot be read, the run
/// aborts, or the outputs cannot be written. Nothing is published on abort.
pub async fn run_pipeline(args: RunArgs) -> Result<()> {
    let mut config = load_config(&args.config, args.profile.as_deref())?;
    if let Some(dir) = args.output {
        config.output.dir = dir;
    }
    let output_config = config.output.clone();

    let inputs = Arc::new(RawInputs::load(&config.inputs)?);
    let pipeline = Arc::new(Pipeline::from_config(config)?);
    let output = pipeline.run_concurrent(inputs).await?;

    let writer = WarehouseWriter::new(&output_config.dir, output_config.format);
    let published = output.publish(&writer)?;

    println!(
        "Published {} files to {} ({} fact rows, {} quarantined, {} over capacity)",
        published.len(),
        output_config.dir.display(),
        output.schema.fact_ticket_sales.len(),
        output.quarantine.total,
        output.summary.over_capacity_rows,
    );
    Ok(())
}
