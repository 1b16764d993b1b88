//! Validate command: dry run that reports without publishing.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use ticket_etl_pipeline::{Pipeline, RawInputs};

use super::load_config;

/// Arguments for the validate command.
#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/Pipeline.toml")]
    pub config: PathBuf,

    /// Profile overlay
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Also print every quarantined row
    #[arg(long)]
    pub show_quarantine: bool,
}

/// Runs the pipeline and prints the run summary as JSON.
///
/// # Errors
/// Returns an error if configuration or inputs cannot be read or the run
/// aborts on a dataset-level invariant
pub async fn run_validate(args: ValidateArgs) -> Result<()> {
    let config = load_config(&args.config, args.profile.as_deref())?;
    let inputs = Arc::new(RawInputs::load(&config.inputs)?);
    let pipeline = Arc::new(Pipeline::from_config(config)?);

    let output = pipeline.run_concurrent(inputs).await?;

    println!("{}", serde_json::to_string_pretty(&output.summary)?);
    if args.show_quarantine {
        for row in &output.quarantine.rows {
            println!(
                "{}\t{}\t{}\t{}\t{}",
                row.source,
                row.origin.as_deref().unwrap_or("-"),
                row.rule,
                row.key,
                row.value
            );
        }
    }
    Ok(())
}
