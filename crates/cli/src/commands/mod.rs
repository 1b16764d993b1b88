//! CLI commands for the ticket sales ETL.

pub mod dim_date;
pub mod run;
pub mod validate;

pub use dim_date::{run_dim_date, DimDateArgs};
pub use run::{run_pipeline, RunArgs};
pub use validate::{run_validate, ValidateArgs};

use anyhow::{Context, Result};
use std::path::Path;
use ticket_etl_core::{ConfigLoader, PipelineConfig};

/// Loads configuration, with the profile overlay when one is given.
pub(crate) fn load_config(path: &Path, profile: Option<&str>) -> Result<PipelineConfig> {
    let config = match profile {
        Some(profile) => ConfigLoader::load_with_profile(path, profile),
        None => ConfigLoader::load(path),
    }
    .with_context(|| format!("Failed to load config from {}", path.display()))?;

    tracing::info!(
        config = %path.display(),
        profile = profile.unwrap_or("-"),
        start = %config.window.start,
        end = %config.window.end,
        markets = config.markets.len(),
        "Loaded pipeline configuration"
    );
    Ok(config)
}
