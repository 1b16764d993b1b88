use crate::config::PipelineConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

pub const ENV_PREFIX: &str = "TICKET_ETL_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads pipeline configuration by merging a TOML file with environment variables.
    ///
    /// Nested keys are reached with a double underscore, e.g.
    /// `TICKET_ETL_OUTPUT__DIR=/tmp/out`.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<PipelineConfig> {
        let config: PipelineConfig = Self::figment(path.as_ref(), None).extract()?;

        Ok(config)
    }

    /// Loads pipeline configuration with a profile overlay.
    ///
    /// `config/Pipeline.toml` with profile `ci` also reads `config/Pipeline.ci.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_with_profile(path: impl AsRef<Path>, profile: &str) -> Result<PipelineConfig> {
        let config: PipelineConfig = Self::figment(path.as_ref(), Some(profile)).extract()?;

        Ok(config)
    }

    fn figment(path: &Path, profile: Option<&str>) -> Figment {
        let mut figment = Figment::new().merge(Toml::file(path));

        if let Some(profile) = profile {
            figment = figment.merge(Toml::file(profile_path(path, profile)));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}

fn profile_path(path: &Path, profile: &str) -> std::path::PathBuf {
    let stem = path
        .file_stem()
        .map_or_else(|| "Pipeline".to_string(), |s| s.to_string_lossy().into_owned());
    path.with_file_name(format!("{stem}.{profile}.toml"))
}
