pub mod config;
pub mod config_loader;
pub mod error;
pub mod quarantine;

pub use config::{
    AnalysisWindow, InputConfig, MarketConfig, OutputConfig, OutputFormat, PipelineConfig,
    SectionConfig, WeatherThresholds,
};
pub use config_loader::ConfigLoader;
pub use error::{CapacityConflict, PipelineError, VenueMarketConflict};
pub use quarantine::{count_by_rule, Cleaned, QuarantinedRow, Rule, Source};
