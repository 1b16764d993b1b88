//! Cleaning, integration and star schema engine for the ticket sales ETL.
//!
//! Stages run in a fixed order:
//! - [`cleaners`]: per-source typing, key normalization and quarantine
//! - [`integrate`]: sale-preserving join to capacity and daily weather
//! - [`dimensions`]: deduplicated dimensions plus the generated calendar
//! - [`facts`]: aggregation to the fact grain with safe division
//! - [`validation`]: dataset-level checks at each boundary

pub mod cleaners;
pub mod dimensions;
pub mod facts;
pub mod integrate;
pub mod keys;
pub mod runner;
pub mod validation;

pub use cleaners::{aggregate_daily, SectionCapacityCleaner, TicketSalesCleaner, WeatherCleaner};
pub use dimensions::{build_dim_date, market_id, DimensionMaterializer, Dimensions};
pub use facts::{avg_price, safe_div, utilization, FactAggregator, FactTables};
pub use integrate::{CapacityIndex, IntegrationEngine, WeatherIndex};
pub use keys::{CanonicalKey, KeyError, KeyNormalizer, VenueRef};
pub use runner::{Pipeline, PipelineOutput, QuarantineReport, RawInputs, RunSummary, SourceStats};
