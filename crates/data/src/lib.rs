//! Data models and storage for the ticket sales ETL.
//!
//! This crate provides:
//! - Raw, cleaned, integrated and star schema record models
//! - CSV readers for the three raw sources
//! - CSV, Parquet and JSON writers for the published tables

pub mod csv_storage;
pub mod json_storage;
pub mod models;
pub mod parquet_storage;
pub mod warehouse;

// Re-export commonly used types
pub use csv_storage::{normalize_header, CsvStorage};
pub use json_storage::JsonStorage;
pub use parquet_storage::{ArrowTable, ParquetStorage};
pub use warehouse::{StarSchema, TableMetadata, WarehouseWriter};

// Re-export models
pub use models::{
    DailyWeather, DimDate, DimMarket, DimSection, DimVenue, DimWeather, FactSalesWithWeather,
    FactTicketSales, IntegratedRecord, RawRecord, RawSectionCapacity, RawTicketSale,
    RawWeatherObservation, SectionCapacity, TicketSale, WeatherReading,
};
