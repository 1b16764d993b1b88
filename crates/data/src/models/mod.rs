//! Data models for the ticket sales ETL.
//!
//! Money uses `rust_decimal::Decimal`; weather readings use `f64`.

pub mod cleaned;
pub mod integrated;
pub mod raw;
pub mod star;

pub use cleaned::{DailyWeather, SectionCapacity, TicketSale, WeatherReading};
pub use integrated::IntegratedRecord;
pub use raw::{RawRecord, RawSectionCapacity, RawTicketSale, RawWeatherObservation};
pub use star::{
    DimDate, DimMarket, DimSection, DimVenue, DimWeather, FactSalesWithWeather, FactTicketSales,
};
