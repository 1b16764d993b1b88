use anyhow::{Context, Result};
use arrow::array::{
    ArrayRef, BooleanArray, Date32Array, Decimal128Array, Float64Array, Int32Array, Int64Array,
    StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use rust_decimal::Decimal;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::models::{
    DimDate, DimMarket, DimSection, DimVenue, DimWeather, FactSalesWithWeather, FactTicketSales,
};

/// Days from 0001-01-01 to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

const MONEY_PRECISION: u8 = 18;
const MONEY_SCALE: i8 = 2;
const RATIO_SCALE: i8 = 4;

/// A row type that can be laid out as an Arrow record batch.
pub trait ArrowTable: Sized {
    fn schema() -> Schema;

    /// # Errors
    /// Returns an error if a column cannot be built
    fn columns(rows: &[Self]) -> Result<Vec<ArrayRef>>;
}

pub struct ParquetStorage;

impl ParquetStorage {
    /// Writes rows to a Snappy-compressed Parquet file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or if writing to the Parquet file fails.
    pub fn write_table<T: ArrowTable>(path: &Path, rows: &[T]) -> Result<()> {
        let schema = Arc::new(T::schema());
        let batch = RecordBatch::try_new(schema.clone(), T::columns(rows)?)?;

        let file = File::create(path)
            .with_context(|| format!("Failed to create Parquet file: {}", path.display()))?;
        let props = WriterProperties::builder()
            .set_compression(parquet::basic::Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;

        writer.write(&batch)?;
        writer.close()?;

        debug!(path = %path.display(), rows = rows.len(), "Wrote Parquet table");
        Ok(())
    }
}

fn date32(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

fn scaled(value: Decimal, scale: i8) -> i128 {
    let mut value = value;
    value.rescale(u32::try_from(scale).unwrap_or(0));
    value.mantissa()
}

fn decimal_column(values: Vec<Option<i128>>, scale: i8) -> Result<ArrayRef> {
    let array = Decimal128Array::from(values).with_precision_and_scale(MONEY_PRECISION, scale)?;
    Ok(Arc::new(array))
}

fn utf8<T>(rows: &[T], f: impl Fn(&T) -> &str) -> ArrayRef {
    Arc::new(StringArray::from(rows.iter().map(f).collect::<Vec<_>>()))
}

fn dates<T>(rows: &[T], f: impl Fn(&T) -> NaiveDate) -> ArrayRef {
    Arc::new(Date32Array::from(
        rows.iter().map(|r| date32(f(r))).collect::<Vec<_>>(),
    ))
}

fn int64<T>(rows: &[T], f: impl Fn(&T) -> i64) -> ArrayRef {
    Arc::new(Int64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
}

fn uint32<T>(rows: &[T], f: impl Fn(&T) -> Option<u32>) -> ArrayRef {
    Arc::new(UInt32Array::from(rows.iter().map(f).collect::<Vec<_>>()))
}

fn float64<T>(rows: &[T], f: impl Fn(&T) -> Option<f64>) -> ArrayRef {
    Arc::new(Float64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
}

impl ArrowTable for DimMarket {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("market_id", DataType::Utf8, false),
            Field::new("market_name", DataType::Utf8, false),
            Field::new("market", DataType::Utf8, false),
            Field::new("country", DataType::Utf8, false),
            Field::new("venue", DataType::Utf8, false),
            Field::new("venue_id", DataType::Utf8, false),
        ])
    }

    fn columns(rows: &[Self]) -> Result<Vec<ArrayRef>> {
        Ok(vec![
            utf8(rows, |r| &r.market_id),
            utf8(rows, |r| &r.market_name),
            utf8(rows, |r| &r.market),
            utf8(rows, |r| &r.country),
            utf8(rows, |r| &r.venue),
            utf8(rows, |r| &r.venue_id),
        ])
    }
}

impl ArrowTable for DimVenue {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("venue_id", DataType::Utf8, false),
            Field::new("venue", DataType::Utf8, false),
            Field::new("market", DataType::Utf8, false),
        ])
    }

    fn columns(rows: &[Self]) -> Result<Vec<ArrayRef>> {
        Ok(vec![
            utf8(rows, |r| &r.venue_id),
            utf8(rows, |r| &r.venue),
            utf8(rows, |r| &r.market),
        ])
    }
}

impl ArrowTable for DimSection {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("venue_id", DataType::Utf8, false),
            Field::new("section", DataType::Utf8, false),
            Field::new("section_capacity", DataType::Int64, false),
        ])
    }

    fn columns(rows: &[Self]) -> Result<Vec<ArrayRef>> {
        Ok(vec![
            utf8(rows, |r| &r.venue_id),
            utf8(rows, |r| &r.section),
            int64(rows, |r| r.section_capacity),
        ])
    }
}

impl ArrowTable for DimDate {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("date_key", DataType::Int32, false),
            Field::new("date", DataType::Date32, false),
            Field::new("year", DataType::Int32, false),
            Field::new("quarter", DataType::UInt32, false),
            Field::new("month", DataType::UInt32, false),
            Field::new("month_name", DataType::Utf8, false),
            Field::new("day", DataType::UInt32, false),
            Field::new("day_of_week", DataType::UInt32, false),
            Field::new("day_name", DataType::Utf8, false),
            Field::new("week_of_year", DataType::UInt32, false),
            Field::new("is_weekend", DataType::Boolean, false),
        ])
    }

    fn columns(rows: &[Self]) -> Result<Vec<ArrayRef>> {
        Ok(vec![
            Arc::new(Int32Array::from(
                rows.iter().map(|r| r.date_key).collect::<Vec<_>>(),
            )),
            dates(rows, |r| r.date),
            Arc::new(Int32Array::from(
                rows.iter().map(|r| r.year).collect::<Vec<_>>(),
            )),
            uint32(rows, |r| Some(r.quarter)),
            uint32(rows, |r| Some(r.month)),
            utf8(rows, |r| &r.month_name),
            uint32(rows, |r| Some(r.day)),
            uint32(rows, |r| Some(r.day_of_week)),
            utf8(rows, |r| &r.day_name),
            uint32(rows, |r| Some(r.week_of_year)),
            Arc::new(BooleanArray::from(
                rows.iter().map(|r| r.is_weekend).collect::<Vec<_>>(),
            )),
        ])
    }
}

impl ArrowTable for DimWeather {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("weather_id", DataType::Utf8, false),
            Field::new("market", DataType::Utf8, false),
            Field::new("event_date", DataType::Date32, false),
            Field::new("avg_temp_c", DataType::Float64, false),
            Field::new("min_temp_c", DataType::Float64, false),
            Field::new("max_temp_c", DataType::Float64, false),
            Field::new("avg_rh_pct", DataType::Float64, false),
            Field::new("avg_wind_mps", DataType::Float64, false),
            Field::new("total_precip_mm", DataType::Float64, false),
            Field::new("windy_hours", DataType::UInt32, false),
            Field::new("rainy_hours", DataType::UInt32, false),
            Field::new("freezing_hours", DataType::UInt32, false),
            Field::new("hours_observed", DataType::UInt32, false),
        ])
    }

    fn columns(rows: &[Self]) -> Result<Vec<ArrayRef>> {
        Ok(vec![
            utf8(rows, |r| &r.weather_id),
            utf8(rows, |r| &r.market),
            dates(rows, |r| r.event_date),
            float64(rows, |r| Some(r.avg_temp_c)),
            float64(rows, |r| Some(r.min_temp_c)),
            float64(rows, |r| Some(r.max_temp_c)),
            float64(rows, |r| Some(r.avg_rh_pct)),
            float64(rows, |r| Some(r.avg_wind_mps)),
            float64(rows, |r| Some(r.total_precip_mm)),
            uint32(rows, |r| Some(r.windy_hours)),
            uint32(rows, |r| Some(r.rainy_hours)),
            uint32(rows, |r| Some(r.freezing_hours)),
            uint32(rows, |r| Some(r.hours_observed)),
        ])
    }
}

impl ArrowTable for FactTicketSales {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("event_date", DataType::Date32, false),
            Field::new("venue_id", DataType::Utf8, false),
            Field::new("section", DataType::Utf8, false),
            Field::new("tickets_sold", DataType::Int64, false),
            Field::new(
                "revenue",
                DataType::Decimal128(MONEY_PRECISION, MONEY_SCALE),
                false,
            ),
            Field::new(
                "avg_price",
                DataType::Decimal128(MONEY_PRECISION, MONEY_SCALE),
                true,
            ),
            Field::new("section_capacity", DataType::Int64, false),
            Field::new(
                "utilization",
                DataType::Decimal128(MONEY_PRECISION, RATIO_SCALE),
                true,
            ),
        ])
    }

    fn columns(rows: &[Self]) -> Result<Vec<ArrayRef>> {
        Ok(vec![
            dates(rows, |r| r.event_date),
            utf8(rows, |r| &r.venue_id),
            utf8(rows, |r| &r.section),
            int64(rows, |r| r.tickets_sold),
            decimal_column(
                rows.iter().map(|r| Some(scaled(r.revenue, MONEY_SCALE))).collect(),
                MONEY_SCALE,
            )?,
            decimal_column(
                rows.iter()
                    .map(|r| r.avg_price.map(|p| scaled(p, MONEY_SCALE)))
                    .collect(),
                MONEY_SCALE,
            )?,
            int64(rows, |r| r.section_capacity),
            decimal_column(
                rows.iter()
                    .map(|r| r.utilization.map(|u| scaled(u, RATIO_SCALE)))
                    .collect(),
                RATIO_SCALE,
            )?,
        ])
    }
}

impl ArrowTable for FactSalesWithWeather {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("event_date", DataType::Date32, false),
            Field::new("market", DataType::Utf8, false),
            Field::new("venue_id", DataType::Utf8, false),
            Field::new("venue", DataType::Utf8, false),
            Field::new("section", DataType::Utf8, false),
            Field::new("tickets_sold", DataType::Int64, false),
            Field::new(
                "revenue",
                DataType::Decimal128(MONEY_PRECISION, MONEY_SCALE),
                false,
            ),
            Field::new(
                "avg_price",
                DataType::Decimal128(MONEY_PRECISION, MONEY_SCALE),
                true,
            ),
            Field::new("section_capacity", DataType::Int64, false),
            Field::new(
                "utilization",
                DataType::Decimal128(MONEY_PRECISION, RATIO_SCALE),
                true,
            ),
            Field::new("avg_temp_c", DataType::Float64, true),
            Field::new("min_temp_c", DataType::Float64, true),
            Field::new("max_temp_c", DataType::Float64, true),
            Field::new("avg_rh_pct", DataType::Float64, true),
            Field::new("avg_wind_mps", DataType::Float64, true),
            Field::new("total_precip_mm", DataType::Float64, true),
            Field::new("windy_hours", DataType::UInt32, true),
            Field::new("rainy_hours", DataType::UInt32, true),
            Field::new("freezing_hours", DataType::UInt32, true),
            Field::new("hours_observed", DataType::UInt32, true),
        ])
    }

    fn columns(rows: &[Self]) -> Result<Vec<ArrayRef>> {
        Ok(vec![
            dates(rows, |r| r.event_date),
            utf8(rows, |r| &r.market),
            utf8(rows, |r| &r.venue_id),
            utf8(rows, |r| &r.venue),
            utf8(rows, |r| &r.section),
            int64(rows, |r| r.tickets_sold),
            decimal_column(
                rows.iter().map(|r| Some(scaled(r.revenue, MONEY_SCALE))).collect(),
                MONEY_SCALE,
            )?,
            decimal_column(
                rows.iter()
                    .map(|r| r.avg_price.map(|p| scaled(p, MONEY_SCALE)))
                    .collect(),
                MONEY_SCALE,
            )?,
            int64(rows, |r| r.section_capacity),
            decimal_column(
                rows.iter()
                    .map(|r| r.utilization.map(|u| scaled(u, RATIO_SCALE)))
                    .collect(),
                RATIO_SCALE,
            )?,
            float64(rows, |r| r.avg_temp_c),
            float64(rows, |r| r.min_temp_c),
            float64(rows, |r| r.max_temp_c),
            float64(rows, |r| r.avg_rh_pct),
            float64(rows, |r| r.avg_wind_mps),
            float64(rows, |r| r.total_precip_mm),
            uint32(rows, |r| r.windy_hours),
            uint32(rows, |r| r.rainy_hours),
            uint32(rows, |r| r.freezing_hours),
            uint32(rows, |r| r.hours_observed),
        ])
    }
}
