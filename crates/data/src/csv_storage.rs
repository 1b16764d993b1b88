use anyhow::{Context, Result};
use csv::{StringRecord, Writer};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use ticket_etl_core::{PipelineError, Source};
use tracing::{debug, info, warn};

use crate::models::{RawRecord, RawSectionCapacity, RawTicketSale, RawWeatherObservation};

/// Source column spellings accepted in place of the contractual names.
const HEADER_ALIASES: &[(&str, &str)] = &[
    ("num_tickets", "tickets_sold"),
    ("total_spend", "revenue"),
    ("time", "timestamp"),
    ("temperature_2m", "temperature"),
    ("relative_humidity_2m", "relative_humidity"),
    ("wind_speed_10m", "wind_speed"),
];

/// Trims, lowercases and underscores a header, then resolves known aliases.
#[must_use]
pub fn normalize_header(header: &str) -> String {
    let normalized = header
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");

    HEADER_ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map_or(normalized, |(_, canonical)| (*canonical).to_string())
}

pub struct CsvStorage;

impl CsvStorage {
    /// Reads one batch of raw ticket sales.
    ///
    /// Missing columns and undecodable rows are tolerated here; affected rows
    /// are quarantined by the cleaner.
    ///
    /// # Errors
    /// Returns error if the file cannot be opened or is not valid CSV
    pub fn read_ticket_sales(path: &Path) -> Result<Vec<RawTicketSale>> {
        let (missing, rows) = read_batch::<RawTicketSale>(path)?;
        if !missing.is_empty() {
            warn!(
                path = %path.display(),
                missing = ?missing,
                "Ticket sales batch is missing columns; affected rows will be quarantined"
            );
        }
        Ok(rows)
    }

    /// Reads one batch of the section capacity reference table.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, a [`PipelineError::MissingColumns`]
    /// if a contractual column is absent, or a [`PipelineError::IncompleteReference`]
    /// if a row cannot be decoded. Capacity is foundational, so these abort.
    pub fn read_section_capacity(path: &Path) -> Result<Vec<RawSectionCapacity>> {
        let (missing, rows) = read_batch::<RawSectionCapacity>(path)?;
        if !missing.is_empty() {
            return Err(PipelineError::MissingColumns {
                input: Source::SectionCapacity,
                columns: missing,
            }
            .into());
        }
        if let Some(row) = rows.iter().find(|row| row.defect().is_some()) {
            return Err(PipelineError::IncompleteReference {
                input: Source::SectionCapacity,
                origin: row.origin.clone().unwrap_or_default(),
                key: format!(
                    "{}/{}",
                    row.venue_id.as_deref().unwrap_or("?"),
                    row.section.as_deref().unwrap_or("?")
                ),
                field: "record".to_string(),
            }
            .into());
        }
        Ok(rows)
    }

    /// Reads one batch of sub-daily weather observations.
    ///
    /// # Errors
    /// Returns error if the file cannot be opened or is not valid CSV
    pub fn read_weather(path: &Path) -> Result<Vec<RawWeatherObservation>> {
        let (missing, rows) = read_batch::<RawWeatherObservation>(path)?;
        if !missing.is_empty() {
            warn!(
                path = %path.display(),
                missing = ?missing,
                "Weather batch is missing columns; affected rows will be quarantined"
            );
        }
        Ok(rows)
    }

    /// Writes rows as CSV with a header taken from the row's field names.
    ///
    /// # Errors
    /// Returns error if file cannot be created or writing fails
    pub fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
        let mut writer = Writer::from_path(path)
            .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;

        for row in rows {
            writer.serialize(row)?;
        }

        writer.flush()?;
        debug!(path = %path.display(), rows = rows.len(), "Wrote CSV table");
        Ok(())
    }
}

/// Reads a batch into raw records, returning the contractual columns the
/// header lacks alongside the rows. A row that cannot be decoded is kept,
/// read lossily and marked with its defect.
fn read_batch<T>(path: &Path) -> Result<(Vec<String>, Vec<T>)>
where
    T: RawRecord + DeserializeOwned + Default,
{
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

    let headers: StringRecord = reader
        .headers()
        .with_context(|| format!("Failed to read CSV header: {}", path.display()))?
        .iter()
        .map(normalize_header)
        .collect();

    let missing: Vec<String> = T::REQUIRED_COLUMNS
        .iter()
        .filter(|column| !headers.iter().any(|h| h == **column))
        .map(|column| (*column).to_string())
        .collect();

    let batch = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

    let mut rows = Vec::new();
    let mut defects = 0usize;
    for result in reader.byte_records() {
        let record =
            result.with_context(|| format!("Malformed CSV record in {}", path.display()))?;
        let line = record.position().map_or(0, csv::Position::line);

        let mut row = match record.deserialize::<T>(Some(headers.as_byte_record())) {
            Ok(row) => row,
            Err(e) => {
                defects += 1;
                let mut row: T = StringRecord::from_byte_record_lossy(record)
                    .deserialize(Some(&headers))
                    .unwrap_or_default();
                row.set_defect(e.to_string());
                row
            }
        };
        row.set_origin(format!("{batch}:{line}"));
        rows.push(row);
    }

    if defects > 0 {
        warn!(path = %path.display(), rows = defects, "CSV rows could not be decoded");
    }
    info!(path = %path.display(), rows = rows.len(), "Read CSV batch");
    Ok((missing, rows))
}
