//! Section capacity cleaner.
//!
//! Capacity is reference data: rows are typed and keyed here, exact
//! duplicates collapse, and differing capacities for one section are left in
//! place for [`crate::integrate::CapacityIndex::build`] to reject as a whole.
//! A row with a blank or undecodable contractual value aborts the run, since
//! every sale of that section would otherwise lose its capacity reference.

use std::collections::HashSet;
use std::sync::Arc;
use ticket_etl_core::{Cleaned, PipelineError, Rule, Source};
use ticket_etl_data::{RawSectionCapacity, SectionCapacity};
use tracing::{error, info};

use super::{decoded, key_part, parse_count, required, Reject};
use crate::keys::KeyNormalizer;

pub struct SectionCapacityCleaner {
    keys: Arc<KeyNormalizer>,
}

impl SectionCapacityCleaner {
    #[must_use]
    pub fn new(keys: Arc<KeyNormalizer>) -> Self {
        Self { keys }
    }

    /// Cleans capacity rows. Output is sorted by (venue_id, section, capacity).
    ///
    /// # Errors
    /// Returns [`PipelineError::IncompleteReference`] for the first row with a
    /// blank or undecodable contractual value
    pub fn clean(
        &self,
        raw: &[RawSectionCapacity],
    ) -> Result<Cleaned<SectionCapacity>, PipelineError> {
        let mut out = Cleaned::new();
        let mut seen = HashSet::new();
        let mut incomplete = None;

        for row in raw {
            let key = format!("{}/{}", key_part(&row.venue_id), key_part(&row.section));
            match self.type_row(row) {
                Ok(capacity) => {
                    if seen.insert(capacity.clone()) {
                        out.accept(capacity);
                    }
                }
                Err(reject)
                    if matches!(reject.rule, Rule::MissingField | Rule::InvalidEncoding) =>
                {
                    error!(
                        origin = row.origin.as_deref().unwrap_or("-"),
                        key = %key,
                        field = %reject.field,
                        "Section capacity row has no usable value"
                    );
                    incomplete.get_or_insert(PipelineError::IncompleteReference {
                        input: Source::SectionCapacity,
                        origin: row.origin.clone().unwrap_or_default(),
                        key,
                        field: reject.field,
                    });
                }
                Err(reject) => out.quarantine(reject.into_row(
                    Source::SectionCapacity,
                    row.origin.as_deref(),
                    key,
                    row.render(),
                )),
            }
        }
        if let Some(err) = incomplete {
            return Err(err);
        }
        out.rows.sort();

        info!(
            read = raw.len(),
            accepted = out.rows.len(),
            quarantined = out.quarantined.len(),
            "Cleaned section capacity"
        );
        Ok(out)
    }

    fn type_row(&self, row: &RawSectionCapacity) -> Result<SectionCapacity, Reject> {
        decoded(row.defect.as_deref())?;
        let venue_raw = required("venue_id", &row.venue_id)?;
        let section_raw = required("section", &row.section)?;
        let capacity_raw = required("section_capacity", &row.section_capacity)?;

        let section_capacity = parse_count("section_capacity", capacity_raw)?;
        if section_capacity <= 0 {
            return Err(Reject::new(
                Rule::NonPositiveCapacity,
                "section_capacity",
                section_capacity,
            ));
        }

        let venue_id = KeyNormalizer::venue_id(venue_raw);
        if self.keys.venue(&venue_id).is_none() {
            return Err(Reject::new(Rule::UnknownVenue, "venue_id", venue_raw));
        }
        let section = self
            .keys
            .section(section_raw)
            .ok_or_else(|| Reject::new(Rule::UnmappedSection, "section", section_raw))?;

        Ok(SectionCapacity {
            venue_id,
            section: section.to_string(),
            section_capacity,
        })
    }
}
