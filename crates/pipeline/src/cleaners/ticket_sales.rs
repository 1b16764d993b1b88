//! Ticket sales cleaner.
//!
//! Types every field, resolves venue and section to canonical keys, enforces
//! the non-negativity rules and the analysis window, then collapses exact
//! duplicates. Rows sharing a `transaction_id` but disagreeing on any value
//! are quarantined together as ambiguous.

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use ticket_etl_core::{AnalysisWindow, Cleaned, Rule, Source};
use ticket_etl_data::{RawTicketSale, TicketSale};
use tracing::{debug, info, warn};

use super::{decoded, key_part, parse_amount, parse_count, required, Reject};
use crate::keys::{KeyError, KeyNormalizer};

pub struct TicketSalesCleaner {
    keys: Arc<KeyNormalizer>,
    window: AnalysisWindow,
}

impl TicketSalesCleaner {
    #[must_use]
    pub fn new(keys: Arc<KeyNormalizer>, window: AnalysisWindow) -> Self {
        Self { keys, window }
    }

    /// Cleans raw ticket sales, preserving input order of accepted rows.
    #[must_use]
    pub fn clean(&self, raw: &[RawTicketSale]) -> Cleaned<TicketSale> {
        let mut out = Cleaned::new();
        let mut typed: Vec<(TicketSale, &RawTicketSale)> = Vec::with_capacity(raw.len());
        let mut spend_mismatches = 0usize;

        for row in raw {
            match self.type_row(row) {
                Ok((sale, spend_matches)) => {
                    if !spend_matches {
                        spend_mismatches += 1;
                    }
                    typed.push((sale, row));
                }
                Err(reject) => out.quarantine(reject.into_row(
                    Source::TicketSales,
                    row.origin.as_deref(),
                    raw_key(row),
                    row.render(),
                )),
            }
        }

        if spend_mismatches > 0 {
            warn!(
                rows = spend_mismatches,
                "Ticket sales where revenue != ticket_price * tickets_sold"
            );
        }

        // Exact duplicates collapse to their first occurrence.
        let mut seen = HashSet::new();
        let before = typed.len();
        typed.retain(|(sale, _)| seen.insert(identity(sale)));
        if typed.len() < before {
            debug!(
                collapsed = before - typed.len(),
                "Collapsed exact duplicate ticket sales"
            );
        }

        // Same transaction, different values: keep none of them.
        let mut by_transaction: BTreeMap<&str, usize> = BTreeMap::new();
        for (sale, _) in &typed {
            if let Some(id) = sale.transaction_id.as_deref() {
                *by_transaction.entry(id).or_insert(0) += 1;
            }
        }
        let ambiguous: HashSet<String> = by_transaction
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(id, _)| id.to_string())
            .collect();

        for (sale, row) in typed {
            match sale.transaction_id.as_deref() {
                Some(id) if ambiguous.contains(id) => out.quarantine(
                    Reject::new(Rule::AmbiguousDuplicate, "transaction_id", id).into_row(
                        Source::TicketSales,
                        row.origin.as_deref(),
                        sale.key(),
                        row.render(),
                    ),
                ),
                _ => out.accept(sale),
            }
        }

        info!(
            read = raw.len(),
            accepted = out.rows.len(),
            quarantined = out.quarantined.len(),
            "Cleaned ticket sales"
        );
        out
    }

    /// Types one row. The flag is false when an optional `ticket_price`
    /// disagrees with revenue.
    fn type_row(&self, row: &RawTicketSale) -> Result<(TicketSale, bool), Reject> {
        decoded(row.defect.as_deref())?;
        let event_date_raw = required("event_date", &row.event_date)?;
        let venue_raw = required("venue_id", &row.venue_id)?;
        let section_raw = required("section", &row.section)?;
        let tickets_raw = required("tickets_sold", &row.tickets_sold)?;
        let revenue_raw = required("revenue", &row.revenue)?;

        let tickets_sold = parse_count("tickets_sold", tickets_raw)?;
        let revenue = parse_amount("revenue", revenue_raw)?;
        if tickets_sold < 0 {
            return Err(Reject::new(Rule::NegativeTickets, "tickets_sold", tickets_sold));
        }
        if revenue < Decimal::ZERO {
            return Err(Reject::new(Rule::NegativeRevenue, "revenue", revenue));
        }

        let key = self
            .keys
            .canonical_key(venue_raw, section_raw, event_date_raw)
            .map_err(|e| match e {
                KeyError::UnknownVenue => Reject::new(Rule::UnknownVenue, "venue_id", venue_raw),
                KeyError::UnmappedSection => {
                    Reject::new(Rule::UnmappedSection, "section", section_raw)
                }
                KeyError::InvalidDate => Reject::new(Rule::InvalidDate, "event_date", event_date_raw),
            })?;

        if !self.window.contains(key.event_date) {
            return Err(Reject::new(Rule::OutsideWindow, "event_date", key.event_date));
        }

        let spend_matches = match row.ticket_price.as_deref().map(str::trim) {
            Some(price) if !price.is_empty() => parse_amount("ticket_price", price)
                .map(|p| round2(p * Decimal::from(tickets_sold)) == round2(revenue))
                .unwrap_or(true),
            _ => true,
        };

        let transaction_id = row
            .transaction_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(ToString::to_string);

        Ok((
            TicketSale {
                event_date: key.event_date,
                venue_id: key.venue_id,
                section: key.section,
                tickets_sold,
                revenue,
                transaction_id,
                origin: row.origin.clone(),
            },
            spend_matches,
        ))
    }
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Value identity of a sale, ignoring where it was read from. Revenue is
/// normalized so "80" and "80.00" compare equal.
fn identity(sale: &TicketSale) -> (chrono::NaiveDate, String, String, i64, Decimal, Option<String>) {
    (
        sale.event_date,
        sale.venue_id.clone(),
        sale.section.clone(),
        sale.tickets_sold,
        sale.revenue.normalize(),
        sale.transaction_id.clone(),
    )
}

fn raw_key(row: &RawTicketSale) -> String {
    format!(
        "{}/{}/{}",
        key_part(&row.event_date),
        key_part(&row.venue_id),
        key_part(&row.section)
    )
}
