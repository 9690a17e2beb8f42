//! Listing filter shared by both store adapters.
//!
//! # Invariants
//! - Every field is optional; set fields are AND-combined.
//! - Bounds are strict (`>` / `<`).
//! - `genres` matches when the record shares at least one genre.
//! - Price bounds must be finite before a filter reaches a store; SQL and
//!   in-process comparison disagree on NaN.

use crate::model::record::{title_key, Genre, Record, RecordValidationError};
use std::collections::BTreeSet;

/// Optional, independently combinable listing criteria.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    /// Exact author match, case-insensitive.
    pub author: Option<String>,
    pub price_bigger_than: Option<f64>,
    pub price_less_than: Option<f64>,
    pub year_bigger_than: Option<i32>,
    pub year_less_than: Option<i32>,
    /// Empty set means no genre constraint.
    pub genres: BTreeSet<Genre>,
}

impl RecordFilter {
    /// Parses a comma-joined genre list, e.g. `SCI_FI,NOVEL`.
    ///
    /// Blank entries are skipped; unknown tags are rejected.
    pub fn parse_genres(csv: &str) -> Result<BTreeSet<Genre>, RecordValidationError> {
        csv.split(',')
            .filter(|part| !part.trim().is_empty())
            .map(str::parse)
            .collect()
    }

    /// Returns a copy with the genre constraint parsed from `csv`.
    pub fn with_genres_csv(mut self, csv: &str) -> Result<Self, RecordValidationError> {
        self.genres = Self::parse_genres(csv)?;
        Ok(self)
    }

    /// Rejects non-finite price bounds.
    ///
    /// # Errors
    /// - `InvalidPrice` carrying the offending bound.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        for bound in [self.price_bigger_than, self.price_less_than]
            .into_iter()
            .flatten()
        {
            if !bound.is_finite() {
                return Err(RecordValidationError::InvalidPrice(bound));
            }
        }
        Ok(())
    }

    /// In-process evaluation used by stores without a query engine.
    pub fn matches(&self, record: &Record) -> bool {
        if let Some(author) = self.author.as_deref() {
            if title_key(&record.author) != title_key(author) {
                return false;
            }
        }
        if self.price_bigger_than.is_some_and(|bound| record.price <= bound) {
            return false;
        }
        if self.price_less_than.is_some_and(|bound| record.price >= bound) {
            return false;
        }
        if self.year_bigger_than.is_some_and(|bound| record.year <= bound) {
            return false;
        }
        if self.year_less_than.is_some_and(|bound| record.year >= bound) {
            return false;
        }
        self.genres.is_empty() || !self.genres.is_disjoint(&record.genres)
    }
}
