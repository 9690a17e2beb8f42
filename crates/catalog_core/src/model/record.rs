//! Record domain model.
//!
//! # Responsibility
//! - Define the canonical record mirrored by both stores.
//! - Provide input validation used at the catalog edge.
//!
//! # Invariants
//! - `id` is assigned once by the identity allocator and never changes.
//! - `price` is the only field mutated after creation.
//! - Title equality is case-insensitive via [`title_key`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Shared identifier agreed by both stores.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type RecordId = i64;

/// Earliest accepted publication year.
pub const MIN_YEAR: i32 = 1940;
/// Latest accepted publication year.
pub const MAX_YEAR: i32 = 2100;

/// Fixed genre vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Genre {
    SciFi,
    Novel,
    History,
    Manga,
    Romance,
    Professional,
}

impl Genre {
    /// Every known genre in declaration order.
    pub const ALL: [Genre; 6] = [
        Genre::SciFi,
        Genre::Novel,
        Genre::History,
        Genre::Manga,
        Genre::Romance,
        Genre::Professional,
    ];

    /// Stable tag used in storage and in filter input.
    pub fn as_tag(self) -> &'static str {
        match self {
            Self::SciFi => "SCI_FI",
            Self::Novel => "NOVEL",
            Self::History => "HISTORY",
            Self::Manga => "MANGA",
            Self::Romance => "ROMANCE",
            Self::Professional => "PROFESSIONAL",
        }
    }
}

impl Display for Genre {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl FromStr for Genre {
    type Err = RecordValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|genre| genre.as_tag() == trimmed)
            .ok_or_else(|| RecordValidationError::UnknownGenre(trimmed.to_string()))
    }
}

/// Canonical catalog record.
///
/// `PartialEq` is the field-identity check used when comparing store copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub title: String,
    pub author: String,
    pub year: i32,
    pub price: f64,
    pub genres: BTreeSet<Genre>,
}

/// Creation input: a record without its identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub title: String,
    pub author: String,
    pub year: i32,
    pub price: f64,
    pub genres: BTreeSet<Genre>,
}

impl NewRecord {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        year: i32,
        price: f64,
        genres: impl IntoIterator<Item = Genre>,
    ) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            year,
            price,
            genres: genres.into_iter().collect(),
        }
    }

    /// Validates creation input.
    ///
    /// # Errors
    /// - `EmptyTitle` when title is blank.
    /// - `YearOutOfRange` when year is outside `[MIN_YEAR, MAX_YEAR]`.
    /// - `InvalidPrice` when price is negative or not finite.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        if self.title.trim().is_empty() {
            return Err(RecordValidationError::EmptyTitle);
        }
        if !(MIN_YEAR..=MAX_YEAR).contains(&self.year) {
            return Err(RecordValidationError::YearOutOfRange(self.year));
        }
        validate_price(self.price)
    }

    /// Binds this input to an allocated id.
    pub fn into_record(self, id: RecordId) -> Record {
        Record {
            id,
            title: self.title,
            author: self.author,
            year: self.year,
            price: self.price,
            genres: self.genres,
        }
    }
}

/// Rejects negative and non-finite prices.
pub fn validate_price(price: f64) -> Result<(), RecordValidationError> {
    if !price.is_finite() || price < 0.0 {
        return Err(RecordValidationError::InvalidPrice(price));
    }
    Ok(())
}

/// Case-insensitive comparison key for titles and authors.
pub fn title_key(value: &str) -> String {
    value.to_lowercase()
}

/// Caller input problems detected before the consistency manager runs.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValidationError {
    EmptyTitle,
    YearOutOfRange(i32),
    InvalidPrice(f64),
    UnknownGenre(String),
}

impl Display for RecordValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "record title cannot be empty"),
            Self::YearOutOfRange(year) => write!(
                f,
                "record year {year} is not in the accepted range [{MIN_YEAR} -> {MAX_YEAR}]"
            ),
            Self::InvalidPrice(price) => write!(f, "record price {price} must be non-negative"),
            Self::UnknownGenre(tag) => write!(f, "unknown genre tag `{tag}`"),
        }
    }
}

impl Error for RecordValidationError {}
