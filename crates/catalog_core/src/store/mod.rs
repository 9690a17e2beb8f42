//! Store adapter contract and its two implementations.
//!
//! # Responsibility
//! - Define the uniform operation surface the consistency manager talks to.
//! - Isolate store-native ids, schemas and query details inside adapters.
//!
//! # Invariants
//! - Adapters accept and return canonical model types only.
//! - "No match" is `Ok(None)` / `Ok(false)`, never an error.
//! - `insert` is all-or-nothing.
//! - Every operation before `initialize` fails with `StoreError::Unavailable`.

use crate::model::filter::RecordFilter;
use crate::model::record::{Record, RecordId};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod document_store;
pub mod sqlite_store;

pub use document_store::DocumentRecordStore;
pub use sqlite_store::SqliteRecordStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Adapter-level failure. Every variant names the adapter it came from.
#[derive(Debug)]
pub enum StoreError {
    /// Store could not be opened, or was used before `initialize`.
    Unavailable { store: String, message: String },
    /// A mutation was rejected; nothing was applied.
    WriteFailed { store: String, message: String },
    /// A query failed at the store level.
    ReadFailed { store: String, message: String },
    /// Persisted data cannot be converted to a canonical record.
    InvalidData { store: String, message: String },
}

impl StoreError {
    pub fn unavailable(store: &str, message: impl Display) -> Self {
        Self::Unavailable {
            store: store.to_string(),
            message: message.to_string(),
        }
    }

    pub fn write_failed(store: &str, message: impl Display) -> Self {
        Self::WriteFailed {
            store: store.to_string(),
            message: message.to_string(),
        }
    }

    pub fn read_failed(store: &str, message: impl Display) -> Self {
        Self::ReadFailed {
            store: store.to_string(),
            message: message.to_string(),
        }
    }

    pub fn invalid_data(store: &str, message: impl Display) -> Self {
        Self::InvalidData {
            store: store.to_string(),
            message: message.to_string(),
        }
    }

    /// Name of the adapter that produced this error.
    pub fn store(&self) -> &str {
        match self {
            Self::Unavailable { store, .. }
            | Self::WriteFailed { store, .. }
            | Self::ReadFailed { store, .. }
            | Self::InvalidData { store, .. } => store,
        }
    }

    /// Stable machine-readable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "store_unavailable",
            Self::WriteFailed { .. } => "store_write_failed",
            Self::ReadFailed { .. } => "store_read_failed",
            Self::InvalidData { .. } => "store_invalid_data",
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable { store, message } => {
                write!(f, "store `{store}` is unavailable: {message}")
            }
            Self::WriteFailed { store, message } => {
                write!(f, "write to store `{store}` failed: {message}")
            }
            Self::ReadFailed { store, message } => {
                write!(f, "read from store `{store}` failed: {message}")
            }
            Self::InvalidData { store, message } => {
                write!(f, "invalid data in store `{store}`: {message}")
            }
        }
    }
}

impl Error for StoreError {}

/// Uniform capability surface over one concrete backing store.
///
/// The consistency manager holds two of these as trait objects and never
/// branches on the technology behind them.
pub trait RecordStore: Send + Sync {
    /// Stable adapter name used for read selection and diagnostics.
    fn name(&self) -> &str;
    /// Opens the store and returns the highest shared id it holds (0 if empty).
    fn initialize(&self) -> StoreResult<RecordId>;
    fn insert(&self, record: &Record) -> StoreResult<()>;
    /// Case-insensitive exact title lookup.
    fn find_by_title(&self, title: &str) -> StoreResult<Option<RecordId>>;
    fn find_by_id(&self, id: RecordId) -> StoreResult<Option<Record>>;
    /// Matching records ordered by case-insensitive title, then id.
    fn list_filtered(&self, filter: &RecordFilter) -> StoreResult<Vec<Record>>;
    /// Replaces the price and returns the previous one.
    fn update_price(&self, id: RecordId, new_price: f64) -> StoreResult<Option<f64>>;
    fn delete_by_id(&self, id: RecordId) -> StoreResult<bool>;
    fn count(&self) -> StoreResult<u64>;
}
