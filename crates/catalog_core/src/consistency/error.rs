//! Consistency manager error taxonomy.

use crate::model::record::RecordId;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ConsistencyResult<T> = Result<T, ConsistencyError>;

/// Key under which a divergence was observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKey {
    Id(RecordId),
    Title(String),
}

impl Display for RecordKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {id}"),
            Self::Title(title) => write!(f, "title \"{title}\""),
        }
    }
}

/// Errors returned by dual-store operations.
///
/// Divergence variants (see [`ConsistencyError::is_divergence`]) are never
/// resolved by preferring one store.
#[derive(Debug)]
pub enum ConsistencyError {
    /// A store could not be opened at startup.
    StoreUnavailable(StoreError),
    /// Stores disagree on the highest id ever written. Fatal to startup.
    IdentitySpaceDivergence {
        primary_store: String,
        primary_max: RecordId,
        secondary_store: String,
        secondary_max: RecordId,
    },
    /// Both sides of a dual write failed; nothing was applied.
    StoreWriteFailed {
        primary: StoreError,
        secondary: StoreError,
    },
    /// Exactly one side of a dual write failed.
    PartialWriteFailure {
        key: RecordKey,
        failed: StoreError,
        succeeded_store: String,
        /// Whether the successful side was undone.
        compensated: bool,
    },
    /// The key exists in exactly one store.
    StoreInconsistency {
        key: RecordKey,
        present_in: String,
        missing_from: String,
    },
    /// Both stores know the title under different ids.
    IdMismatch {
        title: String,
        primary_id: RecordId,
        secondary_id: RecordId,
    },
    /// Stored prices already differed before the update.
    PriceMismatch {
        id: RecordId,
        primary_price: f64,
        secondary_price: f64,
    },
    /// Deletion would succeed in one store only.
    DeletionMismatch {
        id: RecordId,
        present_in: String,
        missing_from: String,
    },
    CountMismatch {
        primary_count: u64,
        secondary_count: u64,
    },
    /// Both copies exist but are not field-identical.
    RecordMismatch { id: RecordId },
    /// Title is already taken by the record with `id`.
    DuplicateTitle { title: String, id: RecordId },
    NotFound(RecordId),
    /// Single-store read or write failure outside a dual-write pair.
    Store(StoreError),
}

impl ConsistencyError {
    /// Whether this error reports disagreement between the two stores.
    pub fn is_divergence(&self) -> bool {
        matches!(
            self,
            Self::IdentitySpaceDivergence { .. }
                | Self::PartialWriteFailure { .. }
                | Self::StoreInconsistency { .. }
                | Self::IdMismatch { .. }
                | Self::PriceMismatch { .. }
                | Self::DeletionMismatch { .. }
                | Self::CountMismatch { .. }
                | Self::RecordMismatch { .. }
        )
    }

    /// Stable machine-readable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::IdentitySpaceDivergence { .. } => "identity_space_divergence",
            Self::StoreWriteFailed { .. } => "store_write_failed",
            Self::PartialWriteFailure { .. } => "partial_write_failure",
            Self::StoreInconsistency { .. } => "store_inconsistency",
            Self::IdMismatch { .. } => "id_mismatch",
            Self::PriceMismatch { .. } => "price_mismatch",
            Self::DeletionMismatch { .. } => "deletion_mismatch",
            Self::CountMismatch { .. } => "count_mismatch",
            Self::RecordMismatch { .. } => "record_mismatch",
            Self::DuplicateTitle { .. } => "duplicate_title",
            Self::NotFound(_) => "not_found",
            Self::Store(err) => err.code(),
        }
    }
}

impl Display for ConsistencyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StoreUnavailable(err) => write!(f, "{err}"),
            Self::IdentitySpaceDivergence {
                primary_store,
                primary_max,
                secondary_store,
                secondary_max,
            } => write!(
                f,
                "stores disagree on max id: {primary_store}:{primary_max} != {secondary_store}:{secondary_max}"
            ),
            Self::StoreWriteFailed { primary, secondary } => {
                write!(f, "write failed in both stores: {primary}; {secondary}")
            }
            Self::PartialWriteFailure {
                key,
                failed,
                succeeded_store,
                compensated,
            } => write!(
                f,
                "partial write for {key}: applied in `{succeeded_store}` only (compensated={compensated}): {failed}"
            ),
            Self::StoreInconsistency {
                key,
                present_in,
                missing_from,
            } => write!(
                f,
                "inconsistency: {key} exists in `{present_in}` but not in `{missing_from}`"
            ),
            Self::IdMismatch {
                title,
                primary_id,
                secondary_id,
            } => write!(
                f,
                "mismatch in record id for title \"{title}\": {primary_id} != {secondary_id}"
            ),
            Self::PriceMismatch {
                id,
                primary_price,
                secondary_price,
            } => write!(
                f,
                "mismatch in record price for id {id}: {primary_price} != {secondary_price}"
            ),
            Self::DeletionMismatch {
                id,
                present_in,
                missing_from,
            } => write!(
                f,
                "mismatch in record deletion for id {id}: present in `{present_in}`, missing from `{missing_from}`"
            ),
            Self::CountMismatch {
                primary_count,
                secondary_count,
            } => write!(
                f,
                "mismatch in record count: {primary_count} != {secondary_count}"
            ),
            Self::RecordMismatch { id } => {
                write!(f, "record copies for id {id} are not field-identical")
            }
            Self::DuplicateTitle { title, id } => {
                write!(f, "record with title \"{title}\" already exists (id {id})")
            }
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ConsistencyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StoreUnavailable(err) | Self::Store(err) => Some(err),
            Self::StoreWriteFailed { primary, .. } => Some(primary),
            Self::PartialWriteFailure { failed, .. } => Some(failed),
            _ => None,
        }
    }
}

impl From<StoreError> for ConsistencyError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
