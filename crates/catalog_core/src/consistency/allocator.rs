//! Shared identity allocation.
//!
//! # Invariants
//! - The counter starts at the reconciled max id + 1.
//! - `allocate` never hands out the same id twice, under any concurrency.

use crate::consistency::error::{ConsistencyError, ConsistencyResult};
use crate::model::record::RecordId;
use std::sync::{Mutex, PoisonError};

/// Monotonic id source owned by the consistency manager.
#[derive(Debug)]
pub struct IdentityAllocator {
    next: Mutex<RecordId>,
}

impl IdentityAllocator {
    /// Builds the allocator from the max id observed in each store.
    ///
    /// # Errors
    /// - `IdentitySpaceDivergence` when the two maxima differ.
    pub fn reconcile(
        (primary_store, primary_max): (&str, RecordId),
        (secondary_store, secondary_max): (&str, RecordId),
    ) -> ConsistencyResult<Self> {
        if primary_max != secondary_max {
            return Err(ConsistencyError::IdentitySpaceDivergence {
                primary_store: primary_store.to_string(),
                primary_max,
                secondary_store: secondary_store.to_string(),
                secondary_max,
            });
        }
        Ok(Self::starting_after(primary_max))
    }

    /// Allocator whose first id is `max_existing + 1`.
    pub fn starting_after(max_existing: RecordId) -> Self {
        Self {
            next: Mutex::new(max_existing.max(0) + 1),
        }
    }

    /// Returns the current counter value and advances it.
    pub fn allocate(&self) -> RecordId {
        let mut next = self.next.lock().unwrap_or_else(PoisonError::into_inner);
        let id = *next;
        *next += 1;
        id
    }

    /// Next id that `allocate` would return.
    pub fn peek(&self) -> RecordId {
        *self.next.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
