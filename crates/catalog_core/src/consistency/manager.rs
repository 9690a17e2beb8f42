//! Dual-store consistency manager.
//!
//! # Responsibility
//! - Allocate the shared id and fan every mutation out to both stores.
//! - Compare both answers and report divergence instead of masking it.
//!
//! # Invariants
//! - Both adapter calls of a pair run concurrently and are both awaited.
//! - Update and delete read both copies first and fail before mutating when
//!   they already disagree.
//! - Lock order: gate (shared) -> title stripe -> id stripe.
//! - `count` holds the gate exclusively, so no dual write is half-applied
//!   while counts are compared.

use crate::consistency::allocator::IdentityAllocator;
use crate::consistency::error::{ConsistencyError, ConsistencyResult, RecordKey};
use crate::consistency::locks::{StripedLocks, DEFAULT_STRIPES};
use crate::model::record::{title_key, NewRecord, Record, RecordId};
use crate::store::{RecordStore, StoreError, StoreResult};
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::panic;
use std::sync::{Arc, MutexGuard, PoisonError, RwLock};
use std::thread;
use std::time::Instant;

/// Which of the two stores serves a single-store read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreSelector {
    #[default]
    Primary,
    Secondary,
}

/// What happens to the successful side when a dual write half-fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialWritePolicy {
    /// Undo the successful side, then report the partial write.
    #[default]
    Compensate,
    /// Leave both sides as they are and report for manual reconciliation.
    LeaveAndFlag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerOptions {
    pub partial_write_policy: PartialWritePolicy,
    pub lock_stripes: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            partial_write_policy: PartialWritePolicy::default(),
            lock_stripes: DEFAULT_STRIPES,
        }
    }
}

/// Guards serializing one record id (and its title, when known).
struct RecordLock<'a> {
    _title: Option<MutexGuard<'a, ()>>,
    _id: MutexGuard<'a, ()>,
}

/// Orchestrates the two store adapters.
pub struct ConsistencyManager {
    primary: Arc<dyn RecordStore>,
    secondary: Arc<dyn RecordStore>,
    allocator: IdentityAllocator,
    title_locks: StripedLocks,
    id_locks: StripedLocks,
    gate: RwLock<()>,
    policy: PartialWritePolicy,
}

impl ConsistencyManager {
    /// Initializes both stores and reconciles their identity space.
    ///
    /// # Errors
    /// - `StoreUnavailable` when either store cannot be opened.
    /// - `IdentitySpaceDivergence` when the stores disagree on the max id.
    pub fn start(
        primary: Arc<dyn RecordStore>,
        secondary: Arc<dyn RecordStore>,
        options: ManagerOptions,
    ) -> ConsistencyResult<Self> {
        let started_at = Instant::now();
        info!(
            "event=manager_start module=consistency status=start primary={} secondary={}",
            primary.name(),
            secondary.name()
        );

        let (primary_max, secondary_max) =
            fan_out(primary.as_ref(), secondary.as_ref(), |store| store.initialize());
        let reconciled = match (primary_max, secondary_max) {
            (Ok(primary_max), Ok(secondary_max)) => IdentityAllocator::reconcile(
                (primary.name(), primary_max),
                (secondary.name(), secondary_max),
            ),
            (Err(err), _) | (_, Err(err)) => Err(ConsistencyError::StoreUnavailable(err)),
        };
        let allocator = match reconciled {
            Ok(allocator) => allocator,
            Err(err) => {
                error!(
                    "event=manager_start module=consistency status=error duration_ms={} error_code={} error={}",
                    started_at.elapsed().as_millis(),
                    err.code(),
                    err
                );
                return Err(err);
            }
        };

        info!(
            "event=manager_start module=consistency status=ok duration_ms={} next_id={}",
            started_at.elapsed().as_millis(),
            allocator.peek()
        );
        Ok(Self {
            primary,
            secondary,
            allocator,
            title_locks: StripedLocks::new(options.lock_stripes),
            id_locks: StripedLocks::new(options.lock_stripes),
            gate: RwLock::new(()),
            policy: options.partial_write_policy,
        })
    }

    /// Adapter serving single-store reads for `selector`.
    pub fn store(&self, selector: StoreSelector) -> &dyn RecordStore {
        match selector {
            StoreSelector::Primary => self.primary.as_ref(),
            StoreSelector::Secondary => self.secondary.as_ref(),
        }
    }

    pub fn partial_write_policy(&self) -> PartialWritePolicy {
        self.policy
    }

    /// Next id the allocator would hand out.
    pub fn next_id(&self) -> RecordId {
        self.allocator.peek()
    }

    /// Creates a record in both stores under a freshly allocated id.
    ///
    /// # Errors
    /// - `DuplicateTitle` when both stores already hold the title.
    /// - Any `exists_by_title` divergence for the title.
    /// - `PartialWriteFailure` / `StoreWriteFailed` when inserts fail.
    pub fn create_record(&self, input: NewRecord) -> ConsistencyResult<RecordId> {
        let started_at = Instant::now();
        let title_chars = input.title.chars().count();
        let result = self.create_record_locked(input);
        let fields = match &result {
            Ok(id) => format!("id={id}"),
            Err(_) => format!("title_chars={title_chars}"),
        };
        log_outcome("record_create", &fields, started_at, &result);
        result
    }

    /// Applies the cross-store title decision table.
    ///
    /// Returns `false` when neither store has the title and `true` when both
    /// agree on one id; every disagreement is an error.
    pub fn exists_by_title(&self, title: &str) -> ConsistencyResult<bool> {
        let started_at = Instant::now();
        let result = {
            let _gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);
            let key = title_key(title);
            let _title = self.title_locks.lock(key.as_str());
            self.lookup_title(title).map(|found| found.is_some())
        };
        let fields = format!("title_chars={}", title.chars().count());
        log_outcome("record_exists", &fields, started_at, &result);
        result
    }

    /// Sets a new price in both stores and returns the agreed old price.
    ///
    /// # Errors
    /// - `NotFound` when neither store has the id.
    /// - `StoreInconsistency` when only one store has it.
    /// - `PriceMismatch` when stored prices already differ; nothing is written.
    pub fn update_price(&self, id: RecordId, new_price: f64) -> ConsistencyResult<f64> {
        let started_at = Instant::now();
        let result = self.update_price_locked(id, new_price);
        log_outcome("record_update_price", &format!("id={id}"), started_at, &result);
        result
    }

    /// Deletes a record from both stores.
    ///
    /// Returns `false` when neither store has the id.
    ///
    /// # Errors
    /// - `DeletionMismatch` when only one store has it; nothing is deleted.
    pub fn delete_by_id(&self, id: RecordId) -> ConsistencyResult<bool> {
        let started_at = Instant::now();
        let result = self.delete_by_id_locked(id);
        log_outcome("record_delete", &format!("id={id}"), started_at, &result);
        result
    }

    /// Returns the record count both stores agree on.
    pub fn count(&self) -> ConsistencyResult<u64> {
        let started_at = Instant::now();
        let result = {
            let _gate = self.gate.write().unwrap_or_else(PoisonError::into_inner);
            let (primary, secondary) = self.on_both(|store| store.count());
            match (primary?, secondary?) {
                (primary_count, secondary_count) if primary_count == secondary_count => {
                    Ok(primary_count)
                }
                (primary_count, secondary_count) => Err(ConsistencyError::CountMismatch {
                    primary_count,
                    secondary_count,
                }),
            }
        };
        log_outcome("record_count", "scope=all", started_at, &result);
        result
    }

    /// Reads one record from both stores and requires identical copies.
    ///
    /// Optional stronger read path; default reads go to one store only.
    pub fn find_by_id_verified(&self, id: RecordId) -> ConsistencyResult<Option<Record>> {
        let started_at = Instant::now();
        let result = {
            let _gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);
            let _id = self.id_locks.lock(&id);
            let (primary, secondary) = self.on_both(|store| store.find_by_id(id));
            match (primary?, secondary?) {
                (None, None) => Ok(None),
                (Some(left), Some(right)) if left == right => Ok(Some(left)),
                (Some(_), Some(_)) => Err(ConsistencyError::RecordMismatch { id }),
                (primary, secondary) => Err(self.presence_divergence(
                    RecordKey::Id(id),
                    primary.is_some(),
                    secondary.is_some(),
                )),
            }
        };
        log_outcome("record_read_verified", &format!("id={id}"), started_at, &result);
        result
    }

    fn create_record_locked(&self, input: NewRecord) -> ConsistencyResult<RecordId> {
        let _gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        let key = title_key(&input.title);
        let _title = self.title_locks.lock(key.as_str());

        if let Some(id) = self.lookup_title(&input.title)? {
            return Err(ConsistencyError::DuplicateTitle {
                title: input.title,
                id,
            });
        }

        let id = self.allocator.allocate();
        let _id = self.id_locks.lock(&id);
        let record = input.into_record(id);

        let (primary, secondary) = self.on_both(|store| store.insert(&record));
        match (primary, secondary) {
            (Ok(()), Ok(())) => Ok(id),
            (Err(primary), Err(secondary)) => {
                Err(ConsistencyError::StoreWriteFailed { primary, secondary })
            }
            (Ok(()), Err(failed)) => Err(self.partial_write(
                RecordKey::Id(id),
                failed,
                self.primary.as_ref(),
                |store| undo_insert(store, id),
            )),
            (Err(failed), Ok(())) => Err(self.partial_write(
                RecordKey::Id(id),
                failed,
                self.secondary.as_ref(),
                |store| undo_insert(store, id),
            )),
        }
    }

    fn update_price_locked(&self, id: RecordId, new_price: f64) -> ConsistencyResult<f64> {
        let _gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        let _id = self.id_locks.lock(&id);

        let (primary, secondary) = self.on_both(|store| store.find_by_id(id));
        let (current, other) = match (primary?, secondary?) {
            (None, None) => return Err(ConsistencyError::NotFound(id)),
            (Some(current), Some(other)) => (current, other),
            (primary, secondary) => {
                return Err(self.presence_divergence(
                    RecordKey::Id(id),
                    primary.is_some(),
                    secondary.is_some(),
                ))
            }
        };
        if current.price != other.price {
            return Err(ConsistencyError::PriceMismatch {
                id,
                primary_price: current.price,
                secondary_price: other.price,
            });
        }
        let old_price = current.price;

        let (primary, secondary) = self.on_both(|store| store.update_price(id, new_price));
        match (primary, secondary) {
            (Ok(Some(primary_price)), Ok(Some(secondary_price))) => {
                if primary_price == secondary_price {
                    Ok(primary_price)
                } else {
                    Err(ConsistencyError::PriceMismatch {
                        id,
                        primary_price,
                        secondary_price,
                    })
                }
            }
            (Ok(None), Ok(None)) => Err(ConsistencyError::NotFound(id)),
            (Ok(primary), Ok(secondary)) => Err(self.presence_divergence(
                RecordKey::Id(id),
                primary.is_some(),
                secondary.is_some(),
            )),
            (Err(primary), Err(secondary)) => {
                Err(ConsistencyError::StoreWriteFailed { primary, secondary })
            }
            (Ok(_), Err(failed)) => Err(self.partial_write(
                RecordKey::Id(id),
                failed,
                self.primary.as_ref(),
                |store| store.update_price(id, old_price).map(|_| ()),
            )),
            (Err(failed), Ok(_)) => Err(self.partial_write(
                RecordKey::Id(id),
                failed,
                self.secondary.as_ref(),
                |store| store.update_price(id, old_price).map(|_| ()),
            )),
        }
    }

    fn delete_by_id_locked(&self, id: RecordId) -> ConsistencyResult<bool> {
        let _gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        let (_lock, primary, secondary) = self.lock_record(id)?;

        let (primary_copy, secondary_copy) = match (primary, secondary) {
            (None, None) => return Ok(false),
            (Some(primary_copy), Some(secondary_copy)) => (primary_copy, secondary_copy),
            (primary, _) => {
                let (present_in, missing_from) = self.present_missing(primary.is_some());
                return Err(ConsistencyError::DeletionMismatch {
                    id,
                    present_in,
                    missing_from,
                });
            }
        };

        let (primary, secondary) = self.on_both(|store| store.delete_by_id(id));
        match (primary, secondary) {
            (Ok(primary_deleted), Ok(secondary_deleted)) if primary_deleted == secondary_deleted => {
                Ok(primary_deleted)
            }
            (Ok(primary_deleted), Ok(_)) => {
                let (present_in, missing_from) = self.present_missing(primary_deleted);
                Err(ConsistencyError::DeletionMismatch {
                    id,
                    present_in,
                    missing_from,
                })
            }
            (Err(primary), Err(secondary)) => {
                Err(ConsistencyError::StoreWriteFailed { primary, secondary })
            }
            (Ok(_), Err(failed)) => Err(self.partial_write(
                RecordKey::Id(id),
                failed,
                self.primary.as_ref(),
                |store| store.insert(&primary_copy),
            )),
            (Err(failed), Ok(_)) => Err(self.partial_write(
                RecordKey::Id(id),
                failed,
                self.secondary.as_ref(),
                |store| store.insert(&secondary_copy),
            )),
        }
    }

    fn lookup_title(&self, title: &str) -> ConsistencyResult<Option<RecordId>> {
        let (primary, secondary) = self.on_both(|store| store.find_by_title(title));
        match (primary?, secondary?) {
            (None, None) => Ok(None),
            (Some(primary_id), Some(secondary_id)) if primary_id == secondary_id => {
                Ok(Some(primary_id))
            }
            (Some(primary_id), Some(secondary_id)) => Err(ConsistencyError::IdMismatch {
                title: title.to_string(),
                primary_id,
                secondary_id,
            }),
            (primary, secondary) => Err(self.presence_divergence(
                RecordKey::Title(title.to_string()),
                primary.is_some(),
                secondary.is_some(),
            )),
        }
    }

    /// Locks `id` together with the title stripe of the record it names.
    ///
    /// Retries until the title observed under the lock matches the stripe
    /// taken, so concurrent title checks never see a half-applied delete.
    fn lock_record(
        &self,
        id: RecordId,
    ) -> ConsistencyResult<(RecordLock<'_>, Option<Record>, Option<Record>)> {
        let mut expected_key = match self.primary.find_by_id(id)? {
            Some(record) => Some(title_key(&record.title)),
            None => self
                .secondary
                .find_by_id(id)?
                .map(|record| title_key(&record.title)),
        };

        loop {
            let title_guard = expected_key
                .as_deref()
                .map(|key| self.title_locks.lock(key));
            let id_guard = self.id_locks.lock(&id);

            let (primary, secondary) = self.on_both(|store| store.find_by_id(id));
            let (primary, secondary) = (primary?, secondary?);
            let observed_key = primary
                .as_ref()
                .or(secondary.as_ref())
                .map(|record| title_key(&record.title));

            if observed_key == expected_key {
                let lock = RecordLock {
                    _title: title_guard,
                    _id: id_guard,
                };
                return Ok((lock, primary, secondary));
            }

            drop(id_guard);
            drop(title_guard);
            expected_key = observed_key;
        }
    }

    fn on_both<T: Send>(&self, op: impl Fn(&dyn RecordStore) -> T + Sync) -> (T, T) {
        fan_out(self.primary.as_ref(), self.secondary.as_ref(), op)
    }

    fn present_missing(&self, in_primary: bool) -> (String, String) {
        let (present, missing) = if in_primary {
            (&self.primary, &self.secondary)
        } else {
            (&self.secondary, &self.primary)
        };
        (present.name().to_string(), missing.name().to_string())
    }

    fn presence_divergence(
        &self,
        key: RecordKey,
        in_primary: bool,
        in_secondary: bool,
    ) -> ConsistencyError {
        debug_assert!(in_primary != in_secondary);
        let (present_in, missing_from) = self.present_missing(in_primary);
        ConsistencyError::StoreInconsistency {
            key,
            present_in,
            missing_from,
        }
    }

    fn partial_write(
        &self,
        key: RecordKey,
        failed: StoreError,
        succeeded: &dyn RecordStore,
        undo: impl FnOnce(&dyn RecordStore) -> StoreResult<()>,
    ) -> ConsistencyError {
        let compensated = match self.policy {
            PartialWritePolicy::LeaveAndFlag => false,
            PartialWritePolicy::Compensate => match undo(succeeded) {
                Ok(()) => true,
                Err(err) => {
                    error!(
                        "event=compensate module=consistency status=error store={} error_code={} error={}",
                        succeeded.name(),
                        err.code(),
                        err
                    );
                    false
                }
            },
        };
        ConsistencyError::PartialWriteFailure {
            key,
            failed,
            succeeded_store: succeeded.name().to_string(),
            compensated,
        }
    }
}

/// Runs `op` against both stores concurrently and waits for both results.
///
/// A panic on the spawned side is re-raised only after the local side
/// finished.
fn fan_out<T: Send>(
    primary: &dyn RecordStore,
    secondary: &dyn RecordStore,
    op: impl Fn(&dyn RecordStore) -> T + Sync,
) -> (T, T) {
    thread::scope(|scope| {
        let handle = scope.spawn(|| op(primary));
        let secondary_result = op(secondary);
        let primary_result = handle
            .join()
            .unwrap_or_else(|payload| panic::resume_unwind(payload));
        (primary_result, secondary_result)
    })
}

fn undo_insert(store: &dyn RecordStore, id: RecordId) -> StoreResult<()> {
    if store.delete_by_id(id)? {
        Ok(())
    } else {
        Err(StoreError::write_failed(
            store.name(),
            format!("record {id} vanished before compensation"),
        ))
    }
}

fn log_outcome<T>(
    event: &str,
    fields: &str,
    started_at: Instant,
    result: &ConsistencyResult<T>,
) {
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok(_) => debug!(
            "event={event} module=consistency status=ok {fields} duration_ms={duration_ms}"
        ),
        Err(err) if err.is_divergence() => error!(
            "event={event} module=consistency status=divergence {fields} duration_ms={duration_ms} error_code={} error={}",
            err.code(),
            err
        ),
        Err(err @ (ConsistencyError::NotFound(_) | ConsistencyError::DuplicateTitle { .. })) => {
            info!(
                "event={event} module=consistency status=rejected {fields} duration_ms={duration_ms} error_code={}",
                err.code()
            )
        }
        Err(err) => warn!(
            "event={event} module=consistency status=error {fields} duration_ms={duration_ms} error_code={} error={}",
            err.code(),
            err
        ),
    }
}
