//! Record access facade.
//!
//! # Responsibility
//! - Route writes, deletes, existence checks and counts through the
//!   consistency manager.
//! - Serve reads and listings from exactly one caller-selected store.
//! - Reject invalid caller input before it reaches the manager.
//!
//! # Invariants
//! - Single-store reads are never cross-checked; `find_by_id_verified` is the
//!   explicit opt-in for a dual read.
//! - A read without a selector uses the configured default store.
//! - Listing filters are validated before either store sees them.

use crate::config::{CatalogConfig, ConfigError};
use crate::consistency::{ConsistencyError, ConsistencyManager, StoreSelector};
use crate::model::filter::RecordFilter;
use crate::model::record::{validate_price, NewRecord, Record, RecordId, RecordValidationError};
use crate::store::{DocumentRecordStore, RecordStore, SqliteRecordStore, StoreError};
use log::{debug, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Service error for catalog use-cases.
#[derive(Debug)]
pub enum CatalogError {
    /// Caller input was rejected before reaching the manager.
    Validation(RecordValidationError),
    /// Store selector names neither role nor adapter.
    UnknownStore(String),
    Config(ConfigError),
    Consistency(ConsistencyError),
}

impl CatalogError {
    /// Whether the underlying error reports store divergence.
    pub fn is_divergence(&self) -> bool {
        matches!(self, Self::Consistency(err) if err.is_divergence())
    }
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::UnknownStore(name) => write!(f, "invalid persistence method: {name}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::Consistency(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CatalogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::UnknownStore(_) => None,
            Self::Config(err) => Some(err),
            Self::Consistency(err) => Some(err),
        }
    }
}

impl From<RecordValidationError> for CatalogError {
    fn from(value: RecordValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<ConfigError> for CatalogError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<ConsistencyError> for CatalogError {
    fn from(value: ConsistencyError) -> Self {
        Self::Consistency(value)
    }
}

impl From<StoreError> for CatalogError {
    fn from(value: StoreError) -> Self {
        Self::Consistency(ConsistencyError::Store(value))
    }
}

/// Catalog facade over the consistency manager.
pub struct CatalogService {
    manager: ConsistencyManager,
    default_store: StoreSelector,
}

impl CatalogService {
    pub fn new(manager: ConsistencyManager, default_store: StoreSelector) -> Self {
        Self {
            manager,
            default_store,
        }
    }

    /// Builds both stores from `config` and starts the manager.
    ///
    /// The SQLite store is primary; the document store is secondary.
    pub fn open(config: &CatalogConfig) -> CatalogResult<Self> {
        config.validate()?;
        let primary: Arc<dyn RecordStore> = Arc::new(match config.sqlite_path.as_deref() {
            Some(path) => SqliteRecordStore::open(path),
            None => SqliteRecordStore::in_memory(),
        });
        let secondary: Arc<dyn RecordStore> =
            Arc::new(match config.document_path.as_deref() {
                Some(path) => DocumentRecordStore::open(path),
                None => DocumentRecordStore::in_memory(),
            });

        let manager = ConsistencyManager::start(primary, secondary, config.manager_options())?;
        info!(
            "event=catalog_open module=service status=ok default_store={}",
            manager.store(config.default_store).name()
        );
        Ok(Self::new(manager, config.default_store))
    }

    pub fn manager(&self) -> &ConsistencyManager {
        &self.manager
    }

    pub fn default_store(&self) -> StoreSelector {
        self.default_store
    }

    /// Liveness check.
    pub fn health(&self) -> &'static str {
        "OK"
    }

    /// Validates and creates a record; returns its shared id.
    pub fn create_record(&self, input: NewRecord) -> CatalogResult<RecordId> {
        debug!(
            "event=request module=service op=create_record title_chars={}",
            input.title.chars().count()
        );
        input.validate()?;
        Ok(self.manager.create_record(input)?)
    }

    pub fn exists_by_title(&self, title: &str) -> CatalogResult<bool> {
        debug!(
            "event=request module=service op=exists_by_title title_chars={}",
            title.chars().count()
        );
        Ok(self.manager.exists_by_title(title)?)
    }

    /// Validates the price, updates both stores and returns the old price.
    pub fn update_price(&self, id: RecordId, new_price: f64) -> CatalogResult<f64> {
        debug!("event=request module=service op=update_price id={id}");
        validate_price(new_price)?;
        Ok(self.manager.update_price(id, new_price)?)
    }

    pub fn delete_record(&self, id: RecordId) -> CatalogResult<bool> {
        debug!("event=request module=service op=delete_record id={id}");
        Ok(self.manager.delete_by_id(id)?)
    }

    pub fn count(&self) -> CatalogResult<u64> {
        debug!("event=request module=service op=count");
        Ok(self.manager.count()?)
    }

    /// Reads one record from a single store.
    pub fn find_by_id(
        &self,
        id: RecordId,
        store: Option<StoreSelector>,
    ) -> CatalogResult<Option<Record>> {
        debug!("event=request module=service op=find_by_id id={id}");
        Ok(self.select(store).find_by_id(id)?)
    }

    /// Reads one record from both stores and requires identical copies.
    pub fn find_by_id_verified(&self, id: RecordId) -> CatalogResult<Option<Record>> {
        Ok(self.manager.find_by_id_verified(id)?)
    }

    pub fn get_title(
        &self,
        id: RecordId,
        store: Option<StoreSelector>,
    ) -> CatalogResult<Option<String>> {
        Ok(self.find_by_id(id, store)?.map(|record| record.title))
    }

    /// Lists matching records from a single store, ordered by title.
    ///
    /// # Errors
    /// - `Validation` when a price bound is not finite.
    pub fn list_records(
        &self,
        filter: &RecordFilter,
        store: Option<StoreSelector>,
    ) -> CatalogResult<Vec<Record>> {
        debug!(
            "event=request module=service op=list_records genres={}",
            filter.genres.len()
        );
        filter.validate()?;
        Ok(self.select(store).list_filtered(filter)?)
    }

    /// Maps `primary`, `secondary`, or an adapter name to a selector.
    ///
    /// Matching is case-insensitive.
    pub fn resolve_store(&self, name: &str) -> CatalogResult<StoreSelector> {
        let trimmed = name.trim();
        let candidates = [StoreSelector::Primary, StoreSelector::Secondary];
        candidates
            .into_iter()
            .find(|selector| {
                let role = match selector {
                    StoreSelector::Primary => "primary",
                    StoreSelector::Secondary => "secondary",
                };
                trimmed.eq_ignore_ascii_case(role)
                    || trimmed.eq_ignore_ascii_case(self.manager.store(*selector).name())
            })
            .ok_or_else(|| CatalogError::UnknownStore(trimmed.to_string()))
    }

    fn select(&self, store: Option<StoreSelector>) -> &dyn RecordStore {
        self.manager.store(store.unwrap_or(self.default_store))
    }
}
