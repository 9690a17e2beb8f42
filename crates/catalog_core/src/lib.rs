//! Core of the dual-store record catalog.
//! Every record mutation goes through the consistency manager, which keeps the
//! relational and document stores in lockstep.

pub mod config;
pub mod consistency;
pub mod db;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;

pub use config::{CatalogConfig, ConfigError};
pub use consistency::{
    ConsistencyError, ConsistencyManager, ConsistencyResult, ManagerOptions, PartialWritePolicy,
    RecordKey, StoreSelector,
};
pub use logging::{
    default_log_level, get_log_level, init_logging, logging_status, set_log_level, NamedLogger,
};
pub use model::filter::RecordFilter;
pub use model::record::{Genre, NewRecord, Record, RecordId, RecordValidationError};
pub use service::catalog_service::{CatalogError, CatalogResult, CatalogService};
pub use store::{
    DocumentRecordStore, RecordStore, SqliteRecordStore, StoreError, StoreResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
