//! Dual-store consistency core.
//!
//! # Responsibility
//! - Own the shared identity space for both stores.
//! - Detect divergence on every operation that touches both stores.
//!
//! # Invariants
//! - This is the only module aware that two stores exist.
//! - Divergence is reported, never repaired by preferring one store.

pub mod allocator;
pub mod error;
pub mod locks;
pub mod manager;

pub use allocator::IdentityAllocator;
pub use error::{ConsistencyError, ConsistencyResult, RecordKey};
pub use manager::{ConsistencyManager, ManagerOptions, PartialWritePolicy, StoreSelector};
