//! Catalog domain model.
//!
//! # Responsibility
//! - Define canonical data structures exchanged with every store adapter.
//! - Keep store-native shapes out of the core.
//!
//! # Invariants
//! - Every record is identified by one shared `RecordId`.
//! - Adapters translate to and from these types, never expose their own.

pub mod filter;
pub mod record;
