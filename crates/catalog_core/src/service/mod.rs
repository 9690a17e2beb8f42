//! Catalog use-case services.
//!
//! # Responsibility
//! - Expose the record operations consumed by the request layer.
//! - Keep callers decoupled from store and consistency details.

pub mod catalog_service;
