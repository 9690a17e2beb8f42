//! SQLite bootstrap for the relational record store.
//!
//! # Responsibility
//! - Open and configure SQLite connections.
//! - Apply schema migrations in deterministic order.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - The relational store must not touch record data before migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Bootstrap step a SQLite call belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbStage {
    /// Opening the database file or memory handle.
    Connect,
    /// Connection pragmas and busy timeout.
    Configure,
    /// Reading `user_version` and applying pending migrations.
    Migrate,
}

impl DbStage {
    fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Configure => "configure",
            Self::Migrate => "migrate",
        }
    }
}

#[derive(Debug)]
pub enum DbError {
    Sqlite {
        stage: DbStage,
        source: rusqlite::Error,
    },
    /// The file was written by a newer build of the catalog.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl DbError {
    /// Adapter for `map_err` tagging a SQLite failure with its stage.
    pub fn at(stage: DbStage) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| Self::Sqlite { stage, source }
    }

    /// Stable code used in `db_open` log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Sqlite {
                stage: DbStage::Connect,
                ..
            } => "db_connect_failed",
            Self::Sqlite {
                stage: DbStage::Configure,
                ..
            } => "db_configure_failed",
            Self::Sqlite {
                stage: DbStage::Migrate,
                ..
            } => "db_migrate_failed",
            Self::UnsupportedSchemaVersion { .. } => "db_schema_unsupported",
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite { stage, source } => {
                write!(f, "sqlite {} failed: {source}", stage.as_str())
            }
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "records schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite { source, .. } => Some(source),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}
