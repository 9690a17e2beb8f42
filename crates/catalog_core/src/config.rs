//! Catalog runtime configuration.
//!
//! # Responsibility
//! - Describe where each store lives and how the manager behaves.
//! - Load that description from JSON.
//!
//! # Invariants
//! - A missing store path means an in-memory store.
//! - Unknown keys are rejected so typos fail loudly.

use crate::consistency::locks::DEFAULT_STRIPES;
use crate::consistency::{ManagerOptions, PartialWritePolicy, StoreSelector};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    /// SQLite database file for the primary store.
    pub sqlite_path: Option<PathBuf>,
    /// JSON collection file for the secondary store.
    pub document_path: Option<PathBuf>,
    /// Store serving reads when the caller does not pick one.
    pub default_store: StoreSelector,
    pub partial_write_policy: PartialWritePolicy,
    /// Mutex stripes per lock table.
    pub lock_stripes: usize,
    pub log_level: Option<String>,
    /// Absolute directory for rolling log files.
    pub log_dir: Option<PathBuf>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            sqlite_path: None,
            document_path: None,
            default_store: StoreSelector::Primary,
            partial_write_policy: PartialWritePolicy::Compensate,
            lock_stripes: DEFAULT_STRIPES,
            log_level: None,
            log_dir: None,
        }
    }
}

impl CatalogConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock_stripes == 0 {
            return Err(ConfigError::Invalid(
                "lock_stripes must be at least 1".to_string(),
            ));
        }
        if let Some(dir) = self.log_dir.as_deref() {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "log_dir must be an absolute path, got `{}`",
                    dir.display()
                )));
            }
        }
        Ok(())
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            partial_write_policy: self.partial_write_policy,
            lock_stripes: self.lock_stripes,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}
