//! CLI error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// CLI errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The database file does not exist.
    ///
    /// This typically means the registry has not been initialized yet.
    #[error("database not found at {path}. Run 'crid init --owner <id>' first")]
    DatabaseNotFound { path: PathBuf },

    /// `init` was run without an owner on the command line or in config.
    #[error("no owner given: pass --owner or set registry.owner in the config file")]
    MissingOwner,

    /// No data directory could be determined and no path was configured.
    #[error("cannot determine a database location: pass --db or set storage.path")]
    NoDataDir,

    /// Configuration is invalid or missing required fields.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred in the registry.
    #[error(transparent)]
    Registry(#[from] registry::Error),

    /// An error occurred in the storage layer.
    #[error(transparent)]
    Storage(#[from] storage::Error),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
