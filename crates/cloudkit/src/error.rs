//! Error types for cloud kinds and backends.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while setting up kinds or backends.
///
/// Failures of individual provider calls are [`declarative::ProviderError`]s
/// and are reported per resource, not through this type.
#[derive(Debug, Error)]
pub enum Error {
    /// Reading or writing the state file failed
    #[error("state file {path}: {source}")]
    Io {
        /// Path of the state file
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The state file is not a valid snapshot
    #[error("state file {path} is not a valid snapshot: {source}")]
    Snapshot {
        /// Path of the state file
        path: PathBuf,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// Kind registration or reconciliation error
    #[error(transparent)]
    Declarative(#[from] declarative::Error),
}

/// Result type for cloudkit operations.
pub type Result<T> = std::result::Result<T, Error>;
