//! Error types for the local cache store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during cache database operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Failed to open or create the database file.
    #[error("Failed to open cache database at {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// Failed to create the directory holding the database file.
    #[error("Failed to create cache directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to run a schema migration.
    #[error("Cache migration failed: {0}")]
    Migration(#[from] rusqlite::Error),

    /// A query failed.
    #[error("Cache query failed: {0}")]
    Query(String),

    /// No picture row exists for the requested id.
    #[error("Picture not found in cache: {0}")]
    NotFound(String),

    /// Failed to spawn a blocking task.
    #[error("Failed to spawn blocking task: {0}")]
    Spawn(#[from] tokio::task::JoinError),

    /// The database schema version is newer than supported.
    #[error("Cache schema version {found} is newer than supported version {expected}")]
    UnsupportedSchemaVersion { found: i32, expected: i32 },
}

impl CacheError {
    /// Create a Query error from a rusqlite error.
    pub fn query(source: rusqlite::Error) -> Self {
        Self::Query(source.to_string())
    }
}
