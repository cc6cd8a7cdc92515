use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON on disk, or a value that cannot be serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Session not found
    #[error("Session not found: {0}")]
    NotFound(String),

    /// A lock could not be acquired in time
    #[error("Timed out after {waited:?} waiting for lock on {path}")]
    LockTimeout {
        /// Lock file or database that was contended
        path: PathBuf,
        /// How long the caller waited
        waited: Duration,
    },

    /// Session key is not a plain file stem
    #[error("Invalid session key: {0:?}")]
    InvalidKey(String),
}

impl StoreError {
    /// Whether this error is a lock timeout
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, StoreError::LockTimeout { .. })
    }
}
