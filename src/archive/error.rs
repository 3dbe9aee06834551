//! Archive error types
//!
//! Defines all errors that can occur in the archive and index layers.

use thiserror::Error;

/// Errors that can occur while reading or writing the local archive
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The index database rejected an operation
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Persisted index rows for a stream are unreadable or inconsistent
    #[error("Index corruption for {key}: {reason}")]
    IndexCorruption { key: String, reason: String },

    /// Interval arguments violate a structural requirement
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

/// Result type alias for archive operations
pub type ArchiveResult<T> = Result<T, ArchiveError>;
