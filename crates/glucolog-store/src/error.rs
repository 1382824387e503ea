//! Error types for glucolog-store.

use std::path::PathBuf;

use time::Date;

/// Result type for glucolog-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in glucolog-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A merge failed; carries the bucket key for retry/diagnosis.
    #[error("Merge failed for device {device_id} on {day}: {source}")]
    Merge {
        device_id: String,
        day: Date,
        source: rusqlite::Error,
    },

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Malformed user or device identifier, or unrepresentable timestamp.
    #[error(transparent)]
    Invalid(#[from] glucolog_types::ParseError),
}
