//! Error types for identifier and date parsing in glucolog-types.

use thiserror::Error;

/// Errors that can occur when validating identifiers or parsing dates.
///
/// This error type is storage-agnostic; database errors belong in
/// glucolog-store.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Malformed user or device identifier.
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Date string that is not `YYYY-MM-DD`.
    #[error("Invalid date {0:?}: expected YYYY-MM-DD")]
    InvalidDate(String),

    /// Timestamp outside the representable range.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Result type alias using glucolog-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
