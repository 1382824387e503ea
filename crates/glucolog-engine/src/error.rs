//! Error types for glucolog-engine.

/// Result type for glucolog-engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in glucolog-engine.
///
/// Absence of data is never an error: queries over users or windows with no
/// buckets return empty results.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed identifier or date parameter; not retryable.
    #[error(transparent)]
    Validation(glucolog_types::ParseError),

    /// Failure at the persistence boundary; the caller may retry the whole
    /// failed call.
    #[error(transparent)]
    Store(glucolog_store::Error),
}

impl From<glucolog_types::ParseError> for Error {
    fn from(err: glucolog_types::ParseError) -> Self {
        Self::Validation(err)
    }
}

impl From<glucolog_store::Error> for Error {
    fn from(err: glucolog_store::Error) -> Self {
        // Identifier checks run inside the store; lift them back out so
        // callers see one validation class regardless of where the check
        // happened to run.
        match err {
            glucolog_store::Error::Invalid(e) => Self::Validation(e),
            other => Self::Store(other),
        }
    }
}
