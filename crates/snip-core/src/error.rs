use thiserror::Error;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised while validating caller-supplied identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
    #[error("invalid user id: {0}")]
    InvalidUserId(String),
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// The original URL is already owned by an active record.
    ///
    /// Carries the short code of that record so callers can answer idempotently.
    #[error("original url already shortened as {0}")]
    UrlConflict(String),
    /// The short code itself is already in use (active or soft-deleted).
    #[error("short code already taken: {0}")]
    CodeTaken(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage io failed: {0}")]
    Io(String),
    #[error("storage operation failed: {0}")]
    Operation(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}
