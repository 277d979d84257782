use snip_core::error::CoreError;
use snip_core::{ShortCode, StorageError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShortenerError>;

#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    /// The URL is already shortened. Callers may treat this as success and
    /// hand out the existing code.
    #[error("url already shortened as {short_code}")]
    Conflict { short_code: ShortCode },
    #[error("short code not found: {0}")]
    NotFound(ShortCode),
    #[error("short code was deleted: {0}")]
    Gone(ShortCode),
    #[error("no free short code after {attempts} attempts")]
    Exhausted { attempts: u32 },
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
    #[error("invalid user id: {0}")]
    InvalidUserId(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<CoreError> for ShortenerError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::InvalidShortCode(message) => Self::InvalidShortCode(message),
            CoreError::InvalidUserId(message) => Self::InvalidUserId(message),
        }
    }
}

/// Converts a StorageError to a ShortenerError.
pub(crate) fn storage_to_shortener_error(e: StorageError) -> ShortenerError {
    match e {
        StorageError::UrlConflict(existing) => ShortenerError::Conflict {
            short_code: ShortCode::new_unchecked(existing),
        },
        other => ShortenerError::Storage(other.to_string()),
    }
}
