use crate::error::Result;
use crate::shortcode::ShortCode;
use crate::user::UserId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A stored URL record in the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    /// The short code, primary key of the record.
    pub short_code: ShortCode,
    /// The original URL that was shortened.
    pub original_url: String,
    /// The user that first shortened the URL.
    pub owner: UserId,
    /// Soft-delete marker. Deleted records resolve as gone.
    pub deleted: bool,
}

impl UrlRecord {
    /// Creates a new active record.
    pub fn new(short_code: ShortCode, original_url: impl Into<String>, owner: UserId) -> Self {
        Self {
            short_code,
            original_url: original_url.into(),
            owner,
            deleted: false,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.deleted
    }
}

/// Aggregate counts over the active records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_urls: u64,
    pub total_users: u64,
}

/// A read-only view of a repository.
#[async_trait]
pub trait ReadRepository: Send + Sync + 'static {
    /// Retrieves the record for a given short code, soft-deleted or not.
    /// Returns `None` if the code was never stored.
    async fn get(&self, code: &ShortCode) -> Result<Option<UrlRecord>>;

    /// Returns every active record owned by `owner`, in no particular order.
    async fn get_by_owner(&self, owner: &UserId) -> Result<Vec<UrlRecord>>;

    /// Counts active records and their distinct owners.
    async fn stats(&self) -> Result<Stats>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait Repository: ReadRepository {
    /// Stores a new active record.
    ///
    /// Returns `Err(UrlConflict(existing))` if an active record already maps
    /// `original_url`, and `Err(CodeTaken)` if `code` is already in use.
    async fn save(&self, code: &ShortCode, original_url: &str, owner: &UserId) -> Result<()>;

    /// Soft-deletes the given codes that are owned by `owner` and still active.
    /// Codes owned by someone else are ignored. Returns how many records were
    /// newly marked as deleted.
    async fn delete_by_owner(&self, owner: &UserId, codes: &[ShortCode]) -> Result<u64>;
}
