use async_trait::async_trait;
use parking_lot::RwLock;
use snip_core::error::{Result, StorageError};
use snip_core::{ReadRepository, Repository, ShortCode, Stats, UrlRecord, UserId};
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Lookup structures shared by the memory and file backends.
///
/// Not synchronized on its own; owners wrap it in a single lock so that the
/// uniqueness check and the insert happen in one critical section.
#[derive(Debug, Default)]
pub(crate) struct UrlIndex {
    records: HashMap<ShortCode, UrlRecord>,
    /// original url -> code, active records only
    active_urls: HashMap<String, ShortCode>,
    /// owner -> codes in insertion order, including soft-deleted ones
    by_owner: HashMap<UserId, Vec<ShortCode>>,
}

impl UrlIndex {
    /// Fails if `original_url` is owned by an active record or `code` is in use.
    pub(crate) fn check_available(&self, code: &ShortCode, original_url: &str) -> Result<()> {
        if let Some(existing) = self.active_urls.get(original_url) {
            return Err(StorageError::UrlConflict(existing.to_string()));
        }
        if self.records.contains_key(code) {
            return Err(StorageError::CodeTaken(code.to_string()));
        }
        Ok(())
    }

    /// Adds a record. Returns `false` and keeps the existing entry if the
    /// code is already indexed.
    pub(crate) fn insert(&mut self, record: UrlRecord) -> bool {
        if self.records.contains_key(&record.short_code) {
            return false;
        }

        if record.is_active() {
            self.active_urls
                .entry(record.original_url.clone())
                .or_insert_with(|| record.short_code.clone());
        }
        self.by_owner
            .entry(record.owner.clone())
            .or_default()
            .push(record.short_code.clone());
        self.records.insert(record.short_code.clone(), record);
        true
    }

    pub(crate) fn get(&self, code: &ShortCode) -> Option<UrlRecord> {
        self.records.get(code).cloned()
    }

    pub(crate) fn active_by_owner(&self, owner: &UserId) -> Vec<UrlRecord> {
        let Some(codes) = self.by_owner.get(owner) else {
            return Vec::new();
        };

        codes
            .iter()
            .filter_map(|code| self.records.get(code))
            .filter(|record| record.is_active())
            .cloned()
            .collect()
    }

    pub(crate) fn soft_delete(&mut self, owner: &UserId, codes: &[ShortCode]) -> u64 {
        let mut deleted = 0;

        for code in codes {
            let Some(record) = self.records.get_mut(code) else {
                continue;
            };
            if record.owner != *owner || record.deleted {
                continue;
            }

            record.deleted = true;
            if self.active_urls.get(&record.original_url) == Some(code) {
                self.active_urls.remove(&record.original_url);
            }
            deleted += 1;
        }

        deleted
    }

    pub(crate) fn stats(&self) -> Stats {
        let mut owners = HashSet::new();
        let mut total_urls = 0;

        for record in self.records.values().filter(|r| r.is_active()) {
            total_urls += 1;
            owners.insert(&record.owner);
        }

        Stats {
            total_urls,
            total_users: owners.len() as u64,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

/// In-memory implementation of the Repository trait.
///
/// All state sits behind one `RwLock`: lookups share the lock, writes take
/// it exclusively, so two concurrent saves of the same URL cannot both pass
/// the uniqueness check.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    index: RwLock<UrlIndex>,
}

impl InMemoryRepository {
    /// Creates a new in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReadRepository for InMemoryRepository {
    async fn get(&self, code: &ShortCode) -> Result<Option<UrlRecord>> {
        Ok(self.index.read().get(code))
    }

    async fn get_by_owner(&self, owner: &UserId) -> Result<Vec<UrlRecord>> {
        Ok(self.index.read().active_by_owner(owner))
    }

    async fn stats(&self) -> Result<Stats> {
        Ok(self.index.read().stats())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn save(&self, code: &ShortCode, original_url: &str, owner: &UserId) -> Result<()> {
        let mut index = self.index.write();
        index.check_available(code, original_url)?;
        index.insert(UrlRecord::new(code.clone(), original_url, owner.clone()));
        trace!(code = %code, owner = %owner, "saved record in memory");
        Ok(())
    }

    async fn delete_by_owner(&self, owner: &UserId, codes: &[ShortCode]) -> Result<u64> {
        let deleted = self.index.write().soft_delete(owner, codes);
        trace!(owner = %owner, requested = codes.len(), deleted, "soft-deleted records in memory");
        Ok(deleted)
    }
}
