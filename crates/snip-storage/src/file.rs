use crate::memory::UrlIndex;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use snip_core::error::{Result, StorageError};
use snip_core::{ReadRepository, Repository, ShortCode, Stats, UrlRecord, UserId};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bytes read per step when scanning backwards for the closing bracket.
const TAIL_SCAN_CHUNK: u64 = 512;

/// On-disk shape of one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileRecord {
    uuid: String,
    short_url: String,
    original_url: String,
    user_id: String,
}

impl From<FileRecord> for UrlRecord {
    fn from(record: FileRecord) -> Self {
        UrlRecord::new(
            ShortCode::new_unchecked(record.short_url),
            record.original_url,
            UserId::new_unchecked(record.user_id),
        )
    }
}

/// File-backed implementation of the Repository trait.
///
/// The file holds a single JSON array that only ever grows: each save
/// replaces the closing `]` with `,` and appends the new object, so a write
/// costs the same no matter how large the file is. The whole array is read
/// once on [`FileRepository::open`] to rebuild the in-memory index, and every
/// lookup is served from that index.
///
/// Writers serialize on `file_lock`. The index `RwLock` is only taken for
/// the in-memory check and insert, never across disk I/O. A save runs on its
/// own task, so dropping the caller's future never leaves a half-written
/// record behind or a record on disk that the index does not know about.
///
/// Soft deletion is not persisted by this backend: `delete_by_owner` is a
/// no-op that reports zero deleted records.
#[derive(Debug)]
pub struct FileRepository {
    store: Arc<FileStore>,
}

#[derive(Debug)]
struct FileStore {
    path: PathBuf,
    index: RwLock<UrlIndex>,
    file_lock: Mutex<()>,
}

impl FileRepository {
    /// Opens the storage file at `path`, creating nothing until the first save.
    ///
    /// A missing or empty file is an empty store. A file whose last append was
    /// interrupted is cut back to its last complete record. Anything else that
    /// is not a JSON array of records fails with [`StorageError::InvalidData`].
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = read_all(&path).await?;

        let mut index = UrlIndex::default();
        for record in records {
            let code = record.short_url.clone();
            if !index.insert(record.into()) {
                warn!(code = %code, path = %path.display(), "skipping duplicate short code in storage file");
            }
        }

        info!(path = %path.display(), records = index.len(), "opened file storage");

        Ok(Self {
            store: Arc::new(FileStore {
                path,
                index: RwLock::new(index),
                file_lock: Mutex::new(()),
            }),
        })
    }

    /// Returns the path of the storage file.
    pub fn path(&self) -> &Path {
        &self.store.path
    }
}

impl FileStore {
    async fn save(&self, code: &ShortCode, original_url: &str, owner: &UserId) -> Result<()> {
        // Holding the file lock for the whole save makes check-then-insert
        // atomic with respect to other writers.
        let _guard = self.file_lock.lock().await;

        self.index.read().check_available(code, original_url)?;

        let record = FileRecord {
            uuid: Uuid::new_v4().to_string(),
            short_url: code.to_string(),
            original_url: original_url.to_string(),
            user_id: owner.to_string(),
        };
        self.append(&record).await?;

        self.index.write().insert(record.into());
        debug!(code = %code, owner = %owner, "appended record to storage file");
        Ok(())
    }

    /// Writes the record and the new closing bracket in a single write.
    async fn append(&self, record: &FileRecord) -> Result<()> {
        let body = serde_json::to_vec_pretty(record)
            .map_err(|e| StorageError::InvalidData(format!("cannot encode record: {e}")))?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .await?;
        let len = file.metadata().await?.len();

        let (offset, prefix): (u64, &[u8]) = match last_non_whitespace(&mut file, len).await? {
            None => (0, &b"[\n"[..]),
            Some((closing, b']')) => match last_non_whitespace(&mut file, closing).await? {
                Some((_, b'[')) => (closing, &b"\n"[..]),
                Some(_) => (closing, &b",\n"[..]),
                None => return Err(self.malformed_tail()),
            },
            Some(_) => return Err(self.malformed_tail()),
        };

        let mut tail = Vec::with_capacity(prefix.len() + body.len() + 2);
        tail.extend_from_slice(prefix);
        tail.extend_from_slice(&body);
        tail.extend_from_slice(b"\n]");

        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(&tail).await?;
        file.flush().await?;

        // whitespace that used to follow the old bracket
        let end = offset + tail.len() as u64;
        if end < len {
            file.set_len(end).await?;
        }

        Ok(())
    }

    fn malformed_tail(&self) -> StorageError {
        StorageError::InvalidData(format!(
            "{} does not end with a closing bracket",
            self.path.display()
        ))
    }
}

/// Returns the offset and value of the last non-whitespace byte before `end`.
async fn last_non_whitespace(file: &mut File, end: u64) -> Result<Option<(u64, u8)>> {
    let mut buf = vec![0u8; TAIL_SCAN_CHUNK as usize];
    let mut end = end;

    while end > 0 {
        let start = end.saturating_sub(TAIL_SCAN_CHUNK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(chunk).await?;

        if let Some(i) = chunk.iter().rposition(|b| !b.is_ascii_whitespace()) {
            return Ok(Some((start + i as u64, chunk[i])));
        }
        end = start;
    }

    Ok(None)
}

async fn read_all(path: &Path) -> Result<Vec<FileRecord>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    match serde_json::from_slice(&bytes) {
        Ok(records) => Ok(records),
        // a prefix of a valid array: the last append never finished
        Err(err) if err.is_eof() => repair_torn_tail(path, &bytes).await,
        Err(err) => Err(StorageError::InvalidData(format!("{}: {err}", path.display()))),
    }
}

/// Cuts the file back to its last complete record and closes the array again.
async fn repair_torn_tail(path: &Path, bytes: &[u8]) -> Result<Vec<FileRecord>> {
    let unrecoverable = || {
        StorageError::InvalidData(format!(
            "{} is truncated and cannot be repaired",
            path.display()
        ))
    };

    let cut = last_complete_record_end(bytes).ok_or_else(unrecoverable)?;
    let mut repaired = bytes[..cut].to_vec();
    repaired.extend_from_slice(b"\n]");
    let records: Vec<FileRecord> =
        serde_json::from_slice(&repaired).map_err(|_| unrecoverable())?;

    let mut file = OpenOptions::new().write(true).open(path).await?;
    file.set_len(cut as u64).await?;
    file.seek(SeekFrom::End(0)).await?;
    file.write_all(b"\n]").await?;
    file.sync_all().await?;

    warn!(
        path = %path.display(),
        kept = records.len(),
        dropped_bytes = bytes.len() - cut,
        "repaired interrupted append in storage file"
    );
    Ok(records)
}

/// Records are pretty-printed objects whose closing brace starts a line, and
/// JSON strings never contain a raw newline, so `\n}` only ends a record.
fn last_complete_record_end(bytes: &[u8]) -> Option<usize> {
    if let Some(pos) = bytes.windows(2).rposition(|pair| pair == b"\n}") {
        return Some(pos + 2);
    }

    // no complete record, keep only the opening bracket
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace())?;
    (bytes[start] == b'[').then_some(start + 1)
}

#[async_trait]
impl ReadRepository for FileRepository {
    async fn get(&self, code: &ShortCode) -> Result<Option<UrlRecord>> {
        Ok(self.store.index.read().get(code))
    }

    async fn get_by_owner(&self, owner: &UserId) -> Result<Vec<UrlRecord>> {
        Ok(self.store.index.read().active_by_owner(owner))
    }

    async fn stats(&self) -> Result<Stats> {
        Ok(self.store.index.read().stats())
    }
}

#[async_trait]
impl Repository for FileRepository {
    async fn save(&self, code: &ShortCode, original_url: &str, owner: &UserId) -> Result<()> {
        let store = Arc::clone(&self.store);
        let (code, original_url, owner) = (code.clone(), original_url.to_string(), owner.clone());

        // the spawned save runs to completion even if this future is dropped
        tokio::spawn(async move { store.save(&code, &original_url, &owner).await })
            .await
            .map_err(|e| StorageError::Operation(format!("file save task failed: {e}")))?
    }

    async fn delete_by_owner(&self, owner: &UserId, codes: &[ShortCode]) -> Result<u64> {
        debug!(
            owner = %owner,
            requested = codes.len(),
            "file storage does not persist deletions, ignoring"
        );
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn code(s: &str) -> ShortCode {
        ShortCode::new_unchecked(s)
    }

    fn user(s: &str) -> UserId {
        UserId::new_unchecked(s)
    }

    fn storage_path(dir: &TempDir) -> PathBuf {
        dir.path().join("urls.json")
    }

    #[tokio::test]
    async fn open_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::open(storage_path(&dir)).await.unwrap();

        assert_eq!(repo.stats().await.unwrap(), Stats::default());
        assert!(!repo.path().exists());
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = storage_path(&dir);

        {
            let repo = FileRepository::open(&path).await.unwrap();
            repo.save(&code("abc123"), "https://example.com", &user("u1"))
                .await
                .unwrap();
            repo.save(&code("def456"), "https://example.org", &user("u2"))
                .await
                .unwrap();
        }

        let repo = FileRepository::open(&path).await.unwrap();
        let record = repo.get(&code("def456")).await.unwrap().unwrap();
        assert_eq!(record.original_url, "https://example.org");
        assert_eq!(record.owner, user("u2"));
        assert_eq!(repo.get_by_owner(&user("u1")).await.unwrap().len(), 1);

        let err = repo
            .save(&code("xyz000"), "https://example.com", &user("u3"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UrlConflict(existing) if existing == "abc123"));
    }

    #[tokio::test]
    async fn file_is_a_json_array_of_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = storage_path(&dir);
        let repo = FileRepository::open(&path).await.unwrap();

        repo.save(&code("abc123"), "https://example.com", &user("u1"))
            .await
            .unwrap();
        repo.save(&code("def456"), "https://example.org", &user("u1"))
            .await
            .unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["short_url"], "abc123");
        assert_eq!(parsed[0]["original_url"], "https://example.com");
        assert_eq!(parsed[0]["user_id"], "u1");
        assert!(parsed[1]["uuid"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn conflicting_save_does_not_touch_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = storage_path(&dir);
        let repo = FileRepository::open(&path).await.unwrap();

        repo.save(&code("abc123"), "https://example.com", &user("u1"))
            .await
            .unwrap();
        let before = std::fs::read(&path).unwrap();

        let err = repo
            .save(&code("abc123"), "https://other.example", &user("u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::CodeTaken(_)));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn corrupted_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = storage_path(&dir);

        for content in ["{\"not\": \"an array\"}", "[{\"uuid\": 1}]", "hello", "[\n{} x"] {
            std::fs::write(&path, content).unwrap();
            let err = FileRepository::open(&path).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidData(_)), "{content}");
        }
    }

    #[tokio::test]
    async fn interrupted_append_is_cut_back_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = storage_path(&dir);
        {
            let repo = FileRepository::open(&path).await.unwrap();
            repo.save(&code("abc123"), "https://example.com", &user("u1"))
                .await
                .unwrap();
        }

        // overwrite the closing bracket with half of the next record
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.truncate(raw.len() - 1);
        raw.push_str(",\n{\n  \"uuid\": \"0b6e\",\n  \"short_url\": \"def");
        std::fs::write(&path, raw).unwrap();

        let repo = FileRepository::open(&path).await.unwrap();
        assert_eq!(repo.stats().await.unwrap().total_urls, 1);
        assert!(repo.get(&code("abc123")).await.unwrap().is_some());

        repo.save(&code("def456"), "https://example.org", &user("u1"))
            .await
            .unwrap();
        let reopened = FileRepository::open(&path).await.unwrap();
        assert_eq!(reopened.stats().await.unwrap().total_urls, 2);
    }

    #[tokio::test]
    async fn interrupted_first_append_leaves_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = storage_path(&dir);
        std::fs::write(&path, "[\n{\"uuid\": \"1\",").unwrap();

        let repo = FileRepository::open(&path).await.unwrap();
        assert_eq!(repo.stats().await.unwrap(), Stats::default());

        repo.save(&code("abc123"), "https://example.com", &user("u1"))
            .await
            .unwrap();
        let parsed: Vec<serde_json::Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[tokio::test]
    async fn save_after_trailing_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = storage_path(&dir);
        std::fs::write(
            &path,
            "[\n{\"uuid\": \"1\", \"short_url\": \"abc123\", \"original_url\": \"https://example.com\", \"user_id\": \"u1\"}\n]\n\n  \n",
        )
        .unwrap();

        let repo = FileRepository::open(&path).await.unwrap();
        assert_eq!(repo.stats().await.unwrap().total_urls, 1);
        repo.save(&code("def456"), "https://example.org", &user("u1"))
            .await
            .unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.ends_with(']'));
        let reopened = FileRepository::open(&path).await.unwrap();
        assert_eq!(reopened.stats().await.unwrap().total_urls, 2);
    }

    #[tokio::test]
    async fn save_into_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = storage_path(&dir);

        for content in ["[]", "[\n]\n", "  \n"] {
            std::fs::write(&path, content).unwrap();
            let repo = FileRepository::open(&path).await.unwrap();
            repo.save(&code("abc123"), "https://example.com", &user("u1"))
                .await
                .unwrap();

            let parsed: Vec<serde_json::Value> =
                serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
            assert_eq!(parsed.len(), 1, "{content:?}");
        }
    }

    #[tokio::test]
    async fn cancelled_saves_keep_file_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let path = storage_path(&dir);
        let repo = FileRepository::open(&path).await.unwrap();

        for i in 0..200u64 {
            let limit = std::time::Duration::from_micros(i % 50);
            let _ = tokio::time::timeout(
                limit,
                repo.save(
                    &code(&format!("t{i:05}")),
                    &format!("https://timed.example/{i}"),
                    &user("u1"),
                ),
            )
            .await;

            repo.save(
                &code(&format!("n{i:05}")),
                &format!("https://normal.example/{i}"),
                &user("u1"),
            )
            .await
            .unwrap();
        }

        // let saves whose callers gave up finish in the background
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        let expected = repo.stats().await.unwrap().total_urls;
        assert!(expected >= 200);
        let reopened = FileRepository::open(&path).await.unwrap();
        assert_eq!(reopened.stats().await.unwrap().total_urls, expected);
    }

    #[tokio::test]
    async fn delete_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::open(storage_path(&dir)).await.unwrap();
        repo.save(&code("abc123"), "https://example.com", &user("u1"))
            .await
            .unwrap();

        let deleted = repo
            .delete_by_owner(&user("u1"), &[code("abc123")])
            .await
            .unwrap();

        assert_eq!(deleted, 0);
        assert!(!repo.get(&code("abc123")).await.unwrap().unwrap().deleted);
    }

    #[tokio::test]
    async fn concurrent_saves_keep_file_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let path = storage_path(&dir);
        let repo = Arc::new(FileRepository::open(&path).await.unwrap());

        let mut handles = vec![];
        for i in 0..20u32 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.save(
                    &ShortCode::new_unchecked(format!("c{:05}", i)),
                    &format!("https://example{i}.com"),
                    &UserId::new_unchecked("u1"),
                )
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let reopened = FileRepository::open(&path).await.unwrap();
        assert_eq!(reopened.stats().await.unwrap().total_urls, 20);
    }
}
