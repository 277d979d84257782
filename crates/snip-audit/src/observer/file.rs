use crate::error::AuditError;
use crate::event::AuditEvent;
use crate::observer::Observer;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Appends one JSON line per event to a file.
///
/// Writes are serialized by a mutex so concurrent deliveries never interleave
/// within a line.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileObserver {
    /// Opens `path` for appending, creating it if needed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Observer for FileObserver {
    fn name(&self) -> &str {
        "file"
    }

    async fn notify(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or(AuditError::Closed)?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), AuditError> {
        let Some(mut file) = self.file.lock().await.take() else {
            return Ok(());
        };
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AuditAction;
    use std::sync::Arc;

    fn event(url: &str) -> AuditEvent {
        AuditEvent::new(AuditAction::Shorten, Some("u1".to_string()), url)
    }

    #[tokio::test]
    async fn appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let observer = FileObserver::open(&path).await.unwrap();

        observer.notify(&event("https://a.example")).await.unwrap();
        observer.notify(&event("https://b.example")).await.unwrap();
        observer.close().await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<AuditEvent> = raw
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].url, "https://a.example");
        assert_eq!(lines[1].url, "https://b.example");
    }

    #[tokio::test]
    async fn keeps_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        std::fs::write(&path, "previous\n").unwrap();

        let observer = FileObserver::open(&path).await.unwrap();
        observer.notify(&event("https://a.example")).await.unwrap();
        observer.close().await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("previous\n"));
        assert_eq!(raw.lines().count(), 2);
    }

    #[tokio::test]
    async fn concurrent_writes_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let observer = Arc::new(FileObserver::open(&path).await.unwrap());

        let mut handles = vec![];
        for i in 0..32 {
            let observer = Arc::clone(&observer);
            handles.push(tokio::spawn(async move {
                observer
                    .notify(&event(&format!("https://example.com/{i}")))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        observer.close().await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        for line in raw.lines() {
            serde_json::from_str::<AuditEvent>(line).unwrap();
        }
        assert_eq!(raw.lines().count(), 32);
    }

    #[tokio::test]
    async fn notify_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let observer = FileObserver::open(dir.path().join("audit.log"))
            .await
            .unwrap();

        observer.close().await.unwrap();
        // closing twice is fine
        observer.close().await.unwrap();

        let err = observer
            .notify(&event("https://a.example"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::Closed));
    }
}
