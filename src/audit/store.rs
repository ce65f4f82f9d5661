//! Audit persistence.
//!
//! # Design Decisions
//! - Stores are append-only; there is no update or delete
//! - `append` returns only after the entry is durable for that backend
//!   (in memory: pushed; on disk: written, flushed and fsynced)

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use crate::audit::types::{AuditFilter, AuditLogEntry};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("audit store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit entry serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("audit store unavailable: {0}")]
    Unavailable(String),
}

/// Durable, append-only audit trail.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError>;

    /// Matching entries, newest first.
    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>, StoreError>;
}

/// In-process store. Entries live as long as the process.
#[derive(Default)]
pub struct MemoryAuditStore {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Every entry in insertion order.
    pub async fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>, StoreError> {
        Ok(filter.apply(self.entries.read().await.iter().cloned()))
    }
}

/// JSON-lines file store. One entry per line.
pub struct JsonlAuditStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditStore {
    /// Open `path` for appending, creating it if needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        tracing::info!(path = %path.display(), "Audit log opened");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditStore for JsonlAuditStore {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>, StoreError> {
        let content = {
            // Hold the writer lock so a half-written line is never read.
            let _guard = self.file.lock().await;
            tokio::fs::read_to_string(&self.path).await?
        };

        let entries = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(n, line)| match serde_json::from_str::<AuditLogEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = n + 1,
                        error = %e,
                        "Skipping unreadable audit line"
                    );
                    None
                }
            });
        Ok(filter.apply(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::types::{AuditAction, AuditEvent, AuditSeverity};

    #[tokio::test]
    async fn test_memory_store_append_and_query() {
        let store = MemoryAuditStore::new();
        store
            .append(&AuditEvent::new(AuditAction::LoginFailure).into_entry(None))
            .await
            .unwrap();
        store
            .append(&AuditEvent::new(AuditAction::UserDeleted).into_entry(None))
            .await
            .unwrap();
        assert_eq!(store.len().await, 2);

        let critical = store
            .query(&AuditFilter {
                min_severity: Some(AuditSeverity::Critical),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].action, AuditAction::UserDeleted);
    }

    #[tokio::test]
    async fn test_jsonl_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let first = AuditEvent::new(AuditAction::DataExported)
            .detail("rows", 120)
            .into_entry(None);
        {
            let store = JsonlAuditStore::open(&path).await.unwrap();
            store.append(&first).await.unwrap();
        }

        let store = JsonlAuditStore::open(&path).await.unwrap();
        let second = AuditEvent::new(AuditAction::Logout).into_entry(None);
        store.append(&second).await.unwrap();

        let all = store.query(&AuditFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.contains(&first));
        assert!(all.contains(&second));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_jsonl_store_skips_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        std::fs::write(&path, "{not json}\n\n").unwrap();

        let store = JsonlAuditStore::open(&path).await.unwrap();
        store
            .append(&AuditEvent::new(AuditAction::SystemBackup).into_entry(None))
            .await
            .unwrap();

        let all = store.query(&AuditFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].action, AuditAction::SystemBackup);
    }
}
