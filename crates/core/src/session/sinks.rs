//! Collaborators notified when a break is verified

use crate::error::StoreError;
use crate::models::{BreakCompleted, BREAK_COMPLETED_EVENT};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

/// Key under which the completion timestamp is stored
pub const LAST_BREAK_COMPLETED_KEY: &str = "last_break_completed_at";

/// Receives `break_completed` events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: &BreakCompleted);
}

/// Persists completion timestamps (milliseconds since the Unix epoch)
#[async_trait]
pub trait CompletionStore: Send + Sync {
    async fn record_completion(&self, key: &str, timestamp_ms: i64) -> Result<(), StoreError>;

    async fn last_completion(&self, key: &str) -> Result<Option<i64>, StoreError>;
}

/// JSON key-value file written atomically through a temp file
#[derive(Debug)]
pub struct FileCompletionStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileCompletionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, i64>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, entries: &BTreeMap<String, i64>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(entries)?;
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &json).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CompletionStore for FileCompletionStore {
    async fn record_completion(&self, key: &str, timestamp_ms: i64) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), timestamp_ms);
        self.save(&entries).await?;
        debug!(path = %self.path.display(), key = %key, "Completion recorded");
        Ok(())
    }

    async fn last_completion(&self, key: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.load().await?.get(key).copied())
    }
}

/// In-memory store that also keeps every write, in order
#[derive(Debug, Default)]
pub struct MemoryCompletionStore {
    writes: Mutex<Vec<(String, i64)>>,
}

impl MemoryCompletionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<(String, i64)> {
        self.writes
            .lock()
            .map(|writes| writes.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionStore for MemoryCompletionStore {
    async fn record_completion(&self, key: &str, timestamp_ms: i64) -> Result<(), StoreError> {
        self.writes
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .push((key.to_string(), timestamp_ms));
        Ok(())
    }

    async fn last_completion(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let writes = self.writes.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(writes
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, ts)| *ts))
    }
}

/// Fans events out to any number of broadcast subscribers
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    tx: broadcast::Sender<BreakCompleted>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BreakCompleted> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventSink for BroadcastEventSink {
    async fn emit(&self, event: &BreakCompleted) {
        // No subscribers is not an error
        let delivered = self.tx.send(event.clone()).unwrap_or(0);
        debug!(
            event = BREAK_COMPLETED_EVENT,
            session_id = %event.session_id,
            subscribers = delivered,
            "Event published"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn event() -> BreakCompleted {
        BreakCompleted {
            session_id: "s-1".to_string(),
            result_label: "Close_eyes".to_string(),
            confidence: 0.92,
            completed_at: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state").join("eyebreak.json");
        let store = FileCompletionStore::new(&path);

        assert_eq!(
            store.last_completion(LAST_BREAK_COMPLETED_KEY).await.unwrap(),
            None
        );

        store
            .record_completion(LAST_BREAK_COMPLETED_KEY, 1_000)
            .await
            .unwrap();
        store
            .record_completion(LAST_BREAK_COMPLETED_KEY, 2_000)
            .await
            .unwrap();

        assert_eq!(
            store.last_completion(LAST_BREAK_COMPLETED_KEY).await.unwrap(),
            Some(2_000)
        );
        assert!(!path.with_extension("tmp").exists());

        let reopened = FileCompletionStore::new(&path);
        assert_eq!(
            reopened
                .last_completion(LAST_BREAK_COMPLETED_KEY)
                .await
                .unwrap(),
            Some(2_000)
        );
    }

    #[tokio::test]
    async fn test_file_store_keeps_other_keys() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        std::fs::write(&path, r#"{"other_key": 7}"#).unwrap();

        let store = FileCompletionStore::new(&path);
        store
            .record_completion(LAST_BREAK_COMPLETED_KEY, 42)
            .await
            .unwrap();

        assert_eq!(store.last_completion("other_key").await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileCompletionStore::new(&path);
        assert!(matches!(
            store.last_completion(LAST_BREAK_COMPLETED_KEY).await,
            Err(StoreError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_store_records_writes() {
        let store = MemoryCompletionStore::new();
        store.record_completion("a", 1).await.unwrap();
        store.record_completion("a", 3).await.unwrap();

        assert_eq!(store.writes().len(), 2);
        assert_eq!(store.last_completion("a").await.unwrap(), Some(3));
        assert_eq!(store.last_completion("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_broadcast_sink_delivers() {
        let sink = BroadcastEventSink::new(8);
        let mut rx = sink.subscribe();

        sink.emit(&event()).await;
        assert_eq!(rx.recv().await.unwrap(), event());
    }

    #[tokio::test]
    async fn test_broadcast_sink_without_subscribers() {
        let sink = BroadcastEventSink::new(8);
        sink.emit(&event()).await;
    }
}
