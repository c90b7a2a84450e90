//! Checkpoint stores: the durable set of record ids already processed.
//!
//! `append` has union semantics and must be durable before it returns; the
//! run controller calls it once per settled wave. `clear` deletes the
//! checkpoint and is only called when a run leaves nothing unprocessed.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use labelwave_core::Progress;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::StoreError;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self) -> Result<Progress, StoreError>;
    async fn append(&self, ids: &[i64]) -> Result<(), StoreError>;
    async fn clear(&self) -> Result<(), StoreError>;
}

/// JSON file checkpoint: `{"processedIds": [...], "lastUpdated": "..."}`.
///
/// The whole file is rewritten on each append through a temporary sibling
/// and a rename, so an interrupted write leaves the previous checkpoint
/// intact.
pub struct FileCheckpoint {
    path: PathBuf,
    cache: tokio::sync::Mutex<Option<Progress>>,
}

impl FileCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: tokio::sync::Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Progress, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| StoreError::CorruptCheckpoint {
                    path: self.path.clone(),
                    source,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Progress::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, progress: &Progress) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(progress)?;
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpoint {
    async fn load(&self) -> Result<Progress, StoreError> {
        let progress = self.read().await?;
        debug!(path = %self.path.display(), ids = progress.len(), "loaded checkpoint");
        *self.cache.lock().await = Some(progress.clone());
        Ok(progress)
    }

    async fn append(&self, ids: &[i64]) -> Result<(), StoreError> {
        let mut cache = self.cache.lock().await;
        let mut progress = match cache.take() {
            Some(p) => p,
            None => self.read().await?,
        };
        progress.extend(ids.iter().copied());
        let written = self.write(&progress).await;
        *cache = Some(progress);
        written
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut cache = self.cache.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => info!(path = %self.path.display(), "checkpoint deleted"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        *cache = Some(Progress::default());
        Ok(())
    }
}

/// In-memory checkpoint for tests.
#[derive(Debug, Default)]
pub struct MemoryCheckpoint {
    progress: Mutex<Progress>,
    appends: AtomicUsize,
    cleared: AtomicUsize,
}

impl MemoryCheckpoint {
    pub fn new(progress: Progress) -> Self {
        Self {
            progress: Mutex::new(progress),
            ..Self::default()
        }
    }

    /// Current contents without going through the trait.
    pub fn snapshot(&self) -> Progress {
        self.progress
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn append_count(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }

    pub fn clear_count(&self) -> usize {
        self.cleared.load(Ordering::SeqCst)
    }
}

fn poisoned() -> StoreError {
    StoreError::Other("memory checkpoint lock poisoned".into())
}

#[async_trait]
impl CheckpointStore for MemoryCheckpoint {
    async fn load(&self) -> Result<Progress, StoreError> {
        Ok(self.progress.lock().map_err(|_| poisoned())?.clone())
    }

    async fn append(&self, ids: &[i64]) -> Result<(), StoreError> {
        self.progress
            .lock()
            .map_err(|_| poisoned())?
            .extend(ids.iter().copied());
        self.appends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.progress.lock().map_err(|_| poisoned())? = Progress::default();
        self.cleared.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileCheckpoint::new(tmp.path().join("progress.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_is_durable_and_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("progress.json");

        let store = FileCheckpoint::new(&path);
        store.append(&[1, 2, 3]).await.unwrap();
        store.append(&[3, 4]).await.unwrap();
        drop(store);

        // A fresh instance sees everything the previous one appended.
        let reopened = FileCheckpoint::new(&path);
        let progress = reopened.load().await.unwrap();
        assert_eq!(
            progress.processed_ids.iter().copied().collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert!(progress.last_updated.is_some());
        assert!(!tmp.path().join("progress.json.tmp").exists());
    }

    #[tokio::test]
    async fn clear_deletes_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("progress.json");
        let store = FileCheckpoint::new(&path);
        store.append(&[1]).await.unwrap();
        assert!(path.exists());

        store.clear().await.unwrap();
        assert!(!path.exists());
        assert!(store.load().await.unwrap().is_empty());

        // Clearing twice is fine.
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn reads_legacy_file_format() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("progress.json");
        std::fs::write(&path, r#"{"processedIds": [10, 11], "lastUpdated": ""}"#).unwrap();

        let progress = FileCheckpoint::new(&path).load().await.unwrap();
        assert!(progress.contains(10) && progress.contains(11));
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("progress.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = FileCheckpoint::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptCheckpoint { .. }));
    }

    #[tokio::test]
    async fn memory_checkpoint_counts_calls() {
        let store = MemoryCheckpoint::default();
        store.append(&[1, 2]).await.unwrap();
        store.append(&[2]).await.unwrap();
        assert_eq!(store.append_count(), 2);
        assert_eq!(store.snapshot().len(), 2);
        store.clear().await.unwrap();
        assert!(store.snapshot().is_empty());
        assert_eq!(store.clear_count(), 1);
    }
}
