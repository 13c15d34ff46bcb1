//! Persistent vector stores
//!
//! A store holds the durable copy of the embedding cache: a map from
//! content hash to vector that survives process restarts.

use crate::error::StoreError;
use crate::hash::ContentHash;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Persisted `hash → vector` entries
pub type VectorMap = BTreeMap<ContentHash, Vec<f32>>;

/// Durable backing for the embedding cache
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Load every persisted entry
    async fn load(&self) -> Result<VectorMap, StoreError>;

    /// Replace the persisted entries
    async fn save(&self, entries: &VectorMap) -> Result<(), StoreError>;
}

/// JSON file keyed by hex content hash
///
/// Writes go to a sibling temporary file which is then renamed over the
/// target, so a crash mid-write leaves the previous file intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store at `path`; the file need not exist yet
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl VectorStore for JsonFileStore {
    async fn load(&self) -> Result<VectorMap, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(VectorMap::new()),
            Err(err) => return Err(self.io_error(err)),
        };
        let entries: VectorMap = serde_json::from_slice(&bytes)?;
        tracing::debug!(
            "Loaded {} cached embedding(s) from {}",
            entries.len(),
            self.path.display()
        );
        Ok(entries)
    }

    async fn save(&self, entries: &VectorMap) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| self.io_error(err))?;
        }

        let json = serde_json::to_vec(entries)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|err| self.io_error(err))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|err| self.io_error(err))?;
        Ok(())
    }
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<VectorMap>,
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create store pre-populated with `entries`
    #[inline]
    #[must_use]
    pub fn with_entries(entries: VectorMap) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Copy of the stored entries
    #[must_use]
    pub fn snapshot(&self) -> VectorMap {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn load(&self) -> Result<VectorMap, StoreError> {
        Ok(self.snapshot())
    }

    async fn save(&self, entries: &VectorMap) -> Result<(), StoreError> {
        *self.entries.lock() = entries.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entries() -> VectorMap {
        let mut map = VectorMap::new();
        map.insert(ContentHash::of_text("call dentist"), vec![0.1, 0.2, 0.3]);
        map.insert(ContentHash::of_text("buy milk"), vec![0.9, 0.0, -0.1]);
        map
    }

    #[tokio::test]
    async fn json_file_missing_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn json_file_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("embeddings_cache.json");

        JsonFileStore::new(&path).save(&entries()).await.unwrap();
        let loaded = JsonFileStore::new(&path).load().await.unwrap();

        assert_eq!(loaded, entries());
        assert!(!dir.path().join("cache").join("embeddings_cache.json.tmp").exists());
    }

    #[tokio::test]
    async fn json_file_corrupt_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"{not json").unwrap();

        let result = JsonFileStore::new(&path).load().await;
        assert!(matches!(result, Err(StoreError::Format(_))));
    }

    #[tokio::test]
    async fn json_file_unwritable_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        // parent is a regular file, so the directory cannot be created
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();

        let result = JsonFileStore::new(blocker.join("cache.json"))
            .save(&entries())
            .await;
        assert!(matches!(result, Err(StoreError::Io { .. })));
    }

    #[tokio::test]
    async fn memory_store_round() {
        let store = MemoryStore::new();
        store.save(&entries()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), entries());
    }
}
