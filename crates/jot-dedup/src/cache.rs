//! Content-addressed embedding cache using moka
//!
//! Vectors are keyed by the [`ContentHash`] of normalized text and never
//! evicted: an embedding for a given text is computed at most once per
//! cache lifetime, and the durable [`VectorStore`] extends that across
//! restarts.

use crate::embedder::Embedder;
use crate::error::EmbedError;
use crate::hash::{normalize, ContentHash};
use crate::store::{VectorMap, VectorStore};
use indexmap::IndexMap;
use moka::future::Cache;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared, immutable embedding vector
pub type Embedding = Arc<[f32]>;

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries in cache
    pub entry_count: u64,
    /// Texts sent to the embedder over the cache lifetime
    pub computed: u64,
}

/// Embedding cache with write-behind persistence
pub struct EmbeddingCache {
    inner: Cache<ContentHash, Embedding>,
    store: Arc<dyn VectorStore>,
    // one writer at a time so snapshots never interleave on disk
    persist_lock: tokio::sync::Mutex<()>,
    computed: std::sync::atomic::AtomicU64,
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("entry_count", &self.inner.entry_count())
            .finish_non_exhaustive()
    }
}

impl EmbeddingCache {
    /// Create empty cache backed by `store`
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            inner: Cache::builder().build(),
            store,
            persist_lock: tokio::sync::Mutex::new(()),
            computed: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Create cache and warm it from `store`
    ///
    /// An unreadable store is logged and the cache starts empty.
    pub async fn load(store: Arc<dyn VectorStore>) -> Self {
        let cache = Self::new(Arc::clone(&store));
        match store.load().await {
            Ok(entries) => {
                let count = entries.len();
                for (hash, vector) in entries {
                    cache.inner.insert(hash, Embedding::from(vector)).await;
                }
                tracing::info!("Embedding cache warmed with {} entr(ies)", count);
            }
            Err(err) => {
                tracing::warn!("Failed to load embedding cache, starting empty: {}", err);
            }
        }
        cache
    }

    /// Cached vector for `text`, if any
    pub async fn get(&self, text: &str) -> Option<Embedding> {
        self.inner.get(&ContentHash::of_text(text)).await
    }

    /// Check if `text` has a cached vector
    pub async fn contains(&self, text: &str) -> bool {
        self.get(text).await.is_some()
    }

    /// Vector for one text, computing it on a miss
    ///
    /// # Errors
    /// Propagates embedder failures
    pub async fn get_or_compute(
        &self,
        text: &str,
        embedder: &dyn Embedder,
    ) -> Result<Embedding, EmbedError> {
        let mut vectors = self
            .batch_get_or_compute(&[text.to_string()], embedder)
            .await?;
        vectors.pop().ok_or(EmbedError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }

    /// Vectors for `texts` in input order
    ///
    /// Distinct uncached normalized texts go to the embedder in exactly one
    /// call; when everything is cached the embedder is not called. New
    /// entries are persisted after the batch.
    ///
    /// # Errors
    /// Propagates embedder failures, or a count mismatch in its output.
    /// Nothing is cached when the batch fails.
    pub async fn batch_get_or_compute(
        &self,
        texts: &[String],
        embedder: &dyn Embedder,
    ) -> Result<Vec<Embedding>, EmbedError> {
        let keys: Vec<ContentHash> = texts.iter().map(|t| ContentHash::of_text(t)).collect();

        let mut resolved: HashMap<ContentHash, Embedding> = HashMap::with_capacity(keys.len());
        let mut missing: IndexMap<ContentHash, String> = IndexMap::new();
        for (key, text) in keys.iter().zip(texts) {
            if resolved.contains_key(key) || missing.contains_key(key) {
                continue;
            }
            match self.inner.get(key).await {
                Some(vector) => {
                    resolved.insert(*key, vector);
                }
                None => {
                    missing.insert(*key, normalize(text));
                }
            }
        }

        if !missing.is_empty() {
            let batch: Vec<String> = missing.values().cloned().collect();
            tracing::debug!(
                "Embedding cache miss for {} of {} text(s)",
                batch.len(),
                texts.len()
            );
            let vectors = embedder.embed(&batch).await?;
            if vectors.len() != batch.len() {
                return Err(EmbedError::CountMismatch {
                    expected: batch.len(),
                    actual: vectors.len(),
                });
            }
            self.computed
                .fetch_add(batch.len() as u64, std::sync::atomic::Ordering::Relaxed);

            for (key, vector) in missing.into_keys().zip(vectors) {
                // first writer wins if another task raced us to this text
                let stored = self
                    .inner
                    .entry(key)
                    .or_insert(Embedding::from(vector))
                    .await
                    .into_value();
                resolved.insert(key, stored);
            }
            self.persist().await;
        }

        keys.iter()
            .map(|key| {
                resolved.get(key).cloned().ok_or(EmbedError::CountMismatch {
                    expected: texts.len(),
                    actual: resolved.len(),
                })
            })
            .collect()
    }

    /// Write the current entries to the backing store
    ///
    /// Returns whether the write succeeded. A failure is logged and the
    /// cache keeps working from memory.
    pub async fn persist(&self) -> bool {
        let _guard = self.persist_lock.lock().await;
        let snapshot: VectorMap = self
            .inner
            .iter()
            .map(|(key, vector)| (*key, vector.to_vec()))
            .collect();

        match self.store.save(&snapshot).await {
            Ok(()) => {
                tracing::debug!("Persisted {} embedding(s)", snapshot.len());
                true
            }
            Err(err) => {
                tracing::warn!(
                    "Failed to persist embedding cache, continuing in memory: {}",
                    err
                );
                false
            }
        }
    }

    /// Get cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
            computed: self.computed.load(std::sync::atomic::Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::MockEmbedder;
    use crate::error::StoreError;
    use crate::store::{JsonFileStore, MemoryStore};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    fn length_vectors(texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect()
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    struct FailingStore;

    #[async_trait]
    impl VectorStore for FailingStore {
        async fn load(&self) -> Result<VectorMap, StoreError> {
            Err(StoreError::Unavailable("read-only".to_string()))
        }

        async fn save(&self, _entries: &VectorMap) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("read-only".to_string()))
        }
    }

    #[tokio::test]
    async fn batch_embeds_distinct_misses_once() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .withf(|batch: &[String]| batch == ["call dentist", "buy milk"])
            .times(1)
            .returning(|batch| Ok(length_vectors(batch)));

        let cache = EmbeddingCache::new(Arc::new(MemoryStore::new()));
        let input = texts(&["Call dentist", "buy milk", " CALL DENTIST "]);
        let vectors = cache.batch_get_or_compute(&input, &embedder).await.unwrap();

        assert_eq!(vectors.len(), 3);
        assert_eq!(&*vectors[0], &[12.0, 1.0]);
        assert_eq!(&*vectors[1], &[8.0, 1.0]);
        assert_eq!(vectors[0], vectors[2]);
    }

    #[tokio::test]
    async fn second_batch_is_served_from_cache() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .times(1)
            .returning(|batch| Ok(length_vectors(batch)));

        let cache = EmbeddingCache::new(Arc::new(MemoryStore::new()));
        let input = texts(&["a", "bb"]);
        let first = cache.batch_get_or_compute(&input, &embedder).await.unwrap();
        let second = cache.batch_get_or_compute(&input, &embedder).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.stats().computed, 2);
    }

    #[tokio::test]
    async fn partial_hit_embeds_only_misses() {
        let mut embedder = MockEmbedder::new();
        let mut seq = mockall::Sequence::new();
        embedder
            .expect_embed()
            .withf(|batch: &[String]| batch == ["a"])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|batch| Ok(length_vectors(batch)));
        embedder
            .expect_embed()
            .withf(|batch: &[String]| batch == ["ccc"])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|batch| Ok(length_vectors(batch)));

        let cache = EmbeddingCache::new(Arc::new(MemoryStore::new()));
        cache.get_or_compute("a", &embedder).await.unwrap();
        let vectors = cache
            .batch_get_or_compute(&texts(&["A", "ccc"]), &embedder)
            .await
            .unwrap();
        assert_eq!(&*vectors[1], &[3.0, 1.0]);
    }

    #[tokio::test]
    async fn embed_failure_caches_nothing() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .returning(|_| Err(EmbedError::Unavailable("offline".to_string())));

        let cache = EmbeddingCache::new(Arc::new(MemoryStore::new()));
        let result = cache.batch_get_or_compute(&texts(&["a"]), &embedder).await;

        assert!(matches!(result, Err(EmbedError::Unavailable(_))));
        assert!(!cache.contains("a").await);
    }

    #[tokio::test]
    async fn short_embedder_output_is_count_mismatch() {
        let mut embedder = MockEmbedder::new();
        embedder.expect_embed().returning(|_| Ok(vec![vec![1.0]]));

        let cache = EmbeddingCache::new(Arc::new(MemoryStore::new()));
        let result = cache
            .batch_get_or_compute(&texts(&["a", "b"]), &embedder)
            .await;
        assert!(matches!(
            result,
            Err(EmbedError::CountMismatch { expected: 2, actual: 1 })
        ));
    }

    #[tokio::test]
    async fn persistence_failure_is_not_fatal() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .times(1)
            .returning(|batch| Ok(length_vectors(batch)));

        let cache = EmbeddingCache::load(Arc::new(FailingStore)).await;
        let vectors = cache
            .batch_get_or_compute(&texts(&["a"]), &embedder)
            .await
            .unwrap();

        assert_eq!(&*vectors[0], &[1.0, 1.0]);
        assert!(cache.contains("a").await);
        assert!(!cache.persist().await);
    }

    #[tokio::test]
    async fn entries_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings_cache.json");

        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .times(1)
            .returning(|batch| Ok(length_vectors(batch)));
        let cache = EmbeddingCache::load(Arc::new(JsonFileStore::new(&path))).await;
        cache
            .batch_get_or_compute(&texts(&["Call dentist"]), &embedder)
            .await
            .unwrap();

        let mut untouched = MockEmbedder::new();
        untouched.expect_embed().never();
        let restarted = EmbeddingCache::load(Arc::new(JsonFileStore::new(&path))).await;
        let vector = restarted
            .get_or_compute("call dentist", &untouched)
            .await
            .unwrap();
        assert_eq!(&*vector, &[12.0, 1.0]);
    }

    #[tokio::test]
    async fn memory_store_receives_snapshot() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .returning(|batch| Ok(length_vectors(batch)));

        let store = Arc::new(MemoryStore::new());
        let cache = EmbeddingCache::new(store.clone());
        cache
            .batch_get_or_compute(&texts(&["x", "yy"]), &embedder)
            .await
            .unwrap();

        let saved = store.snapshot();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved.get(&ContentHash::of_text("YY")), Some(&vec![2.0, 1.0]));
    }
}
