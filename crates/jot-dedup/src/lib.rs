//! Jot Dedup
//!
//! Decides whether candidate tasks already exist, by meaning rather than
//! spelling.
//!
//! # Core Concepts
//!
//! - [`ContentHash`]: Blake3 hash of normalized text, the cache key
//! - [`EmbeddingCache`]: Compute-once vector cache with durable [`VectorStore`]
//! - [`Embedder`]: Text → vector capability ([`HttpEmbedder`] for OpenAI-compatible APIs)
//! - [`SimilarityEngine`]: Cosine-similarity duplicate detection with strict fallback
//!
//! # Example
//!
//! ```rust,ignore
//! use jot_dedup::{EmbeddingCache, JsonFileStore, SimilarityEngine};
//!
//! let cache = EmbeddingCache::load(Arc::new(JsonFileStore::new(path))).await;
//! let engine = SimilarityEngine::new(embedder, Arc::new(cache));
//!
//! let report = engine.find_duplicates(&candidates, &existing, 0.8).await;
//! if report.is_degraded() {
//!     println!("exact-match fallback in use");
//! }
//! ```

#![warn(unreachable_pub)]

mod cache;
mod embedder;
mod error;
mod hash;
mod similarity;
mod store;

pub use cache::{CacheStats, Embedding, EmbeddingCache};
pub use embedder::{Embedder, HttpEmbedder};
pub use error::{EmbedError, StoreError};
pub use hash::{normalize, ContentHash, HashError};
pub use similarity::{
    cosine_similarity, DetectionMode, DuplicateDecision, DuplicateReport, SimilarityEngine,
};
pub use store::{JsonFileStore, MemoryStore, VectorMap, VectorStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::MockEmbedder;
    use std::sync::Arc;

    #[tokio::test]
    async fn repeated_checks_embed_once() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .times(1)
            .returning(|batch| Ok(batch.iter().map(|_| vec![1.0, 0.0]).collect()));

        let cache = Arc::new(EmbeddingCache::new(Arc::new(MemoryStore::new())));
        let engine = SimilarityEngine::new(Arc::new(embedder), cache.clone());
        let candidates = vec!["Buy milk".to_string()];
        let existing = vec!["Call dentist".to_string()];

        let first = engine.find_duplicates(&candidates, &existing, 0.8).await;
        let second = engine.find_duplicates(&candidates, &existing, 0.8).await;

        assert_eq!(first, second);
        assert_eq!(cache.stats().computed, 2);
    }
}
