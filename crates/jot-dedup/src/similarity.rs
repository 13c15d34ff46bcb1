//! Semantic duplicate detection
//!
//! Candidates are compared against existing texts by cosine similarity of
//! their embeddings. When embeddings are unavailable for any reason the
//! engine falls back to strict equality of trimmed, lowercased text and
//! reports the degraded mode to the caller. The fallback is exact:
//! punctuation or wording variants never match.

use crate::cache::{Embedding, EmbeddingCache};
use crate::embedder::Embedder;
use crate::error::EmbedError;
use crate::hash::normalize;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Verdict for one candidate text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateDecision {
    /// Candidate matches an existing text
    pub is_duplicate: bool,
    /// Closest existing text (semantic) or the equal one (fallback)
    pub best_match: Option<String>,
    /// Best cosine similarity; absent in fallback mode or with nothing to compare
    pub score: Option<f64>,
}

impl DuplicateDecision {
    /// Unique, nothing compared
    #[inline]
    #[must_use]
    pub fn unique() -> Self {
        Self {
            is_duplicate: false,
            best_match: None,
            score: None,
        }
    }
}

/// How decisions were reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DetectionMode {
    /// Embedding similarity
    Semantic,
    /// Strict text equality
    Fallback {
        /// Why embeddings were not used
        reason: String,
    },
}

/// Decisions for a batch of candidates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateReport {
    /// One decision per distinct candidate text, in first-seen order
    pub decisions: IndexMap<String, DuplicateDecision>,
    /// Detection mode used for every decision
    pub mode: DetectionMode,
}

impl DuplicateReport {
    /// Decision for a candidate
    #[inline]
    #[must_use]
    pub fn decision(&self, candidate: &str) -> Option<&DuplicateDecision> {
        self.decisions.get(candidate)
    }

    /// Check if the strict fallback was used
    #[inline]
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self.mode, DetectionMode::Fallback { .. })
    }

    /// Number of duplicate candidates
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.decisions.values().filter(|d| d.is_duplicate).count()
    }
}

/// Cosine similarity in `[-1, 1]`
///
/// Returns `None` for vectors of different length and `0.0` when either
/// vector has zero norm. Rounding never pushes the result out of range.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let x64 = f64::from(x);
        let y64 = f64::from(y);
        dot += x64 * y64;
        norm_a += x64 * x64;
        norm_b += y64 * y64;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }
    Some((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}

/// Duplicate detector over an embedding cache
#[derive(Clone)]
pub struct SimilarityEngine {
    embedder: Option<Arc<dyn Embedder>>,
    cache: Arc<EmbeddingCache>,
}

impl std::fmt::Debug for SimilarityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityEngine")
            .field("semantic", &self.embedder.is_some())
            .field("cache", &self.cache)
            .finish()
    }
}

impl SimilarityEngine {
    /// Engine using `embedder` through `cache`
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>, cache: Arc<EmbeddingCache>) -> Self {
        Self {
            embedder: Some(embedder),
            cache,
        }
    }

    /// Engine that only ever uses the strict fallback
    #[must_use]
    pub fn fallback_only(cache: Arc<EmbeddingCache>) -> Self {
        Self {
            embedder: None,
            cache,
        }
    }

    /// Check if semantic comparison is configured
    #[inline]
    #[must_use]
    pub fn is_semantic(&self) -> bool {
        self.embedder.is_some()
    }

    /// Decide for each candidate whether it duplicates an existing text
    ///
    /// `threshold` is the minimum cosine similarity counted as a duplicate.
    /// With no existing texts every candidate is unique and nothing is
    /// embedded. Embedding failures switch the whole batch to the strict
    /// fallback.
    pub async fn find_duplicates(
        &self,
        candidates: &[String],
        existing: &[String],
        threshold: f64,
    ) -> DuplicateReport {
        if candidates.is_empty() {
            return DuplicateReport {
                decisions: IndexMap::new(),
                mode: self.idle_mode(),
            };
        }
        if existing.is_empty() {
            let decisions = candidates
                .iter()
                .map(|c| (c.clone(), DuplicateDecision::unique()))
                .collect();
            return DuplicateReport {
                decisions,
                mode: self.idle_mode(),
            };
        }

        let Some(embedder) = &self.embedder else {
            return fallback(candidates, existing, "embeddings disabled".to_string());
        };

        match self
            .semantic(embedder.as_ref(), candidates, existing, threshold)
            .await
        {
            Ok(decisions) => DuplicateReport {
                decisions,
                mode: DetectionMode::Semantic,
            },
            Err(err) => {
                tracing::warn!("Semantic duplicate detection unavailable, using exact match: {}", err);
                fallback(candidates, existing, err.to_string())
            }
        }
    }

    fn idle_mode(&self) -> DetectionMode {
        if self.is_semantic() {
            DetectionMode::Semantic
        } else {
            DetectionMode::Fallback {
                reason: "embeddings disabled".to_string(),
            }
        }
    }

    async fn semantic(
        &self,
        embedder: &dyn Embedder,
        candidates: &[String],
        existing: &[String],
        threshold: f64,
    ) -> Result<IndexMap<String, DuplicateDecision>, EmbedError> {
        let all: Vec<String> = existing.iter().chain(candidates).cloned().collect();
        let vectors = self.cache.batch_get_or_compute(&all, embedder).await?;
        let (existing_vectors, candidate_vectors) = vectors.split_at(existing.len());

        let mut decisions = IndexMap::with_capacity(candidates.len());
        for (candidate, vector) in candidates.iter().zip(candidate_vectors) {
            if decisions.contains_key(candidate) {
                continue;
            }
            let (best_index, best_score) = best_match(vector, existing_vectors)?;
            let is_duplicate = best_score >= threshold;
            let matched = &existing[best_index];

            tracing::debug!(
                "{:<40} {:>6.3}  {:<40} {}",
                candidate,
                best_score,
                matched,
                if is_duplicate { "DUPLICATE" } else { "unique" }
            );
            decisions.insert(
                candidate.clone(),
                DuplicateDecision {
                    is_duplicate,
                    best_match: Some(matched.clone()),
                    score: Some(best_score),
                },
            );
        }

        tracing::info!(
            "Semantic check: {} of {} candidate(s) duplicate at threshold {:.2}",
            decisions.values().filter(|d| d.is_duplicate).count(),
            decisions.len(),
            threshold
        );
        Ok(decisions)
    }
}

/// Argmax of similarity against `existing`; first index wins ties
///
/// A NaN score (non-finite vector components) counts as `0.0`.
fn best_match(vector: &Embedding, existing: &[Embedding]) -> Result<(usize, f64), EmbedError> {
    let mut best = (0, f64::NEG_INFINITY);
    for (index, other) in existing.iter().enumerate() {
        let score = cosine_similarity(vector, other).ok_or(EmbedError::DimensionMismatch {
            expected: other.len(),
            actual: vector.len(),
        })?;
        let score = if score.is_nan() { 0.0 } else { score };
        if score > best.1 {
            best = (index, score);
        }
    }
    Ok(best)
}

fn fallback(candidates: &[String], existing: &[String], reason: String) -> DuplicateReport {
    let mut known: HashMap<String, &String> = HashMap::with_capacity(existing.len());
    for text in existing {
        known.entry(normalize(text)).or_insert(text);
    }

    let mut decisions = IndexMap::with_capacity(candidates.len());
    for candidate in candidates {
        let matched = known.get(&normalize(candidate));
        decisions
            .entry(candidate.clone())
            .or_insert_with(|| DuplicateDecision {
                is_duplicate: matched.is_some(),
                best_match: matched.map(|m| (*m).clone()),
                score: None,
            });
    }

    tracing::info!(
        "Exact-match check: {} of {} candidate(s) duplicate",
        decisions.values().filter(|d| d.is_duplicate).count(),
        decisions.len()
    );
    DuplicateReport {
        decisions,
        mode: DetectionMode::Fallback { reason },
    }
}
