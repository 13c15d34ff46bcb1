//! Testing utilities for the Jot workspace
//!
//! Shared fixtures and in-memory fakes for the embedding service and the
//! task tracker.

#![allow(missing_docs)]

use async_trait::async_trait;
use jot_core::{Pipeline, PipelineConfig, TaskId, TaskTracker, TaskUploadOrchestrator, TrackerError};
use jot_dedup::{normalize, EmbedError, Embedder, EmbeddingCache, MemoryStore, SimilarityEngine};
use jot_record::{ExtractionRecord, TaskPriority};
use jot_review::InMemorySessionStore;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Two to-do items, the second below a 0.9 threshold
pub const SCENARIO_JSON: &str = r#"{
    "to_do": [
        {"task": "Call dentist", "confidence": 0.95},
        {"task": "Fix the report", "confidence": 0.6}
    ]
}"#;

pub fn scenario_record() -> ExtractionRecord {
    ExtractionRecord::from_json(SCENARIO_JSON).unwrap()
}

/// A daily page with a due date, priorities and gratitude entries
pub fn daily_record() -> ExtractionRecord {
    ExtractionRecord::from_value(serde_json::json!({
        "date": {"value": "2025-06-12", "confidence": 0.99},
        "prepare_priority": [
            {"task": "Finish slides", "confidence": 0.97}
        ],
        "to_do": [
            {"task": "Call dentist", "confidence": 0.95},
            {"task": "Fix the reprot", "confidence": 0.55},
            {"item": "Buy milk", "confidence": 0.92}
        ],
        "i_am_grateful_for": [
            {"item": "Sunny morning", "confidence": 0.4}
        ],
        "daily": [
            {"hour": "9", "activities": "standup", "confidence": 0.3}
        ],
        "reflect": {"text": "Good day", "confidence": 0.8}
    }))
    .unwrap()
}

pub const VECTOR_DIMENSIONS: usize = 32;

/// Deterministic bag-of-words vector over whitespace tokens
pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; VECTOR_DIMENSIONS];
    for word in normalize(text).split_whitespace() {
        let bucket = word
            .bytes()
            .fold(0usize, |hash, byte| hash.wrapping_mul(31).wrapping_add(usize::from(byte)));
        vector[bucket % VECTOR_DIMENSIONS] += 1.0;
    }
    vector
}

/// Embedder that counts calls and serves scripted or bag-of-words vectors
#[derive(Debug, Default)]
pub struct CountingEmbedder {
    calls: AtomicUsize,
    texts_seen: Mutex<Vec<String>>,
    vectors: Mutex<HashMap<String, Vec<f32>>>,
    failing: AtomicBool,
}

impl CountingEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `vector` for `text`, compared after normalization
    pub fn with_vector(self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.lock().insert(normalize(text), vector);
        self
    }

    pub fn failing() -> Self {
        let embedder = Self::new();
        embedder.set_failing(true);
        embedder
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every text sent so far, across all calls
    pub fn texts_seen(&self) -> Vec<String> {
        self.texts_seen.lock().clone()
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbedError::Unavailable("embedding service down".to_string()));
        }
        self.texts_seen.lock().extend(texts.iter().cloned());

        let vectors = self.vectors.lock();
        Ok(texts
            .iter()
            .map(|text| {
                vectors
                    .get(&normalize(text))
                    .cloned()
                    .unwrap_or_else(|| bag_of_words(text))
            })
            .collect())
    }
}

/// Task the fake tracker created
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedTask {
    pub id: TaskId,
    pub text: String,
    pub priority: TaskPriority,
    pub scope: String,
}

/// In-memory tracker with scripted failures
#[derive(Debug, Default)]
pub struct ScriptedTracker {
    existing: Mutex<HashMap<String, Vec<String>>>,
    failing: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    listing_fails: AtomicBool,
    delay: Mutex<Option<Duration>>,
    created: Mutex<Vec<CreatedTask>>,
    next_id: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_existing<I, S>(self, scope: &str, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.existing
            .lock()
            .entry(scope.to_string())
            .or_default()
            .extend(texts.into_iter().map(Into::into));
        self
    }

    /// Creating `text` returns an error
    pub fn failing_on(self, text: &str) -> Self {
        self.failing.lock().insert(text.to_string());
        self
    }

    /// Creating `text` never completes
    pub fn hanging_on(self, text: &str) -> Self {
        self.hanging.lock().insert(text.to_string());
        self
    }

    /// Every creation takes `delay`
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = Some(delay);
        self
    }

    pub fn with_listing_failure(self) -> Self {
        self.set_listing_failure(true);
        self
    }

    /// Start or end a listing outage
    pub fn set_listing_failure(&self, failing: bool) {
        self.listing_fails.store(failing, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<CreatedTask> {
        self.created.lock().clone()
    }

    pub fn created_texts(&self) -> Vec<String> {
        self.created.lock().iter().map(|task| task.text.clone()).collect()
    }

    /// Highest number of creations observed running at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskTracker for ScriptedTracker {
    async fn list_existing_tasks(&self, scope: &str) -> Result<Vec<String>, TrackerError> {
        if self.listing_fails.load(Ordering::SeqCst) {
            return Err(TrackerError::Status {
                status: 503,
                body: "service unavailable".to_string(),
            });
        }
        Ok(self.existing.lock().get(scope).cloned().unwrap_or_default())
    }

    async fn create_task(
        &self,
        text: &str,
        priority: TaskPriority,
        scope: &str,
    ) -> Result<TaskId, TrackerError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let result = self.create(text, priority, scope).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl ScriptedTracker {
    async fn create(
        &self,
        text: &str,
        priority: TaskPriority,
        scope: &str,
    ) -> Result<TaskId, TrackerError> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let hangs = self.hanging.lock().contains(text);
        if hangs {
            std::future::pending::<()>().await;
        }
        let fails = self.failing.lock().contains(text);
        if fails {
            return Err(TrackerError::Rejected(format!("cannot create '{text}'")));
        }

        let id = TaskId(format!("task-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1));
        self.created.lock().push(CreatedTask {
            id: id.clone(),
            text: text.to_string(),
            priority,
            scope: scope.to_string(),
        });
        self.existing
            .lock()
            .entry(scope.to_string())
            .or_default()
            .push(text.to_string());
        Ok(id)
    }
}

pub fn memory_cache() -> Arc<EmbeddingCache> {
    Arc::new(EmbeddingCache::new(Arc::new(MemoryStore::new())))
}

pub fn semantic_engine(embedder: Arc<CountingEmbedder>) -> SimilarityEngine {
    SimilarityEngine::new(embedder, memory_cache())
}

pub fn fallback_engine() -> SimilarityEngine {
    SimilarityEngine::fallback_only(memory_cache())
}

/// Pipeline over in-memory sessions with the given collaborators
pub fn pipeline(
    config: PipelineConfig,
    tracker: Arc<ScriptedTracker>,
    engine: SimilarityEngine,
) -> Pipeline {
    let orchestrator = TaskUploadOrchestrator::new(tracker, engine, config.similarity_threshold)
        .with_max_concurrency(config.upload.max_concurrency)
        .with_create_timeout(config.upload.create_timeout());
    Pipeline::new(config, Arc::new(InMemorySessionStore::new()), orchestrator)
}
