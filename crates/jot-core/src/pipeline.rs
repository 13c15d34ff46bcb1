//! Conversation-facing pipeline
//!
//! Ties the stages together for one conversation session: ingest a page,
//! optionally review its low-confidence items, then promote the (patched)
//! record into the tracker.

use crate::config::PipelineConfig;
use crate::error::{ConfigError, PipelineError};
use crate::orchestrator::{TaskUploadOrchestrator, UploadReport};
use crate::tracker::{RestTaskTracker, TaskTracker};
use jot_dedup::{EmbeddingCache, HttpEmbedder, JsonFileStore, SimilarityEngine};
use jot_record::{
    AddressError, ExtractionRecord, PageType, RecordError, SchemaRegistry, DEFAULT_DUE,
};
use jot_review::{
    patch, triage, FlaggedItem, InMemorySessionStore, NextItem, PendingPage, ReviewError,
    ReviewProgress, ReviewState, SessionHandle, SessionId, SessionStore,
};
use serde::Serialize;
use std::sync::Arc;

/// Result of ingesting a page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestSummary {
    /// Page type used for the schema
    pub page_type: PageType,
    /// Items flagged for review
    pub flagged: usize,
}

impl IngestSummary {
    /// Check if the page needs review before promotion
    #[inline]
    #[must_use]
    pub fn needs_review(&self) -> bool {
        self.flagged > 0
    }
}

/// Result of promoting a page
#[derive(Debug, Clone, PartialEq)]
pub struct PromotionReport {
    /// Record that was promoted, reviewed text applied
    pub record: ExtractionRecord,
    /// Reviewed items that could not be patched back
    pub patch_errors: Vec<AddressError>,
    /// Task scope used
    pub scope: String,
    /// Upload outcomes
    pub upload: UploadReport,
}

/// End-to-end pipeline over a session store
pub struct Pipeline {
    config: PipelineConfig,
    schemas: SchemaRegistry,
    sessions: Arc<dyn SessionStore>,
    orchestrator: TaskUploadOrchestrator,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create pipeline from parts
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        sessions: Arc<dyn SessionStore>,
        orchestrator: TaskUploadOrchestrator,
    ) -> Self {
        Self {
            config,
            schemas: SchemaRegistry::builtin(),
            sessions,
            orchestrator,
        }
    }

    /// With custom page schemas
    #[inline]
    #[must_use]
    pub fn with_schemas(mut self, schemas: SchemaRegistry) -> Self {
        self.schemas = schemas;
        self
    }

    /// Build the production pipeline from configuration
    ///
    /// Reads secrets from the environment variables the configuration names.
    /// Semantic detection degrades to exact match when embeddings are
    /// disabled or the embedding key is absent.
    ///
    /// # Errors
    /// Returns error if the tracker token is missing or a client cannot be built
    pub async fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let orchestrator = build_orchestrator(&config, tracker_from_env(&config)?).await?;
        Ok(Self::new(
            config,
            Arc::new(InMemorySessionStore::new()),
            orchestrator,
        ))
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Orchestrator in use
    #[inline]
    #[must_use]
    pub fn orchestrator(&self) -> &TaskUploadOrchestrator {
        &self.orchestrator
    }

    /// Flag low-confidence items without touching any session
    ///
    /// # Errors
    /// Returns error if the record does not fit the page schema
    pub fn triage(
        &self,
        page_type: PageType,
        record: &ExtractionRecord,
    ) -> Result<Vec<FlaggedItem>, RecordError> {
        triage::flag_with_schema(
            record,
            self.schemas.get(page_type),
            self.config.confidence_threshold,
        )
    }

    /// Open a new conversation session
    pub async fn create_session(&self) -> SessionId {
        self.sessions.create().await
    }

    /// End a conversation session
    pub async fn end_session(&self, id: SessionId) -> bool {
        self.sessions.delete(id).await
    }

    /// Purge sessions idle longer than the configured limit
    pub async fn cleanup_sessions(&self) -> usize {
        self.sessions
            .cleanup_older_than(self.config.session_max_age())
            .await
    }

    /// Store a page in the session and flag its low-confidence items
    ///
    /// Replaces any previously ingested page that was not promoted.
    ///
    /// # Errors
    /// - Structural errors from the page schema
    /// - [`ReviewError::ReviewAlreadyActive`] while a review is running
    pub async fn ingest(
        &self,
        id: SessionId,
        page_type: PageType,
        record: ExtractionRecord,
    ) -> Result<IngestSummary, PipelineError> {
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;
        if session.review.is_active() {
            return Err(ReviewError::ReviewAlreadyActive.into());
        }

        let flagged = self.triage(page_type, &record)?;
        if session.review.state() == ReviewState::Completed {
            let stale = session.review.take_completed()?;
            tracing::warn!(
                "Session {} discards {} reviewed item(s) of the replaced page",
                id,
                stale.reviewed.len()
            );
        }
        let summary = IngestSummary {
            page_type,
            flagged: flagged.len(),
        };
        tracing::info!(
            "Session {} ingested {} page with {} item(s) to review",
            id,
            page_type,
            summary.flagged
        );
        session.pending = Some(PendingPage {
            page_type,
            record,
            flagged,
        });
        session.touch();
        Ok(summary)
    }

    /// Begin reviewing the flagged items of the ingested page
    ///
    /// # Errors
    /// - [`PipelineError::NothingIngested`] without an ingested page
    /// - Review state errors, including an empty review
    pub async fn start_review(&self, id: SessionId) -> Result<NextItem, PipelineError> {
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;
        let pending = session
            .pending
            .as_ref()
            .ok_or(PipelineError::NothingIngested)?;
        let (items, record) = (pending.flagged.clone(), pending.record.clone());

        let next = session.review.start(items, record)?;
        session.touch();
        Ok(next)
    }

    /// Submit the reviewer's text for the current item
    ///
    /// # Errors
    /// Review state errors
    pub async fn submit_review(
        &self,
        id: SessionId,
        text: &str,
    ) -> Result<ReviewProgress, PipelineError> {
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;
        let progress = session.review.submit(text)?;
        session.touch();
        Ok(progress)
    }

    /// Abandon the running review
    ///
    /// # Errors
    /// Review state errors
    pub async fn cancel_review(&self, id: SessionId) -> Result<usize, PipelineError> {
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;
        let discarded = session.review.cancel()?;
        session.touch();
        Ok(discarded)
    }

    /// Promote the ingested page into the tracker
    ///
    /// A completed review is patched into the record first; without one the
    /// record is promoted as extracted. The page and the review are cleared
    /// once the upload ran, and both stay in the session when it fails.
    ///
    /// # Errors
    /// - [`ReviewError::ReviewAlreadyActive`] while a review is running
    /// - [`PipelineError::NothingIngested`] without an ingested page
    /// - [`crate::UploadError`] if existing tasks cannot be listed
    pub async fn promote(&self, id: SessionId) -> Result<PromotionReport, PipelineError> {
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;
        if session.review.is_active() {
            return Err(ReviewError::ReviewAlreadyActive.into());
        }
        let pending = session
            .pending
            .clone()
            .ok_or(PipelineError::NothingIngested)?;

        // collected only after a successful upload
        let (record, patch_errors) = match session.review.completed() {
            Some((source, reviewed)) => {
                let outcome = patch::apply(source, reviewed);
                (outcome.record, outcome.errors)
            }
            None => (pending.record, Vec::new()),
        };

        let schema = self.schemas.get(pending.page_type);
        let candidates = schema.candidate_tasks(&record);
        let scope = schema.due_hint(&record);
        if let Some(text) = schema.due_text(&record).filter(|_| scope == DEFAULT_DUE) {
            tracing::warn!("Unrecognized page date '{}', tasks are due {}", text, scope);
        }
        tracing::info!(
            "Promoting {} candidate task(s) from session {} into '{}'",
            candidates.len(),
            id,
            scope
        );

        let upload = self.orchestrator.upload_scoped(&candidates, &scope).await?;
        if session.review.state() == ReviewState::Completed {
            session.review.take_completed()?;
        }
        session.pending = None;
        session.touch();

        Ok(PromotionReport {
            record,
            patch_errors,
            scope,
            upload,
        })
    }

    async fn session(&self, id: SessionId) -> Result<SessionHandle, PipelineError> {
        self.sessions
            .get(id)
            .await
            .ok_or(PipelineError::SessionNotFound(id))
    }
}

/// Tracker client from the configured token variable
///
/// # Errors
/// Returns error if the variable is unset or the client cannot be built
pub fn tracker_from_env(config: &PipelineConfig) -> Result<Arc<dyn TaskTracker>, PipelineError> {
    let token = std::env::var(&config.tracker.token_env)
        .map_err(|_| ConfigError::MissingSecret(config.tracker.token_env.clone()))?;
    let tracker = RestTaskTracker::new(
        &token,
        &config.tracker.base_url,
        config.tracker.timeout(),
    )?;
    Ok(Arc::new(tracker))
}

/// Similarity engine and orchestrator for `tracker` per configuration
///
/// # Errors
/// Returns error if the embedding client cannot be built
pub async fn build_orchestrator(
    config: &PipelineConfig,
    tracker: Arc<dyn TaskTracker>,
) -> Result<TaskUploadOrchestrator, PipelineError> {
    let cache = Arc::new(
        EmbeddingCache::load(Arc::new(JsonFileStore::new(config.cache_file.clone()))).await,
    );

    let engine = if !config.embeddings_enabled {
        tracing::info!("Embeddings disabled, duplicate detection uses exact match");
        SimilarityEngine::fallback_only(cache)
    } else if let Ok(key) = std::env::var(&config.embedding.api_key_env) {
        let embedder = HttpEmbedder::new(
            &key,
            &config.embedding.endpoint,
            config.embedding.model.clone(),
            config.embedding.timeout(),
        )?
        .with_dimensions(config.embedding.dimensions);
        SimilarityEngine::new(Arc::new(embedder), cache)
    } else {
        tracing::warn!(
            "{} not set, duplicate detection uses exact match",
            config.embedding.api_key_env
        );
        SimilarityEngine::fallback_only(cache)
    };

    Ok(
        TaskUploadOrchestrator::new(tracker, engine, config.similarity_threshold)
            .with_max_concurrency(config.upload.max_concurrency)
            .with_create_timeout(config.upload.create_timeout()),
    )
}
