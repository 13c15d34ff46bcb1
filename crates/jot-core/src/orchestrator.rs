//! Task upload orchestration
//!
//! Duplicate detection runs once over the whole batch and completes before
//! any task is created. Creations then run on a bounded number of
//! concurrent calls, each under its own timeout. Every input item gets
//! exactly one outcome, in input order, whatever happens to its neighbours.

use crate::error::UploadError;
use crate::tracker::{TaskId, TaskTracker};
use futures::stream::{self, StreamExt};
use jot_dedup::{DetectionMode, DuplicateReport, SimilarityEngine};
use jot_record::{TaskCandidate, TaskPriority};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Reason reported for a creation that ran out of time
pub const TIMEOUT_REASON: &str = "timeout";

/// What happened to one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task created
    Created {
        /// Tracker id
        id: TaskId,
    },
    /// Matched an existing task and was not created
    SkippedDuplicate {
        /// Existing text it matched
        best_match: Option<String>,
        /// Similarity, when computed
        score: Option<f64>,
    },
    /// Creation failed; the rest of the batch continued
    Failed {
        /// Failure description
        reason: String,
    },
}

/// Outcome for one input item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// Task text
    pub text: String,
    /// Requested priority
    pub priority: TaskPriority,
    /// Result
    pub status: TaskStatus,
}

impl TaskOutcome {
    /// Check if the task was created
    #[inline]
    #[must_use]
    pub fn is_created(&self) -> bool {
        matches!(self.status, TaskStatus::Created { .. })
    }

    /// Check if the task failed
    #[inline]
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.status, TaskStatus::Failed { .. })
    }
}

/// Tally of outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCounts {
    /// Tasks created
    pub created: usize,
    /// Duplicates skipped
    pub skipped: usize,
    /// Creations failed
    pub failed: usize,
}

/// Result of an upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReport {
    /// One outcome per input item, in input order
    pub outcomes: Vec<TaskOutcome>,
    /// Tally of `outcomes`
    pub counts: UploadCounts,
    /// How duplicates were detected
    pub detection: DetectionMode,
}

impl UploadReport {
    /// Human-readable one-line summary
    #[must_use]
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Created {} new tasks, skipped {} duplicates",
            self.counts.created, self.counts.skipped
        );
        if self.counts.failed > 0 {
            summary.push_str(&format!(", {} failed", self.counts.failed));
        }
        summary
    }
}

/// Creates deduplicated tasks in a tracker
#[derive(Clone)]
pub struct TaskUploadOrchestrator {
    tracker: Arc<dyn TaskTracker>,
    engine: SimilarityEngine,
    similarity_threshold: f64,
    max_concurrency: usize,
    create_timeout: Duration,
}

impl std::fmt::Debug for TaskUploadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskUploadOrchestrator")
            .field("engine", &self.engine)
            .field("similarity_threshold", &self.similarity_threshold)
            .field("max_concurrency", &self.max_concurrency)
            .field("create_timeout", &self.create_timeout)
            .finish_non_exhaustive()
    }
}

impl TaskUploadOrchestrator {
    /// Create orchestrator with default limits
    #[must_use]
    pub fn new(
        tracker: Arc<dyn TaskTracker>,
        engine: SimilarityEngine,
        similarity_threshold: f64,
    ) -> Self {
        Self {
            tracker,
            engine,
            similarity_threshold,
            max_concurrency: 4,
            create_timeout: Duration::from_secs(30),
        }
    }

    /// With creation concurrency (at least 1)
    #[inline]
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// With per-creation timeout
    #[inline]
    #[must_use]
    pub fn with_create_timeout(mut self, timeout: Duration) -> Self {
        self.create_timeout = timeout;
        self
    }

    /// Duplicate decisions for `items` against `existing`, creating nothing
    pub async fn check_duplicates(
        &self,
        items: &[TaskCandidate],
        existing: &[String],
    ) -> DuplicateReport {
        let texts: Vec<String> = items.iter().map(|item| item.text.clone()).collect();
        self.engine
            .find_duplicates(&texts, existing, self.similarity_threshold)
            .await
    }

    /// List existing tasks in `scope`, then upload
    ///
    /// # Errors
    /// Returns [`UploadError::ListingFailed`] if the existing tasks cannot be
    /// listed; nothing is created in that case
    pub async fn upload_scoped(
        &self,
        items: &[TaskCandidate],
        scope: &str,
    ) -> Result<UploadReport, UploadError> {
        let existing = self
            .tracker
            .list_existing_tasks(scope)
            .await
            .map_err(|source| UploadError::ListingFailed {
                scope: scope.to_string(),
                source,
            })?;
        Ok(self.upload(items, &existing, scope).await)
    }

    /// Create every item of `items` that does not duplicate `existing`
    pub async fn upload(
        &self,
        items: &[TaskCandidate],
        existing: &[String],
        scope: &str,
    ) -> UploadReport {
        let duplicates = self.check_duplicates(items, existing).await;
        if duplicates.is_degraded() {
            tracing::warn!("Uploading with exact-match duplicate detection");
        }

        let mut statuses: Vec<Option<TaskStatus>> = vec![None; items.len()];
        let mut pending = Vec::new();
        for (index, item) in items.iter().enumerate() {
            match duplicates.decision(&item.text) {
                Some(decision) if decision.is_duplicate => {
                    tracing::debug!("Skipping duplicate: {}", item.text);
                    statuses[index] = Some(TaskStatus::SkippedDuplicate {
                        best_match: decision.best_match.clone(),
                        score: decision.score,
                    });
                }
                _ => pending.push((index, item)),
            }
        }

        let created: Vec<(usize, TaskStatus)> = stream::iter(pending)
            .map(|(index, item)| async move { (index, self.create_one(item, scope).await) })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;
        for (index, status) in created {
            statuses[index] = Some(status);
        }

        let outcomes: Vec<TaskOutcome> = items
            .iter()
            .zip(statuses)
            .map(|(item, status)| TaskOutcome {
                text: item.text.clone(),
                priority: item.priority,
                status: status.unwrap_or_else(|| TaskStatus::Failed {
                    reason: "not attempted".to_string(),
                }),
            })
            .collect();

        let counts = tally(&outcomes);
        let report = UploadReport {
            outcomes,
            counts,
            detection: duplicates.mode,
        };
        tracing::info!("{}", report.summary());
        report
    }

    async fn create_one(&self, item: &TaskCandidate, scope: &str) -> TaskStatus {
        let call = self.tracker.create_task(&item.text, item.priority, scope);
        match tokio::time::timeout(self.create_timeout, call).await {
            Ok(Ok(id)) => {
                tracing::debug!("Created task {}: {}", id, item.text);
                TaskStatus::Created { id }
            }
            Ok(Err(err)) => {
                tracing::error!("Failed to create task '{}': {}", item.text, err);
                TaskStatus::Failed {
                    reason: err.to_string(),
                }
            }
            Err(_) => {
                tracing::error!(
                    "Creating task '{}' timed out after {:?}",
                    item.text,
                    self.create_timeout
                );
                TaskStatus::Failed {
                    reason: TIMEOUT_REASON.to_string(),
                }
            }
        }
    }
}

fn tally(outcomes: &[TaskOutcome]) -> UploadCounts {
    outcomes
        .iter()
        .fold(UploadCounts::default(), |mut counts, outcome| {
            match outcome.status {
                TaskStatus::Created { .. } => counts.created += 1,
                TaskStatus::SkippedDuplicate { .. } => counts.skipped += 1,
                TaskStatus::Failed { .. } => counts.failed += 1,
            }
            counts
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackerError;
    use async_trait::async_trait;
    use jot_dedup::{EmbeddingCache, MemoryStore};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTracker {
        existing: Vec<String>,
        fail: Vec<String>,
        hang: Vec<String>,
        fail_listing: bool,
        created: Mutex<Vec<String>>,
        next_id: AtomicUsize,
    }

    #[async_trait]
    impl TaskTracker for RecordingTracker {
        async fn list_existing_tasks(&self, _scope: &str) -> Result<Vec<String>, TrackerError> {
            if self.fail_listing {
                return Err(TrackerError::Rejected("listing disabled".to_string()));
            }
            Ok(self.existing.clone())
        }

        async fn create_task(
            &self,
            text: &str,
            _priority: TaskPriority,
            _scope: &str,
        ) -> Result<TaskId, TrackerError> {
            if self.hang.iter().any(|t| t == text) {
                std::future::pending::<()>().await;
            }
            if self.fail.iter().any(|t| t == text) {
                return Err(TrackerError::Rejected(format!("cannot create {text}")));
            }
            self.created.lock().unwrap().push(text.to_string());
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(TaskId(format!("task-{id}")))
        }
    }

    fn orchestrator(tracker: Arc<RecordingTracker>) -> TaskUploadOrchestrator {
        let cache = Arc::new(EmbeddingCache::new(Arc::new(MemoryStore::new())));
        TaskUploadOrchestrator::new(tracker, SimilarityEngine::fallback_only(cache), 0.8)
    }

    fn items(texts: &[&str]) -> Vec<TaskCandidate> {
        texts
            .iter()
            .map(|t| TaskCandidate::new(*t, TaskPriority::Normal))
            .collect()
    }

    #[tokio::test]
    async fn duplicates_are_skipped_and_never_created() {
        let tracker = Arc::new(RecordingTracker {
            existing: vec!["Call dentist".to_string()],
            ..Default::default()
        });
        let report = orchestrator(tracker.clone())
            .upload(&items(&["call dentist", "Buy milk"]), &tracker.existing, "today")
            .await;

        assert!(matches!(
            report.outcomes[0].status,
            TaskStatus::SkippedDuplicate { .. }
        ));
        assert!(report.outcomes[1].is_created());
        assert_eq!(*tracker.created.lock().unwrap(), vec!["Buy milk".to_string()]);
        assert_eq!(report.summary(), "Created 1 new tasks, skipped 1 duplicates");
    }

    #[tokio::test]
    async fn failure_does_not_abort_batch() {
        let tracker = Arc::new(RecordingTracker {
            fail: vec!["b".to_string()],
            ..Default::default()
        });
        let report = orchestrator(tracker)
            .with_max_concurrency(2)
            .upload(&items(&["a", "b", "c"]), &[], "today")
            .await;

        let texts: Vec<_> = report.outcomes.iter().map(|o| o.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert!(report.outcomes[0].is_created());
        assert!(report.outcomes[1].is_failed());
        assert!(report.outcomes[2].is_created());
        assert_eq!(
            report.counts,
            UploadCounts {
                created: 2,
                skipped: 0,
                failed: 1
            }
        );
        assert_eq!(report.summary(), "Created 2 new tasks, skipped 0 duplicates, 1 failed");
    }

    #[tokio::test]
    async fn slow_creation_times_out() {
        let tracker = Arc::new(RecordingTracker {
            hang: vec!["slow".to_string()],
            ..Default::default()
        });
        let report = orchestrator(tracker)
            .with_create_timeout(Duration::from_millis(20))
            .upload(&items(&["slow", "fast"]), &[], "today")
            .await;

        assert_eq!(
            report.outcomes[0].status,
            TaskStatus::Failed {
                reason: TIMEOUT_REASON.to_string()
            }
        );
        assert!(report.outcomes[1].is_created());
    }

    #[tokio::test]
    async fn listing_failure_creates_nothing() {
        let tracker = Arc::new(RecordingTracker {
            fail_listing: true,
            ..Default::default()
        });
        let result = orchestrator(tracker.clone())
            .upload_scoped(&items(&["a"]), "today")
            .await;

        assert!(matches!(result, Err(UploadError::ListingFailed { .. })));
        assert!(tracker.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_items_each_get_an_outcome() {
        let tracker = Arc::new(RecordingTracker::default());
        let report = orchestrator(tracker)
            .upload(&items(&["a", "a"]), &[], "today")
            .await;
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.counts.created, 2);
    }

    #[tokio::test]
    async fn empty_upload_is_empty_report() {
        let tracker = Arc::new(RecordingTracker::default());
        let report = orchestrator(tracker).upload(&[], &[], "today").await;
        assert!(report.outcomes.is_empty());
        assert_eq!(report.summary(), "Created 0 new tasks, skipped 0 duplicates");
    }
}
