//! Jot Core - journal page promotion pipeline
//!
//! Takes the structured extraction of a scanned journal page and turns it
//! into tracker tasks:
//! - Flags items the extractor was unsure about
//! - Runs an item-by-item human review and patches the corrections in
//! - Skips tasks that already exist, semantically or verbatim
//! - Creates the rest concurrently, one failure never stopping the batch
//!
//! # Core Concepts
//!
//! - **Pipeline**: per-conversation state over a [`jot_review::SessionStore`]
//! - **TaskUploadOrchestrator**: dedup-gated, bounded-concurrency task creation
//! - **TaskTracker**: the two tracker calls the pipeline needs
//!
//! # Example
//!
//! ```rust,ignore
//! use jot_core::{Pipeline, PipelineConfig};
//! use jot_record::{ExtractionRecord, PageType};
//!
//! # async fn example(json: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Pipeline::from_config(PipelineConfig::new()).await?;
//! let session = pipeline.create_session().await;
//!
//! let summary = pipeline
//!     .ingest(session, PageType::Daily, ExtractionRecord::from_json(json)?)
//!     .await?;
//! if summary.needs_review() {
//!     let next = pipeline.start_review(session).await?;
//!     pipeline.submit_review(session, &next.text).await?;
//! }
//!
//! let report = pipeline.promote(session).await?;
//! println!("{}", report.upload.summary());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod tracker;

pub use config::{EmbeddingConfig, PipelineConfig, TrackerConfig, UploadConfig};
pub use error::{ConfigError, PipelineError, TrackerError, UploadError};
pub use orchestrator::{
    TaskOutcome, TaskStatus, TaskUploadOrchestrator, UploadCounts, UploadReport, TIMEOUT_REASON,
};
pub use pipeline::{build_orchestrator, tracker_from_env, IngestSummary, Pipeline, PromotionReport};
pub use tracker::{RestTaskTracker, TaskId, TaskTracker};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Jot
    pub use crate::{
        Pipeline, PipelineConfig, PipelineError, TaskOutcome, TaskStatus, TaskTracker,
        TaskUploadOrchestrator, UploadReport,
    };
    pub use jot_dedup::{DuplicateReport, SimilarityEngine};
    pub use jot_record::{ExtractionRecord, PageType, TaskCandidate, TaskPriority};
    pub use jot_review::{ReviewProgress, SessionId};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
