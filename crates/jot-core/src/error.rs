//! Error types for the Jot pipeline
//!
//! Batch operations report per-item failures in their outcomes rather than
//! as errors. The errors here are the ones that stop an operation:
//! - Structural problems with a record
//! - Review state machine misuse
//! - Unreachable collaborators before any work started
//! - Bad configuration

use jot_dedup::EmbedError;
use jot_record::RecordError;
use jot_review::{ReviewError, SessionId};
use std::path::PathBuf;

/// Main pipeline error type
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Record does not have the expected structure
    #[error("invalid record: {0}")]
    Record(#[from] RecordError),

    /// Review operation issued in the wrong state
    #[error("review error: {0}")]
    Review(#[from] ReviewError),

    /// Upload could not start
    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),

    /// Configuration problem
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Embedding client could not be built
    #[error("embedder error: {0}")]
    Embed(#[from] EmbedError),

    /// Tracker client could not be built
    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    /// Unknown session id
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// Review or promotion requested before any page was ingested
    #[error("no page ingested in this session")]
    NothingIngested,
}

impl PipelineError {
    /// Check if the caller misused the API rather than a collaborator failing
    #[inline]
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::Record(_) | Self::Review(_) | Self::SessionNotFound(_) | Self::NothingIngested
        )
    }
}

/// Task tracker client errors
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// Transport failure
    #[error("tracker request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response
    #[error("tracker returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, if readable
        body: String,
    },

    /// Client could not be configured
    #[error("tracker configuration error: {0}")]
    Config(String),

    /// Tracker refused the operation
    #[error("tracker rejected request: {0}")]
    Rejected(String),
}

/// Errors that abort an upload before any task is created
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Existing tasks could not be listed, so duplicates cannot be checked
    #[error("listing existing tasks for '{scope}' failed: {source}")]
    ListingFailed {
        /// Scope being listed
        scope: String,
        /// Underlying failure
        #[source]
        source: TrackerError,
    },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File unreadable
    #[error("cannot read {path}: {source}")]
    Read {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Malformed TOML
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value out of range
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong
        reason: String,
    },

    /// Required secret not present in the environment
    #[error("environment variable {0} is not set")]
    MissingSecret(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_errors_are_classified() {
        assert!(PipelineError::from(ReviewError::NoActiveReview).is_caller_error());
        assert!(PipelineError::NothingIngested.is_caller_error());
        assert!(PipelineError::SessionNotFound(SessionId::new()).is_caller_error());

        let listing = UploadError::ListingFailed {
            scope: "today".to_string(),
            source: TrackerError::Rejected("nope".to_string()),
        };
        assert!(!PipelineError::from(listing).is_caller_error());
    }

    #[test]
    fn listing_error_names_scope() {
        let err = UploadError::ListingFailed {
            scope: "today".to_string(),
            source: TrackerError::Status {
                status: 503,
                body: "down".to_string(),
            },
        };
        assert_eq!(
            err.to_string(),
            "listing existing tasks for 'today' failed: tracker returned 503: down"
        );
    }
}
