//! Jot Review
//!
//! Human-in-the-loop correction of low-confidence extraction results.
//!
//! # Flow
//!
//! 1. [`triage::flag`] selects items below the confidence threshold
//! 2. [`ReviewSession`] walks a reviewer through them one at a time
//! 3. [`patch::apply`] merges the reviewed text into a copy of the record
//!
//! Sessions live in a [`SessionStore`]; the per-session lock it hands out
//! keeps review mutation single-writer.

#![warn(unreachable_pub)]

mod error;
pub mod patch;
mod session;
mod store;
pub mod triage;

pub use error::ReviewError;
pub use patch::PatchOutcome;
pub use session::{
    allowed_transitions, validate_transition, CompletedReview, NextItem, ReviewProgress,
    ReviewSession, ReviewState,
};
pub use store::{
    ConversationSession, InMemorySessionStore, PendingPage, SessionHandle, SessionId,
    SessionStore,
};
pub use triage::{FlaggedItem, ReviewedItem};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
pub mod prelude {
    pub use crate::patch;
    pub use crate::triage;
    pub use crate::{
        FlaggedItem, InMemorySessionStore, ReviewError, ReviewProgress, ReviewSession,
        ReviewedItem, SessionId, SessionStore,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use jot_record::{ExtractionRecord, ItemAddress};
    use serde_json::json;

    #[test]
    fn flag_review_patch_round() {
        let record = ExtractionRecord::from_value(json!({
            "to_do": [
                {"task": "Call dentist", "confidence": 0.95},
                {"task": "Fix the report", "confidence": 0.6}
            ]
        }))
        .unwrap();

        let mut session = ReviewSession::new();
        let next = session.start(triage::flag(&record, 0.9), record.clone()).unwrap();
        assert_eq!(next.text, "Fix the report");

        let progress = session.submit("Fix the quarterly report").unwrap();
        assert_eq!(progress, ReviewProgress::Completed { reviewed_count: 1 });

        let completed = session.take_completed().unwrap();
        let outcome = patch::apply(&completed.source, &completed.reviewed);
        let item = outcome
            .record
            .resolve(&ItemAddress::new("to_do", 1, "task"))
            .unwrap();
        assert_eq!(item.text("task"), Some("Fix the quarterly report"));
        assert_eq!(item.confidence(), Some(1.0));
    }
}
