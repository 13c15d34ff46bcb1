//! Review session state machine
//!
//! Walks a reviewer through flagged items one at a time:
//!
//! ```text
//! Inactive --start--> Active --submit (last)--> Completed --take--> Inactive
//!              ^         |
//!              +-cancel--+
//! ```
//!
//! A session has exactly one writer. Callers sharing a session across tasks
//! serialize access through the session store's per-session lock.

use crate::error::ReviewError;
use crate::triage::{FlaggedItem, ReviewedItem};
use jot_record::ExtractionRecord;
use serde::{Deserialize, Serialize};

/// Review lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReviewState {
    /// No review in progress
    #[default]
    Inactive,
    /// Walking flagged items
    Active,
    /// Every item reviewed, result not yet collected
    Completed,
}

/// States reachable from `from`
#[must_use]
pub fn allowed_transitions(from: ReviewState) -> Vec<ReviewState> {
    use ReviewState::{Active, Completed, Inactive};
    match from {
        Inactive => vec![Active],
        Active => vec![Completed, Inactive],
        Completed => vec![Inactive],
    }
}

/// Validates a state transition
///
/// # Errors
/// Returns [`ReviewError::IllegalTransition`] when `to` is not reachable
pub fn validate_transition(from: ReviewState, to: ReviewState) -> Result<(), ReviewError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(ReviewError::IllegalTransition { from, to })
    }
}

/// Next item to show the reviewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextItem {
    /// Text as extracted
    pub text: String,
    /// Extractor confidence
    pub confidence: f64,
    /// Section name
    pub section: String,
    /// Index inside the section
    pub index: usize,
    /// 1-based progress position
    pub position: usize,
    /// Number of items in this review
    pub total: usize,
}

/// Result of a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReviewProgress {
    /// More items to review
    Next {
        /// Item to show next
        next_item: NextItem,
    },
    /// Review finished
    Completed {
        /// Items reviewed
        reviewed_count: usize,
    },
}

impl ReviewProgress {
    /// Whether the review finished
    #[inline]
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Collected output of a completed review
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedReview {
    /// Record the review was started against
    pub source: ExtractionRecord,
    /// Reviewed items in review order
    pub reviewed: Vec<ReviewedItem>,
}

/// Per-owner review state machine
#[derive(Debug, Clone, Default)]
pub struct ReviewSession {
    state: ReviewState,
    items: Vec<FlaggedItem>,
    cursor: usize,
    reviewed: Vec<ReviewedItem>,
    source: Option<ExtractionRecord>,
}

impl ReviewSession {
    /// Create inactive session
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> ReviewState {
        self.state
    }

    /// Check if a review is in progress
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == ReviewState::Active
    }

    /// Position of the item awaiting review
    #[inline]
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// All items in this review
    #[inline]
    #[must_use]
    pub fn items(&self) -> &[FlaggedItem] {
        &self.items
    }

    /// Items reviewed so far
    #[inline]
    #[must_use]
    pub fn reviewed(&self) -> &[ReviewedItem] {
        &self.reviewed
    }

    /// Item awaiting review, if active
    #[must_use]
    pub fn current(&self) -> Option<NextItem> {
        if self.is_active() {
            self.next_item()
        } else {
            None
        }
    }

    /// Begin reviewing `items` flagged in `source`
    ///
    /// # Errors
    /// - [`ReviewError::ReviewAlreadyActive`] if a review is in progress
    /// - [`ReviewError::ReviewNotCollected`] if a completed review was not taken
    /// - [`ReviewError::EmptyReview`] if `items` is empty
    pub fn start(
        &mut self,
        items: Vec<FlaggedItem>,
        source: ExtractionRecord,
    ) -> Result<NextItem, ReviewError> {
        match self.state {
            ReviewState::Active => return Err(ReviewError::ReviewAlreadyActive),
            ReviewState::Completed => return Err(ReviewError::ReviewNotCollected),
            ReviewState::Inactive => {}
        }
        if items.is_empty() {
            return Err(ReviewError::EmptyReview);
        }
        self.transition(ReviewState::Active)?;

        tracing::info!("Review started with {} item(s)", items.len());
        self.items = items;
        self.cursor = 0;
        self.reviewed = Vec::with_capacity(self.items.len());
        self.source = Some(source);

        self.next_item().ok_or(ReviewError::EmptyReview)
    }

    /// Accept or correct the current item
    ///
    /// Text equal to the extracted text after trimming both sides keeps the
    /// original; anything else is recorded as an edit.
    ///
    /// # Errors
    /// Returns [`ReviewError::NoActiveReview`] outside the active state
    pub fn submit(&mut self, text: &str) -> Result<ReviewProgress, ReviewError> {
        if !self.is_active() {
            return Err(ReviewError::NoActiveReview);
        }
        let Some(item) = self.items.get(self.cursor).cloned() else {
            return Err(ReviewError::NoActiveReview);
        };

        let reviewed = if text.trim() == item.text.trim() {
            tracing::debug!("Accepted {} as extracted", item.address);
            item.accept()
        } else {
            tracing::debug!("Edited {}: '{}' -> '{}'", item.address, item.text, text);
            item.edit(text)
        };
        self.reviewed.push(reviewed);
        self.cursor += 1;

        if self.cursor == self.items.len() {
            self.transition(ReviewState::Completed)?;
            tracing::info!("Review completed: {} item(s)", self.reviewed.len());
            return Ok(ReviewProgress::Completed {
                reviewed_count: self.reviewed.len(),
            });
        }

        self.next_item()
            .map(|next_item| ReviewProgress::Next { next_item })
            .ok_or(ReviewError::NoActiveReview)
    }

    /// Abandon the review in progress, discarding partial results
    ///
    /// Returns how many submissions were discarded.
    ///
    /// # Errors
    /// Returns [`ReviewError::NoActiveReview`] outside the active state
    pub fn cancel(&mut self) -> Result<usize, ReviewError> {
        if !self.is_active() {
            return Err(ReviewError::NoActiveReview);
        }
        self.transition(ReviewState::Inactive)?;
        let discarded = self.reviewed.len();
        self.reset();
        tracing::info!("Review cancelled, {} submission(s) discarded", discarded);
        Ok(discarded)
    }

    /// Source record and reviewed items of a completed review, left in place
    #[must_use]
    pub fn completed(&self) -> Option<(&ExtractionRecord, &[ReviewedItem])> {
        match (self.state, &self.source) {
            (ReviewState::Completed, Some(source)) => Some((source, &self.reviewed)),
            _ => None,
        }
    }

    /// Collect the result of a completed review and return to inactive
    ///
    /// # Errors
    /// - [`ReviewError::ReviewAlreadyActive`] while the review is still running
    /// - [`ReviewError::NoActiveReview`] when there is nothing to collect
    pub fn take_completed(&mut self) -> Result<CompletedReview, ReviewError> {
        match self.state {
            ReviewState::Active => return Err(ReviewError::ReviewAlreadyActive),
            ReviewState::Inactive => return Err(ReviewError::NoActiveReview),
            ReviewState::Completed => {}
        }
        let source = self.source.take().ok_or(ReviewError::NoActiveReview)?;
        self.transition(ReviewState::Inactive)?;
        let reviewed = std::mem::take(&mut self.reviewed);
        self.reset();
        Ok(CompletedReview { source, reviewed })
    }

    fn next_item(&self) -> Option<NextItem> {
        self.items.get(self.cursor).map(|item| NextItem {
            text: item.text.clone(),
            confidence: item.confidence,
            section: item.address.section.clone(),
            index: item.address.index,
            position: self.cursor + 1,
            total: self.items.len(),
        })
    }

    fn transition(&mut self, to: ReviewState) -> Result<(), ReviewError> {
        validate_transition(self.state, to)?;
        self.state = to;
        Ok(())
    }

    fn reset(&mut self) {
        self.items.clear();
        self.cursor = 0;
        self.reviewed.clear();
        self.source = None;
    }
}
