//! Error types for review sessions

use crate::session::ReviewState;

/// Review state machine misuse
///
/// Every variant is a caller error: the operation was issued in a state
/// where it is not valid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReviewError {
    /// `submit` or `cancel` without an active review
    #[error("no active review")]
    NoActiveReview,

    /// `start` while a review is in progress; cancel it first
    #[error("a review is already active")]
    ReviewAlreadyActive,

    /// `start` with nothing to review
    #[error("cannot start a review with no items")]
    EmptyReview,

    /// `start` while a completed review has not been collected
    #[error("completed review has not been collected")]
    ReviewNotCollected,

    /// Transition not in the state table
    #[error("illegal review transition: {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state
        from: ReviewState,
        /// Requested state
        to: ReviewState,
    },
}
