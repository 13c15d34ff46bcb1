//! Error types for record handling

use crate::address::ItemAddress;
use crate::record::SectionShape;

/// Errors raised while parsing or validating an extraction record
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// Input is not valid JSON
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Top-level value is not an object
    #[error("record must be an object, found {found}")]
    NotAnObject {
        /// JSON type found
        found: &'static str,
    },

    /// Section is neither an object nor an array
    #[error("section '{section}' must be an object or array, found {found}")]
    InvalidSection {
        /// Section name
        section: String,
        /// JSON type found
        found: &'static str,
    },

    /// Sequence element is not an object
    #[error("item {index} of section '{section}' must be an object, found {found}")]
    InvalidItem {
        /// Section name
        section: String,
        /// Element position
        index: usize,
        /// JSON type found
        found: &'static str,
    },

    /// Confidence is not a number in `[0, 1]`
    #[error("invalid confidence {value} in section '{section}'")]
    InvalidConfidence {
        /// Section name
        section: String,
        /// Element position for sequence items
        index: Option<usize>,
        /// Offending raw value
        value: String,
    },

    /// Section shape disagrees with the page schema
    #[error("section '{section}' should be a {expected}, found a {found}")]
    ShapeMismatch {
        /// Section name
        section: String,
        /// Shape the schema declares
        expected: SectionShape,
        /// Shape the record carries
        found: SectionShape,
    },
}

/// Errors resolving an [`ItemAddress`] against a record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// No section with that name
    #[error("section not found: {section}")]
    SectionNotFound {
        /// Section name
        section: String,
    },

    /// Section exists but is a scalar
    #[error("section '{section}' is not a sequence")]
    NotASequence {
        /// Section name
        section: String,
    },

    /// Index past the end of the sequence
    #[error("index {index} out of bounds for section '{section}' (len {len})")]
    IndexOutOfBounds {
        /// Section name
        section: String,
        /// Requested index
        index: usize,
        /// Sequence length
        len: usize,
    },

    /// Item text changed since it was flagged
    #[error("item at {address} changed since review started")]
    SnapshotMismatch {
        /// Item address
        address: ItemAddress,
    },
}
