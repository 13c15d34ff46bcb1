//! Error types for embedding and persistence

use std::path::PathBuf;

/// Errors producing embeddings
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Transport failure talking to the embedding service
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Service answered with a non-success status
    #[error("embedding service returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, if readable
        body: String,
    },

    /// Service returned the wrong number of vectors
    #[error("embedding service returned {actual} vectors for {expected} inputs")]
    CountMismatch {
        /// Inputs sent
        expected: usize,
        /// Vectors received
        actual: usize,
    },

    /// Vectors of different lengths cannot be compared
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the first vector
        expected: usize,
        /// Offending dimension
        actual: usize,
    },

    /// Client could not be configured
    #[error("embedder configuration error: {0}")]
    Config(String),

    /// Embedder not reachable for another reason
    #[error("embedder unavailable: {0}")]
    Unavailable(String),
}

/// Errors loading or saving persisted vectors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure
    #[error("vector store I/O error at {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File content is not a valid vector map
    #[error("vector store format error: {0}")]
    Format(#[from] serde_json::Error),

    /// Store rejected the write
    #[error("vector store unavailable: {0}")]
    Unavailable(String),
}
