//! Error types for the `docrag` crate.

use thiserror::Error;

/// Errors that can occur in retrieval operations.
///
/// There is no empty-corpus variant: ranking and selection over zero
/// candidates succeed with empty results.
#[derive(Debug, Error)]
pub enum RagError {
    /// Chunking, selection, or pipeline parameters are unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A query or listing request is unusable, e.g. a blank query or `k == 0`.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The upstream embedding service failed.
    #[error("Embedding service error ({provider}): {message}")]
    EmbeddingService {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The embedding service returned a vector that cannot be used.
    #[error("Malformed embedding at index {index}: {reason}")]
    MalformedEmbedding {
        /// Position of the offending input within the request.
        index: usize,
        /// Why the vector was rejected.
        reason: String,
    },

    /// Two vectors of different length were compared.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Length of the query vector.
        expected: usize,
        /// Length of the candidate vector.
        actual: usize,
    },

    /// The upstream generation service failed.
    #[error("Generation service error ({provider}): {message}")]
    GenerationService {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the document store backend.
    #[error("Document store error ({backend}): {message}")]
    DocumentStore {
        /// The store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A document could not be ingested.
    #[error("Ingestion of document '{document_id}' failed: {message}")]
    Ingestion {
        /// The document that was being ingested.
        document_id: String,
        /// A description of the failure.
        message: String,
    },
}

impl RagError {
    /// Whether this error only affects a single item and may be isolated
    /// from the rest of a batch.
    pub fn is_per_item(&self) -> bool {
        matches!(self, Self::MalformedEmbedding { .. } | Self::DimensionMismatch { .. })
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
