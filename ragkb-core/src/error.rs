//! Error taxonomy for the knowledge-base core.
//!
//! Every fallible operation in this crate returns [`Result`]. The variants
//! map one-to-one onto the statuses the API layer reports: bad input,
//! missing entity, vector shape mismatch, a failed ingestion (after the
//! compensating rollback ran), and raw persistence or embedding failures.

use ragkb_embed::EmbedError;

/// Result type for knowledge-base operations.
pub type Result<T> = std::result::Result<T, KbError>;

#[derive(Debug, thiserror::Error)]
pub enum KbError {
    /// Malformed input: empty name, zero top-k, unsupported file type, ...
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// The referenced entity does not exist or is not owned by the caller.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A vector's length does not match the index's established dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Upload failed partway; any partial writes were rolled back.
    #[error("Ingestion failed: {message}")]
    Ingestion { message: String },

    /// Underlying persistence failure, surfaced as-is.
    #[error("Storage error: {source}")]
    Storage {
        #[from]
        source: sqlx::Error,
    },

    /// Embedding provider failure outside the upload pipeline.
    #[error("Embedding error: {source}")]
    Embedding {
        #[from]
        source: EmbedError,
    },
}

impl KbError {
    /// Create a validation error with a custom message.
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not-found error for the given entity kind and identifier.
    pub fn not_found<S: Into<String>>(entity: &'static str, id: S) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Create an ingestion error with a custom message.
    pub fn ingestion<S: Into<String>>(message: S) -> Self {
        Self::Ingestion {
            message: message.into(),
        }
    }

    /// Whether this error is a not-found error, for callers that treat
    /// missing entities as skippable rather than fatal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
