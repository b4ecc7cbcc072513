//! Error types for the embedding capability

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type covering embedding provider failures.
///
/// Providers backed by remote services or local model runtimes wrap their
/// failures in [`EmbedError::Generation`]; configuration problems (zero
/// dimension, missing model settings) use [`EmbedError::InvalidConfig`].
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Error when provider configuration is invalid
    #[error("Invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// Error during embedding generation
    #[error("Embedding generation failed: {source}")]
    Generation {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl EmbedError {
    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Wrap a provider-specific failure as a generation error.
    pub fn generation<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Generation {
            source: Box::new(source),
        }
    }
}
