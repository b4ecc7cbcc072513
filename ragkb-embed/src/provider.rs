//! Embedding provider trait and the built-in hashing provider

use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fnv::FnvHasher;
use half::f16;
use std::hash::Hasher;

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result from a vector of f16 embeddings.
    ///
    /// The dimension is inferred from the first embedding vector; an empty
    /// result has dimension 0.
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    /// Number of embedding vectors in this result.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Returns `true` if this result contains no embedding vectors.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text.
///
/// The knowledge-base core only ever talks to this trait; which model (if
/// any) sits behind it is a deployment decision. Implementations must be
/// deterministic per input for a given configuration and must produce
/// vectors of a fixed dimension.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>>;

    /// Generate embeddings for multiple texts (batch processing)
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// Deterministic feature-hashing embedding provider.
///
/// Tokenizes text into lowercase alphanumeric words, hashes each token with
/// FNV into one of `dimension` buckets (with a hash-derived sign), and
/// L2-normalizes the accumulated counts. No model files, no network, and
/// identical output for identical input, which makes it the default choice
/// for tests and for deployments that have not wired up a real model.
///
/// Texts sharing vocabulary land near each other under cosine similarity;
/// semantically related but lexically disjoint texts do not. That is a
/// real limitation, and the reason production deployments should swap in a
/// model-backed [`EmbeddingProvider`].
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Default dimension, matching small sentence-embedding models.
    pub const DEFAULT_DIMENSION: usize = 384;

    /// Create a hashing embedder producing vectors of `dimension` entries.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(EmbedError::invalid_config(
                "embedding dimension must be positive",
            ));
        }
        Ok(Self { dimension })
    }

    /// Embed a single text synchronously.
    fn embed_one(&self, text: &str) -> Vec<f16> {
        let mut accum = vec![0.0f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let lowered = token.to_lowercase();
            let mut hasher = FnvHasher::default();
            hasher.write(lowered.as_bytes());
            let hash = hasher.finish();

            let bucket = (hash % self.dimension as u64) as usize;
            // One hash bit decides the sign so collisions tend to cancel
            // rather than pile up.
            let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
            accum[bucket] += sign;
        }

        // Normalize; a text with no tokens stays the zero vector.
        let norm: f32 = accum.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut accum {
                *value /= norm;
            }
        }

        accum.into_iter().map(f16::from_f32).collect()
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimension: Self::DEFAULT_DIMENSION,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        Ok(self.embed_one(text))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        tracing::debug!("Generating hash embeddings for {} texts", texts.len());
        let embeddings = texts.iter().map(|t| self.embed_one(t)).collect();
        Ok(EmbeddingResult::new(embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hash"
    }
}
