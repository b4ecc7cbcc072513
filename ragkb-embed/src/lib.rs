//! # ragkb-embed
//!
//! The embedding capability for the knowledge-base core. The core depends
//! on embeddings only through the [`EmbeddingProvider`] trait: single and
//! batched text-to-vector generation with a fixed output dimension.
//!
//! The crate ships one concrete provider, [`HashEmbedder`], a deterministic
//! feature-hashing implementation with no model files or network
//! dependencies. It is the default for tests and for deployments that have
//! not configured a model-backed provider; production setups implement
//! [`EmbeddingProvider`] against whatever model runtime or embedding API
//! they use.
//!
//! Vectors are half-precision ([`half::f16`]) to keep stored indexes small;
//! similarity math upstream widens to f32.

pub mod error;
pub mod provider;

// Re-export main types for easy access
pub use error::{EmbedError, Result};
pub use provider::{EmbeddingProvider, EmbeddingResult, HashEmbedder};
