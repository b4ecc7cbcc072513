//! # ragkb-core
//!
//! Retrieval-augmented knowledge-base service: users create knowledge
//! bases, upload text documents into them, and ask questions answered by
//! the most relevant stored chunks.
//!
//! ## Architecture
//!
//! ```text
//! upload ──▶ KnowledgeBaseManager ──▶ TextSplitter (ragkb-context)
//!                 │                       │
//!                 │                       ▼
//!                 │              EmbeddingProvider (ragkb-embed)
//!                 │                       │
//!                 ▼                       ▼
//!           DocumentStore ◀──────── VectorIndex
//!           (SQLite, durable)       (in-memory, rebuilt at open)
//!                 ▲                       ▲
//!                 └────── QueryEngine ────┘
//! ```
//!
//! - [`store`]: durable records behind the [`DocumentStore`] trait, with a
//!   SQLite implementation. Embeddings are persisted next to their chunks,
//!   so the index is derived state.
//! - [`index`]: exact cosine-similarity search over per-knowledge-base
//!   vector partitions.
//! - [`manager`]: the write path. Validates uploads, splits and embeds
//!   them, and keeps store and index consistent, rolling the upload back
//!   when indexing fails.
//! - [`query`]: the read path. Lock-free top-k retrieval that tolerates
//!   concurrent deletions by skipping stale hits.
//!
//! ## Example
//!
//! ```no_run
//! use ragkb_core::{
//!     KnowledgeBaseManager, ManagerConfig, QueryEngine, SqliteStore, VectorIndex,
//! };
//! use ragkb_core::store::DocumentStore;
//! use ragkb_embed::{EmbeddingProvider, HashEmbedder};
//! use std::sync::Arc;
//!
//! # async fn demo() -> ragkb_core::Result<()> {
//! let store: Arc<dyn DocumentStore> =
//!     Arc::new(SqliteStore::open(std::path::Path::new("./data")).await?);
//! let index = Arc::new(VectorIndex::new());
//! let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedder::default());
//!
//! let manager = KnowledgeBaseManager::open(
//!     store.clone(),
//!     index.clone(),
//!     embedder.clone(),
//!     ManagerConfig::default(),
//! )
//! .await?;
//!
//! let kb = manager.create_knowledge_base("alice", "Math Notes", "").await?;
//! manager
//!     .upload_document("alice", &kb.id, "algebra.txt", b"Linear maps preserve sums.")
//!     .await?;
//!
//! let engine = QueryEngine::new(store, index, embedder);
//! let answer = engine.query("alice", &kb.id, "what do linear maps preserve?", None).await?;
//! println!("{}", answer.context);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod index;
pub mod manager;
pub mod query;
pub mod store;

pub use error::{KbError, Result};
pub use index::VectorIndex;
pub use manager::{KnowledgeBaseManager, ManagerConfig};
pub use query::{DEFAULT_TOP_K, QueryEngine, QueryResponse, QuerySource};
pub use store::sqlite_store::SqliteStore;
pub use store::{ChunkId, ChunkRecord, Document, DocumentStore, KnowledgeBase};
