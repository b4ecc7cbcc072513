//! Document storage for knowledge bases.
//!
//! This module defines the record types and the [`DocumentStore`] trait that
//! the manager and query engine are written against, keeping the concrete
//! backend swappable. The shipped backend is [`sqlite_store::SqliteStore`].
//!
//! ## Ownership model
//!
//! A knowledge base exclusively owns its documents; a document exclusively
//! owns its chunks. The store enforces referential integrity at its
//! boundary: `add_document` and `delete_document` are transactional, and
//! deleting a knowledge base cascades through documents to chunks. Caller
//! ownership (the opaque `owner` reference handed down by the excluded auth
//! layer) is checked on every knowledge-base lookup; a knowledge base owned
//! by someone else is indistinguishable from a missing one.

use crate::error::Result;
use async_trait::async_trait;
use half::f16;
use serde::Serialize;

pub mod sqlite_store;

/// Database ID for a chunk (SQLite rowid). Ascending ids double as the
/// deterministic tie-break in search results.
pub type ChunkId = i64;

/// A named collection of documents belonging to one owner.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeBase {
    /// UUID, immutable once created.
    pub id: String,
    /// Opaque owner reference from the auth layer.
    pub owner: String,
    pub name: String,
    pub description: String,
    /// Creation time, unix seconds.
    pub created_at: i64,
    /// Ids of owned documents, in upload order.
    pub document_ids: Vec<String>,
}

/// One ingested document inside a knowledge base.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    /// UUID, immutable once created.
    pub id: String,
    pub kb_id: String,
    pub filename: String,
    /// Detected type, e.g. "txt" or "md".
    pub file_type: String,
    /// Size of the raw upload in bytes.
    pub size: u64,
    /// Upload time, unix seconds.
    pub uploaded_at: i64,
    pub chunk_count: usize,
    /// Ids of owned chunks, ordered by sequence.
    pub chunk_ids: Vec<ChunkId>,
}

/// Metadata for a document about to be ingested.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub filename: String,
    pub file_type: String,
    pub size: u64,
}

/// A chunk about to be persisted as part of `add_document`.
///
/// Sequence positions must be contiguous starting at 0; the store's unique
/// constraint rejects duplicates within a document.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub sequence: usize,
    pub content: String,
    pub embedding: Vec<f16>,
    pub byte_start: usize,
    pub byte_end: usize,
}

/// A persisted chunk, as read back from the store.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: ChunkId,
    pub document_id: String,
    pub sequence: usize,
    pub content: String,
    pub embedding: Vec<f16>,
    pub byte_start: usize,
    pub byte_end: usize,
}

/// CRUD over knowledge bases, documents, and chunks with referential
/// integrity enforced at the store boundary.
///
/// Mutations either fully apply or leave the store untouched; there are no
/// observable partial writes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a knowledge base. Fails with a validation error when the name
    /// is empty or blank.
    async fn create_knowledge_base(
        &self,
        owner: &str,
        name: &str,
        description: &str,
    ) -> Result<KnowledgeBase>;

    /// Fetch a knowledge base by id. Not-found when absent or owned by a
    /// different caller.
    async fn get_knowledge_base(&self, owner: &str, kb_id: &str) -> Result<KnowledgeBase>;

    /// List the caller's knowledge bases, newest first.
    async fn list_knowledge_bases(&self, owner: &str) -> Result<Vec<KnowledgeBase>>;

    /// Delete a knowledge base and everything it owns. Re-deleting returns
    /// not-found, never a crash.
    async fn delete_knowledge_base(&self, owner: &str, kb_id: &str) -> Result<()>;

    /// Atomically persist a document and its chunks; either everything is
    /// stored or nothing is. Returns the document with its assigned chunk
    /// ids, in sequence order.
    async fn add_document(
        &self,
        kb_id: &str,
        meta: NewDocument,
        chunks: Vec<NewChunk>,
    ) -> Result<Document>;

    /// Fetch one document. Not-found when absent or belonging to another
    /// knowledge base.
    async fn get_document(&self, kb_id: &str, doc_id: &str) -> Result<Document>;

    /// List a knowledge base's documents in upload order.
    async fn list_documents(&self, kb_id: &str) -> Result<Vec<Document>>;

    /// Atomically delete a document and its chunks. Not-found when the
    /// document does not belong to that knowledge base.
    async fn delete_document(&self, kb_id: &str, doc_id: &str) -> Result<()>;

    /// Fetch a single chunk, or None if the id is stale.
    async fn get_chunk(&self, chunk_id: ChunkId) -> Result<Option<ChunkRecord>>;

    /// Fetch a document's chunks ordered by sequence.
    async fn get_document_chunks(&self, doc_id: &str) -> Result<Vec<ChunkRecord>>;

    /// Every stored embedding as (kb id, chunk id, vector), used to rebuild
    /// the in-memory vector index at startup.
    async fn all_embeddings(&self) -> Result<Vec<(String, ChunkId, Vec<f16>)>>;
}
