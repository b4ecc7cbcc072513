//! Knowledge base lifecycle and the document ingestion pipeline.
//!
//! [`KnowledgeBaseManager`] owns the store, the vector index, and the
//! embedding provider, and coordinates every mutation:
//!
//! 1. upload: validate, split, embed, persist atomically, then index
//! 2. delete document: unindex, then delete from the store
//! 3. delete knowledge base: drop the index partition, then the rows
//!
//! Mutations within one knowledge base are serialized by a per-knowledge-base
//! async lock; mutations on different knowledge bases run concurrently, and
//! queries never take these locks at all. The index is updated only after
//! the store commit succeeds, so a query racing a mutation sees either the
//! old state or the new one. The one observable in-between is a chunk id
//! still in the index whose row is already gone; the query engine skips
//! those.

use crate::error::{KbError, Result};
use crate::index::VectorIndex;
use crate::store::{Document, DocumentStore, KnowledgeBase, NewChunk, NewDocument};
use ragkb_context::TextSplitter;
use ragkb_embed::EmbeddingProvider;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// File types accepted for upload, by filename extension.
const SUPPORTED_FILE_TYPES: &[&str] = &["txt", "md", "markdown"];

/// Chunking configuration for the manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Maximum chunk size in bytes.
    pub max_chunk_size: usize,
    /// Overlap carried from the preceding chunk, in bytes.
    pub chunk_overlap: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ManagerConfig {
    pub fn with_max_chunk_size(mut self, max_chunk_size: usize) -> Self {
        self.max_chunk_size = max_chunk_size;
        self
    }

    pub fn with_chunk_overlap(mut self, chunk_overlap: usize) -> Self {
        self.chunk_overlap = chunk_overlap;
        self
    }
}

/// Coordinates knowledge bases across the store, index, and embedder.
pub struct KnowledgeBaseManager {
    store: Arc<dyn DocumentStore>,
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    splitter: TextSplitter,
    kb_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KnowledgeBaseManager {
    /// Create a manager without touching the store. Fails when the chunking
    /// configuration is unusable.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: ManagerConfig,
    ) -> Result<Self> {
        if config.max_chunk_size == 0 {
            return Err(KbError::validation("max chunk size must be positive"));
        }
        if config.chunk_overlap >= config.max_chunk_size {
            return Err(KbError::validation(
                "chunk overlap must be smaller than max chunk size",
            ));
        }

        Ok(Self {
            store,
            index,
            embedder,
            splitter: TextSplitter::new(config.max_chunk_size, config.chunk_overlap),
            kb_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Create a manager and warm the index from everything already stored.
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: ManagerConfig,
    ) -> Result<Self> {
        let manager = Self::new(store, index, embedder, config)?;
        manager.rebuild_index().await?;
        Ok(manager)
    }

    /// Reload every stored embedding into the index.
    pub async fn rebuild_index(&self) -> Result<()> {
        let embeddings = self.store.all_embeddings().await?;
        let count = embeddings.len();
        for (kb_id, chunk_id, vector) in embeddings {
            self.index.insert(&kb_id, chunk_id, vector)?;
        }
        tracing::info!("Rebuilt vector index with {count} embeddings");
        Ok(())
    }

    async fn kb_lock(&self, kb_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.kb_locks.lock().await;
        locks
            .entry(kb_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn create_knowledge_base(
        &self,
        owner: &str,
        name: &str,
        description: &str,
    ) -> Result<KnowledgeBase> {
        self.store
            .create_knowledge_base(owner, name, description)
            .await
    }

    pub async fn get_knowledge_base(&self, owner: &str, kb_id: &str) -> Result<KnowledgeBase> {
        self.store.get_knowledge_base(owner, kb_id).await
    }

    pub async fn list_knowledge_bases(&self, owner: &str) -> Result<Vec<KnowledgeBase>> {
        self.store.list_knowledge_bases(owner).await
    }

    /// Delete a knowledge base, its documents, and its indexed vectors.
    pub async fn delete_knowledge_base(&self, owner: &str, kb_id: &str) -> Result<()> {
        // Ownership check before any index mutation so a foreign caller
        // cannot drop another owner's partition.
        self.store.get_knowledge_base(owner, kb_id).await?;

        let lock = self.kb_lock(kb_id).await;
        let _guard = lock.lock().await;

        self.index.drop_all(kb_id);
        self.store.delete_knowledge_base(owner, kb_id).await?;

        drop(_guard);
        self.kb_locks.lock().await.remove(kb_id);
        Ok(())
    }

    /// List a knowledge base's documents, checking caller ownership.
    pub async fn list_documents(&self, owner: &str, kb_id: &str) -> Result<Vec<Document>> {
        self.store.get_knowledge_base(owner, kb_id).await?;
        self.store.list_documents(kb_id).await
    }

    pub async fn get_document(&self, owner: &str, kb_id: &str, doc_id: &str) -> Result<Document> {
        self.store.get_knowledge_base(owner, kb_id).await?;
        self.store.get_document(kb_id, doc_id).await
    }

    /// Ingest a document: validate, split, embed, persist, index.
    ///
    /// The store write is one transaction, and the index is only touched
    /// after it commits. If indexing then fails, the inserted vectors and
    /// the document row are rolled back before the error is returned, so a
    /// failed upload leaves no trace.
    pub async fn upload_document(
        &self,
        owner: &str,
        kb_id: &str,
        filename: &str,
        content: &[u8],
    ) -> Result<Document> {
        self.store.get_knowledge_base(owner, kb_id).await?;

        let file_type = detect_file_type(filename)?;
        let text = std::str::from_utf8(content)
            .map_err(|_| KbError::validation("document content is not valid UTF-8"))?;

        let lock = self.kb_lock(kb_id).await;
        let _guard = lock.lock().await;

        let pieces = self.splitter.split(text);
        if pieces.is_empty() {
            return Err(KbError::validation("document is empty"));
        }
        tracing::debug!(
            "Split '{filename}' into {} chunks for knowledge base {kb_id}",
            pieces.len()
        );

        let texts: Vec<String> = pieces.iter().map(|p| p.text.clone()).collect();
        let embedded = self
            .embedder
            .embed_texts(&texts)
            .await
            .map_err(|e| KbError::ingestion(format!("embedding failed: {e}")))?;
        if embedded.len() != pieces.len() {
            return Err(KbError::ingestion(format!(
                "embedder returned {} vectors for {} chunks",
                embedded.len(),
                pieces.len()
            )));
        }

        let chunks: Vec<NewChunk> = pieces
            .iter()
            .zip(embedded.embeddings.iter())
            .map(|(piece, embedding)| NewChunk {
                sequence: piece.sequence,
                content: piece.text.clone(),
                embedding: embedding.clone(),
                byte_start: piece.byte_start,
                byte_end: piece.byte_end,
            })
            .collect();

        let meta = NewDocument {
            filename: filename.to_string(),
            file_type,
            size: content.len() as u64,
        };
        let document = self.store.add_document(kb_id, meta, chunks).await?;

        // Store commit succeeded; mirror the chunks into the index. On
        // failure, undo both sides and report the upload as failed.
        let mut inserted = Vec::with_capacity(document.chunk_ids.len());
        for (&chunk_id, embedding) in document.chunk_ids.iter().zip(embedded.embeddings.iter()) {
            match self.index.insert(kb_id, chunk_id, embedding.clone()) {
                Ok(()) => inserted.push(chunk_id),
                Err(e) => {
                    tracing::error!(
                        "Indexing chunk {chunk_id} of '{filename}' failed, rolling back: {e}"
                    );
                    for &id in &inserted {
                        self.index.remove(kb_id, id);
                    }
                    if let Err(delete_err) =
                        self.store.delete_document(kb_id, &document.id).await
                    {
                        tracing::error!(
                            "Rollback of document {} also failed: {delete_err}",
                            document.id
                        );
                    }
                    return Err(KbError::ingestion(format!(
                        "failed to index '{filename}': {e}"
                    )));
                }
            }
        }

        tracing::info!(
            "Ingested '{filename}' ({} chunks) into knowledge base {kb_id}",
            document.chunk_count
        );
        Ok(document)
    }

    /// Delete a document and its indexed vectors.
    ///
    /// The vectors leave the index before the rows leave the store, so a
    /// concurrent query cannot surface content from a document whose
    /// deletion already returned.
    pub async fn delete_document(&self, owner: &str, kb_id: &str, doc_id: &str) -> Result<()> {
        self.store.get_knowledge_base(owner, kb_id).await?;

        let lock = self.kb_lock(kb_id).await;
        let _guard = lock.lock().await;

        let document = self.store.get_document(kb_id, doc_id).await?;
        for &chunk_id in &document.chunk_ids {
            self.index.remove(kb_id, chunk_id);
        }
        self.store.delete_document(kb_id, doc_id).await?;

        tracing::info!("Deleted document '{}' from knowledge base {kb_id}", document.filename);
        Ok(())
    }
}

/// Map a filename to its supported type, by extension (case-insensitive).
fn detect_file_type(filename: &str) -> Result<String> {
    let extension = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    if SUPPORTED_FILE_TYPES.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(KbError::validation(format!(
            "unsupported file type for '{filename}' (supported: {})",
            SUPPORTED_FILE_TYPES.join(", ")
        )))
    }
}
