//! Top-k retrieval over a knowledge base.
//!
//! The query path is read-only and lock-free: embed the question, search
//! the index partition, hydrate the winning chunk ids from the store, and
//! assemble a context string plus source attributions. Chunk ids that won
//! the search but are gone from the store by hydration time (a concurrent
//! delete) are skipped with a warning rather than failing the query.

use crate::error::{KbError, Result};
use crate::index::VectorIndex;
use crate::store::{ChunkId, DocumentStore};
use ragkb_embed::EmbeddingProvider;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Results returned per query when the caller does not say.
pub const DEFAULT_TOP_K: usize = 3;

/// Attribution for one retrieved chunk.
#[derive(Debug, Clone, Serialize)]
pub struct QuerySource {
    pub document_id: String,
    pub filename: String,
    pub chunk_id: ChunkId,
    /// Byte span of the chunk in the original document.
    pub byte_start: usize,
    pub byte_end: usize,
    /// Cosine similarity against the question, higher is better.
    pub score: f32,
}

/// A query answer: concatenated context plus per-chunk attributions.
///
/// `sources` is ordered best match first; `context` concatenates the same
/// chunks in the same order, separated by blank lines.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResponse {
    pub context: String,
    pub sources: Vec<QuerySource>,
}

impl QueryResponse {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Read-only retrieval over the store and index.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn DocumentStore>,
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl QueryEngine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
        }
    }

    /// Answer a question against one knowledge base.
    ///
    /// `top_k` defaults to [`DEFAULT_TOP_K`]; an explicit 0 is a validation
    /// error. Querying an empty knowledge base returns an empty response.
    pub async fn query(
        &self,
        owner: &str,
        kb_id: &str,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<QueryResponse> {
        let k = top_k.unwrap_or(DEFAULT_TOP_K);
        if k == 0 {
            return Err(KbError::validation("top_k must be positive"));
        }

        // Ownership check doubles as the existence check.
        self.store.get_knowledge_base(owner, kb_id).await?;

        let query_vector = self.embedder.embed_text(question).await?;
        let hits = self.index.search(kb_id, &query_vector, k)?;
        tracing::debug!("Query on knowledge base {kb_id} matched {} chunks", hits.len());

        let mut seen: HashSet<ChunkId> = HashSet::new();
        let mut filenames: HashMap<String, String> = HashMap::new();
        let mut parts: Vec<String> = Vec::with_capacity(hits.len());
        let mut sources: Vec<QuerySource> = Vec::with_capacity(hits.len());

        for (chunk_id, score) in hits {
            if !seen.insert(chunk_id) {
                continue;
            }

            let Some(chunk) = self.store.get_chunk(chunk_id).await? else {
                tracing::warn!("Skipping chunk {chunk_id}: deleted since it was indexed");
                continue;
            };

            let filename = match filenames.get(&chunk.document_id) {
                Some(name) => name.clone(),
                None => match self.store.get_document(kb_id, &chunk.document_id).await {
                    Ok(document) => {
                        filenames.insert(chunk.document_id.clone(), document.filename.clone());
                        document.filename
                    }
                    Err(e) if e.is_not_found() => {
                        tracing::warn!(
                            "Skipping chunk {chunk_id}: document {} deleted since it was indexed",
                            chunk.document_id
                        );
                        continue;
                    }
                    Err(e) => return Err(e),
                },
            };

            parts.push(chunk.content);
            sources.push(QuerySource {
                document_id: chunk.document_id,
                filename,
                chunk_id,
                byte_start: chunk.byte_start,
                byte_end: chunk.byte_end,
                score,
            });
        }

        Ok(QueryResponse {
            context: parts.join("\n\n"),
            sources,
        })
    }
}
