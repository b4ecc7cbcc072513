//! SQLite-backed document store.
//!
//! One database file (`ragkb.db`) holds three tables: `knowledge_bases`,
//! `documents`, and `chunks`. Embeddings are stored inline as little-endian
//! f16 blobs in the chunk rows, so a knowledge base is fully contained in
//! the one file and the vector index can be rebuilt from it at startup.

use crate::error::{KbError, Result};
use crate::store::{
    ChunkId, ChunkRecord, Document, DocumentStore, KnowledgeBase, NewChunk, NewDocument,
};
use async_trait::async_trait;
use half::f16;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// SQLite implementation of [`DocumentStore`].
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the store's database under `base_dir` and run
    /// migrations.
    pub async fn open(base_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(base_dir)
            .await
            .map_err(|e| KbError::ingestion(format!("failed to create {base_dir:?}: {e}")))?;
        let db_path = base_dir.join("ragkb.db");

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .foreign_keys(true)
            .page_size(1 << 16)
            .optimize_on_close(true, None);

        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self { pool };
        store.create_tables().await?;
        Ok(store)
    }

    /// Open an in-memory store, used by tests.
    ///
    /// The pool is pinned to a single connection: every sqlite `:memory:`
    /// connection gets its own private database, so a larger pool would
    /// scatter tables across connections.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await?;
        let store = Self { pool };
        store.create_tables().await?;
        Ok(store)
    }

    async fn create_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS knowledge_bases (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                kb_id TEXT NOT NULL REFERENCES knowledge_bases(id) ON DELETE CASCADE,
                filename TEXT NOT NULL,
                file_type TEXT NOT NULL,
                size INTEGER NOT NULL,
                uploaded_at INTEGER NOT NULL,
                chunk_count INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                sequence INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                byte_start INTEGER NOT NULL,
                byte_end INTEGER NOT NULL,
                UNIQUE(document_id, sequence)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_kbs_owner ON knowledge_bases(owner, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_documents_kb ON documents(kb_id)",
            "CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id)",
        ] {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    /// Direct access to the connection pool, for maintenance tooling.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn document_ids_for(&self, kb_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM documents WHERE kb_id = ? ORDER BY uploaded_at, rowid")
            .bind(kb_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get::<String, _>("id")).collect())
    }

    async fn chunk_ids_for(&self, doc_id: &str) -> Result<Vec<ChunkId>> {
        let rows = sqlx::query("SELECT id FROM chunks WHERE document_id = ? ORDER BY sequence")
            .bind(doc_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get::<i64, _>("id")).collect())
    }
}

/// Serialize an f16 vector as little-endian bytes for blob storage.
fn encode_embedding(embedding: &[f16]) -> Vec<u8> {
    bytemuck::cast_slice(embedding).to_vec()
}

/// Decode a blob written by [`encode_embedding`]. Copies through
/// `pod_collect_to_vec` since blob bytes from the driver carry no alignment
/// guarantee.
fn decode_embedding(blob: &[u8]) -> Vec<f16> {
    bytemuck::pod_collect_to_vec(blob)
}

fn chunk_from_row(row: &sqlx::sqlite::SqliteRow) -> ChunkRecord {
    ChunkRecord {
        id: row.get::<i64, _>("id"),
        document_id: row.get::<String, _>("document_id"),
        sequence: row.get::<i64, _>("sequence") as usize,
        content: row.get::<String, _>("content"),
        embedding: decode_embedding(&row.get::<Vec<u8>, _>("embedding")),
        byte_start: row.get::<i64, _>("byte_start") as usize,
        byte_end: row.get::<i64, _>("byte_end") as usize,
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn create_knowledge_base(
        &self,
        owner: &str,
        name: &str,
        description: &str,
    ) -> Result<KnowledgeBase> {
        let name = name.trim();
        if name.is_empty() {
            return Err(KbError::validation("knowledge base name must not be empty"));
        }

        let kb = KnowledgeBase {
            id: uuid::Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: chrono::Utc::now().timestamp(),
            document_ids: Vec::new(),
        };

        sqlx::query(
            "INSERT INTO knowledge_bases (id, owner, name, description, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&kb.id)
        .bind(&kb.owner)
        .bind(&kb.name)
        .bind(&kb.description)
        .bind(kb.created_at)
        .execute(&self.pool)
        .await?;

        tracing::info!("Created knowledge base '{}' ({})", kb.name, kb.id);
        Ok(kb)
    }

    async fn get_knowledge_base(&self, owner: &str, kb_id: &str) -> Result<KnowledgeBase> {
        let row = sqlx::query(
            "SELECT id, owner, name, description, created_at
             FROM knowledge_bases WHERE id = ? AND owner = ?",
        )
        .bind(kb_id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| KbError::not_found("knowledge base", kb_id))?;

        Ok(KnowledgeBase {
            id: row.get::<String, _>("id"),
            owner: row.get::<String, _>("owner"),
            name: row.get::<String, _>("name"),
            description: row.get::<String, _>("description"),
            created_at: row.get::<i64, _>("created_at"),
            document_ids: self.document_ids_for(kb_id).await?,
        })
    }

    async fn list_knowledge_bases(&self, owner: &str) -> Result<Vec<KnowledgeBase>> {
        let rows = sqlx::query(
            "SELECT id, owner, name, description, created_at
             FROM knowledge_bases WHERE owner = ?
             ORDER BY created_at DESC, rowid DESC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        let mut kbs = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.get::<String, _>("id");
            kbs.push(KnowledgeBase {
                document_ids: self.document_ids_for(&id).await?,
                id,
                owner: row.get::<String, _>("owner"),
                name: row.get::<String, _>("name"),
                description: row.get::<String, _>("description"),
                created_at: row.get::<i64, _>("created_at"),
            });
        }
        Ok(kbs)
    }

    async fn delete_knowledge_base(&self, owner: &str, kb_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Children first, explicitly, so the delete does not depend on the
        // connection's foreign_keys pragma.
        sqlx::query(
            "DELETE FROM chunks WHERE document_id IN
             (SELECT id FROM documents WHERE kb_id = ?)",
        )
        .bind(kb_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM documents WHERE kb_id = ?")
            .bind(kb_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM knowledge_bases WHERE id = ? AND owner = ?")
            .bind(kb_id)
            .bind(owner)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(KbError::not_found("knowledge base", kb_id));
        }

        tx.commit().await?;
        tracing::info!("Deleted knowledge base {kb_id}");
        Ok(())
    }

    async fn add_document(
        &self,
        kb_id: &str,
        meta: NewDocument,
        chunks: Vec<NewChunk>,
    ) -> Result<Document> {
        let doc_id = uuid::Uuid::new_v4().to_string();
        let uploaded_at = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;

        let kb_exists = sqlx::query("SELECT 1 FROM knowledge_bases WHERE id = ?")
            .bind(kb_id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !kb_exists {
            return Err(KbError::not_found("knowledge base", kb_id));
        }

        sqlx::query(
            "INSERT INTO documents (id, kb_id, filename, file_type, size, uploaded_at, chunk_count)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&doc_id)
        .bind(kb_id)
        .bind(&meta.filename)
        .bind(&meta.file_type)
        .bind(meta.size as i64)
        .bind(uploaded_at)
        .bind(chunks.len() as i64)
        .execute(&mut *tx)
        .await?;

        let mut chunk_ids = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO chunks (document_id, sequence, content, embedding, byte_start, byte_end)
                 VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
            )
            .bind(&doc_id)
            .bind(chunk.sequence as i64)
            .bind(&chunk.content)
            .bind(encode_embedding(&chunk.embedding))
            .bind(chunk.byte_start as i64)
            .bind(chunk.byte_end as i64)
            .fetch_one(&mut *tx)
            .await?;
            chunk_ids.push(id);
        }

        tx.commit().await?;
        tracing::debug!(
            "Stored document '{}' ({} chunks) in knowledge base {kb_id}",
            meta.filename,
            chunk_ids.len()
        );

        Ok(Document {
            id: doc_id,
            kb_id: kb_id.to_string(),
            filename: meta.filename,
            file_type: meta.file_type,
            size: meta.size,
            uploaded_at,
            chunk_count: chunk_ids.len(),
            chunk_ids,
        })
    }

    async fn get_document(&self, kb_id: &str, doc_id: &str) -> Result<Document> {
        let row = sqlx::query(
            "SELECT id, kb_id, filename, file_type, size, uploaded_at, chunk_count
             FROM documents WHERE id = ? AND kb_id = ?",
        )
        .bind(doc_id)
        .bind(kb_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| KbError::not_found("document", doc_id))?;

        Ok(Document {
            id: row.get::<String, _>("id"),
            kb_id: row.get::<String, _>("kb_id"),
            filename: row.get::<String, _>("filename"),
            file_type: row.get::<String, _>("file_type"),
            size: row.get::<i64, _>("size") as u64,
            uploaded_at: row.get::<i64, _>("uploaded_at"),
            chunk_count: row.get::<i64, _>("chunk_count") as usize,
            chunk_ids: self.chunk_ids_for(doc_id).await?,
        })
    }

    async fn list_documents(&self, kb_id: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT id, kb_id, filename, file_type, size, uploaded_at, chunk_count
             FROM documents WHERE kb_id = ? ORDER BY uploaded_at, rowid",
        )
        .bind(kb_id)
        .fetch_all(&self.pool)
        .await?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.get::<String, _>("id");
            documents.push(Document {
                chunk_ids: self.chunk_ids_for(&id).await?,
                id,
                kb_id: row.get::<String, _>("kb_id"),
                filename: row.get::<String, _>("filename"),
                file_type: row.get::<String, _>("file_type"),
                size: row.get::<i64, _>("size") as u64,
                uploaded_at: row.get::<i64, _>("uploaded_at"),
                chunk_count: row.get::<i64, _>("chunk_count") as usize,
            });
        }
        Ok(documents)
    }

    async fn delete_document(&self, kb_id: &str, doc_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM documents WHERE id = ? AND kb_id = ?")
            .bind(doc_id)
            .bind(kb_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(KbError::not_found("document", doc_id));
        }

        tx.commit().await?;
        tracing::debug!("Deleted document {doc_id} from knowledge base {kb_id}");
        Ok(())
    }

    async fn get_chunk(&self, chunk_id: ChunkId) -> Result<Option<ChunkRecord>> {
        let row = sqlx::query(
            "SELECT id, document_id, sequence, content, embedding, byte_start, byte_end
             FROM chunks WHERE id = ?",
        )
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(chunk_from_row))
    }

    async fn get_document_chunks(&self, doc_id: &str) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query(
            "SELECT id, document_id, sequence, content, embedding, byte_start, byte_end
             FROM chunks WHERE document_id = ? ORDER BY sequence",
        )
        .bind(doc_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(chunk_from_row).collect())
    }

    async fn all_embeddings(&self) -> Result<Vec<(String, ChunkId, Vec<f16>)>> {
        let rows = sqlx::query(
            "SELECT documents.kb_id AS kb_id, chunks.id AS id, chunks.embedding AS embedding
             FROM chunks JOIN documents ON chunks.document_id = documents.id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                (
                    row.get::<String, _>("kb_id"),
                    row.get::<i64, _>("id"),
                    decode_embedding(&row.get::<Vec<u8>, _>("embedding")),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn sample_chunk(sequence: usize, content: &str) -> NewChunk {
        NewChunk {
            sequence,
            content: content.to_string(),
            embedding: vec![f16::from_f32(0.5); 4],
            byte_start: sequence * 10,
            byte_end: sequence * 10 + content.len(),
        }
    }

    fn sample_doc(filename: &str) -> NewDocument {
        NewDocument {
            filename: filename.to_string(),
            file_type: "txt".to_string(),
            size: 42,
        }
    }

    #[test]
    fn test_embedding_blob_round_trip() {
        let embedding: Vec<f16> = [0.25, -1.5, 0.0, 3.75].iter().map(|&x| f16::from_f32(x)).collect();
        let blob = encode_embedding(&embedding);
        assert_eq!(blob.len(), embedding.len() * 2);
        assert_eq!(decode_embedding(&blob), embedding);
    }

    #[tokio::test]
    async fn test_knowledge_base_crud() -> Result<()> {
        let store = SqliteStore::open_memory().await?;

        let kb = store.create_knowledge_base("alice", "Math Notes", "algebra").await?;
        assert_eq!(kb.name, "Math Notes");
        assert!(kb.document_ids.is_empty());

        let fetched = store.get_knowledge_base("alice", &kb.id).await?;
        assert_eq!(fetched.id, kb.id);
        assert_eq!(fetched.description, "algebra");

        let listed = store.list_knowledge_bases("alice").await?;
        assert_eq!(listed.len(), 1);

        store.delete_knowledge_base("alice", &kb.id).await?;
        assert!(store.get_knowledge_base("alice", &kb.id).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_blank_name_rejected() -> Result<()> {
        let store = SqliteStore::open_memory().await?;
        let err = store
            .create_knowledge_base("alice", "   ", "")
            .await
            .unwrap_err();
        assert!(matches!(err, KbError::Validation { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_other_owner_cannot_see_kb() -> Result<()> {
        let store = SqliteStore::open_memory().await?;
        let kb = store.create_knowledge_base("alice", "Private", "").await?;

        let err = store.get_knowledge_base("bob", &kb.id).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.list_knowledge_bases("bob").await?.is_empty());

        let err = store.delete_knowledge_base("bob", &kb.id).await.unwrap_err();
        assert!(err.is_not_found());
        // Still there for its owner.
        store.get_knowledge_base("alice", &kb.id).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_add_and_fetch_document() -> Result<()> {
        let store = SqliteStore::open_memory().await?;
        let kb = store.create_knowledge_base("alice", "Notes", "").await?;

        let doc = store
            .add_document(
                &kb.id,
                sample_doc("notes.txt"),
                vec![sample_chunk(0, "first"), sample_chunk(1, "second")],
            )
            .await?;
        assert_eq!(doc.chunk_count, 2);
        assert_eq!(doc.chunk_ids.len(), 2);
        assert!(doc.chunk_ids[0] < doc.chunk_ids[1]);

        let chunks = store.get_document_chunks(&doc.id).await?;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "first");
        assert_eq!(chunks[0].embedding.len(), 4);

        let one = store.get_chunk(doc.chunk_ids[1]).await?.unwrap();
        assert_eq!(one.content, "second");
        assert_eq!(one.sequence, 1);

        let fetched = store.get_knowledge_base("alice", &kb.id).await?;
        assert_eq!(fetched.document_ids, vec![doc.id.clone()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_add_document_to_missing_kb() -> Result<()> {
        let store = SqliteStore::open_memory().await?;
        let err = store
            .add_document("no-such-kb", sample_doc("a.txt"), vec![sample_chunk(0, "x")])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_sequence_rolls_back_whole_document() -> Result<()> {
        let store = SqliteStore::open_memory().await?;
        let kb = store.create_knowledge_base("alice", "Notes", "").await?;

        let result = store
            .add_document(
                &kb.id,
                sample_doc("dup.txt"),
                vec![sample_chunk(0, "a"), sample_chunk(0, "b")],
            )
            .await;
        assert!(result.is_err());

        // Nothing partial was kept.
        assert!(store.list_documents(&kb.id).await?.is_empty());
        assert!(store.all_embeddings().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_document_removes_chunks() -> Result<()> {
        let store = SqliteStore::open_memory().await?;
        let kb = store.create_knowledge_base("alice", "Notes", "").await?;
        let doc = store
            .add_document(&kb.id, sample_doc("a.txt"), vec![sample_chunk(0, "x")])
            .await?;
        let chunk_id = doc.chunk_ids[0];

        store.delete_document(&kb.id, &doc.id).await?;
        assert!(store.get_chunk(chunk_id).await?.is_none());
        assert!(store.delete_document(&kb.id, &doc.id).await.unwrap_err().is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn test_kb_delete_cascades() -> Result<()> {
        let store = SqliteStore::open_memory().await?;
        let kb = store.create_knowledge_base("alice", "Notes", "").await?;
        store
            .add_document(&kb.id, sample_doc("a.txt"), vec![sample_chunk(0, "x")])
            .await?;
        store
            .add_document(&kb.id, sample_doc("b.txt"), vec![sample_chunk(0, "y")])
            .await?;

        store.delete_knowledge_base("alice", &kb.id).await?;
        assert!(store.all_embeddings().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_list_order_newest_kb_first() -> Result<()> {
        let store = SqliteStore::open_memory().await?;
        let first = store.create_knowledge_base("alice", "first", "").await?;
        let second = store.create_knowledge_base("alice", "second", "").await?;

        let listed = store.list_knowledge_bases("alice").await?;
        let ids: Vec<&str> = listed.iter().map(|kb| kb.id.as_str()).collect();
        // Same-second creations fall back to insertion order, newest first.
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_all_embeddings_spans_knowledge_bases() -> Result<()> {
        let store = SqliteStore::open_memory().await?;
        let kb1 = store.create_knowledge_base("alice", "one", "").await?;
        let kb2 = store.create_knowledge_base("alice", "two", "").await?;
        store
            .add_document(&kb1.id, sample_doc("a.txt"), vec![sample_chunk(0, "x")])
            .await?;
        store
            .add_document(&kb2.id, sample_doc("b.txt"), vec![sample_chunk(0, "y")])
            .await?;

        let all = store.all_embeddings().await?;
        assert_eq!(all.len(), 2);
        let kb_ids: std::collections::HashSet<&str> =
            all.iter().map(|(kb_id, _, _)| kb_id.as_str()).collect();
        assert!(kb_ids.contains(kb1.id.as_str()));
        assert!(kb_ids.contains(kb2.id.as_str()));
        Ok(())
    }

    #[tokio::test]
    async fn test_persists_across_reopen() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let kb_id;
        {
            let store = SqliteStore::open(dir.path()).await?;
            let kb = store.create_knowledge_base("alice", "Durable", "").await?;
            kb_id = kb.id;
            store
                .add_document(&kb_id, sample_doc("a.txt"), vec![sample_chunk(0, "x")])
                .await?;
        }

        let store = SqliteStore::open(dir.path()).await?;
        let kb = store.get_knowledge_base("alice", &kb_id).await?;
        assert_eq!(kb.name, "Durable");
        assert_eq!(store.all_embeddings().await?.len(), 1);
        Ok(())
    }
}
