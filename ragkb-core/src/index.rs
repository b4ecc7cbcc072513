//! In-memory vector index with exact cosine-similarity search.
//!
//! Vectors live in per-knowledge-base partitions; a search only ever scans
//! one partition. The index is a cache over the store's embedding blobs and
//! is rebuilt from it at startup, so nothing here touches disk.
//!
//! Each partition's dimension is fixed by the first vector inserted into
//! it; later inserts and queries of a different length fail with a
//! dimension-mismatch error instead of producing garbage scores.

use crate::error::{KbError, Result};
use crate::store::ChunkId;
use half::f16;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
struct KbVectors {
    dimension: usize,
    vectors: HashMap<ChunkId, Vec<f16>>,
}

/// Exact-search vector index partitioned by knowledge base.
///
/// All methods take `&self`; interior mutability is a single [`RwLock`] so
/// searches on different knowledge bases proceed concurrently while inserts
/// and removals take the write half briefly.
#[derive(Debug, Default)]
pub struct VectorIndex {
    kbs: RwLock<HashMap<String, KbVectors>>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the vector for a chunk.
    pub fn insert(&self, kb_id: &str, chunk_id: ChunkId, vector: Vec<f16>) -> Result<()> {
        let mut kbs = self.kbs.write().unwrap();
        let kb = kbs.entry(kb_id.to_string()).or_default();

        if kb.vectors.is_empty() {
            kb.dimension = vector.len();
        } else if vector.len() != kb.dimension {
            return Err(KbError::DimensionMismatch {
                expected: kb.dimension,
                actual: vector.len(),
            });
        }

        kb.vectors.insert(chunk_id, vector);
        Ok(())
    }

    /// Remove a chunk's vector. Removing an absent id is a no-op so removal
    /// can be retried safely.
    pub fn remove(&self, kb_id: &str, chunk_id: ChunkId) {
        let mut kbs = self.kbs.write().unwrap();
        if let Some(kb) = kbs.get_mut(kb_id) {
            kb.vectors.remove(&chunk_id);
            if kb.vectors.is_empty() {
                kbs.remove(kb_id);
            }
        }
    }

    /// Drop a knowledge base's entire partition.
    pub fn drop_all(&self, kb_id: &str) {
        self.kbs.write().unwrap().remove(kb_id);
    }

    /// Exact top-k search within one knowledge base.
    ///
    /// Returns at most `k` `(chunk id, cosine score)` pairs, best score
    /// first, ascending chunk id breaking ties. An unknown or empty
    /// knowledge base yields an empty result rather than an error.
    pub fn search(&self, kb_id: &str, query: &[f16], k: usize) -> Result<Vec<(ChunkId, f32)>> {
        if k == 0 {
            return Err(KbError::validation("search limit must be positive"));
        }

        let kbs = self.kbs.read().unwrap();
        let Some(kb) = kbs.get(kb_id) else {
            return Ok(Vec::new());
        };
        if query.len() != kb.dimension {
            return Err(KbError::DimensionMismatch {
                expected: kb.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(ChunkId, f32)> = kb
            .vectors
            .iter()
            .map(|(&id, vector)| (id, cosine_similarity(query, vector)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Number of vectors indexed for a knowledge base.
    pub fn len(&self, kb_id: &str) -> usize {
        self.kbs
            .read()
            .unwrap()
            .get(kb_id)
            .map(|kb| kb.vectors.len())
            .unwrap_or(0)
    }

    /// Whether a knowledge base has no indexed vectors.
    pub fn is_empty(&self, kb_id: &str) -> bool {
        self.len(kb_id) == 0
    }
}

/// Cosine similarity, computed in f32. Zero vectors score 0 against
/// everything.
fn cosine_similarity(a: &[f16], b: &[f16]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = x.to_f32();
        let y = y.to_f32();
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(values: &[f32]) -> Vec<f16> {
        values.iter().map(|&x| f16::from_f32(x)).collect()
    }

    #[test]
    fn test_search_orders_by_score() {
        let index = VectorIndex::new();
        index.insert("kb", 1, v(&[1.0, 0.0])).unwrap();
        index.insert("kb", 2, v(&[0.0, 1.0])).unwrap();
        index.insert("kb", 3, v(&[0.7, 0.7])).unwrap();

        let results = index.search("kb", &v(&[1.0, 0.0]), 3).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, 1);
        assert!((results[0].1 - 1.0).abs() < 1e-3);
        assert_eq!(results[1].0, 3);
        assert_eq!(results[2].0, 2);

        let top_one = index.search("kb", &v(&[1.0, 0.0]), 1).unwrap();
        assert_eq!(top_one.len(), 1);
        assert_eq!(top_one[0].0, 1);
    }

    #[test]
    fn test_ties_break_by_ascending_chunk_id() {
        let index = VectorIndex::new();
        // Identical vectors, identical scores.
        index.insert("kb", 9, v(&[0.5, 0.5])).unwrap();
        index.insert("kb", 2, v(&[0.5, 0.5])).unwrap();
        index.insert("kb", 5, v(&[0.5, 0.5])).unwrap();

        let results = index.search("kb", &v(&[1.0, 1.0]), 3).unwrap();
        let ids: Vec<ChunkId> = results.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn test_k_larger_than_partition() {
        let index = VectorIndex::new();
        index.insert("kb", 1, v(&[1.0])).unwrap();
        let results = index.search("kb", &v(&[1.0]), 50).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_zero_k_rejected() {
        let index = VectorIndex::new();
        let err = index.search("kb", &v(&[1.0]), 0).unwrap_err();
        assert!(matches!(err, KbError::Validation { .. }));
    }

    #[test]
    fn test_unknown_kb_searches_empty() {
        let index = VectorIndex::new();
        assert!(index.search("nowhere", &v(&[1.0]), 3).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch() {
        let index = VectorIndex::new();
        index.insert("kb", 1, v(&[1.0, 0.0, 0.0])).unwrap();

        let err = index.insert("kb", 2, v(&[1.0, 0.0])).unwrap_err();
        assert!(matches!(
            err,
            KbError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));

        let err = index.search("kb", &v(&[1.0]), 3).unwrap_err();
        assert!(matches!(err, KbError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_partitions_are_independent() {
        let index = VectorIndex::new();
        index.insert("math", 1, v(&[1.0, 0.0])).unwrap();
        // Different dimension in another partition is fine.
        index.insert("recipes", 2, v(&[1.0, 0.0, 0.0])).unwrap();

        let results = index.search("math", &v(&[1.0, 0.0]), 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let index = VectorIndex::new();
        index.insert("kb", 1, v(&[1.0])).unwrap();

        index.remove("kb", 1);
        index.remove("kb", 1);
        index.remove("kb", 999);
        assert!(index.is_empty("kb"));

        // An emptied partition forgets its dimension.
        index.insert("kb", 2, v(&[1.0, 0.0])).unwrap();
        assert_eq!(index.len("kb"), 1);
    }

    #[test]
    fn test_drop_all() {
        let index = VectorIndex::new();
        index.insert("kb", 1, v(&[1.0])).unwrap();
        index.insert("kb", 2, v(&[0.5])).unwrap();
        index.insert("other", 3, v(&[1.0])).unwrap();

        index.drop_all("kb");
        assert!(index.is_empty("kb"));
        assert_eq!(index.len("other"), 1);
    }

    #[test]
    fn test_insert_replaces_existing_vector() {
        let index = VectorIndex::new();
        index.insert("kb", 1, v(&[1.0, 0.0])).unwrap();
        index.insert("kb", 1, v(&[0.0, 1.0])).unwrap();
        assert_eq!(index.len("kb"), 1);

        let results = index.search("kb", &v(&[0.0, 1.0]), 1).unwrap();
        assert!((results[0].1 - 1.0).abs() < 1e-3);
    }
}
