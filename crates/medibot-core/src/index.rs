//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the pipeline's only contract with the
//! document index: top-k nearest-neighbour search by vector, returning each
//! hit's text and metadata. Indexes are read-only at request time and shared
//! across sessions, so implementations must be `Send + Sync`.
//!
//! [`FlatIndex`] is the in-memory implementation: rows are held in insertion
//! order and searched by brute-force cosine similarity.

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;

/// One nearest-neighbour match.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub text: String,
    /// Loader metadata, normally `{"source": ..., "page": ...}`.
    pub metadata: serde_json::Value,
    pub score: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Vector dimensionality, or `None` for an empty index.
    fn dims(&self) -> Option<usize>;

    /// Number of stored chunks.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return at most `k` hits, most similar first.
    ///
    /// Hits with equal scores keep their original index order.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>>;
}

struct StoredChunk {
    text: String,
    metadata: serde_json::Value,
    vector: Vec<f32>,
}

/// In-memory index searched by brute-force cosine similarity.
#[derive(Default)]
pub struct FlatIndex {
    chunks: Vec<StoredChunk>,
    dims: Option<usize>,
}

impl FlatIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. All vectors in one index must share a dimension.
    pub fn push(
        &mut self,
        text: impl Into<String>,
        metadata: serde_json::Value,
        vector: Vec<f32>,
    ) -> Result<()> {
        if vector.is_empty() {
            bail!("embedding vector must not be empty");
        }
        match self.dims {
            Some(d) if d != vector.len() => bail!(
                "embedding has {} dimensions, index has {}",
                vector.len(),
                d
            ),
            _ => self.dims = Some(vector.len()),
        }
        self.chunks.push(StoredChunk {
            text: text.into(),
            metadata,
            vector,
        });
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for FlatIndex {
    fn dims(&self) -> Option<usize> {
        self.dims
    }

    fn len(&self) -> usize {
        self.chunks.len()
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (i, cosine_similarity(query, &c.vector)))
            .collect();

        // sort_by is stable: ties stay in insertion order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| {
                let c = &self.chunks[i];
                IndexHit {
                    text: c.text.clone(),
                    metadata: c.metadata.clone(),
                    score,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn index() -> FlatIndex {
        let mut idx = FlatIndex::new();
        idx.push("east", json!({"page": 1}), vec![1.0, 0.0]).unwrap();
        idx.push("north", json!({"page": 2}), vec![0.0, 1.0]).unwrap();
        idx.push("north-east", json!({"page": 3}), vec![1.0, 1.0]).unwrap();
        idx.push("also east", json!({"page": 4}), vec![2.0, 0.0]).unwrap();
        idx
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let hits = index().search(&[0.0, 1.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "north");
        assert_eq!(hits[1].text, "north-east");
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let hits = index().search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].text, "east");
        assert_eq!(hits[1].text, "also east");
    }

    #[tokio::test]
    async fn test_k_bounds() {
        let idx = index();
        for k in 0..=6 {
            let hits = idx.search(&[1.0, 1.0], k).await.unwrap();
            assert!(hits.len() <= k);
            assert_eq!(hits.len(), k.min(idx.len()));
        }
    }

    #[test]
    fn test_push_rejects_mismatched_dims() {
        let mut idx = index();
        assert!(idx.push("bad", json!({}), vec![1.0, 2.0, 3.0]).is_err());
        assert!(idx.push("empty", json!({}), vec![]).is_err());
        assert_eq!(idx.dims(), Some(2));
        assert_eq!(idx.len(), 4);
    }

    #[tokio::test]
    async fn test_empty_index() {
        let idx = FlatIndex::new();
        assert!(idx.is_empty());
        assert_eq!(idx.dims(), None);
        assert!(idx.search(&[1.0], 3).await.unwrap().is_empty());
    }
}
