//! In-memory [`CorpusIndex`] for tests and small corpora.
//!
//! Entries live in a `BTreeMap` keyed by chunk id behind a `RwLock`.
//! Nearest-neighbour search is brute-force cosine similarity.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::Chunk;

use super::{check_query_dims, validate_entries, CorpusIndex, IndexEntry, ScoredEntry};

pub struct InMemoryIndex {
    entries: RwLock<BTreeMap<String, IndexEntry>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory index lock poisoned")
}

#[async_trait]
impl CorpusIndex for InMemoryIndex {
    async fn reset(&self) -> Result<()> {
        self.entries.write().map_err(poisoned)?.clear();
        Ok(())
    }

    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        validate_entries(entries)?;
        let mut stored = self.entries.write().map_err(poisoned)?;
        for entry in entries {
            stored.insert(entry.chunk.id.clone(), entry.clone());
        }
        Ok(())
    }

    async fn nearest(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ScoredEntry>> {
        let stored = self.entries.read().map_err(poisoned)?;
        let mut scored = Vec::with_capacity(stored.len());
        for e in stored.values() {
            check_query_dims(query_vec.len(), e.embedding.len())?;
            scored.push(ScoredEntry {
                chunk: e.chunk.clone(),
                embedding: e.embedding.clone(),
                score: cosine_similarity(query_vec, &e.embedding),
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().map_err(poisoned)?.len())
    }

    async fn list(&self) -> Result<Vec<Chunk>> {
        let stored = self.entries.read().map_err(poisoned)?;
        Ok(stored.values().map(|e| e.chunk.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;

    fn entry(doc: &str, seq: u64, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk: Chunk {
                id: crate::chunk::chunk_id(doc, seq),
                document_id: doc.to_string(),
                sequence: seq,
                text: format!("{} {}", doc, seq),
                hash: String::new(),
                metadata: Metadata::new(),
            },
            embedding,
        }
    }

    #[tokio::test]
    async fn test_nearest_orders_by_similarity() {
        let index = InMemoryIndex::new();
        index
            .upsert(&[
                entry("a", 0, vec![1.0, 0.0]),
                entry("b", 0, vec![0.0, 1.0]),
                entry("c", 0, vec![0.7, 0.7]),
            ])
            .await
            .unwrap();

        let hits = index.nearest(&[1.0, 0.1], 2).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["a_chunk_0", "c_chunk_0"]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_ties_broken_by_id() {
        let index = InMemoryIndex::new();
        index
            .upsert(&[entry("z", 0, vec![1.0]), entry("a", 0, vec![1.0])])
            .await
            .unwrap();
        let hits = index.nearest(&[1.0], 10).await.unwrap();
        assert_eq!(hits[0].chunk.id, "a_chunk_0");
        assert_eq!(hits[1].chunk.id, "z_chunk_0");
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_reset_clears() {
        let index = InMemoryIndex::new();
        index.upsert(&[entry("a", 0, vec![1.0])]).await.unwrap();
        index.upsert(&[entry("a", 0, vec![2.0])]).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
        assert_eq!(index.list().await.unwrap()[0].id, "a_chunk_0");

        index.reset().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
        assert!(index.nearest(&[1.0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nearest_rejects_wrong_dimension() {
        let index = InMemoryIndex::new();
        index
            .upsert(&[entry("a", 0, vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
        let err = index.nearest(&[1.0, 0.0], 5).await.unwrap_err();
        assert!(err.to_string().contains("re-ingest"));
    }

    #[tokio::test]
    async fn test_upsert_rejects_malformed_ids() {
        let index = InMemoryIndex::new();
        let mut bad = entry("a", 0, vec![1.0]);
        bad.chunk.id = "a-0".to_string();
        assert!(index.upsert(&[bad]).await.is_err());
        assert_eq!(index.count().await.unwrap(), 0);
    }
}
