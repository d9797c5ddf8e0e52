//! Maximal marginal relevance (MMR) retrieval.
//!
//! MMR trades relevance against redundancy. Starting from the most
//! relevant candidate, each further pick maximizes
//!
//! ```text
//! λ × sim(query, c) − (1 − λ) × max sim(c, s) for s in selected
//! ```
//!
//! With `λ = 1` this is plain top-k; lower values favour chunks unlike
//! those already picked.
//!
//! # Algorithm
//!
//! 1. Embed the query.
//! 2. Fetch `max(fetch_k, k)` nearest candidates from the index.
//! 3. Greedily select `k` of them by MMR score.
//! 4. Return the chunks in selection order.

use anyhow::Result;

use crate::embedding::{cosine_similarity, embed_query, Embedder};
use crate::models::Chunk;
use crate::store::{CorpusIndex, ScoredEntry};

/// Select up to `k` candidate indices by maximal marginal relevance.
///
/// `candidates` must be ordered by relevance, highest first; equal MMR
/// scores resolve to the earlier (more relevant) candidate.
pub fn mmr_select(candidates: &[ScoredEntry], k: usize, lambda_mult: f32) -> Vec<usize> {
    let mut selected: Vec<usize> = Vec::with_capacity(k.min(candidates.len()));
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0usize;
        let mut best_score = f32::NEG_INFINITY;

        for (pos, &i) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&j| cosine_similarity(&candidates[i].embedding, &candidates[j].embedding))
                .fold(None, |acc: Option<f32>, s| Some(acc.map_or(s, |a| a.max(s))))
                .unwrap_or(0.0);
            let score = lambda_mult * candidates[i].score - (1.0 - lambda_mult) * redundancy;
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }

        selected.push(remaining.remove(best_pos));
    }

    selected
}

/// Retrieve `k` diverse, relevant chunks for `query`.
///
/// Returns fewer than `k` chunks when the index holds fewer, and an empty
/// list for an empty index.
pub async fn max_marginal_relevance_search(
    index: &dyn CorpusIndex,
    embedder: &dyn Embedder,
    query: &str,
    k: usize,
    fetch_k: usize,
    lambda_mult: f32,
) -> Result<Vec<Chunk>> {
    if k == 0 {
        return Ok(Vec::new());
    }

    let query_vec = embed_query(embedder, query).await?;
    let candidates = index.nearest(&query_vec, fetch_k.max(k)).await?;
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let picks = mmr_select(&candidates, k, lambda_mult);
    tracing::debug!(
        candidates = candidates.len(),
        selected = picks.len(),
        "mmr selection complete"
    );

    let mut candidates: Vec<Option<ScoredEntry>> = candidates.into_iter().map(Some).collect();
    Ok(picks
        .into_iter()
        .filter_map(|i| candidates[i].take())
        .map(|e| e.chunk)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::models::Metadata;
    use crate::store::memory::InMemoryIndex;
    use crate::store::IndexEntry;

    fn candidate(id: &str, score: f32, embedding: Vec<f32>) -> ScoredEntry {
        ScoredEntry {
            chunk: Chunk {
                id: id.to_string(),
                document_id: id.to_string(),
                sequence: 0,
                text: id.to_string(),
                hash: String::new(),
                metadata: Metadata::new(),
            },
            embedding,
            score,
        }
    }

    #[test]
    fn test_first_pick_is_most_relevant() {
        let c = vec![
            candidate("a", 0.9, vec![1.0, 0.0]),
            candidate("b", 0.8, vec![0.0, 1.0]),
        ];
        for lambda in [0.0, 0.1, 0.5, 1.0] {
            assert_eq!(mmr_select(&c, 1, lambda), vec![0], "lambda {}", lambda);
        }
    }

    #[test]
    fn test_low_lambda_prefers_diversity() {
        // a and a2 are near duplicates; b is less relevant but different.
        let c = vec![
            candidate("a", 0.95, vec![1.0, 0.0]),
            candidate("a2", 0.94, vec![0.99, 0.01]),
            candidate("b", 0.60, vec![0.0, 1.0]),
        ];
        assert_eq!(mmr_select(&c, 2, 0.1), vec![0, 2]);
    }

    #[test]
    fn test_lambda_one_is_top_k() {
        let c = vec![
            candidate("a", 0.95, vec![1.0, 0.0]),
            candidate("a2", 0.94, vec![0.99, 0.01]),
            candidate("b", 0.60, vec![0.0, 1.0]),
        ];
        assert_eq!(mmr_select(&c, 2, 1.0), vec![0, 1]);
    }

    #[test]
    fn test_returns_at_most_candidates() {
        let c = vec![candidate("a", 0.5, vec![1.0])];
        assert_eq!(mmr_select(&c, 5, 0.1), vec![0]);
        assert!(mmr_select(&[], 5, 0.1).is_empty());
    }

    #[test]
    fn test_selection_has_no_duplicates() {
        let c: Vec<_> = (0..10)
            .map(|i| candidate(&format!("c{}", i), 1.0 - i as f32 * 0.05, vec![1.0, i as f32]))
            .collect();
        let mut picks = mmr_select(&c, 7, 0.3);
        assert_eq!(picks.len(), 7);
        picks.sort();
        picks.dedup();
        assert_eq!(picks.len(), 7);
    }

    async fn index_with(texts: &[(&str, &str)], embedder: &HashEmbedder) -> InMemoryIndex {
        let index = InMemoryIndex::new();
        let entries: Vec<IndexEntry> = texts
            .iter()
            .map(|(doc, text)| IndexEntry {
                chunk: Chunk {
                    id: crate::chunk::chunk_id(doc, 0),
                    document_id: doc.to_string(),
                    sequence: 0,
                    text: text.to_string(),
                    hash: String::new(),
                    metadata: Metadata::new(),
                },
                embedding: embedder.embed_one(text),
            })
            .collect();
        index.upsert(&entries).await.unwrap();
        index
    }

    #[tokio::test]
    async fn test_search_empty_index() {
        let embedder = HashEmbedder::default();
        let index = InMemoryIndex::new();
        let hits = max_marginal_relevance_search(&index, &embedder, "anything", 5, 15, 0.1)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_search_small_index_returns_all() {
        let embedder = HashEmbedder::default();
        let index = index_with(
            &[("a", "median nerve"), ("b", "ulnar nerve"), ("c", "retail sales")],
            &embedder,
        )
        .await;
        let hits = max_marginal_relevance_search(&index, &embedder, "median nerve", 5, 15, 0.1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, "a_chunk_0");
    }

    #[tokio::test]
    async fn test_fetch_k_below_k_is_raised() {
        let embedder = HashEmbedder::default();
        let index = index_with(
            &[("a", "one"), ("b", "two"), ("c", "three"), ("d", "four")],
            &embedder,
        )
        .await;
        let hits = max_marginal_relevance_search(&index, &embedder, "one", 3, 1, 0.5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
    }
}
