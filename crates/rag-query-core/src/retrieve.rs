//! Query-time retrieval over a shared index.

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::embedding::Embedder;
use crate::models::Chunk;
use crate::search::max_marginal_relevance_search;
use crate::store::CorpusIndex;

pub const DEFAULT_K: usize = 5;
pub const DEFAULT_FETCH_K: usize = 15;
pub const DEFAULT_LAMBDA_MULT: f32 = 0.1;

/// MMR tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    /// Chunks returned per query.
    pub k: usize,
    /// Candidates considered before re-ranking.
    pub fetch_k: usize,
    /// 1.0 is pure relevance, 0.0 pure diversity.
    pub lambda_mult: f32,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            fetch_k: DEFAULT_FETCH_K,
            lambda_mult: DEFAULT_LAMBDA_MULT,
        }
    }
}

impl RetrievalParams {
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            bail!("retrieval.k must be >= 1");
        }
        if self.fetch_k == 0 {
            bail!("retrieval.fetch_k must be >= 1");
        }
        if !(0.0..=1.0).contains(&self.lambda_mult) {
            bail!(
                "retrieval.lambda_mult must be within [0, 1], got {}",
                self.lambda_mult
            );
        }
        Ok(())
    }
}

/// Embeds queries and runs MMR search against a read-only index.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<dyn CorpusIndex>,
    embedder: Arc<dyn Embedder>,
    params: RetrievalParams,
}

impl Retriever {
    pub fn new(
        index: Arc<dyn CorpusIndex>,
        embedder: Arc<dyn Embedder>,
        params: RetrievalParams,
    ) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            index,
            embedder,
            params,
        })
    }

    /// Returns at most `k` chunks in MMR selection order.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>> {
        max_marginal_relevance_search(
            self.index.as_ref(),
            self.embedder.as_ref(),
            query,
            self.params.k,
            self.params.fetch_k,
            self.params.lambda_mult,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{chunk_text, ChunkParams};
    use crate::embedding::HashEmbedder;
    use crate::models::Metadata;
    use crate::store::index_chunks;
    use crate::store::memory::InMemoryIndex;

    #[test]
    fn test_defaults() {
        let p = RetrievalParams::default();
        assert_eq!((p.k, p.fetch_k), (5, 15));
        assert!((p.lambda_mult - 0.1).abs() < f32::EPSILON);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_invalid_params() {
        let bad = [
            RetrievalParams { k: 0, ..Default::default() },
            RetrievalParams { fetch_k: 0, ..Default::default() },
            RetrievalParams { lambda_mult: 1.5, ..Default::default() },
            RetrievalParams { lambda_mult: -0.1, ..Default::default() },
        ];
        for p in bad {
            assert!(p.validate().is_err(), "{:?}", p);
        }
    }

    #[tokio::test]
    async fn test_retrieve_caps_at_k() {
        let index = Arc::new(InMemoryIndex::new());
        let embedder = Arc::new(HashEmbedder::default());
        let text = "nerve hamartoma study ".repeat(500);
        let chunks = chunk_text("study", &text, &Metadata::new(), &ChunkParams::default()).unwrap();
        assert!(chunks.len() > 5);
        index_chunks(index.as_ref(), embedder.as_ref(), &chunks, 16)
            .await
            .unwrap();

        let retriever = Retriever::new(index, embedder, RetrievalParams::default()).unwrap();
        let hits = retriever.retrieve("nerve").await.unwrap();
        assert_eq!(hits.len(), 5);
    }
}
