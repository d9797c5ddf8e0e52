//! Vector index abstraction.
//!
//! A [`CorpusIndex`] holds chunks together with their embeddings and
//! answers nearest-neighbour queries by cosine similarity. The index is
//! populated by ingestion and read by retrieval; it is never modified by
//! queries.
//!
//! Implementations must be `Send + Sync` so a single index can be shared
//! by concurrent queries.

pub mod memory;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::chunk::{chunk_id, parse_chunk_id};
use crate::embedding::Embedder;
use crate::models::Chunk;

/// A chunk paired with its embedding, as written to the index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// A nearest-neighbour hit.
///
/// The embedding is returned alongside the chunk because diversity
/// re-ranking compares candidates with each other.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// Persistent or in-memory chunk index.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`reset`](CorpusIndex::reset) | Remove every entry |
/// | [`upsert`](CorpusIndex::upsert) | Insert or replace entries by chunk id |
/// | [`nearest`](CorpusIndex::nearest) | Top-`limit` entries by cosine similarity |
/// | [`count`](CorpusIndex::count) | Number of stored entries |
/// | [`list`](CorpusIndex::list) | All chunks ordered by id |
#[async_trait]
pub trait CorpusIndex: Send + Sync {
    async fn reset(&self) -> Result<()>;

    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()>;

    /// Returns at most `limit` entries, highest similarity first, ties
    /// broken by chunk id. Fails if `query_vec` does not have the
    /// dimension of the stored embeddings.
    async fn nearest(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ScoredEntry>>;

    async fn count(&self) -> Result<usize>;

    async fn list(&self) -> Result<Vec<Chunk>>;
}

/// Check entries before they reach an index.
///
/// Every chunk id must be `<document_id>_chunk_<sequence>` and agree with
/// the chunk's own fields, and all embeddings must share one dimension.
pub fn validate_entries(entries: &[IndexEntry]) -> Result<()> {
    let mut dims: Option<usize> = None;
    for entry in entries {
        let chunk = &entry.chunk;
        match parse_chunk_id(&chunk.id) {
            Some((doc, seq)) if doc == chunk.document_id && seq == chunk.sequence => {}
            _ => bail!(
                "malformed chunk id '{}' (expected '{}')",
                chunk.id,
                chunk_id(&chunk.document_id, chunk.sequence)
            ),
        }
        if entry.embedding.is_empty() {
            bail!("chunk '{}' has an empty embedding", chunk.id);
        }
        match dims {
            None => dims = Some(entry.embedding.len()),
            Some(d) if d != entry.embedding.len() => bail!(
                "embedding dimension mismatch for '{}': {} != {}",
                chunk.id,
                entry.embedding.len(),
                d
            ),
            Some(_) => {}
        }
    }
    Ok(())
}

/// Fail unless a query vector matches the dimension of stored embeddings.
///
/// A mismatch means the index was built with a different embedding
/// configuration than the one answering queries.
pub fn check_query_dims(query_dims: usize, stored_dims: usize) -> Result<()> {
    if query_dims != stored_dims {
        bail!(
            "query embedding has {} dimensions but the index holds {}-dimensional embeddings; \
             re-ingest with the current [embedding] configuration",
            query_dims,
            stored_dims
        );
    }
    Ok(())
}

/// Embed `chunks` in batches and upsert them into `index`.
///
/// Returns the number of chunks written.
pub async fn index_chunks(
    index: &dyn CorpusIndex,
    embedder: &dyn Embedder,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<usize> {
    let batch_size = batch_size.max(1);
    let mut written = 0;

    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != batch.len() {
            bail!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            );
        }

        let entries: Vec<IndexEntry> = batch
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(chunk, embedding)| IndexEntry { chunk, embedding })
            .collect();
        validate_entries(&entries)?;
        index.upsert(&entries).await?;
        written += entries.len();
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryIndex;
    use super::*;
    use crate::chunk::{chunk_text, ChunkParams};
    use crate::embedding::HashEmbedder;
    use crate::models::Metadata;

    fn entry(id: &str, doc: &str, seq: u64, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk: Chunk {
                id: id.to_string(),
                document_id: doc.to_string(),
                sequence: seq,
                text: String::new(),
                hash: String::new(),
                metadata: Metadata::new(),
            },
            embedding,
        }
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        let entries = vec![
            entry("a_chunk_0", "a", 0, vec![1.0, 0.0]),
            entry("a_chunk_1", "a", 1, vec![0.0, 1.0]),
        ];
        assert!(validate_entries(&entries).is_ok());
    }

    #[test]
    fn test_validate_rejects_malformed_id() {
        let entries = vec![entry("a-0", "a", 0, vec![1.0])];
        assert!(validate_entries(&entries).is_err());

        let mismatched = vec![entry("b_chunk_0", "a", 0, vec![1.0])];
        assert!(validate_entries(&mismatched).is_err());
    }

    #[test]
    fn test_validate_rejects_mixed_dims() {
        let entries = vec![
            entry("a_chunk_0", "a", 0, vec![1.0, 0.0]),
            entry("a_chunk_1", "a", 1, vec![1.0]),
        ];
        assert!(validate_entries(&entries).is_err());
    }

    #[tokio::test]
    async fn test_index_chunks_in_batches() {
        let text = "lorem ipsum dolor ".repeat(300);
        let chunks =
            chunk_text("doc", &text, &Metadata::new(), &ChunkParams::default()).unwrap();
        let index = InMemoryIndex::new();
        let embedder = HashEmbedder::new(32).unwrap();

        let written = index_chunks(&index, &embedder, &chunks, 2).await.unwrap();
        assert_eq!(written, chunks.len());
        assert_eq!(index.count().await.unwrap(), chunks.len());

        // Re-indexing the same chunks replaces rather than duplicates.
        index_chunks(&index, &embedder, &chunks, 64).await.unwrap();
        assert_eq!(index.count().await.unwrap(), chunks.len());
    }
}
