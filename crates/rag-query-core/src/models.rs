//! Core data models shared by ingestion and query time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// String-to-string metadata carried from a source document onto its chunks.
pub type Metadata = BTreeMap<String, String>;

/// Metadata key holding the chunk id (used as the citation).
pub const META_ID: &str = "id";
/// Metadata key holding the originating document identifier or path.
pub const META_SOURCE: &str = "source";

/// A document loaded from the corpus, before chunking.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    /// Stable document identifier, the prefix of every chunk id.
    pub id: String,
    /// Full extracted text.
    pub text: String,
    /// Metadata copied onto every chunk (`source`, `file_name`, ...).
    pub metadata: Metadata,
}

/// A bounded slice of a document's text, independently indexed and retrievable.
///
/// Chunks are created once by the chunker and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `<document_id>_chunk_<sequence>`.
    pub id: String,
    pub document_id: String,
    /// Position within the document, starting at 0.
    pub sequence: u64,
    /// Window text with surrounding whitespace trimmed.
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
    /// Document metadata plus the injected `id` key.
    pub metadata: Metadata,
}

/// One question's lifecycle, from submission to answer.
///
/// A job is `PENDING` while `is_complete` is false and becomes `COMPLETE`
/// exactly once, when `answer_text` and `sources` are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryJob {
    pub query_id: String,
    pub query_text: String,
    pub answer_text: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub is_complete: bool,
    /// Unix timestamp (seconds) of submission.
    #[serde(default)]
    pub created_at: i64,
}

impl QueryJob {
    /// Create a pending job with a fresh `query_id`.
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_id: Uuid::new_v4().simple().to_string(),
            query_text: query_text.into(),
            answer_text: None,
            sources: Vec::new(),
            is_complete: false,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Returns a copy of this job in the `COMPLETE` state.
    pub fn completed(&self, answer_text: String, sources: Vec<String>) -> Self {
        Self {
            answer_text: Some(answer_text),
            sources,
            is_complete: true,
            ..self.clone()
        }
    }

    pub fn state(&self) -> &'static str {
        if self.is_complete {
            "COMPLETE"
        } else {
            "PENDING"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_pending() {
        let job = QueryJob::new("what is macrodactyly?");
        assert!(!job.is_complete);
        assert!(job.answer_text.is_none());
        assert!(job.sources.is_empty());
        assert_eq!(job.state(), "PENDING");
        assert_eq!(job.query_id.len(), 32);
    }

    #[test]
    fn completed_keeps_identity() {
        let job = QueryJob::new("q");
        let done = job.completed("a".to_string(), vec!["doc_chunk_0".to_string()]);
        assert_eq!(done.query_id, job.query_id);
        assert_eq!(done.query_text, "q");
        assert_eq!(done.created_at, job.created_at);
        assert_eq!(done.state(), "COMPLETE");
    }

    #[test]
    fn payload_shape() {
        let job = QueryJob::new("q");
        let json = serde_json::to_value(&job).unwrap();
        for key in ["query_id", "query_text", "answer_text", "sources", "is_complete"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert!(json["answer_text"].is_null());

        let back: QueryJob = serde_json::from_value(json).unwrap();
        assert_eq!(back, job);
    }
}
