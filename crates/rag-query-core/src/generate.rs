//! Answer generation.
//!
//! The [`Generator`] sends a built prompt to a [`LanguageModel`] and pairs
//! the raw completion with the ids of the chunks that formed the context.
//! Citations always come from retrieval metadata, never from the model's
//! own text.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::models::{Chunk, META_ID};

/// Prompt in, completion out.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// An answer and the chunk ids it was grounded on.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub answer_text: String,
    pub sources: Vec<String>,
}

/// Context attached to errors raised by the language model.
///
/// Callers can detect a generation failure with
/// `err.downcast_ref::<GenerationFailed>()`.
#[derive(Debug, Clone)]
pub struct GenerationFailed {
    pub model: String,
}

impl fmt::Display for GenerationFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "language model '{}' failed", self.model)
    }
}

#[derive(Clone)]
pub struct Generator {
    model: Arc<dyn LanguageModel>,
}

impl Generator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Run the model once. Failures propagate without retry.
    pub async fn generate(&self, prompt: &str, retrieved: &[Chunk]) -> Result<Generation> {
        let answer_text = self.model.complete(prompt).await.with_context(|| GenerationFailed {
            model: self.model.model_name().to_string(),
        })?;

        Ok(Generation {
            answer_text,
            sources: source_ids(retrieved),
        })
    }
}

/// The `id` metadata of each chunk, in order, falling back to the chunk id.
pub fn source_ids(chunks: &[Chunk]) -> Vec<String> {
    chunks
        .iter()
        .map(|c| c.metadata.get(META_ID).cloned().unwrap_or_else(|| c.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;
    use crate::testing::{FailingModel, ScriptedModel};

    fn chunk(id: &str) -> Chunk {
        let mut metadata = Metadata::new();
        metadata.insert(META_ID.to_string(), id.to_string());
        Chunk {
            id: id.to_string(),
            document_id: "doc".to_string(),
            sequence: 0,
            text: "text".to_string(),
            hash: String::new(),
            metadata,
        }
    }

    #[tokio::test]
    async fn test_sources_follow_retrieval_not_model_text() {
        let model = Arc::new(ScriptedModel::new("See doc_chunk_9 [source: other_chunk_1]"));
        let generator = Generator::new(model.clone());
        let out = generator
            .generate("prompt", &[chunk("doc_chunk_1"), chunk("doc_chunk_0")])
            .await
            .unwrap();
        assert_eq!(out.answer_text, "See doc_chunk_9 [source: other_chunk_1]");
        assert_eq!(out.sources, vec!["doc_chunk_1", "doc_chunk_0"]);
        assert_eq!(model.prompts(), vec!["prompt".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_propagates_with_marker() {
        let generator = Generator::new(Arc::new(FailingModel));
        let err = generator.generate("p", &[]).await.unwrap_err();
        let marker = err.downcast_ref::<GenerationFailed>().unwrap();
        assert_eq!(marker.model, "failing");
        assert!(format!("{:#}", err).contains("model unavailable"));
    }

    #[test]
    fn test_source_ids_fallback_to_chunk_id() {
        let mut c = chunk("doc_chunk_3");
        c.metadata.clear();
        assert_eq!(source_ids(&[c]), vec!["doc_chunk_3"]);
    }
}
