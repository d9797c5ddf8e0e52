//! Retrieve, build the prompt, generate.

use anyhow::{bail, Result};
use serde::Deserialize;

use crate::generate::{Generation, Generator};
use crate::prompt::PromptBuilder;
use crate::retrieve::Retriever;

/// What to do when retrieval returns nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyContextPolicy {
    /// Send the empty-context prompt and let the model answer with the
    /// insufficiency signal.
    #[default]
    AskModel,
    /// Skip the model and answer with the insufficiency signal directly.
    AnswerSignal,
}

/// The synchronous query pipeline shared by the API and the workers.
#[derive(Clone)]
pub struct QueryPipeline {
    retriever: Retriever,
    prompts: PromptBuilder,
    generator: Generator,
    on_empty: EmptyContextPolicy,
}

impl QueryPipeline {
    pub fn new(
        retriever: Retriever,
        prompts: PromptBuilder,
        generator: Generator,
        on_empty: EmptyContextPolicy,
    ) -> Self {
        Self {
            retriever,
            prompts,
            generator,
            on_empty,
        }
    }

    /// Answer `query_text` from the index.
    ///
    /// Empty retrieval is not an error. Model failures propagate.
    pub async fn answer(&self, query_text: &str) -> Result<Generation> {
        if query_text.trim().is_empty() {
            bail!("query_text must not be empty");
        }

        let chunks = self.retriever.retrieve(query_text).await?;
        tracing::info!(retrieved = chunks.len(), "retrieved context");
        for chunk in &chunks {
            tracing::info!(
                chunk_id = %chunk.id,
                source = chunk.metadata.get("source").map(String::as_str).unwrap_or("unknown"),
                "context chunk"
            );
        }

        if chunks.is_empty() && self.on_empty == EmptyContextPolicy::AnswerSignal {
            return Ok(Generation {
                answer_text: self.prompts.insufficient_answer().to_string(),
                sources: Vec::new(),
            });
        }

        let prompt = self.prompts.build(query_text, &chunks);
        let generation = self.generator.generate(&prompt, &chunks).await?;
        tracing::info!(
            model = self.generator.model_name(),
            sources = generation.sources.len(),
            "generated answer"
        );
        Ok(generation)
    }
}
