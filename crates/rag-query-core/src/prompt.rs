//! Grounded prompt construction.
//!
//! The prompt instructs the model to answer only from the retrieved
//! context, to reply with an explicit insufficiency signal when the context
//! does not contain the answer, and not to add outside information.
//! Chunks appear in retrieval order, separated by [`CONTEXT_DELIMITER`].

use serde::Deserialize;

use crate::models::Chunk;

/// Separator placed between chunk texts in the context block.
pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

/// Default insufficiency signal.
pub const DEFAULT_INSUFFICIENT_ANSWER: &str = "I don't know.";

/// How far the model may stretch beyond the literal context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grounding {
    /// Answer from context, or give the closest supported answer when
    /// the question can be generalized from it.
    #[default]
    Generalize,
    /// Answer from context or reply with the insufficiency signal.
    Strict,
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    grounding: Grounding,
    insufficient_answer: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(Grounding::default(), DEFAULT_INSUFFICIENT_ANSWER)
    }
}

impl PromptBuilder {
    pub fn new(grounding: Grounding, insufficient_answer: impl Into<String>) -> Self {
        Self {
            grounding,
            insufficient_answer: insufficient_answer.into(),
        }
    }

    /// The text the model is told to reply with when context is insufficient.
    pub fn insufficient_answer(&self) -> &str {
        &self.insufficient_answer
    }

    /// Join chunk texts in order. Zero chunks give an empty block.
    pub fn context_block(chunks: &[Chunk]) -> String {
        chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_DELIMITER)
    }

    /// Build the full prompt for `question` over `chunks`.
    pub fn build(&self, question: &str, chunks: &[Chunk]) -> String {
        let context = Self::context_block(chunks);
        let generalize = match self.grounding {
            Grounding::Generalize => {
                " YET, if the context doesn't provide enough information but you can \
                 generalize the question from it and give significant, closest \
                 information, please do."
            }
            Grounding::Strict => "",
        };

        format!(
            "\nAnswer the question **only using the provided context**:\n\n\
             {context}\n\n\
             ---\n\
             If the answer cannot be found in the retrieved context, respond with: \"{signal}\".{generalize}\n\n\
             Frame your response clearly and concisely, ensuring it is structured and directly addresses the question.\n\n\
             Do not infer additional information beyond what is provided in the context.\n\n\
             ---\n\
             **Question:** {question}\n\
             **Answer:**\n",
            context = context,
            signal = self.insufficient_answer,
            generalize = generalize,
            question = question,
        )
    }
}
