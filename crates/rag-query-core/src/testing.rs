//! Deterministic fakes shared by unit tests.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::chunk::{chunk_text, ChunkParams};
use crate::embedding::HashEmbedder;
use crate::generate::{Generator, LanguageModel};
use crate::job::Dispatcher;
use crate::models::{Metadata, QueryJob};
use crate::pipeline::{EmptyContextPolicy, QueryPipeline};
use crate::prompt::PromptBuilder;
use crate::retrieve::{RetrievalParams, Retriever};
use crate::store::index_chunks;
use crate::store::memory::InMemoryIndex;

/// Replies with a fixed answer and records every prompt.
pub struct ScriptedModel {
    answer: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answer.clone())
    }
}

pub struct FailingModel;

#[async_trait]
impl LanguageModel for FailingModel {
    fn model_name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        bail!("model unavailable")
    }
}

/// Records dispatched jobs instead of sending them.
pub struct RecordingDispatcher {
    fail: bool,
    jobs: Mutex<Vec<QueryJob>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self {
            fail: false,
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn jobs(&self) -> Vec<QueryJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    fn target(&self) -> &str {
        "recording"
    }

    async fn dispatch(&self, job: &QueryJob) -> Result<()> {
        if self.fail {
            bail!("worker unreachable");
        }
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }
}

/// Pipeline over an in-memory index built from `(document_id, text)` pairs.
pub async fn pipeline_with(
    docs: &[(&str, &str)],
    model: Arc<dyn LanguageModel>,
    prompts: PromptBuilder,
    on_empty: EmptyContextPolicy,
) -> QueryPipeline {
    let index = Arc::new(InMemoryIndex::new());
    let embedder = Arc::new(HashEmbedder::default());
    for (doc, text) in docs {
        let chunks = chunk_text(doc, text, &Metadata::new(), &ChunkParams::default()).unwrap();
        index_chunks(index.as_ref(), embedder.as_ref(), &chunks, 16)
            .await
            .unwrap();
    }
    let retriever = Retriever::new(index, embedder, RetrievalParams::default()).unwrap();
    QueryPipeline::new(retriever, prompts, Generator::new(model), on_empty)
}

pub async fn indexed_pipeline(
    docs: &[(&str, &str)],
    model: Arc<dyn LanguageModel>,
) -> QueryPipeline {
    pipeline_with(
        docs,
        model,
        PromptBuilder::default(),
        EmptyContextPolicy::default(),
    )
    .await
}
