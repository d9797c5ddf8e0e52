//! Wiring of the query pipeline from configuration, plus the `query` and
//! `get` CLI commands.

use std::sync::Arc;

use anyhow::{Context, Result};

use rag_query_core::embedding::Embedder;
use rag_query_core::generate::{Generator, LanguageModel};
use rag_query_core::job::JobStore;
use rag_query_core::models::QueryJob;
use rag_query_core::orchestrator::{ExecutionMode, JobOrchestrator, Worker};
use rag_query_core::pipeline::QueryPipeline;
use rag_query_core::prompt::PromptBuilder;
use rag_query_core::retrieve::Retriever;
use rag_query_core::store::check_query_dims;

use crate::config::Config;
use crate::db;
use crate::dispatch::create_execution_mode;
use crate::embedding::create_embedder;
use crate::llm::create_model;
use crate::migrate::{migrate_index, migrate_jobs};
use crate::sqlite_store::{SqliteCorpusIndex, SqliteJobStore};

/// Everything the API server and the workers need.
#[derive(Clone)]
pub struct Services {
    pub orchestrator: JobOrchestrator,
    pub worker: Worker,
}

/// Build services from the config's embedding, llm, and worker sections.
pub async fn build_services(config: &Config) -> Result<Services> {
    let embedder = create_embedder(&config.embedding)?;
    let model = create_model(&config.llm)?;
    let mode = create_execution_mode(&config.worker)?;
    build_services_with(config, embedder, model, mode).await
}

/// Build services with explicit black-box implementations.
pub async fn build_services_with(
    config: &Config,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn LanguageModel>,
    mode: ExecutionMode,
) -> Result<Services> {
    let index_pool = db::connect_index(config).await?;
    migrate_index(&index_pool).await?;
    let jobs_pool = db::connect_jobs(config).await?;
    migrate_jobs(&jobs_pool).await?;

    let index = Arc::new(SqliteCorpusIndex::new(index_pool));
    if let Some(stored) = index.stored_dims().await? {
        check_query_dims(embedder.dims(), stored)
            .with_context(|| format!("Embedder '{}' does not match the index", embedder.model_name()))?;
    }
    let jobs: Arc<dyn JobStore> = Arc::new(SqliteJobStore::new(jobs_pool));

    let retriever = Retriever::new(index, embedder, config.retrieval_params())?;
    let prompts = PromptBuilder::new(
        config.prompt.grounding,
        config.prompt.insufficient_answer.clone(),
    );
    let pipeline = QueryPipeline::new(
        retriever,
        prompts,
        Generator::new(model),
        config.prompt.on_empty_context,
    );

    Ok(Services {
        orchestrator: JobOrchestrator::new(pipeline.clone(), jobs.clone(), mode),
        worker: Worker::new(pipeline, jobs),
    })
}

fn print_job(job: &QueryJob) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(job)?);
    Ok(())
}

/// `ragq query "<text>"`
pub async fn run_query(config: &Config, query_text: &str) -> Result<()> {
    let services = build_services(config).await?;
    let job = services.orchestrator.submit(query_text).await?;
    print_job(&job)
}

/// `ragq get <query_id>`
pub async fn run_get(config: &Config, query_id: &str) -> Result<()> {
    let services = build_services(config).await?;
    match services.orchestrator.get(query_id).await? {
        Some(job) => print_job(&job),
        None => {
            eprintln!("Error: query not found: {}", query_id);
            std::process::exit(1);
        }
    }
}
