//! TOML configuration.
//!
//! Every command loads one file (default `./config/ragq.toml`) and
//! validates it up front; a bad chunk sizing or a missing worker target
//! stops the process before any work starts.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use rag_query_core::chunk::{ChunkParams, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use rag_query_core::pipeline::EmptyContextPolicy;
use rag_query_core::prompt::{Grounding, DEFAULT_INSUFFICIENT_ANSWER};
use rag_query_core::retrieve::{RetrievalParams, DEFAULT_FETCH_K, DEFAULT_K, DEFAULT_LAMBDA_MULT};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Job records.
#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Corpus index location. `ingest --reset` deletes and recreates this file.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_include_globs() -> Vec<String> {
    ["**/*.pdf", "**/*.md", "**/*.txt", "**/*.docx"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    #[serde(default = "default_lambda_mult")]
    pub lambda_mult: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            fetch_k: DEFAULT_FETCH_K,
            lambda_mult: DEFAULT_LAMBDA_MULT,
        }
    }
}

fn default_k() -> usize {
    DEFAULT_K
}
fn default_fetch_k() -> usize {
    DEFAULT_FETCH_K
}
fn default_lambda_mult() -> f32 {
    DEFAULT_LAMBDA_MULT
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for Ollama (default `http://localhost:11434`) or an
    /// OpenAI-compatible server (default `https://api.openai.com`).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// AWS region for Bedrock.
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            url: None,
            region: None,
            temperature: None,
            max_tokens: None,
            timeout_secs: 120,
        }
    }
}

fn default_llm_provider() -> String {
    "disabled".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    #[serde(default)]
    pub grounding: Grounding,
    #[serde(default = "default_insufficient_answer")]
    pub insufficient_answer: String,
    #[serde(default)]
    pub on_empty_context: EmptyContextPolicy,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            grounding: Grounding::default(),
            insufficient_answer: default_insufficient_answer(),
            on_empty_context: EmptyContextPolicy::default(),
        }
    }
}

fn default_insufficient_answer() -> String {
    DEFAULT_INSUFFICIENT_ANSWER.to_string()
}

/// Boot-time execution policy for submitted queries.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    /// `inline` or `http`.
    #[serde(default = "default_worker_mode")]
    pub mode: String,
    /// Worker base URL for `http` mode; jobs are POSTed to `<url>/invoke`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_dispatch_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            mode: default_worker_mode(),
            url: None,
            timeout_secs: default_dispatch_timeout_secs(),
        }
    }
}

fn default_worker_mode() -> String {
    "inline".to_string()
}
fn default_dispatch_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_worker_bind")]
    pub worker_bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            worker_bind: default_worker_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_worker_bind() -> String {
    "127.0.0.1:8001".to_string()
}

impl Config {
    pub fn chunk_params(&self) -> ChunkParams {
        ChunkParams {
            chunk_size: self.chunking.chunk_size,
            overlap: self.chunking.overlap,
        }
    }

    pub fn retrieval_params(&self) -> RetrievalParams {
        RetrievalParams {
            k: self.retrieval.k,
            fetch_k: self.retrieval.fetch_k,
            lambda_mult: self.retrieval.lambda_mult,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    config.chunk_params().validate()?;
    config.retrieval_params().validate()?;

    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "hash" | "ollama" | "openai" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hash, ollama, openai, or local.",
            other
        ),
    }
    if embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }
    if embedding.provider != "hash" {
        if embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                embedding.provider
            );
        }
        if embedding.dims.is_none() {
            bail!(
                "embedding.dims must be specified when provider is '{}'",
                embedding.provider
            );
        }
    }

    let llm = &config.llm;
    match llm.provider.as_str() {
        "disabled" => {}
        "ollama" | "openai" | "bedrock" => {
            if llm.model.is_none() {
                bail!("llm.model must be specified when provider is '{}'", llm.provider);
            }
            if llm.provider == "bedrock" && llm.region.is_none() {
                bail!("llm.region must be specified when provider is 'bedrock'");
            }
        }
        other => bail!(
            "Unknown llm provider: '{}'. Must be ollama, openai, bedrock, or disabled.",
            other
        ),
    }

    let worker = &config.worker;
    match worker.mode.as_str() {
        "inline" => {}
        "http" => {
            if worker.url.is_none() {
                bail!("worker.url must be specified when worker.mode is 'http'");
            }
        }
        other => bail!(
            "Unknown worker mode: '{}'. Must be inline or http.",
            other
        ),
    }

    Ok(config)
}
