//! Corpus ingestion.
//!
//! scan → extract → chunk → embed → upsert. With `reset`, the index file is
//! deleted and recreated first, so a reset followed by ingestion of the
//! same corpus reproduces identical chunk ids, text, and hashes. Ingestion
//! must not run while queries are being served from the same index.

use anyhow::{Context, Result};
use std::path::Path;

use rag_query_core::chunk::chunk_document;
use rag_query_core::embedding::Embedder;
use rag_query_core::models::Chunk;
use rag_query_core::store::{index_chunks, CorpusIndex};

use crate::config::Config;
use crate::corpus::{load_documents, scan_corpus};
use crate::db;
use crate::embedding::create_embedder;
use crate::migrate::migrate_index;
use crate::sqlite_store::SqliteCorpusIndex;

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    pub reset: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub files: usize,
    pub documents: usize,
    pub chunks: usize,
    pub written: usize,
    /// First chunk produced, for operator verification.
    pub sample: Option<Chunk>,
}

/// Delete the index database (and its WAL side files).
pub fn remove_index_files(path: &Path) -> Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut p = path.as_os_str().to_owned();
        p.push(suffix);
        let p = Path::new(&p);
        if p.exists() {
            std::fs::remove_file(p)
                .with_context(|| format!("Failed to remove index file: {}", p.display()))?;
        }
    }
    Ok(())
}

/// Ingest the configured corpus with `embedder`.
pub async fn ingest(
    config: &Config,
    embedder: &dyn Embedder,
    opts: IngestOptions,
) -> Result<IngestSummary> {
    let params = config.chunk_params();
    params.validate()?;

    let files = scan_corpus(&config.corpus)?;
    let docs = load_documents(&files)?;

    let mut chunks = Vec::new();
    for doc in &docs {
        chunks.extend(chunk_document(doc, &params)?);
    }

    let mut summary = IngestSummary {
        files: files.len(),
        documents: docs.len(),
        chunks: chunks.len(),
        written: 0,
        sample: chunks.first().cloned(),
    };

    if opts.dry_run {
        return Ok(summary);
    }

    if opts.reset {
        tracing::info!(path = %config.index.path.display(), "resetting corpus index");
        remove_index_files(&config.index.path)?;
    }

    let pool = db::connect_index(config).await?;
    migrate_index(&pool).await?;
    let index = SqliteCorpusIndex::new(pool.clone());

    summary.written = index_chunks(&index, embedder, &chunks, config.embedding.batch_size).await?;
    tracing::info!(
        documents = summary.documents,
        chunks = summary.written,
        total = index.count().await?,
        model = embedder.model_name(),
        "ingestion complete"
    );

    pool.close().await;
    Ok(summary)
}

/// CLI entry point for `ragq ingest`.
pub async fn run_ingest(config: &Config, opts: IngestOptions) -> Result<()> {
    let embedder = create_embedder(&config.embedding)?;
    let summary = ingest(config, embedder.as_ref(), opts).await?;

    if opts.dry_run {
        println!("ingest (dry-run)");
    } else {
        println!("ingest{}", if opts.reset { " (reset)" } else { "" });
    }
    println!("  files matched: {}", summary.files);
    println!("  documents:     {}", summary.documents);
    println!("  chunks:        {}", summary.chunks);
    if !opts.dry_run {
        println!("  chunks written: {}", summary.written);
    }

    if let Some(sample) = &summary.sample {
        println!();
        println!("--- Sample chunk: {} ---", sample.id);
        println!("{}", sample.text);
        println!();
        println!("metadata: {}", serde_json::to_string(&sample.metadata)?);
    }

    Ok(())
}
