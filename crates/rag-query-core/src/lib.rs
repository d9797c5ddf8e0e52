//! # rag-query core
//!
//! Pure logic for the retrieval-augmented query pipeline: data models,
//! fixed-window chunking, the corpus index abstraction, MMR retrieval,
//! grounded prompt construction, generation, and the query-job state
//! machine.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network code.
//! The black boxes of the pipeline (embedding function, vector store,
//! language model, worker dispatch) are traits here; the `rag-query`
//! application crate supplies the concrete implementations.
//!
//! ```text
//! ingest:  SourceDocument ──▶ chunk ──▶ Embedder ──▶ CorpusIndex
//!
//! query:   JobOrchestrator ──▶ Retriever ──▶ PromptBuilder ──▶ Generator
//!                │                                                 │
//!                └──(dispatch)──▶ Worker ──▶ same pipeline ────────┘
//! ```

pub mod chunk;
pub mod embedding;
pub mod generate;
pub mod job;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod prompt;
pub mod retrieve;
pub mod search;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
