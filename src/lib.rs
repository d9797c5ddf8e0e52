//! # RAG Query
//!
//! Retrieval-augmented question answering over a local document corpus.
//!
//! Documents are chunked, embedded, and stored in a SQLite vector index.
//! A question is answered by MMR retrieval over that index, a grounded
//! prompt, and one language-model call. Each question is tracked as a
//! query job that is either answered inline or handed to a worker.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Corpus  │──▶│ Chunk+Embed  │──▶│ SQLite index │
//! │ PDF/DOCX │   │   (ingest)   │   │   (chunks)   │
//! └──────────┘   └──────────────┘   └──────┬───────┘
//!                                          │ MMR
//!        ┌──────────────┐           ┌──────▼───────┐     ┌─────────┐
//!        │ CLI / HTTP   │──submit──▶│ Orchestrator │────▶│   LLM   │
//!        │ (ragq)       │◀───get────│  + job store │     └─────────┘
//!        └──────────────┘           └──────┬───────┘
//!                                          │ dispatch
//!                                   ┌──────▼───────┐
//!                                   │ HTTP worker  │
//!                                   │ (ragq serve) │
//!                                   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragq init                      # create both databases
//! ragq ingest --reset            # rebuild the index from corpus.data_dir
//! ragq query "What is LFH?"      # answer and print the job
//! ragq serve api                 # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`corpus`] | Corpus scanning and document loading |
//! | [`extract`] | PDF, DOCX, and text extraction |
//! | [`ingest`] | Corpus ingestion into the index |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Language-model providers |
//! | [`aws`] | SigV4 request signing |
//! | [`dispatch`] | HTTP worker hand-off |
//! | [`sqlite_store`] | SQLite corpus index and job store |
//! | [`query`] | Pipeline wiring, `query`/`get` commands |
//! | [`server`] | HTTP API and HTTP worker |
//! | [`worker`] | One-shot worker command |
//! | [`db`] | Database connections |
//! | [`migrate`] | Schema migrations |
//! | [`logging`] | Diagnostic logging setup |

pub mod aws;
pub mod config;
pub mod corpus;
pub mod db;
pub mod dispatch;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod query;
pub mod server;
pub mod sqlite_store;
pub mod worker;
