//! # RAG Query CLI (`ragq`)
//!
//! ## Usage
//!
//! ```bash
//! ragq --config ./config/ragq.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragq init` | Create the job and index databases |
//! | `ragq ingest [--reset] [--dry-run]` | Chunk, embed, and index the corpus |
//! | `ragq query "<text>"` | Submit a question and print the job |
//! | `ragq get <query_id>` | Print a job's current state |
//! | `ragq serve api` | Start the HTTP API |
//! | `ragq serve worker` | Start the HTTP worker |
//! | `ragq work [PAYLOAD\|-]` | Answer one dispatched job |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rag_query::{config, ingest, logging, migrate, query, server, worker};

/// RAG Query: retrieval-augmented question answering over a document corpus.
#[derive(Parser)]
#[command(
    name = "ragq",
    about = "Retrieval-augmented question answering over a local document corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragq.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize both database schemas. Idempotent.
    Init,

    /// Ingest the corpus into the vector index.
    Ingest {
        /// Delete and recreate the index before ingesting.
        #[arg(long)]
        reset: bool,

        /// Count files and chunks without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Submit a question and print the resulting job.
    ///
    /// In inline mode the job is complete; in dispatch mode it is pending
    /// until a worker answers it.
    Query {
        /// The question.
        text: String,
    },

    /// Print the current state of a job.
    Get {
        /// Job id returned by `query` or `/submit_query`.
        id: String,
    },

    /// Start a server.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },

    /// Answer one dispatched job and exit.
    Work {
        /// Job JSON, or `-` to read it from stdin.
        payload: Option<String>,
    },
}

#[derive(Subcommand)]
enum ServeService {
    /// HTTP API on `[server].bind`.
    Api,
    /// HTTP worker on `[server].worker_bind`.
    Worker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Databases initialized successfully.");
        }
        Commands::Ingest { reset, dry_run } => {
            ingest::run_ingest(&cfg, ingest::IngestOptions { reset, dry_run }).await?;
        }
        Commands::Query { text } => {
            query::run_query(&cfg, &text).await?;
        }
        Commands::Get { id } => {
            query::run_get(&cfg, &id).await?;
        }
        Commands::Serve { service } => match service {
            ServeService::Api => server::run_server(&cfg).await?,
            ServeService::Worker => server::run_worker_server(&cfg).await?,
        },
        Commands::Work { payload } => {
            worker::run_work(&cfg, payload.as_deref()).await?;
        }
    }

    Ok(())
}
