//! Query job lifecycle.
//!
//! ```text
//!              submit()
//!                 │
//!      ┌──────────┴───────────┐
//!   Inline                 Dispatch
//!      │                      │
//!  pipeline.answer()     insert PENDING
//!      │                      │
//!  insert COMPLETE       dispatcher.dispatch() ──► Worker::handle()
//!      │                      │                        │
//!  return COMPLETE       return PENDING          pipeline.answer()
//!                                                      │
//!                                             finalize (PENDING → COMPLETE)
//! ```
//!
//! The mode is chosen once when the orchestrator is built. A failed inline
//! generation writes no record and surfaces the error to the caller. A
//! failed worker leaves the record `PENDING`.

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::job::{DispatchFailed, Dispatcher, FinalizeOutcome, JobStore};
use crate::models::QueryJob;
use crate::pipeline::QueryPipeline;

/// How submitted jobs are executed.
#[derive(Clone)]
pub enum ExecutionMode {
    /// Answer within `submit`.
    Inline,
    /// Persist `PENDING` and hand the job to a worker.
    Dispatch(Arc<dyn Dispatcher>),
}

impl ExecutionMode {
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionMode::Inline => "inline",
            ExecutionMode::Dispatch(_) => "dispatch",
        }
    }
}

#[derive(Clone)]
pub struct JobOrchestrator {
    pipeline: QueryPipeline,
    jobs: Arc<dyn JobStore>,
    mode: ExecutionMode,
}

impl JobOrchestrator {
    pub fn new(pipeline: QueryPipeline, jobs: Arc<dyn JobStore>, mode: ExecutionMode) -> Self {
        Self {
            pipeline,
            jobs,
            mode,
        }
    }

    /// Create a job for `query_text` and run or dispatch it.
    ///
    /// Inline mode returns the completed job; dispatch mode returns the
    /// pending job as soon as the worker accepted it.
    pub async fn submit(&self, query_text: &str) -> Result<QueryJob> {
        if query_text.trim().is_empty() {
            bail!("query_text must not be empty");
        }

        let job = QueryJob::new(query_text);
        tracing::info!(query_id = %job.query_id, mode = self.mode.name(), "query submitted");

        match &self.mode {
            ExecutionMode::Inline => {
                let generation = self.pipeline.answer(query_text).await?;
                let done = job.completed(generation.answer_text, generation.sources);
                self.jobs.insert(&done).await?;
                Ok(done)
            }
            ExecutionMode::Dispatch(dispatcher) => {
                self.jobs.insert(&job).await?;
                dispatcher
                    .dispatch(&job)
                    .await
                    .with_context(|| DispatchFailed {
                        target: dispatcher.target().to_string(),
                    })?;
                tracing::info!(
                    query_id = %job.query_id,
                    target = dispatcher.target(),
                    "job dispatched"
                );
                Ok(job)
            }
        }
    }

    /// Current state of a job, or `None` for an unknown id.
    pub async fn get(&self, query_id: &str) -> Result<Option<QueryJob>> {
        self.jobs.get(query_id).await
    }
}

/// Executes dispatched jobs and finalizes their records.
#[derive(Clone)]
pub struct Worker {
    pipeline: QueryPipeline,
    jobs: Arc<dyn JobStore>,
}

impl Worker {
    pub fn new(pipeline: QueryPipeline, jobs: Arc<dyn JobStore>) -> Self {
        Self { pipeline, jobs }
    }

    /// Answer the job in `payload` and mark its record complete.
    ///
    /// Redelivered payloads for an already complete job are skipped
    /// without calling the model. Every failure is logged here before it
    /// is returned, and the record stays `PENDING`.
    pub async fn handle(&self, payload: &QueryJob) -> Result<FinalizeOutcome> {
        match self.run(payload).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let reason = format!("{:#}", e);
                tracing::error!(
                    query_id = %payload.query_id,
                    error = %reason,
                    "worker failed, job stays pending"
                );
                Err(e)
            }
        }
    }

    async fn run(&self, payload: &QueryJob) -> Result<FinalizeOutcome> {
        let existing = self
            .jobs
            .get(&payload.query_id)
            .await
            .context("Failed to read job record")?;
        if existing.is_some_and(|job| job.is_complete) {
            tracing::info!(query_id = %payload.query_id, "job already complete, skipping");
            return Ok(FinalizeOutcome::AlreadyComplete);
        }

        let generation = self.pipeline.answer(&payload.query_text).await?;

        let done = payload.completed(generation.answer_text, generation.sources);
        let outcome = self
            .jobs
            .finalize(&done)
            .await
            .context("Failed to finalize job record")?;
        match outcome {
            FinalizeOutcome::Applied => {
                tracing::info!(query_id = %done.query_id, "job finalized")
            }
            FinalizeOutcome::AlreadyComplete => {
                tracing::warn!(query_id = %done.query_id, "job completed concurrently, result discarded")
            }
        }
        Ok(outcome)
    }
}
