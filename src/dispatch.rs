//! Worker hand-off.
//!
//! [`HttpDispatcher`] POSTs the job to `<worker.url>/invoke` on a
//! `ragq serve worker` instance and returns as soon as the worker accepted
//! it, without waiting for the answer.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use rag_query_core::job::Dispatcher;
use rag_query_core::models::QueryJob;
use rag_query_core::orchestrator::ExecutionMode;

use crate::config::WorkerConfig;

/// Resolve `[worker]` into the orchestrator's execution mode.
pub fn create_execution_mode(config: &WorkerConfig) -> Result<ExecutionMode> {
    match config.mode.as_str() {
        "inline" => Ok(ExecutionMode::Inline),
        "http" => Ok(ExecutionMode::Dispatch(Arc::new(HttpDispatcher::new(config)?))),
        other => bail!("Unknown worker mode: {}", other),
    }
}

pub struct HttpDispatcher {
    client: reqwest::Client,
    invoke_url: String,
}

impl HttpDispatcher {
    pub fn new(config: &WorkerConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("worker.url required for http mode"))?;
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
            invoke_url: format!("{}/invoke", url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    fn target(&self) -> &str {
        &self.invoke_url
    }

    async fn dispatch(&self, job: &QueryJob) -> Result<()> {
        let response = self.client.post(&self.invoke_url).json(job).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("worker rejected job (HTTP {}): {}", status, body);
        }
        Ok(())
    }
}
