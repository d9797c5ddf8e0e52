//! Job records and the worker hand-off boundary.
//!
//! A [`JobStore`] keeps one [`QueryJob`] per `query_id`. Records are
//! inserted once in either state and completed at most once: after
//! [`JobStore::finalize`] has applied, later finalizes for the same id are
//! no-ops. A [`Dispatcher`] hands a pending job to a worker and returns as
//! soon as the hand-off is accepted.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::QueryJob;

/// Result of a finalize attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The record moved to `COMPLETE` (or was created complete).
    Applied,
    /// The record was already complete and was left untouched.
    AlreadyComplete,
}

/// Durable job records keyed by `query_id`.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new record. Fails if the id already exists.
    async fn insert(&self, job: &QueryJob) -> Result<()>;

    /// Look up a record. Unknown ids are `Ok(None)`.
    async fn get(&self, query_id: &str) -> Result<Option<QueryJob>>;

    /// Write `answer_text`, `sources` and `is_complete = true` unless the
    /// record is already complete. A missing record is inserted as
    /// complete from `job`.
    async fn finalize(&self, job: &QueryJob) -> Result<FinalizeOutcome>;
}

/// Context attached to errors raised while handing a job to a worker.
#[derive(Debug, Clone)]
pub struct DispatchFailed {
    pub target: String,
}

impl fmt::Display for DispatchFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dispatch to '{}' failed", self.target)
    }
}

/// Fire-and-forget hand-off of a pending job to a worker.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Human-readable target (URL, function name) used in logs and errors.
    fn target(&self) -> &str;

    /// Send the serialized job. Returns once the worker has accepted it.
    async fn dispatch(&self, job: &QueryJob) -> Result<()>;
}

/// Thread-safe in-memory job store.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, QueryJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory job store lock poisoned")
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: &QueryJob) -> Result<()> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        if jobs.contains_key(&job.query_id) {
            bail!("query '{}' already exists", job.query_id);
        }
        jobs.insert(job.query_id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, query_id: &str) -> Result<Option<QueryJob>> {
        Ok(self.jobs.read().map_err(poisoned)?.get(query_id).cloned())
    }

    async fn finalize(&self, job: &QueryJob) -> Result<FinalizeOutcome> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        match jobs.get_mut(&job.query_id) {
            Some(existing) if existing.is_complete => Ok(FinalizeOutcome::AlreadyComplete),
            Some(existing) => {
                existing.answer_text = job.answer_text.clone();
                existing.sources = job.sources.clone();
                existing.is_complete = true;
                Ok(FinalizeOutcome::Applied)
            }
            None => {
                let mut created = job.clone();
                created.is_complete = true;
                jobs.insert(created.query_id.clone(), created);
                Ok(FinalizeOutcome::Applied)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = InMemoryJobStore::new();
        let job = QueryJob::new("q");
        store.insert(&job).await.unwrap();
        assert_eq!(store.get(&job.query_id).await.unwrap(), Some(job.clone()));
        assert!(store.insert(&job).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_id_is_none() {
        let store = InMemoryJobStore::new();
        assert_eq!(store.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_finalize_applies_once() {
        let store = InMemoryJobStore::new();
        let job = QueryJob::new("q");
        store.insert(&job).await.unwrap();

        let first = job.completed("first".to_string(), vec!["a_chunk_0".to_string()]);
        assert_eq!(store.finalize(&first).await.unwrap(), FinalizeOutcome::Applied);

        let second = job.completed("second".to_string(), vec![]);
        assert_eq!(
            store.finalize(&second).await.unwrap(),
            FinalizeOutcome::AlreadyComplete
        );

        let stored = store.get(&job.query_id).await.unwrap().unwrap();
        assert_eq!(stored.answer_text.as_deref(), Some("first"));
        assert_eq!(stored.sources, vec!["a_chunk_0"]);
        assert!(stored.is_complete);
        assert_eq!(stored.query_text, "q");
    }

    #[tokio::test]
    async fn test_finalize_missing_record_inserts_complete() {
        let store = InMemoryJobStore::new();
        let job = QueryJob::new("q").completed("a".to_string(), vec![]);
        assert_eq!(store.finalize(&job).await.unwrap(), FinalizeOutcome::Applied);
        assert!(store.get(&job.query_id).await.unwrap().unwrap().is_complete);
    }

    #[test]
    fn test_dispatch_failed_display() {
        let marker = DispatchFailed {
            target: "http://worker".to_string(),
        };
        assert_eq!(marker.to_string(), "dispatch to 'http://worker' failed");
    }
}
