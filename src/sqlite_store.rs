//! SQLite-backed [`CorpusIndex`] and [`JobStore`].
//!
//! Embeddings are stored as little-endian `f32` BLOBs (see
//! [`vec_to_blob`]) and searched by brute-force cosine similarity.
//!
//! Job finalization is a compare-and-set on `is_complete = 0`, so a record
//! moves to `COMPLETE` at most once even if a payload is delivered twice.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use rag_query_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use rag_query_core::job::{FinalizeOutcome, JobStore};
use rag_query_core::models::{Chunk, Metadata, QueryJob};
use rag_query_core::store::{check_query_dims, validate_entries, CorpusIndex, IndexEntry, ScoredEntry};

#[derive(Clone)]
pub struct SqliteCorpusIndex {
    pool: SqlitePool,
}

impl SqliteCorpusIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Dimension of the stored embeddings, or `None` for an empty index.
    ///
    /// Fails if the index holds embeddings of more than one dimension.
    pub async fn stored_dims(&self) -> Result<Option<usize>> {
        let dims: Vec<i64> = sqlx::query_scalar("SELECT DISTINCT dims FROM chunks")
            .fetch_all(&self.pool)
            .await?;
        match dims.as_slice() {
            [] => Ok(None),
            [d] => Ok(Some(*d as usize)),
            _ => bail!(
                "index holds embeddings of several dimensions ({:?}); run `ragq ingest --reset`",
                dims
            ),
        }
    }
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<Chunk> {
    let metadata_json: String = row.get("metadata_json");
    let metadata: Metadata = serde_json::from_str(&metadata_json)
        .with_context(|| "Invalid chunk metadata_json in index")?;
    let sequence: i64 = row.get("sequence");
    Ok(Chunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        sequence: sequence as u64,
        text: row.get("text"),
        hash: row.get("hash"),
        metadata,
    })
}

#[async_trait]
impl CorpusIndex for SqliteCorpusIndex {
    async fn reset(&self) -> Result<()> {
        sqlx::query("DELETE FROM chunks").execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        validate_entries(entries)?;

        let mut tx = self.pool.begin().await?;
        for entry in entries {
            let chunk = &entry.chunk;
            let metadata_json = serde_json::to_string(&chunk.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, sequence, text, hash, metadata_json, embedding, dims)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    document_id = excluded.document_id,
                    sequence = excluded.sequence,
                    text = excluded.text,
                    hash = excluded.hash,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    dims = excluded.dims
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.sequence as i64)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(&metadata_json)
            .bind(vec_to_blob(&entry.embedding))
            .bind(entry.embedding.len() as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn nearest(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ScoredEntry>> {
        let rows = sqlx::query(
            "SELECT id, document_id, sequence, text, hash, metadata_json, embedding, dims FROM chunks",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let dims: i64 = row.get("dims");
            check_query_dims(query_vec.len(), dims as usize)?;
            let blob: Vec<u8> = row.get("embedding");
            let embedding = blob_to_vec(&blob);
            let score = cosine_similarity(query_vec, &embedding);
            scored.push(ScoredEntry {
                chunk: row_to_chunk(row)?,
                embedding,
                score,
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn list(&self) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT id, document_id, sequence, text, hash, metadata_json FROM chunks ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_chunk).collect()
    }
}

#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: &QueryJob) -> Result<()> {
        let sources_json = serde_json::to_string(&job.sources)?;
        let completed_at = job.is_complete.then(|| chrono::Utc::now().timestamp());
        sqlx::query(
            r#"
            INSERT INTO query_jobs (query_id, query_text, answer_text, sources_json, is_complete, created_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.query_id)
        .bind(&job.query_text)
        .bind(&job.answer_text)
        .bind(&sources_json)
        .bind(job.is_complete)
        .bind(job.created_at)
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert query '{}'", job.query_id))?;
        Ok(())
    }

    async fn get(&self, query_id: &str) -> Result<Option<QueryJob>> {
        let row = sqlx::query(
            "SELECT query_id, query_text, answer_text, sources_json, is_complete, created_at FROM query_jobs WHERE query_id = ?",
        )
        .bind(query_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let sources_json: String = row.get("sources_json");
        let sources: Vec<String> = serde_json::from_str(&sources_json)
            .with_context(|| format!("Invalid sources_json for query '{}'", query_id))?;

        Ok(Some(QueryJob {
            query_id: row.get("query_id"),
            query_text: row.get("query_text"),
            answer_text: row.get("answer_text"),
            sources,
            is_complete: row.get("is_complete"),
            created_at: row.get("created_at"),
        }))
    }

    async fn finalize(&self, job: &QueryJob) -> Result<FinalizeOutcome> {
        let sources_json = serde_json::to_string(&job.sources)?;
        let now = chrono::Utc::now().timestamp();

        let updated = sqlx::query(
            r#"
            UPDATE query_jobs
            SET answer_text = ?, sources_json = ?, is_complete = 1, completed_at = ?
            WHERE query_id = ? AND is_complete = 0
            "#,
        )
        .bind(&job.answer_text)
        .bind(&sources_json)
        .bind(now)
        .bind(&job.query_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 1 {
            return Ok(FinalizeOutcome::Applied);
        }

        // Either already complete, or the pending record never landed.
        let inserted = sqlx::query(
            r#"
            INSERT INTO query_jobs (query_id, query_text, answer_text, sources_json, is_complete, created_at, completed_at)
            VALUES (?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(query_id) DO NOTHING
            "#,
        )
        .bind(&job.query_id)
        .bind(&job.query_text)
        .bind(&job.answer_text)
        .bind(&sources_json)
        .bind(job.created_at)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 1 {
            Ok(FinalizeOutcome::Applied)
        } else {
            Ok(FinalizeOutcome::AlreadyComplete)
        }
    }
}
