use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the job table and the corpus index schema. Idempotent.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let jobs = db::connect_jobs(config).await?;
    migrate_jobs(&jobs).await?;
    jobs.close().await;

    let index = db::connect_index(config).await?;
    migrate_index(&index).await?;
    index.close().await;
    Ok(())
}

pub async fn migrate_jobs(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS query_jobs (
            query_id TEXT PRIMARY KEY,
            query_text TEXT NOT NULL,
            answer_text TEXT,
            sources_json TEXT NOT NULL DEFAULT '[]',
            is_complete INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            completed_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_query_jobs_created_at ON query_jobs(created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn migrate_index(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            sequence INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL,
            UNIQUE(document_id, sequence)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;

    Ok(())
}
