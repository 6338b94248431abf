//! Schema setup for the sqlite-backed chunk graph. Idempotent; safe to
//! run on every startup.

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS graph_documents (
            id TEXT PRIMARY KEY,
            title TEXT,
            ingested_at INTEGER NOT NULL,
            chunk_count INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS graph_chunks (
            document_id TEXT NOT NULL,
            chunk_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            element_type TEXT NOT NULL,
            page_number INTEGER,
            section_path TEXT NOT NULL,
            content_type TEXT NOT NULL,
            pages_json TEXT NOT NULL DEFAULT '[]',
            hash TEXT NOT NULL,
            PRIMARY KEY (document_id, chunk_id),
            UNIQUE (document_id, chunk_index),
            FOREIGN KEY (document_id) REFERENCES graph_documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS graph_edges (
            document_id TEXT NOT NULL,
            src TEXT NOT NULL,
            dst TEXT NOT NULL,
            kind TEXT NOT NULL,
            weight REAL NOT NULL DEFAULT 0.0,
            PRIMARY KEY (document_id, src, dst, kind)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_graph_edges_src ON graph_edges(document_id, src, kind)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_graph_chunks_section \
         ON graph_chunks(document_id, section_path)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
