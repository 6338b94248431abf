//! Chunk graph storage and edge construction.
//!
//! The graph holds one document at a time: its chunks plus NEXT edges
//! (adjacent chunks within the same section) and optional SIMILAR_TO
//! edges (term-vector cosine above a threshold, computed at ingest).
//! Section membership is not materialized as edges; shared-section
//! lookups query the chunk rows directly.
//!
//! [`GraphStore`] is the narrow protocol the enhancer depends on. The
//! production implementation is [`SqliteGraphStore`]; tests use
//! [`MemoryGraphStore`], which can also be switched into a failing mode
//! to exercise fail-open behavior downstream.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::Chunk;
use crate::sparse::TfidfIndex;

/// Edge kinds persisted in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Next,
    SimilarTo,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Next => "NEXT",
            EdgeKind::SimilarTo => "SIMILAR_TO",
        }
    }
}

/// A directed edge between two chunks of the same document.
#[derive(Debug, Clone)]
pub struct Edge {
    pub src: String,
    pub dst: String,
    pub kind: EdgeKind,
    pub weight: f32,
}

/// Document row stored alongside its chunks.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: String,
    pub title: Option<String>,
    pub ingested_at: i64,
}

/// Narrow storage protocol for graph-backed retrieval.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Replace a document atomically: all prior chunks and edges for this
    /// document id are removed before the new ones are written.
    async fn replace_document(
        &self,
        doc: &DocumentRecord,
        chunks: &[Chunk],
        edges: &[Edge],
    ) -> Result<()>;

    /// All chunks of a document in chunk-index order.
    async fn load_chunks(&self, document_id: &str) -> Result<Vec<Chunk>>;

    /// Chunks reachable from `chunk_id` over NEXT edges.
    async fn next_chunks(&self, document_id: &str, chunk_id: &str) -> Result<Vec<Chunk>>;

    /// Chunks sharing a section path, in chunk-index order, capped at
    /// `limit`.
    async fn section_chunks(
        &self,
        document_id: &str,
        section_path: &str,
        limit: usize,
    ) -> Result<Vec<Chunk>>;

    /// Chunks reachable from `chunk_id` over SIMILAR_TO edges, strongest
    /// first.
    async fn similar_chunks(&self, document_id: &str, chunk_id: &str) -> Result<Vec<Chunk>>;
}

// ============ Edge construction ============

/// NEXT edges between consecutive chunks that share a section path.
/// Reading order never crosses a top-level section boundary.
pub fn next_edges(chunks: &[Chunk]) -> Vec<Edge> {
    chunks
        .windows(2)
        .filter(|pair| pair[0].section_path == pair[1].section_path)
        .map(|pair| Edge {
            src: pair[0].chunk_id.clone(),
            dst: pair[1].chunk_id.clone(),
            kind: EdgeKind::Next,
            weight: 1.0,
        })
        .collect()
}

/// SIMILAR_TO edges from each chunk to its top-N most similar peers with
/// cosine at or above `threshold`. Self-edges are never produced.
pub fn similarity_edges(index: &TfidfIndex, threshold: f32, top_n: usize) -> Vec<Edge> {
    let chunks = index.chunks();
    let mut edges = Vec::new();

    for i in 0..chunks.len() {
        let mut peers: Vec<(usize, f32)> = (0..chunks.len())
            .filter(|&j| j != i)
            .map(|j| (j, index.similarity(i, j)))
            .filter(|(_, sim)| *sim >= threshold)
            .collect();
        peers.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        peers.truncate(top_n);

        for (j, sim) in peers {
            edges.push(Edge {
                src: chunks[i].chunk_id.clone(),
                dst: chunks[j].chunk_id.clone(),
                kind: EdgeKind::SimilarTo,
                weight: sim,
            });
        }
    }

    edges
}

// ============ Sqlite store ============

pub struct SqliteGraphStore {
    pool: SqlitePool,
}

impl SqliteGraphStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_chunk(row: &SqliteRow) -> Result<Chunk> {
    let pages_json: String = row.try_get("pages_json")?;
    let page_number: Option<i64> = row.try_get("page_number")?;
    let index: i64 = row.try_get("chunk_index")?;

    Ok(Chunk {
        chunk_id: row.try_get("chunk_id")?,
        index: index as usize,
        text: row.try_get("text")?,
        element_type: row.try_get("element_type")?,
        page_number: page_number.map(|p| p as u32),
        section_path: row.try_get("section_path")?,
        content_type: row.try_get("content_type")?,
        pages: serde_json::from_str(&pages_json)?,
        hash: row.try_get("hash")?,
    })
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn replace_document(
        &self,
        doc: &DocumentRecord,
        chunks: &[Chunk],
        edges: &[Edge],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Single active document: any prior subgraph is cleared in full.
        sqlx::query("DELETE FROM graph_edges").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM graph_chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM graph_documents").execute(&mut *tx).await?;

        sqlx::query(
            "INSERT INTO graph_documents (id, title, ingested_at, chunk_count) VALUES (?, ?, ?, ?)",
        )
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(doc.ingested_at)
        .bind(chunks.len() as i64)
        .execute(&mut *tx)
        .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO graph_chunks
                    (document_id, chunk_id, chunk_index, text, element_type,
                     page_number, section_path, content_type, pages_json, hash)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&doc.id)
            .bind(&chunk.chunk_id)
            .bind(chunk.index as i64)
            .bind(&chunk.text)
            .bind(&chunk.element_type)
            .bind(chunk.page_number.map(|p| p as i64))
            .bind(&chunk.section_path)
            .bind(&chunk.content_type)
            .bind(serde_json::to_string(&chunk.pages)?)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;
        }

        for edge in edges {
            sqlx::query(
                "INSERT INTO graph_edges (document_id, src, dst, kind, weight) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&doc.id)
            .bind(&edge.src)
            .bind(&edge.dst)
            .bind(edge.kind.as_str())
            .bind(edge.weight as f64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT * FROM graph_chunks WHERE document_id = ? ORDER BY chunk_index",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_chunk).collect()
    }

    async fn next_chunks(&self, document_id: &str, chunk_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            r#"
            SELECT c.* FROM graph_edges e
            JOIN graph_chunks c
              ON c.document_id = e.document_id AND c.chunk_id = e.dst
            WHERE e.document_id = ? AND e.src = ? AND e.kind = 'NEXT'
            ORDER BY c.chunk_index
            "#,
        )
        .bind(document_id)
        .bind(chunk_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_chunk).collect()
    }

    async fn section_chunks(
        &self,
        document_id: &str,
        section_path: &str,
        limit: usize,
    ) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT * FROM graph_chunks WHERE document_id = ? AND section_path = ? \
             ORDER BY chunk_index LIMIT ?",
        )
        .bind(document_id)
        .bind(section_path)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_chunk).collect()
    }

    async fn similar_chunks(&self, document_id: &str, chunk_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            r#"
            SELECT c.* FROM graph_edges e
            JOIN graph_chunks c
              ON c.document_id = e.document_id AND c.chunk_id = e.dst
            WHERE e.document_id = ? AND e.src = ? AND e.kind = 'SIMILAR_TO'
            ORDER BY c.page_number, c.chunk_index
            "#,
        )
        .bind(document_id)
        .bind(chunk_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_chunk).collect()
    }
}

// ============ In-memory store ============

#[derive(Default)]
struct MemoryInner {
    chunks: HashMap<String, Vec<Chunk>>,
    edges: HashMap<String, Vec<Edge>>,
}

/// In-memory [`GraphStore`] for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryGraphStore {
    inner: RwLock<MemoryInner>,
    failing: bool,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every operation errors. Lets tests drive the
    /// fail-open path in the enhancer.
    pub fn failing() -> Self {
        Self {
            inner: RwLock::new(MemoryInner::default()),
            failing: true,
        }
    }

    fn check(&self) -> Result<()> {
        if self.failing {
            bail!("graph store unavailable");
        }
        Ok(())
    }

    fn with_inner<T>(&self, f: impl FnOnce(&MemoryInner) -> T) -> Result<T> {
        self.check()?;
        match self.inner.read() {
            Ok(guard) => Ok(f(&guard)),
            Err(_) => bail!("graph store lock poisoned"),
        }
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn replace_document(
        &self,
        doc: &DocumentRecord,
        chunks: &[Chunk],
        edges: &[Edge],
    ) -> Result<()> {
        self.check()?;
        let mut inner = match self.inner.write() {
            Ok(guard) => guard,
            Err(_) => bail!("graph store lock poisoned"),
        };
        // Single active document: any prior subgraph is cleared in full.
        inner.chunks.clear();
        inner.edges.clear();
        inner.chunks.insert(doc.id.clone(), chunks.to_vec());
        inner.edges.insert(doc.id.clone(), edges.to_vec());
        Ok(())
    }

    async fn load_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        self.with_inner(|inner| {
            inner
                .chunks
                .get(document_id)
                .cloned()
                .unwrap_or_default()
        })
    }

    async fn next_chunks(&self, document_id: &str, chunk_id: &str) -> Result<Vec<Chunk>> {
        self.with_inner(|inner| follow(inner, document_id, chunk_id, EdgeKind::Next))
    }

    async fn section_chunks(
        &self,
        document_id: &str,
        section_path: &str,
        limit: usize,
    ) -> Result<Vec<Chunk>> {
        self.with_inner(|inner| {
            inner
                .chunks
                .get(document_id)
                .map(|chunks| {
                    chunks
                        .iter()
                        .filter(|c| c.section_path == section_path)
                        .take(limit)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    async fn similar_chunks(&self, document_id: &str, chunk_id: &str) -> Result<Vec<Chunk>> {
        self.with_inner(|inner| follow(inner, document_id, chunk_id, EdgeKind::SimilarTo))
    }
}

fn follow(inner: &MemoryInner, document_id: &str, chunk_id: &str, kind: EdgeKind) -> Vec<Chunk> {
    let (Some(edges), Some(chunks)) = (inner.edges.get(document_id), inner.chunks.get(document_id))
    else {
        return Vec::new();
    };

    let mut hits: Vec<&Chunk> = edges
        .iter()
        .filter(|e| e.kind == kind && e.src == chunk_id)
        .filter_map(|e| chunks.iter().find(|c| c.chunk_id == e.dst))
        .collect();

    if kind == EdgeKind::SimilarTo {
        hits.sort_by_key(|c| (c.page_number, c.index));
    } else {
        hits.sort_by_key(|c| c.index);
    }

    hits.into_iter().cloned().collect()
}
