//! Ingestion command flow: parsed filing JSON → chunks → sparse index →
//! chunk graph.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use uuid::Uuid;

use crate::chunker::build_chunks;
use crate::config::Config;
use crate::db;
use crate::dense;
use crate::graph::SqliteGraphStore;
use crate::migrate;
use crate::models::Element;
use crate::session::DocumentSession;

/// Input envelope: one parsed filing as produced by the upstream
/// document parser.
#[derive(Debug, Deserialize)]
pub struct ParsedFiling {
    /// Stable id for the filing. Minted when the parser did not assign one.
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub elements: Vec<Element>,
}

pub fn load_filing(path: &Path) -> Result<ParsedFiling> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read filing file: {}", path.display()))?;
    let filing: ParsedFiling = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse filing JSON: {}", path.display()))?;
    Ok(filing)
}

pub async fn run_ingest(
    config: &Config,
    path: &Path,
    document_id: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let filing = load_filing(path)?;
    let doc_id = document_id
        .or_else(|| filing.document_id.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if dry_run {
        let chunks = build_chunks(&filing.elements, &config.chunking);
        println!("ingest {} (dry-run)", doc_id);
        println!("  elements: {}", filing.elements.len());
        println!("  estimated chunks: {}", chunks.len());
        return Ok(());
    }

    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;
    let store = Arc::new(SqliteGraphStore::new(pool));
    let retriever: Arc<dyn dense::Retriever> = Arc::from(dense::create_retriever(&config.dense)?);

    let session = DocumentSession::ingest(
        &doc_id,
        filing.title.as_deref(),
        &filing.elements,
        config.clone(),
        store,
        retriever,
    )
    .await?;

    println!("ingest {}", doc_id);
    println!("  elements: {}", filing.elements.len());
    println!("  chunks written: {}", session.chunk_count());
    println!("  edges written: {}", session.edges_written());
    if config.graph.enable_similarity_edges {
        println!("  similarity edges: enabled");
    }
    println!("ok");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_filing_envelope() {
        let json = r#"
        {
            "document_id": "goog-10q",
            "title": "Form 10-Q",
            "elements": [
                {
                    "kind": "TextElement",
                    "page_number": 2,
                    "section_path": "part_i/item_1",
                    "content_type": "text",
                    "body": {"text": "Revenue grew."}
                }
            ]
        }
        "#;
        let filing: ParsedFiling = serde_json::from_str(json).unwrap();
        assert_eq!(filing.document_id.as_deref(), Some("goog-10q"));
        assert_eq!(filing.elements.len(), 1);
        assert_eq!(
            filing.elements[0].section_path.as_deref(),
            Some("part_i/item_1")
        );
    }
}
