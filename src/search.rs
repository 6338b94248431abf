//! Search command flow: open a session over an ingested filing, answer
//! the query, print ranked results.

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::dense;
use crate::graph::SqliteGraphStore;
use crate::router;
use crate::session::DocumentSession;

pub async fn run_search(
    config: &Config,
    document_id: &str,
    query: &str,
    limit: Option<usize>,
) -> Result<()> {
    let mut config = config.clone();
    if let Some(k) = limit {
        // Same constraint load_config enforces for retrieval.top_k.
        if k == 0 {
            bail!("--limit must be >= 1");
        }
        config.retrieval.top_k = k;
    }

    let pool = db::connect(&config.db.path).await?;
    let store = Arc::new(SqliteGraphStore::new(pool));
    let retriever: Arc<dyn dense::Retriever> =
        Arc::from(dense::create_retriever(&config.dense)?);

    let dense_configured = config.dense.is_enabled();
    let session = DocumentSession::open(document_id, config, store, retriever).await?;
    let answer = session.ask(query).await?;

    println!("search \"{}\" in {}", query, document_id);
    println!("  route: {}", answer.route);
    if dense_configured && !answer.dense_available {
        println!("  note: dense retriever unavailable, sparse-only results");
    }
    println!("  results: {}", answer.candidates.len());

    for (i, cand) in answer.candidates.iter().enumerate() {
        let page = match cand.chunk.page_number {
            Some(p) => p.to_string(),
            None => "-".to_string(),
        };
        println!(
            "{}. [{:.4}] {} via {} ({}, page {})",
            i + 1,
            cand.score,
            cand.chunk.chunk_id,
            cand.source,
            cand.chunk.section_path,
            page
        );
        println!("   {}", snippet(&cand.chunk.text, 160));
    }

    Ok(())
}

/// Classify a query without touching the database.
pub fn run_route(config: &Config, query: &str) -> Result<()> {
    let route = router::route(query, &config.router);
    println!("{}", route);
    Ok(())
}

/// First `max` characters on a single line, on a char boundary, with an
/// ellipsis when truncated.
fn snippet(text: &str, max: usize) -> String {
    let flat = text.replace(['\n', '\r'], " ");
    if flat.len() <= max {
        return flat;
    }
    let mut end = max;
    while !flat.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &flat[..end])
}
