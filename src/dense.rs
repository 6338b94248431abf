//! Retriever capability seam.
//!
//! [`Retriever`] is the uniform ranked-list provider the fuser consumes:
//! - **[`DisabledRetriever`]** — returns errors; used when no dense
//!   service is configured. Callers degrade to sparse-only.
//! - **[`HttpDenseRetriever`]** — posts queries to an external dense-index
//!   service with retry and backoff. The dense index itself lives in that
//!   service; this crate only ranks against it.
//! - **[`SparseAdapter`]** — the in-core TF-IDF index behind the same
//!   trait.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::DenseConfig;
use crate::models::ScoredRef;
use crate::sparse::TfidfIndex;

/// A retriever that ranks a document's chunks against a query and returns
/// scored chunk references, best first.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Provider identifier for logs and diagnostics.
    fn name(&self) -> &str;

    /// Rank the given document's chunks against the query.
    async fn rank(&self, document_id: &str, query: &str, top_k: usize) -> Result<Vec<ScoredRef>>;
}

// ============ Disabled Retriever ============

/// A no-op retriever that always returns errors.
///
/// Used when `dense.provider = "disabled"`. The session layer treats the
/// error as a degradation signal, not a query failure.
pub struct DisabledRetriever;

#[async_trait]
impl Retriever for DisabledRetriever {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn rank(&self, _document_id: &str, _query: &str, _top_k: usize) -> Result<Vec<ScoredRef>> {
        bail!("Dense retriever is disabled")
    }
}

// ============ HTTP Retriever ============

/// Dense retriever backed by an external ranking service.
///
/// Sends `POST <endpoint>` with a JSON body of document id, query, and
/// top_k; expects `{"results": [{"chunk_id": ..., "score": ...}]}` back.
pub struct HttpDenseRetriever {
    endpoint: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl HttpDenseRetriever {
    pub fn new(config: &DenseConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("dense.endpoint required for http provider"))?;
        Ok(Self {
            endpoint,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Retriever for HttpDenseRetriever {
    fn name(&self) -> &str {
        "http"
    }

    async fn rank(&self, document_id: &str, query: &str, top_k: usize) -> Result<Vec<ScoredRef>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "document_id": document_id,
            "query": query,
            "top_k": top_k,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client.post(&self.endpoint).json(&body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_rank_response(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Dense service error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Dense service error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Dense ranking failed after retries")))
    }
}

// ============ Sparse adapter ============

/// Adapts the fitted TF-IDF index to the retriever seam so fusion
/// consumes two uniform ranked-list providers. Never fails.
pub struct SparseAdapter<'a> {
    index: &'a TfidfIndex,
}

impl<'a> SparseAdapter<'a> {
    pub fn new(index: &'a TfidfIndex) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Retriever for SparseAdapter<'_> {
    fn name(&self) -> &str {
        "sparse"
    }

    async fn rank(&self, _document_id: &str, query: &str, top_k: usize) -> Result<Vec<ScoredRef>> {
        Ok(self.index.rank(query, top_k))
    }
}

/// Parse the ranking service response JSON.
fn parse_rank_response(json: &serde_json::Value) -> Result<Vec<ScoredRef>> {
    let results = json
        .get("results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid dense response: missing results array"))?;

    let mut refs = Vec::with_capacity(results.len());
    for item in results {
        let chunk_id = item
            .get("chunk_id")
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid dense response: missing chunk_id"))?;
        let score = item.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32;
        refs.push(ScoredRef {
            chunk_id: chunk_id.to_string(),
            score,
        });
    }

    Ok(refs)
}

/// Create the appropriate [`Retriever`] based on configuration.
pub fn create_retriever(config: &DenseConfig) -> Result<Box<dyn Retriever>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledRetriever)),
        "http" => Ok(Box::new(HttpDenseRetriever::new(config)?)),
        other => bail!("Unknown dense provider: {}", other),
    }
}
