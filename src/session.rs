//! Per-document retrieval session.
//!
//! A [`DocumentSession`] is built once per ingested filing and is
//! immutable afterwards: ingestion chunks the parsed elements, fits the
//! sparse index, writes the chunk graph, and the resulting session
//! answers queries until the next document replaces it. Concurrent
//! queries against one session are safe; there is no partially-updated
//! state to observe.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{info, warn};

use crate::chunker::build_chunks;
use crate::config::Config;
use crate::dense::{Retriever, SparseAdapter};
use crate::enhance::GraphEnhancer;
use crate::ensemble::{fuse, RankedList};
use crate::graph::{next_edges, similarity_edges, DocumentRecord, GraphStore};
use crate::models::{Chunk, Element, Provenance, RetrievalCandidate, ScoredRef};
use crate::router::{route, Route};
use crate::sparse::TfidfIndex;

/// Outcome of one query, with the route taken and whether the dense
/// source participated.
pub struct Answer {
    pub route: Route,
    pub candidates: Vec<RetrievalCandidate>,
    pub dense_available: bool,
}

pub struct DocumentSession {
    document_id: String,
    config: Config,
    index: TfidfIndex,
    chunks_by_id: HashMap<String, Chunk>,
    store: Arc<dyn GraphStore>,
    dense: Arc<dyn Retriever>,
    /// Edges written at ingest; zero for sessions reopened from storage.
    edges_written: usize,
}

impl DocumentSession {
    /// Ingest a parsed filing: chunk, fit the sparse index, and replace
    /// the chunk graph for this document id.
    pub async fn ingest(
        document_id: &str,
        title: Option<&str>,
        elements: &[Element],
        config: Config,
        store: Arc<dyn GraphStore>,
        dense: Arc<dyn Retriever>,
    ) -> Result<Self> {
        let chunks = build_chunks(elements, &config.chunking);
        if chunks.is_empty() {
            bail!("Document '{}' produced no chunks", document_id);
        }

        let index = TfidfIndex::fit(&chunks, &config.sparse);

        let mut edges = next_edges(&chunks);
        if config.graph.enable_similarity_edges {
            edges.extend(similarity_edges(
                &index,
                config.graph.similarity_threshold,
                config.graph.similarity_top_n,
            ));
        }

        let doc = DocumentRecord {
            id: document_id.to_string(),
            title: title.map(String::from),
            ingested_at: chrono::Utc::now().timestamp(),
        };
        store.replace_document(&doc, &chunks, &edges).await?;

        info!(
            document_id,
            chunks = chunks.len(),
            edges = edges.len(),
            "document ingested"
        );

        let edge_count = edges.len();
        Ok(Self::assemble(
            document_id, chunks, index, config, store, dense, edge_count,
        ))
    }

    /// Rebuild a session from a previously ingested document. The sparse
    /// index is refit from the stored chunks; edges stay as written.
    pub async fn open(
        document_id: &str,
        config: Config,
        store: Arc<dyn GraphStore>,
        dense: Arc<dyn Retriever>,
    ) -> Result<Self> {
        let chunks = store.load_chunks(document_id).await?;
        if chunks.is_empty() {
            bail!("No ingested document found with id '{}'", document_id);
        }
        let index = TfidfIndex::fit(&chunks, &config.sparse);
        Ok(Self::assemble(document_id, chunks, index, config, store, dense, 0))
    }

    fn assemble(
        document_id: &str,
        chunks: Vec<Chunk>,
        index: TfidfIndex,
        config: Config,
        store: Arc<dyn GraphStore>,
        dense: Arc<dyn Retriever>,
        edges_written: usize,
    ) -> Self {
        let chunks_by_id = chunks
            .into_iter()
            .map(|c| (c.chunk_id.clone(), c))
            .collect();
        Self {
            document_id: document_id.to_string(),
            config,
            index,
            chunks_by_id,
            store,
            dense,
            edges_written,
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks_by_id.len()
    }

    pub fn edges_written(&self) -> usize {
        self.edges_written
    }

    /// Answer a query: route, run sparse and dense retrieval, fuse, and
    /// enhance from the graph. Dense failure degrades to sparse-only.
    pub async fn ask(&self, query: &str) -> Result<Answer> {
        let route = route(query, &self.config.router);
        let top_k = self.config.retrieval.top_k;

        let sparse_refs = SparseAdapter::new(&self.index)
            .rank(&self.document_id, query, top_k)
            .await?;
        let sparse_list = RankedList {
            candidates: self.resolve(&sparse_refs, Provenance::Sparse),
            weight: self.config.retrieval.sparse_weight,
        };

        let (fused, dense_available) = match self.dense_rank(query, top_k).await {
            Some(dense_refs) => {
                let dense_list = RankedList {
                    candidates: self.resolve(&dense_refs, Provenance::Dense),
                    weight: self.config.retrieval.dense_weight,
                };
                (fuse(vec![dense_list, sparse_list], top_k), true)
            }
            None => {
                // Sparse-only degradation keeps ensemble provenance so
                // downstream consumers see one candidate shape.
                let mut only = sparse_list.candidates;
                only.truncate(top_k);
                for c in &mut only {
                    c.source = Provenance::Ensemble;
                }
                (only, false)
            }
        };

        let enhancer = GraphEnhancer::new(self.store.as_ref(), &self.config.graph);
        let candidates = enhancer.enhance(&self.document_id, fused).await;

        Ok(Answer {
            route,
            candidates,
            dense_available,
        })
    }

    async fn dense_rank(&self, query: &str, top_k: usize) -> Option<Vec<ScoredRef>> {
        if !self.config.dense.is_enabled() {
            return None;
        }
        match self.dense.rank(&self.document_id, query, top_k).await {
            Ok(refs) => Some(refs),
            Err(e) => {
                warn!(
                    document_id = %self.document_id,
                    error = %e,
                    "dense retriever failed, degrading to sparse-only"
                );
                None
            }
        }
    }

    /// Materialize scored references against this session's chunks.
    /// References to unknown chunk ids (a stale dense index) are dropped.
    fn resolve(&self, refs: &[ScoredRef], source: Provenance) -> Vec<RetrievalCandidate> {
        refs.iter()
            .filter_map(|r| {
                let chunk = self.chunks_by_id.get(&r.chunk_id);
                if chunk.is_none() {
                    warn!(chunk_id = %r.chunk_id, "dropping reference to unknown chunk");
                }
                chunk.map(|c| RetrievalCandidate {
                    chunk: c.clone(),
                    score: r.score,
                    source,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig};
    use crate::dense::DisabledRetriever;
    use crate::graph::MemoryGraphStore;
    use crate::models::{Element, ElementBody};

    fn config() -> Config {
        Config {
            db: DbConfig {
                path: std::path::PathBuf::from(":memory:"),
            },
            chunking: Default::default(),
            retrieval: Default::default(),
            sparse: Default::default(),
            dense: Default::default(),
            graph: Default::default(),
            router: Default::default(),
        }
    }

    fn text_element(kind: &str, section: &str, page: u32, text: &str) -> Element {
        Element {
            kind: kind.to_string(),
            page_number: Some(page),
            section_path: Some(section.to_string()),
            content_type: None,
            body: ElementBody::Text(text.to_string()),
        }
    }

    fn filing() -> Vec<Element> {
        vec![
            text_element("TopSectionTitle", "part_i/item_1", 1, "Item 1. Financial Statements"),
            text_element(
                "TableElement",
                "part_i/item_1",
                2,
                "Revenue $96,469 million, up 14% from $84,742 million in the prior quarter.",
            ),
            text_element(
                "TextElement",
                "part_i/item_1",
                2,
                "The condensed consolidated statements are unaudited and interim.",
            ),
            text_element("TopSectionTitle", "part_ii/item_1a", 8, "Item 1A. Risk Factors"),
            text_element(
                "TextElement",
                "part_ii/item_1a",
                8,
                "Our operating results may fluctuate due to advertising demand uncertainty \
                 and foreign exchange exposure.",
            ),
        ]
    }

    struct StubDense(Vec<ScoredRef>);

    #[async_trait::async_trait]
    impl Retriever for StubDense {
        fn name(&self) -> &str {
            "stub"
        }
        async fn rank(&self, _d: &str, _q: &str, _k: usize) -> Result<Vec<ScoredRef>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn ingest_then_ask_with_sparse_only() {
        let store = Arc::new(MemoryGraphStore::new());
        let session = DocumentSession::ingest(
            "doc-1",
            Some("10-Q"),
            &filing(),
            config(),
            store,
            Arc::new(DisabledRetriever),
        )
        .await
        .unwrap();

        let answer = session.ask("what was total revenue for the quarter").await.unwrap();
        assert_eq!(answer.route, Route::Table);
        assert!(!answer.dense_available);
        assert!(!answer.candidates.is_empty());
        assert!(answer.candidates[0].chunk.text.contains("96,469"));
        assert!(answer
            .candidates
            .iter()
            .all(|c| matches!(
                c.source,
                Provenance::Ensemble | Provenance::Next | Provenance::Section | Provenance::SimilarTo
            )));
    }

    #[tokio::test]
    async fn dense_participates_when_enabled() {
        let store = Arc::new(MemoryGraphStore::new());
        let mut cfg = config();
        cfg.dense.provider = "http".to_string();
        cfg.dense.endpoint = Some("http://unused".to_string());

        // Ingest first so we know a valid chunk id for the stub.
        let bootstrap = DocumentSession::ingest(
            "doc-1",
            None,
            &filing(),
            config(),
            store.clone(),
            Arc::new(DisabledRetriever),
        )
        .await
        .unwrap();
        let risk_chunk = bootstrap
            .chunks_by_id
            .values()
            .find(|c| c.text.contains("fluctuate"))
            .unwrap()
            .chunk_id
            .clone();

        let stub = StubDense(vec![ScoredRef {
            chunk_id: risk_chunk.clone(),
            score: 0.95,
        }]);
        let session = DocumentSession::open("doc-1", cfg, store, Arc::new(stub))
            .await
            .unwrap();

        let answer = session.ask("tell me about the company").await.unwrap();
        assert!(answer.dense_available);
        // Dense weight 0.7 puts its sole candidate first.
        assert_eq!(answer.candidates[0].chunk.chunk_id, risk_chunk);
    }

    #[tokio::test]
    async fn dense_failure_degrades_to_sparse_only() {
        let store = Arc::new(MemoryGraphStore::new());
        let mut cfg = config();
        cfg.dense.provider = "http".to_string();
        cfg.dense.endpoint = Some("http://unused".to_string());

        struct FailingDense;
        #[async_trait::async_trait]
        impl Retriever for FailingDense {
            fn name(&self) -> &str {
                "failing"
            }
            async fn rank(&self, _d: &str, _q: &str, _k: usize) -> Result<Vec<ScoredRef>> {
                anyhow::bail!("connection refused")
            }
        }

        let session = DocumentSession::ingest(
            "doc-1",
            None,
            &filing(),
            cfg,
            store,
            Arc::new(FailingDense),
        )
        .await
        .unwrap();

        let answer = session.ask("advertising demand uncertainty").await.unwrap();
        assert!(!answer.dense_available);
        assert!(!answer.candidates.is_empty());
    }

    #[tokio::test]
    async fn unknown_dense_references_are_dropped() {
        let store = Arc::new(MemoryGraphStore::new());
        let mut cfg = config();
        cfg.dense.provider = "http".to_string();
        cfg.dense.endpoint = Some("http://unused".to_string());

        let stub = StubDense(vec![ScoredRef {
            chunk_id: "chunk_9999".to_string(),
            score: 0.9,
        }]);
        let session = DocumentSession::ingest(
            "doc-1",
            None,
            &filing(),
            cfg,
            store,
            Arc::new(stub),
        )
        .await
        .unwrap();

        let answer = session.ask("revenue for the quarter").await.unwrap();
        assert!(answer
            .candidates
            .iter()
            .all(|c| c.chunk.chunk_id != "chunk_9999"));
    }

    #[tokio::test]
    async fn empty_document_is_rejected() {
        let store = Arc::new(MemoryGraphStore::new());
        let result = DocumentSession::ingest(
            "doc-1",
            None,
            &[],
            config(),
            store,
            Arc::new(DisabledRetriever),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn open_fails_for_unknown_document() {
        let store = Arc::new(MemoryGraphStore::new());
        let result = DocumentSession::open(
            "missing",
            config(),
            store,
            Arc::new(DisabledRetriever),
        )
        .await;
        assert!(result.is_err());
    }
}
