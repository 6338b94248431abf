//! Graph-based result enhancement.
//!
//! Takes a fused candidate list and appends graph neighbors of those
//! candidates: NEXT successors first, then shared-section chunks, then
//! SIMILAR_TO peers. Additions are capped at
//! `floor(base_count × enhancement_weight)` so graph context can round
//! out an answer but never crowd out the retrievers' own ranking.
//!
//! Enhancement is strictly additive and fails open: if the graph store
//! errors at any point, the base list is returned unchanged and the
//! failure is logged as a warning. A retrieval query never fails because
//! the graph is unavailable.

use std::collections::HashSet;

use anyhow::Result;
use tracing::{debug, warn};

use crate::config::GraphConfig;
use crate::graph::GraphStore;
use crate::models::{Chunk, Provenance, RetrievalCandidate};

pub struct GraphEnhancer<'a> {
    store: &'a dyn GraphStore,
    config: &'a GraphConfig,
}

impl<'a> GraphEnhancer<'a> {
    pub fn new(store: &'a dyn GraphStore, config: &'a GraphConfig) -> Self {
        Self { store, config }
    }

    /// Enhance a base candidate list with graph neighbors. The base list
    /// and its order are always preserved; additions follow it.
    pub async fn enhance(
        &self,
        document_id: &str,
        base: Vec<RetrievalCandidate>,
    ) -> Vec<RetrievalCandidate> {
        if !self.config.enable_enhancement || base.is_empty() {
            return base;
        }

        let budget = (base.len() as f64 * self.config.enhancement_weight).floor() as usize;
        if budget == 0 {
            return base;
        }

        match self.discover(document_id, &base, budget).await {
            Ok(additions) => {
                if !additions.is_empty() {
                    debug!(
                        document_id,
                        added = additions.len(),
                        budget,
                        "graph enhancement applied"
                    );
                }
                let mut out = base;
                out.extend(additions);
                out
            }
            Err(e) => {
                warn!(document_id, error = %e, "graph enhancement failed, returning base results");
                base
            }
        }
    }

    async fn discover(
        &self,
        document_id: &str,
        base: &[RetrievalCandidate],
        budget: usize,
    ) -> Result<Vec<RetrievalCandidate>> {
        let mut seen_ids: HashSet<String> = base
            .iter()
            .map(|c| c.chunk.chunk_id.clone())
            .collect();
        let mut seen_hashes: HashSet<String> =
            base.iter().map(|c| c.chunk.hash.clone()).collect();
        let mut additions: Vec<RetrievalCandidate> = Vec::with_capacity(budget);

        let push = |chunk: Chunk,
                        source: Provenance,
                        additions: &mut Vec<RetrievalCandidate>,
                        seen_ids: &mut HashSet<String>,
                        seen_hashes: &mut HashSet<String>| {
            if seen_ids.contains(&chunk.chunk_id) || seen_hashes.contains(&chunk.hash) {
                return;
            }
            seen_ids.insert(chunk.chunk_id.clone());
            seen_hashes.insert(chunk.hash.clone());
            additions.push(RetrievalCandidate {
                chunk,
                score: 0.0,
                source,
            });
        };

        // Reading-order successors first.
        'next: for cand in base {
            for chunk in self
                .store
                .next_chunks(document_id, &cand.chunk.chunk_id)
                .await?
            {
                push(
                    chunk,
                    Provenance::Next,
                    &mut additions,
                    &mut seen_ids,
                    &mut seen_hashes,
                );
                if additions.len() >= budget {
                    break 'next;
                }
            }
        }

        if additions.len() < budget {
            'section: for cand in base {
                let peers = self
                    .store
                    .section_chunks(
                        document_id,
                        &cand.chunk.section_path,
                        self.config.section_fetch_limit,
                    )
                    .await?;
                for chunk in peers {
                    push(
                        chunk,
                        Provenance::Section,
                        &mut additions,
                        &mut seen_ids,
                        &mut seen_hashes,
                    );
                    if additions.len() >= budget {
                        break 'section;
                    }
                }
            }
        }

        if additions.len() < budget {
            'similar: for cand in base {
                for chunk in self
                    .store
                    .similar_chunks(document_id, &cand.chunk.chunk_id)
                    .await?
                {
                    push(
                        chunk,
                        Provenance::SimilarTo,
                        &mut additions,
                        &mut seen_ids,
                        &mut seen_hashes,
                    );
                    if additions.len() >= budget {
                        break 'similar;
                    }
                }
            }
        }

        Ok(additions)
    }
}
