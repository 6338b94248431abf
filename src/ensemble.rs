//! Weighted rank fusion of dense and sparse candidate lists.
//!
//! Uses reciprocal-rank fusion: each source contributes
//! `weight / (rank + C)` per candidate, with C = 60. Scores fuse on rank
//! position only, never on raw scores, so the two sources' incomparable
//! score scales cannot skew the result. Duplicate chunk ids merge into a
//! single candidate that accumulates contributions from every list it
//! appears in, keeping the chunk payload from the higher-weighted source.

use std::collections::HashMap;

use crate::models::{Provenance, RetrievalCandidate};

/// Rank-offset constant in the reciprocal-rank denominator. Dampens the
/// gap between adjacent top ranks.
const RRF_C: f64 = 60.0;

/// One ranked list entering fusion.
pub struct RankedList {
    pub candidates: Vec<RetrievalCandidate>,
    pub weight: f64,
}

/// Fuse ranked lists into a single descending-ordered list of at most
/// `top_k` candidates. Callers validate that weights sum to 1.0 at
/// configuration time; fusion itself takes them as given.
pub fn fuse(lists: Vec<RankedList>, top_k: usize) -> Vec<RetrievalCandidate> {
    struct Fused {
        candidate: RetrievalCandidate,
        score: f64,
        source_weight: f64,
        first_seen: usize,
    }

    let mut by_id: HashMap<String, Fused> = HashMap::new();
    let mut order = 0usize;

    for list in lists {
        for (rank, cand) in list.candidates.into_iter().enumerate() {
            let contribution = list.weight / (rank as f64 + RRF_C);
            match by_id.get_mut(&cand.chunk.chunk_id) {
                Some(existing) => {
                    existing.score += contribution;
                    // Higher-weighted source supplies the payload.
                    if list.weight > existing.source_weight {
                        existing.candidate.chunk = cand.chunk;
                        existing.source_weight = list.weight;
                    }
                }
                None => {
                    by_id.insert(
                        cand.chunk.chunk_id.clone(),
                        Fused {
                            candidate: RetrievalCandidate {
                                chunk: cand.chunk,
                                score: 0.0,
                                source: Provenance::Ensemble,
                            },
                            score: contribution,
                            source_weight: list.weight,
                            first_seen: order,
                        },
                    );
                    order += 1;
                }
            }
        }
    }

    let mut fused: Vec<Fused> = by_id.into_values().collect();
    // Fused score descending, insertion order on ties for determinism.
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.first_seen.cmp(&b.first_seen))
    });
    fused.truncate(top_k);

    fused
        .into_iter()
        .map(|f| {
            let mut c = f.candidate;
            c.score = f.score as f32;
            c
        })
        .collect()
}
