//! Term-weighted sparse scorer.
//!
//! A TF-IDF index over chunk text: lowercase tokens of two or more word
//! characters (underscores allowed, so compound financial vocabulary like
//! `cost_per_click` survives), English stop words removed, unigrams and
//! bigrams. After fitting, columns whose term belongs to the configured
//! domain list are multiplied by the boost factor directly in the fitted
//! matrix — and the same boost is applied to query vectors — so domain
//! terms dominate both representations consistently.
//!
//! Query-time ranking is cosine similarity against the boosted matrix,
//! followed by a multiplicative heuristic overlay (currency density,
//! numeric/tabular salience, artifact and header-only penalties, and a
//! category floor that can lift a zero-similarity chunk). The overlay is
//! deterministic for a given corpus and query; ties break by chunk index.

use std::collections::HashMap;

use tracing::debug;

use crate::config::{HeuristicConfig, SparseConfig};
use crate::models::{Chunk, ScoredRef};

/// Vocabulary the overlay treats as partnership/alliance language.
const PARTNERSHIP_TERMS: &[&str] = &[
    "partner",
    "partners",
    "partnership",
    "partnerships",
    "alliance",
    "alliances",
    "collaboration",
    "agreement",
];

/// English stop words removed before indexing (the usual IR list).
const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "cannot", "could", "did", "do", "does", "doing", "down", "during", "each", "few",
    "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "him",
    "his", "how", "if", "in", "into", "is", "it", "its", "itself", "me", "more", "most", "my",
    "no", "nor", "not", "of", "off", "on", "once", "only", "or", "other", "our", "ours", "out",
    "over", "own", "same", "she", "should", "so", "some", "such", "than", "that", "the", "their",
    "theirs", "them", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours",
];

/// Fitted sparse index over one chunk corpus.
///
/// Rebuilt fully on every document ingestion; read-only during querying,
/// so concurrent queries against the same document are safe.
pub struct TfidfIndex {
    vocab: HashMap<String, usize>,
    idf: Vec<f32>,
    /// Column indices carrying the domain-term boost.
    boosted_cols: Vec<bool>,
    /// Per-chunk sparse vectors, `(column, boosted tf·idf)` sorted by column.
    rows: Vec<Vec<(usize, f32)>>,
    row_norms: Vec<f32>,
    chunks: Vec<Chunk>,
    heuristics: HeuristicConfig,
    term_boost: f32,
}

impl TfidfIndex {
    /// Fit the index over a chunk corpus. An empty corpus yields an index
    /// that answers every query with an empty ranking.
    pub fn fit(chunks: &[Chunk], config: &SparseConfig) -> Self {
        let token_lists: Vec<Vec<String>> = chunks.iter().map(|c| terms(&c.text)).collect();

        // Corpus-wide term totals and document frequencies.
        let mut totals: HashMap<&str, (usize, usize)> = HashMap::new();
        for tokens in &token_lists {
            let mut seen: HashMap<&str, usize> = HashMap::new();
            for t in tokens {
                *seen.entry(t.as_str()).or_insert(0) += 1;
            }
            for (t, n) in seen {
                let entry = totals.entry(t).or_insert((0, 0));
                entry.0 += n;
                entry.1 += 1;
            }
        }

        // Cap the vocabulary at max_features by total count, lexicographic
        // on ties for determinism.
        let mut by_count: Vec<(&str, usize, usize)> =
            totals.iter().map(|(t, (n, df))| (*t, *n, *df)).collect();
        by_count.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        by_count.truncate(config.max_features);
        by_count.sort_by(|a, b| a.0.cmp(b.0));

        let n_docs = chunks.len();
        let mut vocab = HashMap::with_capacity(by_count.len());
        let mut idf = Vec::with_capacity(by_count.len());
        let mut boosted_cols = Vec::with_capacity(by_count.len());
        for (col, (term, _, df)) in by_count.iter().enumerate() {
            vocab.insert(term.to_string(), col);
            // Smoothed idf: ln((1 + n) / (1 + df)) + 1.
            idf.push((((1 + n_docs) as f32) / ((1 + df) as f32)).ln() + 1.0);
            boosted_cols.push(config.domain_terms.iter().any(|d| d == term));
        }

        let mut rows = Vec::with_capacity(n_docs);
        let mut row_norms = Vec::with_capacity(n_docs);
        for tokens in &token_lists {
            let mut counts: HashMap<usize, f32> = HashMap::new();
            for t in tokens {
                if let Some(&col) = vocab.get(t.as_str()) {
                    *counts.entry(col).or_insert(0.0) += 1.0;
                }
            }
            let mut row: Vec<(usize, f32)> = counts
                .into_iter()
                .map(|(col, tf)| {
                    let mut w = tf * idf[col];
                    if boosted_cols[col] {
                        w *= config.term_boost;
                    }
                    (col, w)
                })
                .collect();
            row.sort_by_key(|(col, _)| *col);
            let norm = row.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
            rows.push(row);
            row_norms.push(norm);
        }

        debug!(
            chunks = n_docs,
            vocabulary = vocab.len(),
            "fitted sparse index"
        );

        Self {
            vocab,
            idf,
            boosted_cols,
            rows,
            row_norms,
            chunks: chunks.to_vec(),
            heuristics: config.heuristics.clone(),
            term_boost: config.term_boost,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Rank the corpus against a query, returning at most `k` candidates.
    /// Deterministic for identical corpus and query; an empty corpus
    /// returns an empty list.
    pub fn rank(&self, query: &str, k: usize) -> Vec<ScoredRef> {
        if self.chunks.is_empty() {
            return Vec::new();
        }

        let query_vec = self.query_vector(query);
        let query_lower = query.to_lowercase();

        let mut scored: Vec<(usize, f32)> = (0..self.chunks.len())
            .map(|i| {
                let base = self.cosine_row(i, &query_vec);
                let adjusted = apply_overlay(
                    base,
                    &self.chunks[i].text,
                    &query_lower,
                    &self.heuristics,
                );
                (i, adjusted)
            })
            .collect();

        // Score descending, original corpus order on ties.
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        scored
            .into_iter()
            .filter(|(_, s)| *s > 0.0)
            .map(|(i, score)| ScoredRef {
                chunk_id: self.chunks[i].chunk_id.clone(),
                score,
            })
            .collect()
    }

    /// Cosine similarity between two chunks' boosted vectors. Used for
    /// SIMILAR_TO edge construction at ingest time.
    pub fn similarity(&self, a: usize, b: usize) -> f32 {
        let (ra, rb) = (&self.rows[a], &self.rows[b]);
        let denom = self.row_norms[a] * self.row_norms[b];
        if denom < f32::EPSILON {
            return 0.0;
        }
        sparse_dot(ra, rb) / denom
    }

    /// Query vector with the same idf weighting and domain boost as the
    /// fitted matrix.
    fn query_vector(&self, query: &str) -> Vec<(usize, f32)> {
        let mut counts: HashMap<usize, f32> = HashMap::new();
        for t in terms(query) {
            if let Some(&col) = self.vocab.get(t.as_str()) {
                *counts.entry(col).or_insert(0.0) += 1.0;
            }
        }
        let mut vec: Vec<(usize, f32)> = counts
            .into_iter()
            .map(|(col, tf)| {
                let mut w = tf * self.idf[col];
                if self.boosted_cols[col] {
                    w *= self.term_boost;
                }
                (col, w)
            })
            .collect();
        vec.sort_by_key(|(col, _)| *col);
        vec
    }

    fn cosine_row(&self, row: usize, query_vec: &[(usize, f32)]) -> f32 {
        let qnorm = query_vec.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        let denom = self.row_norms[row] * qnorm;
        if denom < f32::EPSILON {
            return 0.0;
        }
        sparse_dot(&self.rows[row], query_vec) / denom
    }
}

/// Dot product of two column-sorted sparse vectors.
fn sparse_dot(a: &[(usize, f32)], b: &[(usize, f32)]) -> f32 {
    let (mut i, mut j, mut dot) = (0usize, 0usize, 0.0f32);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    dot
}

/// Unigrams plus adjacent bigrams (space-joined), stop words removed.
fn terms(text: &str) -> Vec<String> {
    let unigrams = tokenize(text);
    let mut out = Vec::with_capacity(unigrams.len() * 2);
    for pair in unigrams.windows(2) {
        out.push(format!("{} {}", pair[0], pair[1]));
    }
    out.extend(unigrams);
    out
}

/// Lowercase tokens of two or more word characters; `_` is a word
/// character.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.len() >= 2 && !STOP_WORDS.contains(t))
        .map(String::from)
        .collect()
}

// ============ Heuristic overlay ============

/// Apply the content heuristics to one chunk's base similarity. Only the
/// chunk being scored is affected.
fn apply_overlay(base: f32, text: &str, query_lower: &str, cfg: &HeuristicConfig) -> f32 {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return base;
    }

    let mut score = base;
    let n = tokens.len() as f32;

    let currency = tokens.iter().filter(|t| is_currency_marker(t)).count() as f32;
    let numeric = tokens.iter().filter(|t| is_numeric_token(t)).count() as f32;
    let artifacts = tokens.iter().filter(|t| is_artifact_token(t)).count() as f32;

    if currency / n > cfg.currency_density_threshold {
        score *= cfg.currency_boost;
    }
    if numeric / n > cfg.numeric_density_threshold || looks_tabular(&tokens) {
        score *= cfg.numeric_boost;
    }
    if artifacts / n > cfg.artifact_ratio_threshold {
        score *= cfg.artifact_penalty;
    }
    // Header-only: short, no figures.
    if tokens.len() < cfg.header_token_limit && numeric == 0.0 {
        score *= cfg.header_penalty;
    }

    // Category floor: a partnership-style question can lift a chunk dense
    // in partnership vocabulary from zero base similarity.
    if PARTNERSHIP_TERMS.iter().any(|t| query_lower.contains(t)) {
        let hits = tokens
            .iter()
            .filter(|t| {
                let lower = t.to_lowercase();
                PARTNERSHIP_TERMS.iter().any(|p| lower.contains(p))
            })
            .count();
        if hits >= 2 && score < cfg.category_floor {
            score = cfg.category_floor;
        }
    }

    score
}

fn is_currency_marker(token: &str) -> bool {
    token.contains('$')
        || token.ends_with('%')
        || matches!(
            token.to_lowercase().trim_matches(|c: char| !c.is_alphanumeric()),
            "million" | "millions" | "billion" | "billions" | "thousand" | "thousands"
        )
}

fn is_numeric_token(token: &str) -> bool {
    let digits = token.chars().filter(|c| c.is_ascii_digit()).count();
    digits > 0 && digits * 2 >= token.len()
}

/// Parsing artifacts: punctuation runs and single stray characters left by
/// markup-to-text conversion.
fn is_artifact_token(token: &str) -> bool {
    let alnum = token.chars().filter(|c| c.is_alphanumeric()).count();
    token.len() == 1 || alnum * 2 < token.len()
}

/// Tabular salience: several numeric or currency tokens in close sequence,
/// as in flattened financial tables.
fn looks_tabular(tokens: &[&str]) -> bool {
    let mut run = 0usize;
    for t in tokens {
        if is_numeric_token(t) || t.contains('$') || t.ends_with('%') {
            run += 1;
            if run >= 3 {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn chunk(i: usize, text: &str) -> Chunk {
        Chunk {
            chunk_id: format!("chunk_{}", i),
            index: i,
            hash: Chunk::text_hash(text),
            text: text.to_string(),
            element_type: "TextElement".to_string(),
            page_number: Some(1),
            section_path: "part_i/item_1".to_string(),
            content_type: "unknown".to_string(),
            pages: BTreeSet::new(),
        }
    }

    fn corpus() -> Vec<Chunk> {
        vec![
            chunk(0, "The company designs consumer hardware and licenses software platforms."),
            chunk(
                1,
                "Total revenue for the quarter was $96,469 million, an increase of 14% \
                 compared to $84,742 million in the prior year quarter.",
            ),
            chunk(
                2,
                "Our strategic partnership with cloud alliance partners expanded; the \
                 collaboration agreement covers joint distribution.",
            ),
            chunk(3, "Item 2."),
        ]
    }

    #[test]
    fn empty_corpus_returns_empty() {
        let index = TfidfIndex::fit(&[], &SparseConfig::default());
        assert!(index.rank("revenue", 5).is_empty());
    }

    #[test]
    fn top_k_bounds_output() {
        let index = TfidfIndex::fit(&corpus(), &SparseConfig::default());
        assert!(index.rank("revenue quarter", 2).len() <= 2);
        assert!(index.rank("revenue quarter", 100).len() <= 4);
    }

    #[test]
    fn ranking_is_deterministic() {
        let chunks = corpus();
        let index = TfidfIndex::fit(&chunks, &SparseConfig::default());
        let a: Vec<String> = index
            .rank("quarterly revenue increase", 4)
            .into_iter()
            .map(|r| r.chunk_id)
            .collect();
        let b: Vec<String> = index
            .rank("quarterly revenue increase", 4)
            .into_iter()
            .map(|r| r.chunk_id)
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn domain_boost_promotes_domain_chunks() {
        let chunks = vec![
            chunk(0, "generic words describe generic things here today"),
            chunk(1, "revenue revenue is discussed with generic words here"),
        ];

        let mut unboosted_cfg = SparseConfig::default();
        // Boost factor must stay > 1.0; approximate "unboosted" with a
        // factor close to 1.
        unboosted_cfg.term_boost = 1.0001;
        let unboosted = TfidfIndex::fit(&chunks, &unboosted_cfg);

        let boosted_cfg = SparseConfig::default(); // boost 2.0
        let boosted = TfidfIndex::fit(&chunks, &boosted_cfg);

        let rank_of = |refs: &[ScoredRef], id: &str| {
            refs.iter().position(|r| r.chunk_id == id).unwrap_or(usize::MAX)
        };

        let u = unboosted.rank("revenue growth", 2);
        let b = boosted.rank("revenue growth", 2);
        assert!(rank_of(&b, "chunk_1") <= rank_of(&u, "chunk_1"));
        assert_eq!(b[0].chunk_id, "chunk_1");
    }

    #[test]
    fn currency_dense_chunk_outranks_narrative_for_numeric_query() {
        let index = TfidfIndex::fit(&corpus(), &SparseConfig::default());
        let results = index.rank("what was total revenue for the quarter", 4);
        assert_eq!(results[0].chunk_id, "chunk_1");
    }

    #[test]
    fn partnership_floor_lifts_zero_similarity_chunk() {
        // Query shares no vocabulary with chunk 2 except the category terms;
        // ensure the floor keeps it in the ranking.
        let index = TfidfIndex::fit(&corpus(), &SparseConfig::default());
        let results = index.rank("alliances", 4);
        assert!(results.iter().any(|r| r.chunk_id == "chunk_2"));
    }

    #[test]
    fn overlay_penalizes_headers_and_artifacts_boosts_currency() {
        let cfg = HeuristicConfig::default();

        // Header-only: short, no figures.
        let header = apply_overlay(1.0, "Management Discussion and Analysis", "query", &cfg);
        assert!((header - cfg.artifact_penalty).abs() > 1e-6);
        assert!((header - cfg.header_penalty).abs() < 1e-6);

        // Currency-dense table row.
        let table = apply_overlay(
            1.0,
            "Revenues $96,469 $84,742 $76,693 up 14% over the prior year period reported",
            "query",
            &cfg,
        );
        assert!(table > 1.0);

        // Artifact-heavy parser residue.
        let junk = apply_overlay(1.0, "| | _ :: | -- | | _ someword |", "query", &cfg);
        assert!(junk < 1.0);

        // Ordinary narrative of sufficient length is untouched.
        let plain = apply_overlay(
            1.0,
            "The company continued to invest in infrastructure and research \
             programs during the period under review globally",
            "query",
            &cfg,
        );
        assert!((plain - 1.0).abs() < 1e-6);
    }

    #[test]
    fn overlay_thresholds_are_tunable() {
        let header = "Management Discussion and Analysis";
        let junk = "| | _ :: | -- | | _ someword |";
        let table = "Revenues $96,469 up 14% for the period under review this quarter overall";

        let mut cfg = HeuristicConfig::default();
        cfg.header_token_limit = 4;
        cfg.artifact_ratio_threshold = 0.95;
        cfg.currency_density_threshold = 0.9;

        // Four tokens no longer count as header-only.
        assert!((apply_overlay(1.0, header, "query", &cfg) - 1.0).abs() < 1e-6);
        // Raised artifact cutoff lets the parser residue through unpenalized.
        assert!((apply_overlay(1.0, junk, "query", &cfg) - 1.0).abs() < 1e-6);
        // Raised currency cutoff suppresses the boost.
        assert!(apply_overlay(1.0, table, "query", &cfg) <= 1.0);

        let defaults = HeuristicConfig::default();
        assert!(apply_overlay(1.0, header, "query", &defaults) < 1.0);
        assert!(apply_overlay(1.0, junk, "query", &defaults) < 1.0);
        assert!(apply_overlay(1.0, table, "query", &defaults) > 1.0);
    }

    #[test]
    fn similarity_is_symmetric_and_unit_on_self() {
        let index = TfidfIndex::fit(&corpus(), &SparseConfig::default());
        assert!((index.similarity(1, 1) - 1.0).abs() < 1e-5);
        assert!((index.similarity(0, 1) - index.similarity(1, 0)).abs() < 1e-6);
    }

    #[test]
    fn tokenizer_keeps_underscored_compounds() {
        let tokens = tokenize("cost_per_click rose; TAC was 21%");
        assert!(tokens.contains(&"cost_per_click".to_string()));
        assert!(tokens.contains(&"tac".to_string()));
        assert!(tokens.contains(&"21".to_string()));
    }

    #[test]
    fn tabular_detection() {
        let t: Vec<&str> = "Revenue $96,469 $84,742 $76,693 for three quarters"
            .split_whitespace()
            .collect();
        assert!(looks_tabular(&t));
        let t: Vec<&str> = "no figures appear in this sentence at all"
            .split_whitespace()
            .collect();
        assert!(!looks_tabular(&t));
    }
}
