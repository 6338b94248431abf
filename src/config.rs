use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub sparse: SparseConfig,
    #[serde(default)]
    pub dense: DenseConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub router: RouterConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Chunking strategy selector.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// Each element becomes exactly one chunk. Safe fallback.
    Legacy,
    /// Section-aware windowing with overlap seeding. Primary strategy.
    SectionAware,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
    #[serde(default = "default_strategy")]
    pub strategy: ChunkStrategy,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_chunk_overlap(),
            strategy: default_strategy(),
        }
    }
}

fn default_chunk_size() -> usize {
    400
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_strategy() -> ChunkStrategy {
    ChunkStrategy::SectionAware
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Weight of the dense ranked list in ensemble fusion.
    #[serde(default = "default_dense_weight")]
    pub dense_weight: f64,
    /// Weight of the sparse ranked list in ensemble fusion.
    #[serde(default = "default_sparse_weight")]
    pub sparse_weight: f64,
    /// Default number of candidates each base retriever returns.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            dense_weight: default_dense_weight(),
            sparse_weight: default_sparse_weight(),
            top_k: default_top_k(),
        }
    }
}

fn default_dense_weight() -> f64 {
    0.7
}
fn default_sparse_weight() -> f64 {
    0.3
}
fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct SparseConfig {
    #[serde(default = "default_max_features")]
    pub max_features: usize,
    /// Multiplier applied to domain-term columns in the fitted matrix.
    #[serde(default = "default_term_boost")]
    pub term_boost: f32,
    /// Domain vocabulary boosted in both documents and queries. Terms may
    /// contain underscores (compound financial vocabulary).
    #[serde(default = "default_domain_terms")]
    pub domain_terms: Vec<String>,
    #[serde(default)]
    pub heuristics: HeuristicConfig,
}

impl Default for SparseConfig {
    fn default() -> Self {
        Self {
            max_features: default_max_features(),
            term_boost: default_term_boost(),
            domain_terms: default_domain_terms(),
            heuristics: HeuristicConfig::default(),
        }
    }
}

fn default_max_features() -> usize {
    5000
}
fn default_term_boost() -> f32 {
    2.0
}

fn default_domain_terms() -> Vec<String> {
    [
        // Core financial
        "revenue",
        "assets",
        "liabilities",
        "equity",
        "cash_flow",
        // 10-Q specific
        "quarterly",
        "interim",
        "unaudited",
        "condensed",
        "yoy",
        "quarter_over_quarter",
        "guidance",
        "outlook",
        // SEC specific
        "md_a",
        "risk_factors",
        "forward_looking",
        "material",
        // Monetization metrics
        "cost_per_click",
        "paid_clicks",
        "impressions",
        "monetization",
        "cost_per_impression",
        "click_through_rate",
        "advertising",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Tunables for the query-time re-scoring overlay.
///
/// These compensate for TF-IDF's blindness to numeric/tabular salience.
/// The magnitudes were tuned against one corpus; treat them as starting
/// points rather than load-bearing constants.
#[derive(Debug, Deserialize, Clone)]
pub struct HeuristicConfig {
    /// Multiplier when currency/amount markers are dense in a chunk.
    #[serde(default = "default_currency_boost")]
    pub currency_boost: f32,
    /// Multiplier when numeric tokens are dense (candidate tables).
    #[serde(default = "default_numeric_boost")]
    pub numeric_boost: f32,
    /// Multiplier when parsing-artifact tokens dominate a chunk.
    #[serde(default = "default_artifact_penalty")]
    pub artifact_penalty: f32,
    /// Multiplier for header-only chunks with no figures.
    #[serde(default = "default_header_penalty")]
    pub header_penalty: f32,
    /// Floor score granted to a zero-similarity chunk whose category
    /// keyword density marks it highly relevant (e.g. partnership queries).
    #[serde(default = "default_category_floor")]
    pub category_floor: f32,
    /// Fraction of tokens that must be numeric to count as dense.
    #[serde(default = "default_numeric_density_threshold")]
    pub numeric_density_threshold: f32,
    /// Fraction of tokens bearing currency markers that triggers the
    /// currency boost.
    #[serde(default = "default_currency_density_threshold")]
    pub currency_density_threshold: f32,
    /// Fraction of parsing-artifact tokens that triggers the penalty.
    #[serde(default = "default_artifact_ratio_threshold")]
    pub artifact_ratio_threshold: f32,
    /// Chunks below this token count with no figures are treated as
    /// header-only.
    #[serde(default = "default_header_token_limit")]
    pub header_token_limit: usize,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            currency_boost: default_currency_boost(),
            numeric_boost: default_numeric_boost(),
            artifact_penalty: default_artifact_penalty(),
            header_penalty: default_header_penalty(),
            category_floor: default_category_floor(),
            numeric_density_threshold: default_numeric_density_threshold(),
            currency_density_threshold: default_currency_density_threshold(),
            artifact_ratio_threshold: default_artifact_ratio_threshold(),
            header_token_limit: default_header_token_limit(),
        }
    }
}

fn default_currency_boost() -> f32 {
    1.5
}
fn default_numeric_boost() -> f32 {
    1.25
}
fn default_artifact_penalty() -> f32 {
    0.5
}
fn default_header_penalty() -> f32 {
    0.6
}
fn default_category_floor() -> f32 {
    0.05
}
fn default_numeric_density_threshold() -> f32 {
    0.2
}
fn default_currency_density_threshold() -> f32 {
    0.05
}
fn default_artifact_ratio_threshold() -> f32 {
    0.25
}
fn default_header_token_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct DenseConfig {
    /// `"http"` or `"disabled"`. When disabled, queries degrade to
    /// sparse-only with a logged warning.
    #[serde(default = "default_dense_provider")]
    pub provider: String,
    /// Endpoint of the external dense-index service.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for DenseConfig {
    fn default() -> Self {
        Self {
            provider: default_dense_provider(),
            endpoint: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_dense_provider() -> String {
    "disabled".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

impl DenseConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    #[serde(default = "default_enable_enhancement")]
    pub enable_enhancement: bool,
    /// Enhancement budget: additions capped at
    /// `floor(base_count × enhancement_weight)`.
    #[serde(default = "default_enhancement_weight")]
    pub enhancement_weight: f64,
    /// Bound on chunks fetched per shared-section lookup.
    #[serde(default = "default_section_fetch_limit")]
    pub section_fetch_limit: usize,
    /// Whether SIMILAR_TO edges are written at ingest time.
    #[serde(default)]
    pub enable_similarity_edges: bool,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_similarity_top_n")]
    pub similarity_top_n: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            enable_enhancement: default_enable_enhancement(),
            enhancement_weight: default_enhancement_weight(),
            section_fetch_limit: default_section_fetch_limit(),
            enable_similarity_edges: false,
            similarity_threshold: default_similarity_threshold(),
            similarity_top_n: default_similarity_top_n(),
        }
    }
}

fn default_enable_enhancement() -> bool {
    true
}
fn default_enhancement_weight() -> f64 {
    0.15
}
fn default_section_fetch_limit() -> usize {
    25
}
fn default_similarity_threshold() -> f32 {
    0.7
}
fn default_similarity_top_n() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RouterConfig {
    #[serde(default = "default_table_keywords")]
    pub table_keywords: Vec<String>,
    #[serde(default = "default_risk_keywords")]
    pub risk_keywords: Vec<String>,
    #[serde(default = "default_mda_keywords")]
    pub mda_keywords: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            table_keywords: default_table_keywords(),
            risk_keywords: default_risk_keywords(),
            mda_keywords: default_mda_keywords(),
        }
    }
}

fn default_table_keywords() -> Vec<String> {
    [
        "revenue",
        "income",
        "balance",
        "cash_flow",
        "financial_statement",
        "cost-per-click",
        "cost_per_click",
        "paid_clicks",
        "paid clicks",
        "click",
        "clicks",
        "impressions",
        "cost-per-impression",
        "monetization",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_risk_keywords() -> Vec<String> {
    ["risk", "uncertainty", "factor", "may_adversely"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_mda_keywords() -> Vec<String> {
    ["management", "discussion", "analysis", "outlook", "results"]
        .into_iter()
        .map(String::from)
        .collect()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Validate configuration constraints. Fatal at startup — invalid values
/// are rejected, never silently clamped.
pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.overlap must be < chunking.chunk_size ({} >= {})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    let weight_sum = config.retrieval.dense_weight + config.retrieval.sparse_weight;
    if (weight_sum - 1.0).abs() > 0.01 {
        anyhow::bail!(
            "retrieval.dense_weight + retrieval.sparse_weight must equal 1.0 (got {})",
            weight_sum
        );
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.sparse.term_boost <= 1.0 {
        anyhow::bail!("sparse.term_boost must be > 1.0");
    }
    if config.sparse.max_features == 0 {
        anyhow::bail!("sparse.max_features must be > 0");
    }

    if !(0.0..=0.5).contains(&config.graph.enhancement_weight) {
        anyhow::bail!("graph.enhancement_weight must be between 0.0 and 0.5");
    }

    match config.dense.provider.as_str() {
        "disabled" => {}
        "http" => {
            if config.dense.endpoint.is_none() {
                anyhow::bail!("dense.endpoint must be set when provider is 'http'");
            }
        }
        other => anyhow::bail!(
            "Unknown dense provider: '{}'. Must be disabled or http.",
            other
        ),
    }

    Ok(())
}
