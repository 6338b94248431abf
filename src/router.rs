//! Keyword query router.
//!
//! Classifies a question into a retrieval strategy before any retriever
//! runs. Rules are evaluated as an ordered decision list over the
//! lowercased query; the first match wins, so a query mentioning both
//! revenue figures and risk factors routes to the table strategy.

use serde::Serialize;

use crate::config::RouterConfig;

/// Quantitative vocabulary that, combined with a digit, marks a query as
/// numeric even without an explicit table keyword.
const QUANTITATIVE_TERMS: &[&str] = &[
    "rate",
    "cost",
    "revenue",
    "percentage",
    "%",
    "quarter",
    "year",
];

/// Retrieval strategies the router can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Numeric or tabular lookup (financial statements, metrics).
    Table,
    /// Risk-factor narrative.
    Risk,
    /// Management discussion and analysis.
    Mda,
    /// Fallback hybrid retrieval.
    General,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Table => "table",
            Route::Risk => "risk",
            Route::Mda => "mda",
            Route::General => "general",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Route a query. Deterministic; identical queries always take the same
/// route.
pub fn route(query: &str, config: &RouterConfig) -> Route {
    let q = query.to_lowercase();

    if matches_any(&q, &config.table_keywords) || numeric_question(&q) {
        return Route::Table;
    }
    if matches_any(&q, &config.risk_keywords) {
        return Route::Risk;
    }
    if matches_any(&q, &config.mda_keywords) {
        return Route::Mda;
    }
    Route::General
}

fn matches_any(query: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| query.contains(k.as_str()))
}

/// A digit plus quantitative phrasing signals a numeric lookup.
fn numeric_question(query: &str) -> bool {
    query.chars().any(|c| c.is_ascii_digit())
        && QUANTITATIVE_TERMS.iter().any(|t| query.contains(t))
}
