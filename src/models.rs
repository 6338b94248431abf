//! Core data models for the retrieval engine.
//!
//! These types represent the parsed elements, chunks, and ranked candidates
//! that flow through the ingestion and retrieval pipeline.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Element type recorded for a chunk that merges elements of different kinds.
pub const COMPOSITE_ELEMENT_TYPE: &str = "Composite";

/// Content type recorded when contributing elements disagree.
pub const CONTENT_TYPE_MIXED: &str = "mixed";

/// Content type recorded when no contributing element specified one.
pub const CONTENT_TYPE_UNKNOWN: &str = "unknown";

/// Prefix for chunk identifiers (`chunk_0`, `chunk_1`, ...).
pub const CHUNK_ID_PREFIX: &str = "chunk_";

/// The element kind emitted by the document parser for a top-level
/// section heading. Section-aware chunking partitions at these.
pub const TOP_SECTION_TITLE_KIND: &str = "TopSectionTitle";

/// Body representation of a parsed element.
///
/// The external document parser emits one of a fixed set of
/// representations; extraction strategies are tried in the order the
/// variants are declared (see [`crate::extract`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementBody {
    /// Plain text already extracted by the parser.
    Text(String),
    /// Raw structural markup (HTML-ish); text must be pulled out of tags.
    Markup(String),
    /// An opaque representation the parser could not classify.
    Opaque(String),
}

/// A parsed structural unit from the source document.
///
/// Produced by the external document parser, consumed as a serialized
/// element stream. Immutable for the lifetime of one processing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    /// Structural type (e.g. `"TitleElement"`, `"TextElement"`,
    /// `"TableElement"`, `"TopSectionTitle"`).
    pub kind: String,
    #[serde(default)]
    pub page_number: Option<u32>,
    /// Hierarchical section identifier (e.g. `"part_i/item_2/md_a"`).
    #[serde(default)]
    pub section_path: Option<String>,
    /// Domain classification (e.g. `"income_statement"`, `"notes"`).
    #[serde(default)]
    pub content_type: Option<String>,
    pub body: ElementBody,
}

impl Element {
    /// Whether this element starts a new top-level document section.
    pub fn is_section_boundary(&self) -> bool {
        self.kind == TOP_SECTION_TITLE_KIND
    }
}

/// The atomic retrievable unit, carrying the 5-field metadata contract.
///
/// `chunk_id` values are unique and strictly increasing in creation order
/// within a document; a chunk never spans more than one top-level section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Stable identifier, `chunk_<index>`.
    pub chunk_id: String,
    /// Creation-order index within the document.
    pub index: usize,
    /// Extracted, de-duplicated content.
    pub text: String,
    /// Source element kind, or [`COMPOSITE_ELEMENT_TYPE`] for merged chunks.
    pub element_type: String,
    /// Lowest page number among contributing elements.
    pub page_number: Option<u32>,
    /// Dominant section path among contributing elements; empty when none.
    pub section_path: String,
    /// Shared content type, or `"mixed"` / `"unknown"`.
    pub content_type: String,
    /// All pages contributing elements came from (only merged chunks carry
    /// more than one). BTreeSet keeps iteration order deterministic.
    pub pages: BTreeSet<u32>,
    /// SHA-256 of `text`, used as the content identity for dedup.
    pub hash: String,
}

impl Chunk {
    /// SHA-256 hex digest of chunk text.
    pub fn text_hash(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Provenance tag for a ranked candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    Dense,
    Sparse,
    /// Fused from both base retrievers.
    Ensemble,
    /// Added by graph enhancement via a NEXT edge.
    Next,
    /// Added by graph enhancement via a shared section path.
    Section,
    /// Added by graph enhancement via a SIMILAR_TO edge.
    SimilarTo,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Provenance::Dense => "dense",
            Provenance::Sparse => "sparse",
            Provenance::Ensemble => "ensemble",
            Provenance::Next => "NEXT",
            Provenance::Section => "SECTION",
            Provenance::SimilarTo => "SIMILAR_TO",
        };
        f.write_str(s)
    }
}

/// A `(chunk_id, score)` pair returned by a ranked-list provider.
#[derive(Debug, Clone)]
pub struct ScoredRef {
    pub chunk_id: String,
    pub score: f32,
}

/// A ranked chunk with score and provenance. Created per query and
/// discarded after it completes.
#[derive(Debug, Clone)]
pub struct RetrievalCandidate {
    pub chunk: Chunk,
    pub score: f32,
    pub source: Provenance,
}
