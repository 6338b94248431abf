//! Section-aware document chunker.
//!
//! Turns the parsed element stream into retrievable [`Chunk`]s carrying the
//! 5-field metadata contract (`element_type`, `chunk_id`, `page_number`,
//! `section_path`, `content_type`). Two strategies:
//!
//! - **Legacy 1:1** — each element becomes exactly one chunk, metadata
//!   copied directly. Safe fallback.
//! - **Section-aware windowing** — elements are partitioned at top-level
//!   section titles; within a section, texts are accumulated into a buffer
//!   that is flushed as a chunk when the next element would push it past
//!   `chunk_size` characters. Each new buffer is seeded with the last
//!   `overlap` characters of the previous chunk to preserve continuity.
//!   Chunks never cross a section boundary.
//!
//! Length bound in section-aware mode: when no single element text exceeds
//! `chunk_size` characters, a chunk never exceeds `chunk_size + overlap + 1`
//! characters (overlap seed, newline separator, one non-splitting element).
//! Elements are never split, so a single oversized element alone can exceed
//! this. All lengths are counted in characters, matching the configured
//! `chunk_size` and `overlap` units.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::config::{ChunkStrategy, ChunkingConfig};
use crate::extract::extract_text;
use crate::models::{
    Chunk, Element, CHUNK_ID_PREFIX, COMPOSITE_ELEMENT_TYPE, CONTENT_TYPE_MIXED,
    CONTENT_TYPE_UNKNOWN,
};

/// Build the chunk corpus for a document.
///
/// Elements with no recoverable text are skipped with a warning; a section
/// with zero extractable text yields zero chunks. Chunk ids are unique and
/// strictly increasing in creation order.
pub fn build_chunks(elements: &[Element], config: &ChunkingConfig) -> Vec<Chunk> {
    let chunks = match config.strategy {
        ChunkStrategy::Legacy => legacy_chunks(elements),
        ChunkStrategy::SectionAware => {
            section_aware_chunks(elements, config.chunk_size, config.overlap)
        }
    };
    debug!(
        elements = elements.len(),
        chunks = chunks.len(),
        "chunked document"
    );
    chunks
}

/// Return the elements of the top-level section whose title carries
/// `section_path`, up to (not including) the next section boundary.
pub fn section_elements<'a>(elements: &'a [Element], section_path: &str) -> Vec<&'a Element> {
    let start = elements.iter().position(|el| {
        el.is_section_boundary() && el.section_path.as_deref() == Some(section_path)
    });
    let Some(start) = start else {
        warn!(section_path, "section not found");
        return Vec::new();
    };
    let mut collected = Vec::new();
    for el in &elements[start + 1..] {
        if el.is_section_boundary() {
            break;
        }
        collected.push(el);
    }
    collected
}

/// Legacy strategy: one chunk per element, metadata copied directly.
fn legacy_chunks(elements: &[Element]) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for (i, element) in elements.iter().enumerate() {
        let Some(text) = extract_text(element) else {
            warn!(index = i, kind = %element.kind, "skipping element with no extractable text");
            continue;
        };
        let mut pages = BTreeSet::new();
        if let Some(p) = element.page_number {
            pages.insert(p);
        }
        let index = chunks.len();
        chunks.push(Chunk {
            chunk_id: format!("{}{}", CHUNK_ID_PREFIX, index),
            index,
            hash: Chunk::text_hash(&text),
            text,
            element_type: element.kind.clone(),
            page_number: element.page_number,
            section_path: element.section_path.clone().unwrap_or_default(),
            content_type: element
                .content_type
                .clone()
                .unwrap_or_else(|| CONTENT_TYPE_UNKNOWN.to_string()),
            pages,
        });
    }
    chunks
}

/// Section-aware windowing strategy.
fn section_aware_chunks(elements: &[Element], chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for section in partition_sections(elements) {
        chunk_section(section, chunk_size, overlap, &mut chunks);
    }
    chunks
}

/// Split the element stream at top-level section titles. The title element
/// belongs to the section it opens. Elements before the first title form a
/// leading section of their own.
fn partition_sections(elements: &[Element]) -> Vec<&[Element]> {
    let mut sections = Vec::new();
    let mut start = 0usize;
    for (i, el) in elements.iter().enumerate() {
        if el.is_section_boundary() && i > start {
            sections.push(&elements[start..i]);
            start = i;
        }
    }
    if start < elements.len() {
        sections.push(&elements[start..]);
    }
    sections
}

/// Accumulates one chunk's text and contributing elements.
struct ChunkBuffer<'a> {
    text: String,
    /// Cached character count of `text`; lengths are measured in chars to
    /// match the configured `chunk_size`/`overlap` units.
    char_len: usize,
    contributors: Vec<&'a Element>,
    /// Text of the last appended element, for consecutive-duplicate dedup.
    last_appended: Option<String>,
}

impl<'a> ChunkBuffer<'a> {
    fn seeded(seed: String) -> Self {
        Self {
            char_len: seed.chars().count(),
            text: seed,
            contributors: Vec::new(),
            last_appended: None,
        }
    }

    /// Buffer length in characters if `text` were appended (newline-joined).
    fn projected_len(&self, text: &str) -> usize {
        let added = text.chars().count();
        if self.text.is_empty() {
            added
        } else {
            self.char_len + 1 + added
        }
    }

    fn append(&mut self, element: &'a Element, text: String) {
        self.char_len = self.projected_len(&text);
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(&text);
        self.contributors.push(element);
        self.last_appended = Some(text);
    }

    /// A buffer holding only an overlap seed must not be flushed — it
    /// contains no whole element.
    fn has_element(&self) -> bool {
        !self.contributors.is_empty()
    }
}

fn chunk_section<'a>(
    section: &'a [Element],
    chunk_size: usize,
    overlap: usize,
    chunks: &mut Vec<Chunk>,
) {
    let mut buf = ChunkBuffer::seeded(String::new());

    for (i, element) in section.iter().enumerate() {
        let Some(text) = extract_text(element) else {
            warn!(index = i, kind = %element.kind, "skipping element with no extractable text");
            continue;
        };

        // De-duplicate repeated extractions (headers replayed per page).
        if buf.last_appended.as_deref() == Some(text.as_str()) {
            debug!(kind = %element.kind, "dropping consecutive duplicate element text");
            continue;
        }

        if buf.has_element() && buf.projected_len(&text) > chunk_size {
            let seed = overlap_seed(&buf.text, overlap);
            flush(buf, chunks);
            buf = ChunkBuffer::seeded(seed);
        }
        buf.append(element, text);
    }

    // Section end forces a flush even when under chunk_size; a seed-only
    // buffer is dropped.
    if buf.has_element() {
        flush(buf, chunks);
    }
}

/// Last `overlap` characters of the previous chunk's text, on a char
/// boundary.
fn overlap_seed(text: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(overlap);
    chars[start..].iter().collect()
}

fn flush(buf: ChunkBuffer<'_>, chunks: &mut Vec<Chunk>) {
    let index = chunks.len();
    let meta = aggregate_metadata(&buf.contributors);
    chunks.push(Chunk {
        chunk_id: format!("{}{}", CHUNK_ID_PREFIX, index),
        index,
        hash: Chunk::text_hash(&buf.text),
        text: buf.text,
        element_type: meta.element_type,
        page_number: meta.page_number,
        section_path: meta.section_path,
        content_type: meta.content_type,
        pages: meta.pages,
    });
}

struct AggregatedMeta {
    element_type: String,
    page_number: Option<u32>,
    section_path: String,
    content_type: String,
    pages: BTreeSet<u32>,
}

/// Aggregation rules for merged chunks: composite element type when kinds
/// differ, minimum page number, dominant (most frequent, first-seen on
/// ties) section path, mixed/unknown/shared content type.
fn aggregate_metadata(contributors: &[&Element]) -> AggregatedMeta {
    let mut element_type: Option<&str> = None;
    let mut composite = false;
    let mut page_number: Option<u32> = None;
    let mut pages = BTreeSet::new();
    // First-seen order for deterministic tie-breaking.
    let mut path_counts: Vec<(&str, usize)> = Vec::new();
    let mut content_types: Vec<&str> = Vec::new();

    for el in contributors {
        match element_type {
            None => element_type = Some(&el.kind),
            Some(t) if t != el.kind => composite = true,
            _ => {}
        }
        if let Some(p) = el.page_number {
            pages.insert(p);
            page_number = Some(page_number.map_or(p, |min| min.min(p)));
        }
        if let Some(path) = el.section_path.as_deref() {
            match path_counts.iter_mut().find(|(p, _)| *p == path) {
                Some((_, n)) => *n += 1,
                None => path_counts.push((path, 1)),
            }
        }
        if let Some(ct) = el.content_type.as_deref() {
            if !content_types.contains(&ct) {
                content_types.push(ct);
            }
        }
    }

    let section_path = path_counts
        .iter()
        .max_by_key(|(_, n)| *n)
        .map(|(p, _)| p.to_string())
        .unwrap_or_default();

    let content_type = match content_types.len() {
        0 => CONTENT_TYPE_UNKNOWN.to_string(),
        1 => content_types[0].to_string(),
        _ => CONTENT_TYPE_MIXED.to_string(),
    };

    let element_type = if composite {
        COMPOSITE_ELEMENT_TYPE.to_string()
    } else {
        element_type.unwrap_or_default().to_string()
    };

    AggregatedMeta {
        element_type,
        page_number,
        section_path,
        content_type,
        pages,
    }
}
