//! Element text extraction.
//!
//! The document parser hands over elements in heterogeneous body
//! representations. Extraction tries a fixed, declared order of strategies
//! so that no element is ever silently absent from the corpus:
//!
//! 1. direct text — used as-is when it carries real content;
//! 2. structural markup — tags stripped with quick-xml, whitespace collapsed;
//! 3. bounded opaque fallback — a kind-tagged, length-capped representation.
//!
//! An element whose best extraction is still empty yields `None`; the
//! chunker skips it with a logged warning (it never becomes a chunk).

use crate::models::{Element, ElementBody};

/// Minimum trimmed length for direct text to count as real content.
const MIN_DIRECT_TEXT: usize = 1;

/// Cap on the opaque fallback representation.
const MAX_OPAQUE_LEN: usize = 200;

/// Extract the retrievable text of an element, or `None` when no strategy
/// recovers any content.
pub fn extract_text(element: &Element) -> Option<String> {
    let text = match &element.body {
        ElementBody::Text(s) => normalize_whitespace(s),
        ElementBody::Markup(m) => {
            let stripped = strip_markup(m);
            if stripped.len() >= MIN_DIRECT_TEXT {
                stripped
            } else {
                // Malformed markup: fall through to the opaque rendering of
                // the raw body so the element still reaches the corpus.
                opaque_repr(&element.kind, m)
            }
        }
        ElementBody::Opaque(s) => opaque_repr(&element.kind, s),
    };

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Pull text content out of structural markup, dropping tags and
/// collapsing whitespace. Tolerant of malformed input: parse errors end
/// the scan and whatever was collected so far is returned.
fn strip_markup(markup: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_str(markup);
    reader.config_mut().trim_text(true);
    // HTML is not well-formed XML; unmatched closing tags are routine.
    reader.config_mut().check_end_names = false;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Text(t)) => {
                let s = t.unescape().unwrap_or_default();
                let s = s.trim();
                if !s.is_empty() {
                    parts.push(s.to_string());
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    normalize_whitespace(&parts.join(" "))
}

/// Collapse all whitespace runs to single spaces and trim.
fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Last-resort representation: the element's kind plus a bounded slice of
/// its raw body, so the element stays addressable in the corpus.
fn opaque_repr(kind: &str, raw: &str) -> String {
    let body = normalize_whitespace(raw);
    if body.is_empty() {
        return String::new();
    }
    let capped: String = body.chars().take(MAX_OPAQUE_LEN).collect();
    format!("{}<{}>", kind, capped)
}
