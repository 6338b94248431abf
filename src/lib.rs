//! # Filing Harness
//!
//! A hybrid retrieval engine for question answering over structured
//! financial filings (10-Q style).
//!
//! One parsed filing is ingested at a time: its elements are chunked with
//! section-aware windowing, a TF-IDF index with domain-term boosting is
//! fitted over the chunks, and a chunk graph (reading order, section
//! membership, similarity) is written to SQLite. Queries are routed by
//! keyword, ranked by the sparse index and an optional external dense
//! service, fused by weighted reciprocal rank, and rounded out with a
//! budget-capped set of graph neighbors.
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────────┐
//! │ Parsed   │──▶│ Chunker  │──▶│ TF-IDF index   │
//! │ filing   │   │ sections │   │ + chunk graph  │
//! └──────────┘   └──────────┘   └──────┬────────┘
//!                                      │
//!              query ──▶ router ──▶ sparse + dense
//!                                      │
//!                               fuse ──▶ enhance ──▶ answer
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! fqa init                                  # create database
//! fqa ingest filing.json                    # chunk and index a filing
//! fqa search goog-10q "revenue by quarter"  # ranked answer context
//! fqa route "key risk factors"              # show routing only
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`extract`] | Element text extraction |
//! | [`chunker`] | Section-aware chunking |
//! | [`sparse`] | TF-IDF scoring with domain boosts and heuristics |
//! | [`dense`] | External dense retriever seam |
//! | [`ensemble`] | Weighted rank fusion |
//! | [`graph`] | Chunk graph storage and edge construction |
//! | [`enhance`] | Graph-based result enhancement |
//! | [`router`] | Keyword query routing |
//! | [`session`] | Per-document retrieval sessions |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunker;
pub mod config;
pub mod db;
pub mod dense;
pub mod enhance;
pub mod ensemble;
pub mod extract;
pub mod graph;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod router;
pub mod search;
pub mod session;
pub mod sparse;
