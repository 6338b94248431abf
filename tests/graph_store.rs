//! Sqlite graph store round-trips, exercised through the library API.

use std::collections::BTreeSet;
use std::sync::Arc;

use tempfile::TempDir;

use filing_harness::config::{Config, DbConfig};
use filing_harness::db;
use filing_harness::dense::DisabledRetriever;
use filing_harness::graph::{
    next_edges, DocumentRecord, Edge, EdgeKind, GraphStore, SqliteGraphStore,
};
use filing_harness::migrate;
use filing_harness::models::{Chunk, Element, ElementBody};
use filing_harness::session::DocumentSession;

fn chunk(i: usize, section: &str, text: &str) -> Chunk {
    Chunk {
        chunk_id: format!("chunk_{}", i),
        index: i,
        hash: Chunk::text_hash(text),
        text: text.to_string(),
        element_type: "TextElement".to_string(),
        page_number: Some(i as u32 + 1),
        section_path: section.to_string(),
        content_type: "unknown".to_string(),
        pages: BTreeSet::from([i as u32 + 1]),
    }
}

async fn store_in(tmp: &TempDir) -> SqliteGraphStore {
    let pool = db::connect(&tmp.path().join("fqa.sqlite")).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    SqliteGraphStore::new(pool)
}

#[tokio::test]
async fn chunks_round_trip_with_metadata() {
    let tmp = TempDir::new().unwrap();
    let store = store_in(&tmp).await;

    let chunks = vec![
        chunk(0, "part_i/item_1", "alpha text"),
        chunk(1, "part_i/item_1", "beta text"),
    ];
    let doc = DocumentRecord {
        id: "doc-1".to_string(),
        title: Some("Form 10-Q".to_string()),
        ingested_at: 1_700_000_000,
    };
    store
        .replace_document(&doc, &chunks, &next_edges(&chunks))
        .await
        .unwrap();

    let loaded = store.load_chunks("doc-1").await.unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].chunk_id, "chunk_0");
    assert_eq!(loaded[0].page_number, Some(1));
    assert_eq!(loaded[0].pages, BTreeSet::from([1]));
    assert_eq!(loaded[1].section_path, "part_i/item_1");
    assert_eq!(loaded[1].hash, Chunk::text_hash("beta text"));
}

#[tokio::test]
async fn edges_drive_traversal_queries() {
    let tmp = TempDir::new().unwrap();
    let store = store_in(&tmp).await;

    let chunks = vec![
        chunk(0, "part_i/item_1", "alpha"),
        chunk(1, "part_i/item_1", "beta"),
        chunk(2, "part_ii/item_1a", "gamma"),
    ];
    let mut edges = next_edges(&chunks);
    edges.push(Edge {
        src: "chunk_0".to_string(),
        dst: "chunk_2".to_string(),
        kind: EdgeKind::SimilarTo,
        weight: 0.83,
    });
    let doc = DocumentRecord {
        id: "doc-1".to_string(),
        title: None,
        ingested_at: 0,
    };
    store.replace_document(&doc, &chunks, &edges).await.unwrap();

    let next = store.next_chunks("doc-1", "chunk_0").await.unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].chunk_id, "chunk_1");

    // Section boundary breaks reading order
    assert!(store.next_chunks("doc-1", "chunk_1").await.unwrap().is_empty());

    let similar = store.similar_chunks("doc-1", "chunk_0").await.unwrap();
    assert_eq!(similar.len(), 1);
    assert_eq!(similar[0].chunk_id, "chunk_2");

    let section = store
        .section_chunks("doc-1", "part_i/item_1", 10)
        .await
        .unwrap();
    assert_eq!(section.len(), 2);
    let capped = store
        .section_chunks("doc-1", "part_i/item_1", 1)
        .await
        .unwrap();
    assert_eq!(capped.len(), 1);
}

#[tokio::test]
async fn replace_clears_prior_chunks_and_edges() {
    let tmp = TempDir::new().unwrap();
    let store = store_in(&tmp).await;

    let doc = DocumentRecord {
        id: "doc-1".to_string(),
        title: None,
        ingested_at: 0,
    };
    let first = vec![
        chunk(0, "part_i/item_1", "alpha"),
        chunk(1, "part_i/item_1", "beta"),
        chunk(2, "part_i/item_1", "gamma"),
    ];
    store
        .replace_document(&doc, &first, &next_edges(&first))
        .await
        .unwrap();

    let second = vec![chunk(0, "part_i/item_1", "delta")];
    store
        .replace_document(&doc, &second, &next_edges(&second))
        .await
        .unwrap();

    let loaded = store.load_chunks("doc-1").await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].text, "delta");
    assert!(store.next_chunks("doc-1", "chunk_0").await.unwrap().is_empty());
}

#[tokio::test]
async fn new_document_evicts_the_prior_one() {
    let tmp = TempDir::new().unwrap();
    let store = store_in(&tmp).await;

    let a = vec![chunk(0, "part_i/item_1", "alpha")];
    let b = vec![chunk(0, "part_i/item_1", "bravo")];
    store
        .replace_document(
            &DocumentRecord {
                id: "doc-a".to_string(),
                title: None,
                ingested_at: 0,
            },
            &a,
            &[],
        )
        .await
        .unwrap();
    store
        .replace_document(
            &DocumentRecord {
                id: "doc-b".to_string(),
                title: None,
                ingested_at: 0,
            },
            &b,
            &[],
        )
        .await
        .unwrap();

    // Single active document: ingesting doc-b clears doc-a entirely.
    assert!(store.load_chunks("doc-a").await.unwrap().is_empty());
    assert_eq!(store.load_chunks("doc-b").await.unwrap()[0].text, "bravo");
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

#[tokio::test]
async fn session_survives_reopen_from_sqlite() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(store_in(&tmp).await);

    let elements = vec![
        text_element("TopSectionTitle", "part_i/item_1", 1, "Item 1. Financial Statements"),
        text_element(
            "TableElement",
            "part_i/item_1",
            3,
            "Revenues $96,469 million compared to $84,742 million for the quarter.",
        ),
        text_element("TopSectionTitle", "part_ii/item_1a", 30, "Item 1A. Risk Factors"),
        text_element(
            "TextElement",
            "part_ii/item_1a",
            30,
            "Operating results may fluctuate due to uncertainty in advertising demand.",
        ),
    ];

    let config = Config {
        db: DbConfig {
            path: tmp.path().join("fqa.sqlite"),
        },
        chunking: Default::default(),
        retrieval: Default::default(),
        sparse: Default::default(),
        dense: Default::default(),
        graph: Default::default(),
        router: Default::default(),
    };

    let ingested = DocumentSession::ingest(
        "doc-1",
        Some("10-Q"),
        &elements,
        config.clone(),
        store.clone(),
        Arc::new(DisabledRetriever),
    )
    .await
    .unwrap();
    let expected = ingested.chunk_count();

    let reopened = DocumentSession::open("doc-1", config, store, Arc::new(DisabledRetriever))
        .await
        .unwrap();
    assert_eq!(reopened.chunk_count(), expected);

    let answer = reopened.ask("revenue for the quarter").await.unwrap();
    assert!(!answer.candidates.is_empty());
    assert!(answer.candidates[0].chunk.text.contains("96,469"));
}
