//! End-to-end tests of the IVF lifecycle, filter over-fetch and the
//! incremental NSW path.

use lodestone_core::{ChunkInput, EngineConfig, IndexKind, Metadata, Value};
use lodestone_engine::{Engine, MockEmbedder};
use std::sync::Arc;

fn mock_engine(dimension: usize) -> Engine {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
    Engine::with_embedder(EngineConfig::default(), Arc::new(MockEmbedder::new(dimension)))
}

fn input(text: &str) -> ChunkInput {
    ChunkInput {
        text: text.to_string(),
        ..ChunkInput::default()
    }
}

fn tagged_input(text: &str, key: &str, value: &str) -> ChunkInput {
    let mut metadata = Metadata::new();
    metadata.insert(key.to_string(), Value::from(value));
    ChunkInput {
        text: text.to_string(),
        metadata: Some(metadata),
        ..ChunkInput::default()
    }
}

#[tokio::test]
async fn ivf_lifecycle_from_buffer_to_clusters() {
    let engine = mock_engine(32);
    let mut params = Metadata::new();
    params.insert("n_clusters".into(), Value::from(3i64));
    params.insert("n_probes".into(), Value::from(2i64));
    let library = engine
        .create_library("ivf", IndexKind::Ivf, Some(&params), None)
        .unwrap();

    for i in 0..30 {
        engine
            .add_chunk(library.id, input(&format!("chunk number {i}")))
            .await
            .unwrap();
    }

    // Before build everything sits in the buffer and the query path
    // falls back to an exact scan.
    let stats = engine.library_stats(library.id).unwrap();
    assert_eq!(stats.buffered, 30);
    assert_eq!(stats.centroids, 0);

    let before = engine
        .search(library.id, "chunk number 7", 5, None)
        .await
        .unwrap();
    assert_eq!(before.results.len(), 5);

    let report = engine.build_index(library.id).unwrap();
    assert_eq!(report.library_id, library.id);
    let library_record = engine.get_library(library.id).unwrap();
    assert_eq!(library_record.last_built_at, Some(report.last_built_at));

    let stats = engine.library_stats(library.id).unwrap();
    assert_eq!(stats.centroids, 3);
    assert_eq!(stats.buffered, 0);
    assert_eq!(stats.size, 30);

    let after = engine
        .search(library.id, "chunk number 7", 5, None)
        .await
        .unwrap();
    assert_eq!(after.results.len(), 5);
    // The exact hit survives clustering.
    assert_eq!(after.results[0].chunk_id, before.results[0].chunk_id);
}

#[tokio::test]
async fn filter_overfetch_returns_all_matching_results() {
    let engine = mock_engine(32);
    let library = engine
        .create_library("filtered", IndexKind::Linear, None, None)
        .unwrap();

    for i in 0..95 {
        engine
            .add_chunk(library.id, tagged_input(&format!("filler {i}"), "topic", "b"))
            .await
            .unwrap();
    }
    let mut tagged_ids = Vec::new();
    for i in 0..5 {
        let chunk = engine
            .add_chunk(library.id, tagged_input(&format!("special {i}"), "topic", "a"))
            .await
            .unwrap();
        tagged_ids.push(chunk.id);
    }

    let filters = serde_json::json!({"topic": "a"});
    let response = engine
        .search(library.id, "special", 5, Some(&filters))
        .await
        .unwrap();

    assert_eq!(response.results.len(), 5);
    for hit in &response.results {
        assert!(tagged_ids.contains(&hit.chunk_id));
        assert_eq!(
            hit.chunk.metadata.get("topic").unwrap().as_str(),
            Some("a")
        );
    }
    for pair in response.results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn overly_selective_filter_returns_what_exists() {
    let engine = mock_engine(32);
    let library = engine
        .create_library("sparse", IndexKind::Linear, None, None)
        .unwrap();
    for i in 0..50 {
        engine
            .add_chunk(library.id, tagged_input(&format!("body {i}"), "lang", "en"))
            .await
            .unwrap();
    }
    let rare = engine
        .add_chunk(library.id, tagged_input("unique body", "lang", "fi"))
        .await
        .unwrap();

    let filters = serde_json::json!({"lang": "fi"});
    let response = engine
        .search(library.id, "body", 10, Some(&filters))
        .await
        .unwrap();
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].chunk_id, rare.id);
}

#[tokio::test]
async fn nsw_incremental_inserts_with_interleaved_searches() {
    let engine = mock_engine(32);
    let library = engine
        .create_library("graph", IndexKind::Nsw, None, None)
        .unwrap();

    let mut first_chunk = None;
    for i in 0..200 {
        let chunk = engine
            .add_chunk(library.id, input(&format!("node text {i}")))
            .await
            .unwrap();
        if first_chunk.is_none() {
            first_chunk = Some(chunk);
        }
        if i % 20 == 0 {
            let expect = 5.min(i + 1);
            let response = engine
                .search(library.id, &format!("node text {i}"), 5, None)
                .await
                .unwrap();
            assert_eq!(response.results.len(), expect);
        }
    }

    // The first insert is the graph's entry point; deleting it must not
    // break subsequent searches.
    engine.delete_chunk(first_chunk.unwrap().id).unwrap();
    let response = engine
        .search(library.id, "node text 42", 5, None)
        .await
        .unwrap();
    assert_eq!(response.results.len(), 5);
}

#[tokio::test]
async fn unfiltered_search_obeys_length_law() {
    let engine = mock_engine(32);
    let library = engine
        .create_library("law", IndexKind::Linear, None, None)
        .unwrap();
    for i in 0..7 {
        engine
            .add_chunk(library.id, input(&format!("text {i}")))
            .await
            .unwrap();
    }

    // k <= n: exactly k results; k > n: exactly n.
    let small = engine.search(library.id, "text", 3, None).await.unwrap();
    assert_eq!(small.results.len(), 3);
    let large = engine.search(library.id, "text", 20, None).await.unwrap();
    assert_eq!(large.results.len(), 7);
}

#[tokio::test]
async fn results_are_ordered_across_all_index_kinds() {
    for kind in [IndexKind::Linear, IndexKind::Ivf, IndexKind::Nsw] {
        let engine = mock_engine(32);
        let library = engine.create_library("ordered", kind, None, None).unwrap();
        for i in 0..40 {
            engine
                .add_chunk(library.id, input(&format!("entry {i}")))
                .await
                .unwrap();
        }
        engine.build_index(library.id).unwrap();

        let response = engine.search(library.id, "entry 3", 10, None).await.unwrap();
        assert!(!response.results.is_empty());
        for pair in response.results.windows(2) {
            assert!(
                pair[0].score > pair[1].score
                    || (pair[0].score == pair[1].score
                        && pair[0].chunk_id < pair[1].chunk_id),
                "results out of order for {kind:?}"
            );
        }
    }
}
