//! End-to-end scenarios: full ingest -> extract -> query -> delete round
//! trips over a single store

use docket_core::{
    graph_stats, ExtractionConfig, Extractor, NewEmbedding, OracleResponse, RelationshipType,
    TaskType, EMBEDDING_DIMENSIONS,
};
use docket_e2e_tests::harness::TestStore;
use docket_e2e_tests::mocks::{entity, relationship, MockExtractionOracle};

fn no_cooldown() -> ExtractionConfig {
    ExtractionConfig {
        segment_cooldown_secs: 0,
        ..ExtractionConfig::default()
    }
}

/// Create -> ingest -> extract -> verify -> delete, ending with a clean
/// foreign-key check and zero rows for the document anywhere
#[test]
fn create_ingest_delete_round_trip() {
    let harness = TestStore::create("test1");
    let text = "Alice met Bob on 2024-01-02.";

    let document = harness.ingest_document("doc-A.pdf");
    harness.complete_ocr(&document.id, text);
    let chunks = harness.chunk_ranges(&document.id, &[(0, 14), (14, 28)]);
    assert_eq!(chunks.len(), 2);

    // A chunk embedding so the vector index participates in the cascade
    harness
        .store
        .insert_embeddings(&[NewEmbedding {
            chunk_id: Some(chunks[0].id.clone()),
            vector: vec![0.25; EMBEDDING_DIMENSIONS],
            model_name: "mock-embedder".into(),
            task_type: TaskType::SearchDocument,
            ..Default::default()
        }])
        .unwrap();

    let oracle = MockExtractionOracle::returning(&OracleResponse {
        entities: vec![
            entity("e1", "Alice", "person", 0.9),
            entity("e2", "Bob", "person", 0.85),
            entity("e3", "2024-01-02", "date", 0.9),
        ],
        relationships: vec![relationship("e1", "e2", "related_to", 0.9)],
    });
    let report = Extractor::with_config(&harness.store, &oracle, no_cooldown())
        .run(&document.id)
        .unwrap();

    // Three entities, at least one mention each, three nodes, one edge
    assert_eq!(report.entity_count, 3);
    assert!(report.mention_count >= 3);
    let entities = harness.store.list_entities(&document.id, None).unwrap();
    assert_eq!(entities.len(), 3);
    for entity in &entities {
        assert!(!harness.store.list_mentions(&entity.id).unwrap().is_empty());
    }

    let stats = graph_stats(&harness.store, 10).unwrap();
    assert_eq!(stats.node_count, 3);
    assert_eq!(stats.edge_count, 1);

    let nodes = harness.store.list_nodes(None, 10).unwrap();
    let alice = nodes.iter().find(|n| n.canonical_name == "Alice").unwrap();
    let edges = harness.store.list_edges_for_node(&alice.id).unwrap();
    assert_eq!(edges.len(), 1);
    let edge = &edges[0];
    assert_eq!(edge.relationship_type, RelationshipType::RelatedTo);
    assert_eq!(edge.evidence_count, 1);
    assert!((edge.normalized_weight - 2.0_f64.ln()).abs() < 1e-9);
    assert!(edge.source_node_id < edge.target_node_id);
    assert_eq!(edge.document_ids, vec![document.id.clone()]);

    // Every artifact row traces to a provenance chain rooted at the document
    for entity in &entities {
        let chain = harness.store.get_provenance_chain(&entity.provenance_id).unwrap();
        assert_eq!(chain.last().unwrap().root_document_id, document.id);
    }

    // Delete and verify nothing remains
    harness.store.delete_document(&document.id).unwrap();
    assert!(harness.store.list_chunks(&document.id).unwrap().is_empty());
    assert!(harness.store.list_entities(&document.id, None).unwrap().is_empty());
    assert!(harness
        .store
        .list_mentions_for_document(&document.id)
        .unwrap()
        .is_empty());
    assert!(harness
        .store
        .list_embeddings_for_document(&document.id)
        .unwrap()
        .is_empty());
    assert!(harness
        .store
        .get_provenance_by_root_document(&document.id)
        .unwrap()
        .is_empty());
    let stats = graph_stats(&harness.store, 10).unwrap();
    assert_eq!(stats.node_count, 0);
    assert_eq!(stats.edge_count, 0);
    harness.store.verify_integrity().unwrap();
}

/// Chunk-linked mentions delete cleanly because the cascade removes
/// mentions before chunks
#[test]
fn cascade_handles_chunk_linked_mentions() {
    let harness = TestStore::create("mentions");
    let text = "Dr. Sarah Chen reviewed the operative report carefully.";
    let (document, _, chunks) = harness.ingest_with_text("op-report.pdf", text);

    let oracle = MockExtractionOracle::returning(&OracleResponse {
        entities: vec![entity("e1", "Dr. Sarah Chen", "person", 0.95)],
        relationships: vec![],
    });
    Extractor::with_config(&harness.store, &oracle, no_cooldown())
        .run(&document.id)
        .unwrap();

    // The mention is pinned to a chunk
    let mentions = harness.store.list_mentions_for_document(&document.id).unwrap();
    assert!(!mentions.is_empty());
    assert_eq!(mentions[0].chunk_id.as_deref(), Some(chunks[0].id.as_str()));

    harness.store.delete_document(&document.id).unwrap();
    harness.store.verify_integrity().unwrap();
}

/// Extraction for two documents sharing an entity, then deletion of one,
/// leaves the shared node consistent
#[test]
fn shared_nodes_survive_partial_deletion() {
    let harness = TestStore::create("shared");
    let response = OracleResponse {
        entities: vec![
            entity("e1", "Mercy Hospital", "organization", 0.9),
            entity("e2", "Alice Johnson", "person", 0.9),
        ],
        relationships: vec![relationship("e2", "e1", "works_at", 0.9)],
    };

    let (doc_a, _, _) =
        harness.ingest_with_text("a.pdf", "Alice Johnson works at Mercy Hospital.");
    let oracle = MockExtractionOracle::returning(&response);
    Extractor::with_config(&harness.store, &oracle, no_cooldown())
        .run(&doc_a.id)
        .unwrap();

    let (doc_b, _, _) =
        harness.ingest_with_text("b.pdf", "Alice Johnson visited Mercy Hospital again.");
    let oracle = MockExtractionOracle::returning(&response);
    Extractor::with_config(&harness.store, &oracle, no_cooldown())
        .run(&doc_b.id)
        .unwrap();

    let nodes = harness.store.list_nodes(None, 10).unwrap();
    assert_eq!(nodes.len(), 2);
    assert!(nodes.iter().all(|n| n.document_count == 2));
    let edge = &harness.store.list_edges_for_node(&nodes[0].id).unwrap()[0];
    assert_eq!(edge.evidence_count, 2);

    harness.store.delete_document(&doc_a.id).unwrap();

    let nodes = harness.store.list_nodes(None, 10).unwrap();
    assert_eq!(nodes.len(), 2);
    for node in &nodes {
        assert_eq!(node.document_count, 1, "node {}", node.canonical_name);
        assert_eq!(node.edge_count, 1);
    }
    let edge = &harness.store.list_edges_for_node(&nodes[0].id).unwrap()[0];
    assert_eq!(edge.document_ids, vec![doc_b.id.clone()]);
    harness.store.verify_integrity().unwrap();
}
