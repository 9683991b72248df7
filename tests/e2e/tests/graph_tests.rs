//! Knowledge-graph engine: resolution, builds, merge/split/prune,
//! normalization, path-finding, semantic search, statistics

use docket_core::{
    graph_stats, merge_nodes, normalize_weights, prune_edges, semantic_entity_search, split_node,
    BuildMode, Document, EntityType, ExtractionConfig, Extractor, GraphBuilder, NormalizeOptions,
    OracleResponse, PathOptions, PruneOptions, RelationshipType, SemanticSearchOptions, Store,
    StoreError, TimeRange,
};
use docket_e2e_tests::harness::TestStore;
use docket_e2e_tests::mocks::{
    entity, relationship, MockEmbeddingOracle, MockExtractionOracle,
};

fn no_cooldown() -> ExtractionConfig {
    ExtractionConfig {
        segment_cooldown_secs: 0,
        ..ExtractionConfig::default()
    }
}

fn extract(store: &Store, document: &Document, response: &OracleResponse) {
    let oracle = MockExtractionOracle::returning(response);
    Extractor::with_config(store, &oracle, no_cooldown())
        .run(&document.id)
        .unwrap();
}

/// Two documents, four people, a workplace, a case, and temporal bounds on
/// the employment edge
fn seed_small_graph(harness: &TestStore) -> (Document, Document) {
    let (doc_a, _, _) = harness.ingest_with_text(
        "employment.pdf",
        "Alice Johnson works at Mercy Hospital since 2020.",
    );
    extract(
        &harness.store,
        &doc_a,
        &OracleResponse {
            entities: vec![
                entity("e1", "Alice Johnson", "person", 0.9),
                entity("e2", "Mercy Hospital", "organization", 0.9),
            ],
            relationships: vec![{
                let mut rel = relationship("e1", "e2", "works_at", 0.9);
                rel.temporal = Some("2020-01-01 to 2022-12-31".into());
                rel
            }],
        },
    );

    let (doc_b, _, _) = harness.ingest_with_text(
        "case.pdf",
        "Mercy Hospital is party to Case 2:24-cv-01892.",
    );
    extract(
        &harness.store,
        &doc_b,
        &OracleResponse {
            entities: vec![
                entity("e1", "Mercy Hospital", "organization", 0.9),
                entity("e2", "Case 2:24-cv-01892", "case_number", 0.9),
            ],
            relationships: vec![relationship("e1", "e2", "party_to", 0.8)],
        },
    );

    (doc_a, doc_b)
}

fn node_by_name(store: &Store, name: &str) -> docket_core::KgNode {
    store
        .list_nodes(None, 100)
        .unwrap()
        .into_iter()
        .find(|n| n.canonical_name == name)
        .unwrap_or_else(|| panic!("node {name} not found"))
}

#[test]
fn cross_document_fuzzy_merge() {
    let harness = TestStore::create("fuzzy");
    let (doc_a, _, _) = harness.ingest_with_text("a.pdf", "Dr. Smith examined the patient.");
    extract(
        &harness.store,
        &doc_a,
        &OracleResponse {
            entities: vec![entity("e1", "Dr. Smith", "person", 0.9)],
            relationships: vec![],
        },
    );
    let (doc_b, _, _) = harness.ingest_with_text("b.pdf", "Report signed by Smith, MD.");
    extract(
        &harness.store,
        &doc_b,
        &OracleResponse {
            entities: vec![entity("e1", "Smith, MD", "person", 0.85)],
            relationships: vec![],
        },
    );

    // Exact resolution kept them apart; fuzzy incremental coalesces
    assert_eq!(harness.store.list_nodes(None, 10).unwrap().len(), 2);
    let report = GraphBuilder::new(&harness.store, BuildMode::Fuzzy)
        .incremental_build(&[doc_b.id.clone()])
        .unwrap();
    assert_eq!(report.nodes_matched, 1);
    assert_eq!(report.nodes_deleted, 1);

    let nodes = harness.store.list_nodes(None, 10).unwrap();
    assert_eq!(nodes.len(), 1);
    let node = &nodes[0];
    assert_eq!(node.canonical_name, "Dr. Smith");
    assert_eq!(node.aliases, vec!["Smith, MD".to_string()]);
    assert_eq!(node.document_count, 2);
    assert!(node.mention_count >= 2);
}

#[test]
fn incremental_build_is_order_independent() {
    let build = |first: &str, second: &str| {
        let harness = TestStore::create("assoc");
        let (doc_1, _, _) = harness.ingest_with_text("1.pdf", &format!("{first} was deposed."));
        extract(
            &harness.store,
            &doc_1,
            &OracleResponse {
                entities: vec![entity("e1", first, "person", 0.9)],
                relationships: vec![],
            },
        );
        let (doc_2, _, _) = harness.ingest_with_text("2.pdf", &format!("{second} was deposed."));
        extract(
            &harness.store,
            &doc_2,
            &OracleResponse {
                entities: vec![entity("e1", second, "person", 0.9)],
                relationships: vec![],
            },
        );
        GraphBuilder::new(&harness.store, BuildMode::Fuzzy)
            .incremental_build(&[doc_1.id.clone(), doc_2.id.clone()])
            .unwrap();

        let nodes = harness.store.list_nodes(None, 10).unwrap();
        assert_eq!(nodes.len(), 1);
        let node = nodes.into_iter().next().unwrap();
        (
            node.canonical_name,
            node.aliases,
            node.document_count,
            node.mention_count,
        )
    };

    let forward = build("Dr. Smith", "Smith, MD");
    let reverse = build("Smith, MD", "Dr. Smith");
    assert_eq!(forward, reverse);
}

#[test]
fn full_build_reconstructs_nodes_and_edges() {
    let harness = TestStore::create("fullbuild");
    seed_small_graph(&harness);

    let before = graph_stats(&harness.store, 10).unwrap();
    assert_eq!(before.node_count, 3);
    assert_eq!(before.edge_count, 2);

    let report = GraphBuilder::new(&harness.store, BuildMode::Exact)
        .full_build()
        .unwrap();
    assert_eq!(report.nodes_deleted, 3);
    assert_eq!(report.nodes_created, 3);
    assert_eq!(report.edges_created, 2);

    let after = graph_stats(&harness.store, 10).unwrap();
    assert_eq!(after.node_count, before.node_count);
    assert_eq!(after.edge_count, before.edge_count);
    harness.store.verify_integrity().unwrap();

    // Temporal bounds survive the rebuild through the raw relationships
    let org = node_by_name(&harness.store, "Mercy Hospital");
    let edges = harness.store.list_edges_for_node(&org.id).unwrap();
    let works_at = edges
        .iter()
        .find(|e| e.relationship_type == RelationshipType::WorksAt)
        .unwrap();
    assert_eq!(works_at.valid_from.as_deref(), Some("2020-01-01"));
    assert_eq!(works_at.valid_until.as_deref(), Some("2022-12-31"));
}

#[test]
fn merge_moves_links_unions_aliases_and_combines_edges() {
    let harness = TestStore::create("merge");
    let (doc_a, doc_b) = seed_small_graph(&harness);

    // A second organization node carrying its own edge to the case
    let (doc_c, _, _) = harness.ingest_with_text(
        "variant.pdf",
        "Mercy General is party to Case 2:24-cv-01892.",
    );
    extract(
        &harness.store,
        &doc_c,
        &OracleResponse {
            entities: vec![
                entity("e1", "Mercy General", "organization", 0.8),
                entity("e2", "Case 2:24-cv-01892", "case_number", 0.9),
            ],
            relationships: vec![relationship("e1", "e2", "party_to", 0.7)],
        },
    );

    let target = node_by_name(&harness.store, "Mercy Hospital");
    let source = node_by_name(&harness.store, "Mercy General");
    let case = node_by_name(&harness.store, "Case 2:24-cv-01892");

    let report = merge_nodes(&harness.store, &source.id, &target.id).unwrap();
    assert_eq!(report.links_moved, 1);
    assert_eq!(report.edges_merged, 1);

    // Source is gone; nothing references it
    assert!(matches!(
        harness.store.get_node(&source.id).unwrap_err(),
        StoreError::NotFound(_)
    ));
    harness.store.verify_integrity().unwrap();

    let merged = harness.store.get_node(&target.id).unwrap();
    assert!(merged.aliases.contains(&"Mercy General".to_string()));
    assert_eq!(merged.document_count, 3);

    // The two parallel party_to edges collapsed into one with summed
    // evidence and unioned documents
    let edges = harness.store.list_edges_for_node(&case.id).unwrap();
    assert_eq!(edges.len(), 1);
    let party_to = &edges[0];
    assert_eq!(party_to.evidence_count, 2);
    assert!(party_to.document_ids.contains(&doc_b.id));
    assert!(party_to.document_ids.contains(&doc_c.id));
    assert_eq!(merged.edge_count, 2);
    assert_eq!(
        harness.store.get_node(&case.id).unwrap().edge_count,
        1
    );

    let _ = doc_a;
}

#[test]
fn merge_rejects_mismatched_or_identical_nodes() {
    let harness = TestStore::create("mergebad");
    seed_small_graph(&harness);
    let person = node_by_name(&harness.store, "Alice Johnson");
    let org = node_by_name(&harness.store, "Mercy Hospital");

    assert!(matches!(
        merge_nodes(&harness.store, &person.id, &person.id).unwrap_err(),
        StoreError::InputInvalid(_)
    ));
    assert!(matches!(
        merge_nodes(&harness.store, &person.id, &org.id).unwrap_err(),
        StoreError::InputInvalid(_)
    ));
    assert!(matches!(
        merge_nodes(&harness.store, "missing", &org.id).unwrap_err(),
        StoreError::NotFound(_)
    ));
}

#[test]
fn split_partitions_entities_and_records_provenance() {
    let harness = TestStore::create("split");
    // Two documents whose "Jordan Reed" turn out to be different people
    let (doc_a, _, _) = harness.ingest_with_text("a.pdf", "Jordan Reed testified first.");
    extract(
        &harness.store,
        &doc_a,
        &OracleResponse {
            entities: vec![entity("e1", "Jordan Reed", "person", 0.9)],
            relationships: vec![],
        },
    );
    let (doc_b, _, _) = harness.ingest_with_text("b.pdf", "Jordan Reed signed the invoice.");
    extract(
        &harness.store,
        &doc_b,
        &OracleResponse {
            entities: vec![entity("e1", "Jordan Reed", "person", 0.95)],
            relationships: vec![],
        },
    );

    let node = node_by_name(&harness.store, "Jordan Reed");
    assert_eq!(node.document_count, 2);
    let moved_entity = harness
        .store
        .list_entities(&doc_b.id, None)
        .unwrap()
        .into_iter()
        .next()
        .unwrap();

    let report = split_node(&harness.store, &node.id, &[moved_entity.id.clone()]).unwrap();
    assert_eq!(report.entities_moved, 1);
    assert_eq!(report.original.document_count, 1);
    assert_eq!(report.new_node.document_count, 1);
    assert_eq!(report.new_node.canonical_name, "Jordan Reed");

    // Split provenance chains under the original node with split metadata
    let prov = harness
        .store
        .get_provenance(&report.new_node.provenance_id)
        .unwrap();
    assert_eq!(
        prov.parent_id.as_deref(),
        Some(report.original.provenance_id.as_str())
    );
    assert!(prov
        .parameters_json
        .as_deref()
        .unwrap()
        .contains(&report.original.id));

    // Moving every entity out is rejected
    let remaining = harness.store.list_links_for_node(&node.id).unwrap();
    assert_eq!(remaining.len(), 1);
    let err = split_node(
        &harness.store,
        &node.id,
        &[remaining[0].entity_id.clone()],
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::InputInvalid(_)));
}

#[test]
fn normalize_applies_formula_and_scoping() {
    let harness = TestStore::create("normalize");
    let (doc_a, _) = seed_small_graph(&harness);

    let report = normalize_weights(&harness.store, &NormalizeOptions::default()).unwrap();
    assert_eq!(report.edges_seen, 2);

    let org = node_by_name(&harness.store, "Mercy Hospital");
    let edges = harness.store.list_edges_for_node(&org.id).unwrap();
    for edge in &edges {
        let multiplier = match edge.relationship_type {
            RelationshipType::WorksAt | RelationshipType::PartyTo => 2.0,
            _ => 1.0,
        };
        let expected = (1.0 + edge.evidence_count as f64).ln() * multiplier;
        assert!((edge.normalized_weight - expected).abs() < 1e-9);
    }

    // Override the works_at multiplier, scoped to the employment document
    let mut options = NormalizeOptions::default();
    options.multipliers.insert(RelationshipType::WorksAt, 5.0);
    options.document_ids = Some(vec![doc_a.id.clone()]);
    let report = normalize_weights(&harness.store, &options).unwrap();
    assert_eq!(report.edges_seen, 1);
    assert_eq!(report.edges_updated, 1);

    let edges = harness.store.list_edges_for_node(&org.id).unwrap();
    let works_at = edges
        .iter()
        .find(|e| e.relationship_type == RelationshipType::WorksAt)
        .unwrap();
    assert!((works_at.normalized_weight - 2.0_f64.ln() * 5.0).abs() < 1e-9);
}

#[test]
fn prune_previews_then_deletes_the_same_set() {
    let harness = TestStore::create("prune");
    seed_small_graph(&harness);
    normalize_weights(&harness.store, &NormalizeOptions::default()).unwrap();

    // Thresholds chosen to match every single-evidence edge
    let preview = prune_edges(
        &harness.store,
        &PruneOptions {
            min_weight: Some(5.0),
            dry_run: true,
            ..PruneOptions::default()
        },
    )
    .unwrap();
    assert_eq!(preview.count, 2);
    assert!(!preview.deleted);
    assert_eq!(preview.samples.len(), 2);
    // Dry run deleted nothing
    assert_eq!(graph_stats(&harness.store, 5).unwrap().edge_count, 2);

    // Destructive path without confirm is rejected
    let err = prune_edges(
        &harness.store,
        &PruneOptions {
            min_weight: Some(5.0),
            ..PruneOptions::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::InputInvalid(_)));

    let result = prune_edges(
        &harness.store,
        &PruneOptions {
            min_weight: Some(5.0),
            confirm: true,
            ..PruneOptions::default()
        },
    )
    .unwrap();
    assert!(result.deleted);
    assert_eq!(result.count, preview.count);

    assert_eq!(graph_stats(&harness.store, 5).unwrap().edge_count, 0);
    let org = node_by_name(&harness.store, "Mercy Hospital");
    assert_eq!(org.edge_count, 0);
}

#[test]
fn prune_respects_type_restriction() {
    let harness = TestStore::create("prunetype");
    seed_small_graph(&harness);
    normalize_weights(&harness.store, &NormalizeOptions::default()).unwrap();

    let result = prune_edges(
        &harness.store,
        &PruneOptions {
            min_weight: Some(5.0),
            relationship_types: Some(vec![RelationshipType::PartyTo]),
            confirm: true,
            ..PruneOptions::default()
        },
    )
    .unwrap();
    assert_eq!(result.count, 1);
    assert_eq!(graph_stats(&harness.store, 5).unwrap().edge_count, 1);
}

#[test]
fn paths_respect_temporal_filters() {
    let harness = TestStore::create("paths");
    seed_small_graph(&harness);

    let alice = node_by_name(&harness.store, "Alice Johnson");
    let case = node_by_name(&harness.store, "Case 2:24-cv-01892");

    // Unfiltered: one shortest 2-hop path through the hospital
    let paths = docket_core::find_paths(
        &harness.store,
        &alice.id,
        &case.id,
        &PathOptions::default(),
    )
    .unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].hops, 2);
    assert_eq!(paths[0].nodes.len(), 3);
    assert_eq!(paths[0].nodes[1].canonical_name, "Mercy Hospital");

    // The employment edge ended 2022-12-31; a window starting later
    // severs the path
    let paths = docket_core::find_paths(
        &harness.store,
        &alice.id,
        &case.id,
        &PathOptions {
            time_range: Some(TimeRange {
                from: Some("2023-01-01".into()),
                until: None,
            }),
            ..PathOptions::default()
        },
    )
    .unwrap();
    assert!(paths.is_empty());

    // A window ending at the employment period keeps it
    let paths = docket_core::find_paths(
        &harness.store,
        &alice.id,
        &case.id,
        &PathOptions {
            time_range: Some(TimeRange {
                from: None,
                until: Some("2022-12-31".into()),
            }),
            include_evidence_chunks: true,
            include_contradictions: true,
            ..PathOptions::default()
        },
    )
    .unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].hops, 2);
    assert!(paths[0].edges.iter().all(|e| e.contradiction_count == Some(0)));
    // Chunk evidence mentions an endpoint of each edge
    assert!(paths[0]
        .edges
        .iter()
        .all(|e| !e.evidence_chunks.is_empty()));
}

#[test]
fn paths_respect_relationship_type_filters() {
    let harness = TestStore::create("pathtypes");
    seed_small_graph(&harness);
    let alice = node_by_name(&harness.store, "Alice Johnson");
    let case = node_by_name(&harness.store, "Case 2:24-cv-01892");

    let paths = docket_core::find_paths(
        &harness.store,
        &alice.id,
        &case.id,
        &PathOptions {
            relationship_types: Some(vec![RelationshipType::WorksAt]),
            ..PathOptions::default()
        },
    )
    .unwrap();
    assert!(paths.is_empty());
}

#[test]
fn contradictions_accumulate_on_edges() {
    let harness = TestStore::create("contradict");
    seed_small_graph(&harness);
    let org = node_by_name(&harness.store, "Mercy Hospital");
    let edge_id = harness.store.list_edges_for_node(&org.id).unwrap()[0].id.clone();

    let edge = harness.store.record_edge_contradiction(&edge_id).unwrap();
    assert_eq!(edge.contradiction_count, 1);
    let edge = harness.store.record_edge_contradiction(&edge_id).unwrap();
    assert_eq!(edge.contradiction_count, 2);

    assert!(matches!(
        harness.store.record_edge_contradiction("missing").unwrap_err(),
        StoreError::NotFound(_)
    ));
}

#[test]
fn semantic_search_finds_entities_by_embedding() {
    let harness = TestStore::create("semantic");
    seed_small_graph(&harness);

    let embedder = MockEmbeddingOracle;
    let hits = semantic_entity_search(
        &harness.store,
        &embedder,
        "Alice Johnson",
        &SemanticSearchOptions::default(),
    )
    .unwrap();

    assert!(!hits.is_empty());
    assert_eq!(hits[0].node.canonical_name, "Alice Johnson");
    assert!(hits[0].similarity > 0.99);

    // Type constraint filters out the person hit
    let hits = semantic_entity_search(
        &harness.store,
        &embedder,
        "Alice Johnson",
        &SemanticSearchOptions {
            entity_type: Some(EntityType::Organization),
            ..SemanticSearchOptions::default()
        },
    )
    .unwrap();
    assert!(hits.iter().all(|h| h.node.entity_type == EntityType::Organization));
}

#[test]
fn stats_summarize_the_graph() {
    let harness = TestStore::create("stats");
    seed_small_graph(&harness);

    let stats = graph_stats(&harness.store, 3).unwrap();
    assert_eq!(stats.node_count, 3);
    assert_eq!(stats.edge_count, 2);
    assert_eq!(stats.nodes_by_type[&EntityType::Person], 1);
    assert_eq!(stats.nodes_by_type[&EntityType::Organization], 1);
    assert_eq!(stats.edges_by_type[&RelationshipType::WorksAt], 1);
    assert_eq!(stats.top_connected[0].canonical_name, "Mercy Hospital");
    assert!(stats.avg_edges_per_node > 0.0);
}
