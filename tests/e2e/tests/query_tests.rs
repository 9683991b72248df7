//! Query surfaces: entity text search, timeline construction, witness
//! analysis composition

use docket_core::{
    build_timeline, compose_witness_analysis, search_entities, EntitySearchOptions, EntityType,
    ExtractionConfig, Extractor, OracleResponse, StoreError, TimelineOptions, WitnessOptions,
};
use docket_core::query::PathFilter;
use docket_e2e_tests::harness::TestStore;
use docket_e2e_tests::mocks::{entity, relationship, MockAnalysisOracle, MockExtractionOracle};

fn no_cooldown() -> ExtractionConfig {
    ExtractionConfig {
        segment_cooldown_secs: 0,
        ..ExtractionConfig::default()
    }
}

fn extract(harness: &TestStore, document_id: &str, response: &OracleResponse) {
    let oracle = MockExtractionOracle::returning(response);
    Extractor::with_config(&harness.store, &oracle, no_cooldown())
        .run(document_id)
        .unwrap();
}

#[test]
fn entity_search_enriches_hits_with_kg_context() {
    let harness = TestStore::create("search");
    let (document, _, _) = harness.ingest_with_text(
        "filing.pdf",
        "Alice Johnson works at Mercy Hospital downtown.",
    );
    extract(
        &harness,
        &document.id,
        &OracleResponse {
            entities: vec![
                entity("e1", "Alice Johnson", "person", 0.9),
                entity("e2", "Mercy Hospital", "organization", 0.9),
            ],
            relationships: vec![relationship("e1", "e2", "works_at", 0.9)],
        },
    );

    let hits = search_entities(
        &harness.store,
        &EntitySearchOptions {
            query: "alice".into(),
            entity_type: None,
            document_ids: None,
            limit: 10,
        },
    )
    .unwrap();

    assert_eq!(hits.len(), 1);
    let hit = &hits[0];
    assert_eq!(hit.entity.raw_text, "Alice Johnson");
    let kg = hit.kg.as_ref().expect("kg enrichment");
    assert_eq!(kg.canonical_name, "Alice Johnson");
    assert_eq!(kg.document_count, 1);
    assert_eq!(kg.edge_count, 1);
    assert_eq!(kg.neighbors.len(), 1);
    assert_eq!(kg.neighbors[0].canonical_name, "Mercy Hospital");

    // Type filter excludes the person
    let hits = search_entities(
        &harness.store,
        &EntitySearchOptions {
            query: "alice".into(),
            entity_type: Some(EntityType::Organization),
            document_ids: None,
            limit: 10,
        },
    )
    .unwrap();
    assert!(hits.is_empty());

    // Document filter
    let hits = search_entities(
        &harness.store,
        &EntitySearchOptions {
            query: "alice".into(),
            entity_type: None,
            document_ids: Some(vec!["other-doc".into()]),
            limit: 10,
        },
    )
    .unwrap();
    assert!(hits.is_empty());
}

#[test]
fn timeline_sorts_parsed_dates_first() {
    let harness = TestStore::create("timeline");
    let text = "Admitted 03/15/2024. Discharged 2024-03-20. Follow-up circa spring.";
    let (document, _, _) = harness.ingest_with_text("chart.pdf", text);
    extract(
        &harness,
        &document.id,
        &OracleResponse {
            entities: vec![entity("e1", "circa spring", "date", 0.6)],
            relationships: vec![],
        },
    );

    let result = build_timeline(&harness.store, &TimelineOptions::default()).unwrap();
    assert!(result.diagnostic.is_none());
    assert_eq!(result.entries.len(), 3);
    assert_eq!(result.entries[0].date.as_deref(), Some("2024-03-15"));
    assert_eq!(result.entries[1].date.as_deref(), Some("2024-03-20"));
    // Unparseable date sorts last, by raw text
    assert!(result.entries[2].date.is_none());
    assert_eq!(result.entries[2].raw_text, "circa spring");
}

#[test]
fn timeline_filters_by_co_occurring_entity_names() {
    let harness = TestStore::create("cooccur");
    // Two chunks: Alice's date in the first, an unrelated date in the
    // second, with enough filler between them that the second date's
    // context window cannot reach Alice's name
    let text = "Alice Johnson was admitted 03/15/2024 for observation. \
                The facility intake forms describe standard procedures for all \
                arriving patients and contain no personal details whatsoever in \
                this section of the record being reviewed here. \
                Weather report for 04/01/2024 follows.";
    let chunk_boundary = text.find("Weather").unwrap() as i64;
    let document = harness.ingest_document("notes.pdf");
    harness.complete_ocr(&document.id, text);
    harness.chunk_ranges(
        &document.id,
        &[(0, chunk_boundary), (chunk_boundary, text.chars().count() as i64)],
    );
    extract(
        &harness,
        &document.id,
        &OracleResponse {
            entities: vec![entity("e1", "Alice Johnson", "person", 0.9)],
            relationships: vec![],
        },
    );

    let result = build_timeline(
        &harness.store,
        &TimelineOptions {
            entity_names: Some(vec!["Alice Johnson".into()]),
            ..TimelineOptions::default()
        },
    )
    .unwrap();

    assert_eq!(result.entries.len(), 1);
    assert_eq!(result.entries[0].date.as_deref(), Some("2024-03-15"));
}

#[test]
fn timeline_path_filter_reports_missing_paths() {
    let harness = TestStore::create("pathless");
    let (doc_a, _, _) = harness.ingest_with_text("a.pdf", "Alice Johnson appeared on 01/02/2024.");
    extract(
        &harness,
        &doc_a.id,
        &OracleResponse {
            entities: vec![entity("e1", "Alice Johnson", "person", 0.9)],
            relationships: vec![],
        },
    );
    let (doc_b, _, _) = harness.ingest_with_text("b.pdf", "Robert Miller appeared on 02/03/2024.");
    extract(
        &harness,
        &doc_b.id,
        &OracleResponse {
            entities: vec![entity("e1", "Robert Miller", "person", 0.9)],
            relationships: vec![],
        },
    );

    let nodes = harness.store.list_nodes(None, 10).unwrap();
    let alice = nodes.iter().find(|n| n.canonical_name == "Alice Johnson").unwrap();
    let robert = nodes.iter().find(|n| n.canonical_name == "Robert Miller").unwrap();

    // No edge connects them: empty timeline plus a diagnostic, not an error
    let result = build_timeline(
        &harness.store,
        &TimelineOptions {
            path: Some(PathFilter {
                start_node_id: alice.id.clone(),
                end_node_id: robert.id.clone(),
                max_hops: 3,
            }),
            ..TimelineOptions::default()
        },
    )
    .unwrap();

    assert!(result.entries.is_empty());
    assert!(result.diagnostic.unwrap().contains("no path"));
}

#[test]
fn timeline_path_filter_narrows_to_path_documents() {
    let harness = TestStore::create("pathdocs");
    let (doc_a, _, _) = harness.ingest_with_text(
        "a.pdf",
        "Alice Johnson joined Mercy Hospital on 01/02/2024.",
    );
    extract(
        &harness,
        &doc_a.id,
        &OracleResponse {
            entities: vec![
                entity("e1", "Alice Johnson", "person", 0.9),
                entity("e2", "Mercy Hospital", "organization", 0.9),
            ],
            relationships: vec![relationship("e1", "e2", "works_at", 0.9)],
        },
    );
    // A second, unconnected document whose dates must not appear
    let (doc_b, _, _) = harness.ingest_with_text("b.pdf", "Unrelated filing dated 09/09/2024.");
    extract(
        &harness,
        &doc_b.id,
        &OracleResponse::default(),
    );

    let nodes = harness.store.list_nodes(None, 10).unwrap();
    let alice = nodes.iter().find(|n| n.canonical_name == "Alice Johnson").unwrap();
    let org = nodes.iter().find(|n| n.canonical_name == "Mercy Hospital").unwrap();

    let result = build_timeline(
        &harness.store,
        &TimelineOptions {
            path: Some(PathFilter {
                start_node_id: alice.id.clone(),
                end_node_id: org.id.clone(),
                max_hops: 2,
            }),
            ..TimelineOptions::default()
        },
    )
    .unwrap();

    assert_eq!(result.entries.len(), 1);
    assert_eq!(result.entries[0].document_id, doc_a.id);
    assert_eq!(result.entries[0].date.as_deref(), Some("2024-01-02"));
}

#[test]
fn witness_composer_assembles_prompt_and_returns_usage() {
    let harness = TestStore::create("witness");
    let (doc_a, _, _) = harness.ingest_with_text(
        "deposition.pdf",
        "Dr. Sarah Chen testified about the procedure at Mercy Hospital.",
    );
    extract(
        &harness,
        &doc_a.id,
        &OracleResponse {
            entities: vec![
                entity("e1", "Dr. Sarah Chen", "person", 0.95),
                entity("e2", "Mercy Hospital", "organization", 0.9),
            ],
            relationships: vec![relationship("e1", "e2", "works_at", 0.9)],
        },
    );
    harness
        .store
        .insert_comparison(
            &[doc_a.id.clone()],
            Some("testimony consistent across drafts"),
            r#"{"result":"consistent"}"#,
        )
        .unwrap();

    let oracle = MockAnalysisOracle::new("The witness is credible.");
    let report = compose_witness_analysis(
        &harness.store,
        &oracle,
        &WitnessOptions {
            witness_name: "Dr. Sarah Chen".into(),
            document_ids: None,
            per_document_chars: 500,
        },
    )
    .unwrap();

    assert_eq!(report.analysis, "The witness is credible.");
    assert_eq!(report.documents_used, vec![doc_a.id.clone()]);
    assert!(report.prompt_chars > 0);
    assert_eq!(report.token_usage.output_tokens, 800);
}

#[test]
fn witness_composer_requires_a_known_witness() {
    let harness = TestStore::create("nowitness");
    let oracle = MockAnalysisOracle::new("unused");
    let err = compose_witness_analysis(
        &harness.store,
        &oracle,
        &WitnessOptions {
            witness_name: "Nobody Home".into(),
            document_ids: None,
            per_document_chars: 500,
        },
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}
