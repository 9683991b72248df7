//! Extraction pipeline behavior against scripted oracles

use docket_core::{
    EntityType, ExtractionConfig, Extractor, OracleResponse, PromptKind, StoreError,
};
use docket_e2e_tests::harness::TestStore;
use docket_e2e_tests::mocks::{entity, relationship, MockExtractionOracle, ScriptedReply};

fn no_cooldown() -> ExtractionConfig {
    ExtractionConfig {
        segment_cooldown_secs: 0,
        ..ExtractionConfig::default()
    }
}

#[test]
fn noise_filters_drop_and_reclassify() {
    let harness = TestStore::create("noise");
    let text = "Seen at 14:30, SSN 123-45-6789, BP 120/80, Dr. noted I48.91 today.";
    let (document, _, _) = harness.ingest_with_text("chart.pdf", text);

    let oracle = MockExtractionOracle::returning(&OracleResponse {
        entities: vec![
            entity("e1", "14:30", "date", 0.9),
            entity("e2", "123-45-6789", "case_number", 0.9),
            entity("e3", "120/80", "amount", 0.9),
            entity("e4", "Dr.", "person", 0.9),
            entity("e5", "I48.91", "case_number", 0.9),
        ],
        relationships: vec![],
    });
    let extractor = Extractor::with_config(&harness.store, &oracle, no_cooldown());
    let report = extractor.run(&document.id).unwrap();

    // Only the ICD-10 code survives, reclassified to diagnosis
    assert_eq!(report.entity_count, 1);
    let entities = harness.store.list_entities(&document.id, None).unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].entity_type, EntityType::Diagnosis);
    assert_eq!(entities[0].raw_text, "I48.91");
}

#[test]
fn malformed_json_recovers_with_a_warning() {
    let harness = TestStore::create("recovery");
    let (document, _, _) = harness.ingest_with_text("a.pdf", "Alice Johnson appeared in court.");

    let truncated = r#"{"entities": [
        {"id": "e1", "canonical_name": "Alice Johnson", "type": "person", "confidence": 0.9},
        {"id": "e2", "canonical_name": "Tru"#;
    let oracle = MockExtractionOracle::with_script(vec![ScriptedReply::raw(truncated)]);
    let extractor = Extractor::with_config(&harness.store, &oracle, no_cooldown());
    let report = extractor.run(&document.id).unwrap();

    assert_eq!(report.entity_count, 1);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("recovered 1"));
    let entities = harness.store.list_entities(&document.id, None).unwrap();
    assert_eq!(entities[0].raw_text, "Alice Johnson");
}

#[test]
fn hopeless_responses_fail_without_committing() {
    let harness = TestStore::create("hopeless");
    let (document, _, _) = harness.ingest_with_text("a.pdf", "Nothing useful here.");

    let oracle = MockExtractionOracle::with_script(vec![ScriptedReply::raw("total nonsense")]);
    let extractor = Extractor::with_config(&harness.store, &oracle, no_cooldown());
    let err = extractor.run(&document.id).unwrap_err();

    assert!(matches!(err, StoreError::OracleFailure(_)));
    assert!(harness.store.list_entities(&document.id, None).unwrap().is_empty());
    assert!(harness.store.list_nodes(None, 10).unwrap().is_empty());
}

#[test]
fn suspiciously_small_responses_trigger_two_pass() {
    let harness = TestStore::create("twopass");
    let text = "Alice Johnson works at Mercy Hospital. ".repeat(1_400);
    let (document, _, _) = harness.ingest_with_text("big.pdf", &text);

    let entities_only = OracleResponse {
        entities: vec![
            entity("e1", "Alice Johnson", "person", 0.9),
            entity("e2", "Mercy Hospital", "organization", 0.9),
        ],
        relationships: vec![],
    };
    let relationships_only = OracleResponse {
        entities: vec![],
        relationships: vec![relationship("e1", "e2", "works_at", 0.85)],
    };
    let oracle = MockExtractionOracle::with_script(vec![
        // Joint pass comes back implausibly small for a 50k+ char input
        ScriptedReply::ok(&OracleResponse::default()).with_output_tokens(50),
        ScriptedReply::ok(&entities_only),
        ScriptedReply::ok(&relationships_only),
    ]);
    let extractor = Extractor::with_config(&harness.store, &oracle, no_cooldown());
    let report = extractor.run(&document.id).unwrap();

    let requests = oracle.requests.lock().unwrap();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].kind, PromptKind::Joint);
    assert_eq!(requests[1].kind, PromptKind::EntitiesOnly);
    assert_eq!(requests[2].kind, PromptKind::RelationshipsOnly);
    assert_eq!(requests[2].known_entities.len(), 2);
    drop(requests);

    assert_eq!(report.entity_count, 2);
    assert_eq!(report.edges_created, 1);
    // Token usage accumulates across all three calls
    assert_eq!(report.token_usage.input_tokens, 3_000);
}

#[test]
fn oversized_text_is_segmented_and_agreement_boosts_confidence() {
    let harness = TestStore::create("segments");
    let sentence = "Dr. Sarah Chen reviewed the filing. ";
    let text = sentence.repeat(8); // 288 chars
    let (document, _, _) = harness.ingest_with_text("split.pdf", &text);

    let per_segment = OracleResponse {
        entities: vec![entity("e1", "Dr. Sarah Chen", "person", 0.8)],
        relationships: vec![],
    };
    let oracle = MockExtractionOracle::with_script(vec![
        ScriptedReply::ok(&per_segment),
        ScriptedReply::ok(&per_segment),
    ]);
    let config = ExtractionConfig {
        single_call_char_limit: 200,
        segment_overlap_chars: 40,
        segment_cooldown_secs: 0,
        ..ExtractionConfig::default()
    };
    let extractor = Extractor::with_config(&harness.store, &oracle, config);
    let report = extractor.run(&document.id).unwrap();

    assert_eq!(report.segment_count, 2);
    assert_eq!(oracle.request_count(), 2);
    assert_eq!(report.entity_count, 1);

    let entities = harness.store.list_entities(&document.id, None).unwrap();
    assert_eq!(entities[0].agreement_count, 2);
    // 0.8 plus min(0.15, 0.05 * 1)
    assert!((entities[0].confidence - 0.85).abs() < 1e-9);
}

#[test]
fn regex_dates_supplement_the_oracle() {
    let harness = TestStore::create("dates");
    let text = "The hearing was continued to 03/15/2024 before Judge Warren.";
    let (document, _, _) = harness.ingest_with_text("order.pdf", text);

    let oracle = MockExtractionOracle::returning(&OracleResponse {
        entities: vec![entity("e1", "Judge Warren", "person", 0.9)],
        relationships: vec![],
    });
    let extractor = Extractor::with_config(&harness.store, &oracle, no_cooldown());
    extractor.run(&document.id).unwrap();

    let dates = harness
        .store
        .list_entities(&document.id, Some(EntityType::Date))
        .unwrap();
    assert_eq!(dates.len(), 1);
    assert_eq!(dates[0].raw_text, "03/15/2024");
    assert!((dates[0].confidence - 0.85).abs() < 1e-9);

    // The supplemented date is positioned like any other entity
    let mentions = harness.store.list_mentions(&dates[0].id).unwrap();
    assert_eq!(mentions.len(), 1);
    assert_eq!(mentions[0].character_start, Some(29));
}

#[test]
fn unlocatable_entities_get_a_fallback_mention() {
    let harness = TestStore::create("fallback");
    let (document, _, _) = harness.ingest_with_text("a.pdf", "The defendant was present.");

    let oracle = MockExtractionOracle::returning(&OracleResponse {
        entities: vec![entity("e1", "Robert Miller", "person", 0.7)],
        relationships: vec![],
    });
    let extractor = Extractor::with_config(&harness.store, &oracle, no_cooldown());
    let report = extractor.run(&document.id).unwrap();

    assert_eq!(report.mention_count, 1);
    let entities = harness.store.list_entities(&document.id, None).unwrap();
    let mentions = harness.store.list_mentions(&entities[0].id).unwrap();
    assert_eq!(mentions.len(), 1);
    assert!(mentions[0].chunk_id.is_none());
    assert!(mentions[0].character_start.is_none());
}

#[test]
fn re_extraction_replaces_prior_results() {
    let harness = TestStore::create("rerun");
    let text = "Alice Johnson met Robert Miller.";
    let (document, _, _) = harness.ingest_with_text("a.pdf", text);

    let first = OracleResponse {
        entities: vec![
            entity("e1", "Alice Johnson", "person", 0.9),
            entity("e2", "Robert Miller", "person", 0.8),
        ],
        relationships: vec![relationship("e1", "e2", "related_to", 0.9)],
    };
    let oracle = MockExtractionOracle::returning(&first);
    Extractor::with_config(&harness.store, &oracle, no_cooldown())
        .run(&document.id)
        .unwrap();

    // Second pass sees only one entity; the other must vanish entirely
    let second = OracleResponse {
        entities: vec![entity("e1", "Alice Johnson", "person", 0.95)],
        relationships: vec![],
    };
    let oracle = MockExtractionOracle::returning(&second);
    Extractor::with_config(&harness.store, &oracle, no_cooldown())
        .run(&document.id)
        .unwrap();

    let entities = harness.store.list_entities(&document.id, None).unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].raw_text, "Alice Johnson");
    assert!(harness
        .store
        .list_mentions_for_document(&document.id)
        .unwrap()
        .iter()
        .all(|m| m.entity_id == entities[0].id));

    // The orphaned node and its edge are gone too
    let nodes = harness.store.list_nodes(None, 10).unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].canonical_name, "Alice Johnson");
    assert_eq!(nodes[0].edge_count, 0);
    harness.store.verify_integrity().unwrap();
}

#[test]
fn extraction_requires_completed_ocr() {
    let harness = TestStore::create("noocr");
    let document = harness.ingest_document("a.pdf");

    let oracle = MockExtractionOracle::returning(&OracleResponse::default());
    let err = Extractor::with_config(&harness.store, &oracle, no_cooldown())
        .run(&document.id)
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}
