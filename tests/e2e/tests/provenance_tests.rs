//! Provenance DAG behavior: chain materialization, traversal, orphan
//! re-parenting

use docket_core::{NewProvenance, ProvenanceType, SourceType, StoreError, ORPHANED_ROOT};
use docket_e2e_tests::harness::TestStore;

#[test]
fn chains_materialize_depth_and_path() {
    let harness = TestStore::create("chains");
    let (document, ocr, chunks) = harness.ingest_with_text("a.pdf", "Chained provenance text.");

    let doc_prov = harness.store.get_provenance(&document.provenance_id).unwrap();
    assert_eq!(doc_prov.prov_type, ProvenanceType::Document);
    assert_eq!(doc_prov.chain_depth, 0);
    assert_eq!(doc_prov.chain_path, vec![doc_prov.id.clone()]);
    assert_eq!(doc_prov.root_document_id, document.id);
    assert!(doc_prov.parent_id.is_none());

    let ocr_prov = harness.store.get_provenance(&ocr.provenance_id).unwrap();
    assert_eq!(ocr_prov.chain_depth, 1);
    assert_eq!(ocr_prov.parent_id.as_deref(), Some(doc_prov.id.as_str()));
    assert_eq!(ocr_prov.root_document_id, document.id);

    let chunk_prov = harness.store.get_provenance(&chunks[0].provenance_id).unwrap();
    assert_eq!(chunk_prov.chain_depth, 2);
    assert_eq!(chunk_prov.chain_path.len() as i64, chunk_prov.chain_depth + 1);
}

#[test]
fn chain_walk_is_current_first_root_last() {
    let harness = TestStore::create("walk");
    let (document, ocr, chunks) = harness.ingest_with_text("a.pdf", "Walk this chain please.");

    let chain = harness
        .store
        .get_provenance_chain(&chunks[0].provenance_id)
        .unwrap();
    assert_eq!(chain.len(), 3);
    assert_eq!(chain[0].id, chunks[0].provenance_id);
    assert_eq!(chain[1].id, ocr.provenance_id);
    assert_eq!(chain[2].id, document.provenance_id);
    assert!(chain.len() as i64 <= chain[0].chain_depth + 1);
}

#[test]
fn by_root_orders_by_depth_and_children_by_time() {
    let harness = TestStore::create("byroot");
    let (document, ocr, chunks) = harness.ingest_with_text("a.pdf", "Root document listing.");

    let records = harness
        .store
        .get_provenance_by_root_document(&document.id)
        .unwrap();
    // DOCUMENT + OCR_RESULT + one CHUNK
    assert_eq!(records.len(), 3);
    assert!(records.windows(2).all(|w| w[0].chain_depth <= w[1].chain_depth));

    let children = harness
        .store
        .get_provenance_children(&ocr.provenance_id)
        .unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, chunks[0].provenance_id);
}

#[test]
fn roots_require_a_root_document_id() {
    let harness = TestStore::create("roots");
    let err = harness
        .store
        .insert_provenance(NewProvenance {
            prov_type: ProvenanceType::KnowledgeGraph,
            processor: "test".into(),
            processor_version: "0".into(),
            parameters_json: None,
            content_hash: "sha256:00".into(),
            input_hash: None,
            source_id: None,
            source_type: None,
            parent_id: None,
            extra_parent_ids: Vec::new(),
            root_document_id: None,
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::InputInvalid(_)));
}

#[test]
fn unknown_parent_is_a_named_fk_violation() {
    let harness = TestStore::create("fkparent");
    let err = harness
        .store
        .insert_provenance(NewProvenance {
            prov_type: ProvenanceType::KnowledgeGraph,
            processor: "test".into(),
            processor_version: "0".into(),
            parameters_json: None,
            content_hash: "sha256:00".into(),
            input_hash: None,
            source_id: None,
            source_type: Some(SourceType::Document),
            parent_id: Some("missing-parent".into()),
            extra_parent_ids: Vec::new(),
            root_document_id: None,
        })
        .unwrap_err();
    match err {
        StoreError::ForeignKeyViolation { column, .. } => {
            assert_eq!(column, "provenance.parent_id");
        }
        other => panic!("expected ForeignKeyViolation, got {other:?}"),
    }
}

#[test]
fn comparison_provenance_spans_multiple_parents() {
    let harness = TestStore::create("multiparent");
    let (doc_a, _, _) = harness.ingest_with_text("a.pdf", "First document text.");
    let (doc_b, _, _) = harness.ingest_with_text("b.pdf", "Second document text.");

    let comparison = harness
        .store
        .insert_comparison(
            &[doc_a.id.clone(), doc_b.id.clone()],
            Some("summaries differ on dates"),
            r#"{"verdict":"conflict"}"#,
        )
        .unwrap();

    let prov = harness.store.get_provenance(&comparison.provenance_id).unwrap();
    assert_eq!(prov.prov_type, ProvenanceType::Comparison);
    assert_eq!(prov.parent_ids.len(), 2);
    assert_eq!(prov.root_document_id, doc_a.id);

    // The returned record mirrors the persisted row
    let persisted = harness.store.get_comparison(&comparison.id).unwrap();
    assert_eq!(persisted.created_at, comparison.created_at);
    assert_eq!(persisted.document_ids, comparison.document_ids);
}

#[test]
fn surviving_nodes_reparent_to_the_orphan_sentinel() {
    use docket_core::{OracleResponse, ExtractionConfig, Extractor};
    use docket_e2e_tests::mocks::{entity, MockExtractionOracle};

    let harness = TestStore::create("orphans");
    let (doc_a, _, _) = harness.ingest_with_text("a.pdf", "Dr. Chen treated the patient.");
    let (doc_b, _, _) = harness.ingest_with_text("b.pdf", "Dr. Chen signed the report.");

    // Same canonical entity in both documents resolves to one shared node
    for doc in [&doc_a, &doc_b] {
        let oracle = MockExtractionOracle::returning(&OracleResponse {
            entities: vec![entity("e1", "Dr. Chen", "person", 0.9)],
            relationships: vec![],
        });
        let extractor =
            Extractor::with_config(&harness.store, &oracle, ExtractionConfig::default());
        extractor.run(&doc.id).unwrap();
    }

    let nodes = harness.store.list_nodes(None, 10).unwrap();
    assert_eq!(nodes.len(), 1);
    let node = &nodes[0];
    assert_eq!(node.document_count, 2);
    let node_root_before = harness
        .store
        .get_provenance(&node.provenance_id)
        .unwrap()
        .root_document_id;
    assert_eq!(node_root_before, doc_a.id);

    // Deleting the rooting document keeps the node but re-parents its
    // provenance to the sentinel
    harness.store.delete_document(&doc_a.id).unwrap();
    let node = harness.store.get_node(&node.id).unwrap();
    assert_eq!(node.document_count, 1);

    let prov = harness.store.get_provenance(&node.provenance_id).unwrap();
    assert_eq!(prov.root_document_id, ORPHANED_ROOT);
    assert!(prov.parent_id.is_none());
    assert_eq!(prov.chain_depth, 0);
    harness.store.verify_integrity().unwrap();
}
