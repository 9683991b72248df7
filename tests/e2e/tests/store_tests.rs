//! Store lifecycle, migrations, CRUD, and cascade-delete behavior

use docket_core::{
    DocumentStatus, EmbeddingStatus, NewChunk, NewEmbedding, Store, StoreError, TaskType,
    EMBEDDING_DIMENSIONS,
};
use docket_e2e_tests::harness::TestStore;
use tempfile::TempDir;

fn unit_vector(seed: usize) -> Vec<f32> {
    (0..EMBEDDING_DIMENSIONS)
        .map(|i| ((i + seed) as f32 / EMBEDDING_DIMENSIONS as f32).sin())
        .collect()
}

#[test]
fn create_open_list_delete_round_trip() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    let store = Store::create(Some(root), "test1").unwrap();
    assert_eq!(store.name(), "test1");
    assert!(root.join("test1.db").exists());
    drop(store);

    let reopened = Store::open(Some(root), "test1").unwrap();
    assert_eq!(reopened.metadata().unwrap().name, "test1");
    drop(reopened);

    let listed = Store::list(Some(root)).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "test1");
    assert_eq!(listed[0].metadata.document_count, 0);

    Store::delete(Some(root), "test1").unwrap();
    assert!(!root.join("test1.db").exists());
    assert!(Store::list(Some(root)).unwrap().is_empty());
}

#[test]
fn create_fails_when_file_exists() {
    let temp = TempDir::new().unwrap();
    Store::create(Some(temp.path()), "dup").unwrap();
    let err = Store::create(Some(temp.path()), "dup").unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)));
}

#[test]
fn open_fails_when_absent() {
    let temp = TempDir::new().unwrap();
    let err = Store::open(Some(temp.path()), "ghost").unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn names_are_validated() {
    let temp = TempDir::new().unwrap();
    for bad in ["", "has space", "../up", "semi;colon"] {
        let err = Store::create(Some(temp.path()), bad).unwrap_err();
        assert!(matches!(err, StoreError::InvalidName(_)), "name {bad:?}");
    }
    Store::create(Some(temp.path()), "ok_name-123").unwrap();
}

#[cfg(unix)]
#[test]
fn database_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;
    let harness = TestStore::create("perms");
    let mode = std::fs::metadata(harness.store.path())
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn migrations_are_idempotent_and_monotone() {
    let harness = TestStore::create("migrate");
    let version = harness.store.schema_version().unwrap();
    assert!(version >= 5);

    // Ingest something, reopen (which re-runs the migration chain), and
    // verify nothing moved or disappeared
    let (document, _, chunks) = harness.ingest_with_text("a.pdf", "Some OCR text here.");
    drop(chunks);

    let reopened = harness.reopen();
    assert_eq!(reopened.schema_version().unwrap(), version);
    assert_eq!(reopened.get_document(&document.id).unwrap().id, document.id);
    reopened.verify_integrity().unwrap();
}

#[test]
fn document_status_transitions_are_monotone() {
    let harness = TestStore::create("status");
    let document = harness.ingest_document("a.pdf");
    assert_eq!(document.status, DocumentStatus::Pending);

    let document = harness
        .store
        .update_document_status(&document.id, DocumentStatus::Processing)
        .unwrap();
    assert_eq!(document.status, DocumentStatus::Processing);

    // pending is behind processing; the transition is rejected
    let err = harness
        .store
        .update_document_status(&document.id, DocumentStatus::Pending)
        .unwrap_err();
    assert!(matches!(err, StoreError::InputInvalid(_)));

    let document = harness
        .store
        .update_document_status(&document.id, DocumentStatus::Failed)
        .unwrap();
    // failed documents may retry
    harness
        .store
        .update_document_status(&document.id, DocumentStatus::Processing)
        .unwrap();
}

#[test]
fn ocr_completion_flips_status_and_hashes_text() {
    let harness = TestStore::create("ocr");
    let document = harness.ingest_document("a.pdf");
    let ocr = harness.complete_ocr(&document.id, "Alice met Bob.");

    assert_eq!(ocr.text_length, 14);
    assert_eq!(ocr.content_hash, docket_core::hash::hash_text("Alice met Bob."));
    assert_eq!(
        harness.store.get_document(&document.id).unwrap().status,
        DocumentStatus::Complete
    );
}

#[test]
fn chunk_ranges_are_validated_against_ocr_text() {
    let harness = TestStore::create("chunks");
    let document = harness.ingest_document("a.pdf");
    harness.complete_ocr(&document.id, "0123456789");

    let err = harness
        .store
        .insert_chunks(
            &document.id,
            &[NewChunk {
                chunk_index: 0,
                text: "junk".into(),
                character_start: 5,
                character_end: 15,
                ..Default::default()
            }],
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::InputInvalid(_)));

    let chunks = harness.chunk_ranges(&document.id, &[(0, 5), (5, 10)]);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].text, "01234");
    assert_eq!(chunks[1].embedding_status, EmbeddingStatus::Pending);
}

#[test]
fn embeddings_require_exactly_one_owner() {
    let harness = TestStore::create("embed");
    let (_, _, chunks) = harness.ingest_with_text("a.pdf", "Some chunked text.");

    // No owner
    let err = harness
        .store
        .insert_embeddings(&[NewEmbedding {
            vector: unit_vector(0),
            model_name: "mock".into(),
            task_type: TaskType::SearchDocument,
            ..Default::default()
        }])
        .unwrap_err();
    assert!(matches!(err, StoreError::InputInvalid(_)));

    // Two owners
    let err = harness
        .store
        .insert_embeddings(&[NewEmbedding {
            chunk_id: Some(chunks[0].id.clone()),
            image_id: Some("img".into()),
            vector: unit_vector(0),
            model_name: "mock".into(),
            task_type: TaskType::SearchDocument,
            ..Default::default()
        }])
        .unwrap_err();
    assert!(matches!(err, StoreError::InputInvalid(_)));

    // Wrong dimension count
    let err = harness
        .store
        .insert_embeddings(&[NewEmbedding {
            chunk_id: Some(chunks[0].id.clone()),
            vector: vec![0.5; 16],
            model_name: "mock".into(),
            task_type: TaskType::SearchDocument,
            ..Default::default()
        }])
        .unwrap_err();
    assert!(matches!(err, StoreError::InputInvalid(_)));
}

#[test]
fn chunk_embedding_lands_in_table_and_index_together() {
    let harness = TestStore::create("embed2");
    let (document, _, chunks) = harness.ingest_with_text("a.pdf", "Some chunked text.");

    let inserted = harness
        .store
        .insert_embeddings(&[NewEmbedding {
            chunk_id: Some(chunks[0].id.clone()),
            vector: unit_vector(7),
            model_name: "mock-embedder".into(),
            task_type: TaskType::SearchDocument,
            ..Default::default()
        }])
        .unwrap();
    assert_eq!(inserted.len(), 1);

    // Row exists and the chunk flipped to complete
    let row = harness.store.get_embedding(&inserted[0].id).unwrap();
    assert_eq!(row.dimensions as usize, EMBEDDING_DIMENSIONS);
    assert_eq!(
        harness.store.get_chunk(&chunks[0].id).unwrap().embedding_status,
        EmbeddingStatus::Complete
    );

    // Index entry matches 1:1: a self-query returns the embedding id
    let matches = harness.store.match_embeddings(&unit_vector(7), 1).unwrap();
    assert_eq!(matches[0].0, inserted[0].id);
    assert!(matches[0].1 < 0.001);

    // Unknown owners are rejected before anything is written
    let err = harness
        .store
        .insert_embeddings(&[NewEmbedding {
            chunk_id: Some("no-such-chunk".into()),
            vector: unit_vector(1),
            model_name: "mock".into(),
            task_type: TaskType::SearchDocument,
            ..Default::default()
        }])
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    let _ = document;
}

#[test]
fn pending_embedding_listing_and_status_updates() {
    let harness = TestStore::create("pending");
    let (doc_a, _, chunks_a) = harness.ingest_with_text("a.pdf", "First document body.");
    let (_, _, chunks_b) = harness.ingest_with_text("b.pdf", "Second document body.");

    assert_eq!(
        harness.store.list_chunks_pending_embedding(None).unwrap().len(),
        2
    );
    assert_eq!(
        harness
            .store
            .list_chunks_pending_embedding(Some(&doc_a.id))
            .unwrap()
            .len(),
        1
    );

    harness
        .store
        .update_chunk_embedding_status(&chunks_a[0].id, EmbeddingStatus::Failed)
        .unwrap();
    assert_eq!(
        harness.store.list_chunks_pending_embedding(None).unwrap()[0].id,
        chunks_b[0].id
    );

    let err = harness
        .store
        .update_chunk_embedding_status("missing", EmbeddingStatus::Complete)
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn documents_are_findable_by_content_hash() {
    let harness = TestStore::create("byhash");
    let document = harness.ingest_document("a.pdf");

    let found = harness
        .store
        .get_document_by_hash(&document.file_hash)
        .unwrap()
        .expect("document by hash");
    assert_eq!(found.id, document.id);
    assert!(harness
        .store
        .get_document_by_hash("sha256:unknown")
        .unwrap()
        .is_none());
}

#[test]
fn images_carry_vlm_descriptions_and_embeddings() {
    let harness = TestStore::create("images");
    let (document, _, _) = harness.ingest_with_text("scan.pdf", "Radiology report body.");

    let image = harness
        .store
        .insert_image(
            &document.id,
            Some(3),
            "sha256:imagebytes",
            Some("Chest X-ray showing clear lung fields"),
        )
        .unwrap();
    assert_eq!(image.page_number, Some(3));

    let inserted = harness
        .store
        .insert_embeddings(&[NewEmbedding {
            image_id: Some(image.id.clone()),
            vector: unit_vector(11),
            model_name: "mock".into(),
            task_type: TaskType::SearchDocument,
            original_text: Some("Chest X-ray showing clear lung fields".into()),
            ..Default::default()
        }])
        .unwrap();
    assert_eq!(inserted[0].image_id.as_deref(), Some(image.id.as_str()));

    // Cascade removes the image, its embedding, and the FTS copy
    harness.store.delete_document(&document.id).unwrap();
    harness.store.verify_integrity().unwrap();
}

#[test]
fn metadata_counters_track_writes() {
    let harness = TestStore::create("meta");
    let before = harness.store.metadata().unwrap();
    assert_eq!(before.document_count, 0);

    let (document, _, chunks) = harness.ingest_with_text("a.pdf", "Hello metadata world.");
    let after = harness.store.metadata().unwrap();
    assert_eq!(after.document_count, 1);
    assert_eq!(after.chunk_count, chunks.len() as i64);
    assert!(after.updated_at >= before.updated_at);

    harness.store.delete_document(&document.id).unwrap();
    let end = harness.store.metadata().unwrap();
    assert_eq!(end.document_count, 0);
    assert_eq!(end.chunk_count, 0);
}

#[test]
fn cascade_delete_clears_every_artifact() {
    let harness = TestStore::create("cascade");
    let (document, _, chunks) = harness.ingest_with_text("a.pdf", "Alice met Bob in court.");
    harness
        .store
        .insert_embeddings(&[NewEmbedding {
            chunk_id: Some(chunks[0].id.clone()),
            vector: unit_vector(3),
            model_name: "mock".into(),
            task_type: TaskType::SearchDocument,
            ..Default::default()
        }])
        .unwrap();
    let extraction = harness
        .store
        .insert_extraction(&document.id, Some("intake"), r#"{"court":"district"}"#)
        .unwrap();
    // The returned record is the persisted row, timestamp included
    assert_eq!(
        harness.store.get_extraction(&extraction.id).unwrap().created_at,
        extraction.created_at
    );
    let form_fill = harness
        .store
        .insert_form_fill(&document.id, Some("hcfa"), r#"{"field":"value"}"#)
        .unwrap();
    assert_eq!(
        harness.store.get_form_fill(&form_fill.id).unwrap().created_at,
        form_fill.created_at
    );

    let report = harness.store.delete_document(&document.id).unwrap();
    assert_eq!(report.embeddings_deleted, 1);
    assert_eq!(report.chunks_deleted, chunks.len());

    assert!(matches!(
        harness.store.get_document(&document.id).unwrap_err(),
        StoreError::NotFound(_)
    ));
    assert!(harness.store.list_chunks(&document.id).unwrap().is_empty());
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
    harness.store.verify_integrity().unwrap();

    // Deleting again is NotFound, not a silent no-op
    assert!(matches!(
        harness.store.delete_document(&document.id).unwrap_err(),
        StoreError::NotFound(_)
    ));
}

#[test]
fn chunk_full_text_search_ranks_matches() {
    let harness = TestStore::create("fts");
    let (doc_a, _, _) = harness.ingest_with_text("a.pdf", "The surgeon reviewed the charts.");
    harness.ingest_with_text("b.pdf", "Weather was unremarkable that day.");

    let hits = harness.store.search_chunks("surgeon charts", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document_id, doc_a.id);

    // Stemming from the porter tokenizer: "reviewing" matches "reviewed"
    let hits = harness.store.search_chunks("reviewing", 10).unwrap();
    assert_eq!(hits.len(), 1);

    // Operator characters are neutralized, not executed
    let hits = harness.store.search_chunks("surgeon\" OR \"weather", 10).unwrap();
    assert!(hits.len() <= 1);

    assert!(harness.store.search_chunks("   ", 10).unwrap().is_empty());
}

#[test]
fn unreadable_files_are_skipped_by_list() {
    let temp = TempDir::new().unwrap();
    Store::create(Some(temp.path()), "good").unwrap();
    std::fs::write(temp.path().join("bad.db"), b"this is not a database").unwrap();

    let listed = Store::list(Some(temp.path())).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "good");
}
