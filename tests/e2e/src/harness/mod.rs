//! Test Store Harness
//!
//! Isolated database instances for testing: each harness owns a temp
//! directory that disappears when dropped, plus ingest helpers that walk a
//! document through the ingest -> OCR -> chunk steps.

use std::path::PathBuf;

use docket_core::{
    Chunk, Document, NewChunk, NewDocument, NewOcrResult, OcrQuality, OcrResult, Store,
};
use tempfile::TempDir;

/// One temp-directory store per test
pub struct TestStore {
    pub store: Store,
    pub root: PathBuf,
    pub name: String,
    /// Kept alive so the directory outlives the store
    _temp_dir: TempDir,
}

impl TestStore {
    /// Create a fresh database in a temp directory
    pub fn create(name: &str) -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let root = temp_dir.path().to_path_buf();
        let store = Store::create(Some(root.as_path()), name).expect("create store");
        Self {
            store,
            root,
            name: name.to_string(),
            _temp_dir: temp_dir,
        }
    }

    /// Reopen the same database file (migration idempotence, persistence)
    pub fn reopen(&self) -> Store {
        Store::open(Some(self.root.as_path()), &self.name).expect("reopen store")
    }

    /// Insert a pending document with a hash derived from its name
    pub fn ingest_document(&self, file_name: &str) -> Document {
        self.store
            .insert_document(NewDocument {
                file_path: format!("/evidence/{file_name}"),
                file_name: file_name.to_string(),
                file_hash: docket_core::hash::hash_text(file_name),
                file_size: 1024,
                file_type: "pdf".to_string(),
                ..Default::default()
            })
            .expect("insert document")
    }

    /// Record OCR output for a document
    pub fn complete_ocr(&self, document_id: &str, text: &str) -> OcrResult {
        self.store
            .insert_ocr_result(NewOcrResult {
                document_id: document_id.to_string(),
                extracted_text: text.to_string(),
                quality_mode: OcrQuality::Balanced,
                page_count: 1,
                quality_score: Some(0.97),
                ..Default::default()
            })
            .expect("insert OCR result")
    }

    /// Insert chunks over explicit half-open character ranges
    pub fn chunk_ranges(&self, document_id: &str, ranges: &[(i64, i64)]) -> Vec<Chunk> {
        let ocr = self.store.get_ocr_result(document_id).expect("OCR result");
        let chars: Vec<char> = ocr.extracted_text.chars().collect();
        let new_chunks: Vec<NewChunk> = ranges
            .iter()
            .enumerate()
            .map(|(i, (start, end))| NewChunk {
                chunk_index: i as i64,
                text: chars[*start as usize..*end as usize].iter().collect(),
                character_start: *start,
                character_end: *end,
                page_number: Some(1),
                overlap_previous: 0,
                overlap_next: 0,
            })
            .collect();
        self.store
            .insert_chunks(document_id, &new_chunks)
            .expect("insert chunks")
    }

    /// Full ingest: document + OCR + one chunk covering the whole text
    pub fn ingest_with_text(&self, file_name: &str, text: &str) -> (Document, OcrResult, Vec<Chunk>) {
        let document = self.ingest_document(file_name);
        let ocr = self.complete_ocr(&document.id, text);
        let chunks = self.chunk_ranges(&document.id, &[(0, text.chars().count() as i64)]);
        (document, ocr, chunks)
    }
}
