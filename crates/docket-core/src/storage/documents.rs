//! Document, OCR, and Chunk Storage
//!
//! Typed CRUD for the ingest-side artifacts. Every insert first writes the
//! provenance row for the processing step that produced the artifact, inside
//! the same transaction as the artifact itself.

use rusqlite::{params, Connection, OptionalExtension};

use super::{
    new_id, now_rfc3339, parse_timestamp_col, Store,
};
use crate::error::{Result, StoreError};
use crate::hash;
use crate::model::{
    Chunk, ComparisonRecord, Document, DocumentStatus, EmbeddingStatus, ExtractionRecord,
    FormFillRecord, ImageRecord, NewChunk, NewDocument, NewOcrResult, NewProvenance, OcrQuality,
    OcrResult, ProvenanceType, SourceType,
};

/// Processor identity recorded in provenance rows written by this crate
pub(crate) const PROCESSOR: &str = "docket-core";
pub(crate) const PROCESSOR_VERSION: &str = env!("CARGO_PKG_VERSION");

impl Store {
    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    /// Ingest a document: a root DOCUMENT provenance row plus the document
    /// row, atomically.
    pub fn insert_document(&self, new: NewDocument) -> Result<Document> {
        if new.file_hash.is_empty() {
            return Err(StoreError::InputInvalid("file_hash is required".into()));
        }
        let id = new_id();
        let now = now_rfc3339();

        let writer = self.writer()?;
        let tx = writer.unchecked_transaction()?;

        let prov = Self::insert_provenance_on(
            &tx,
            NewProvenance {
                prov_type: ProvenanceType::Document,
                processor: PROCESSOR.into(),
                processor_version: PROCESSOR_VERSION.into(),
                parameters_json: None,
                content_hash: new.file_hash.clone(),
                input_hash: None,
                source_id: None,
                source_type: Some(SourceType::File),
                parent_id: None,
                extra_parent_ids: Vec::new(),
                root_document_id: Some(id.clone()),
            },
        )?;

        tx.execute(
            "INSERT INTO documents (
                id, file_path, file_name, file_hash, file_size, file_type,
                status, page_count, title, author, subject, upload_ref,
                provenance_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
            params![
                id,
                new.file_path,
                new.file_name,
                new.file_hash,
                new.file_size,
                new.file_type,
                DocumentStatus::Pending.as_str(),
                new.page_count,
                new.title,
                new.author,
                new.subject,
                new.upload_ref,
                prov.id,
                now,
            ],
        )
        .map_err(|e| StoreError::from_sqlite("documents.provenance_id", e))?;

        Self::refresh_metadata(&tx)?;
        tx.commit()?;

        self.get_document(&id)
    }

    pub fn get_document(&self, id: &str) -> Result<Document> {
        let reader = self.reader()?;
        Self::get_document_on(&reader, id)?
            .ok_or_else(|| StoreError::NotFound(format!("document {id}")))
    }

    pub(crate) fn get_document_on(conn: &Connection, id: &str) -> Result<Option<Document>> {
        let mut stmt = conn.prepare(&format!("{DOCUMENT_SELECT} WHERE id = ?1"))?;
        Ok(stmt.query_row(params![id], row_to_document).optional()?)
    }

    /// Look a document up by its raw-byte content hash
    pub fn get_document_by_hash(&self, file_hash: &str) -> Result<Option<Document>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!("{DOCUMENT_SELECT} WHERE file_hash = ?1"))?;
        Ok(stmt
            .query_row(params![file_hash], row_to_document)
            .optional()?)
    }

    /// List documents, optionally filtered by status
    pub fn list_documents(&self, status: Option<DocumentStatus>) -> Result<Vec<Document>> {
        let reader = self.reader()?;
        let rows = match status {
            Some(status) => {
                let mut stmt = reader.prepare(&format!(
                    "{DOCUMENT_SELECT} WHERE status = ?1 ORDER BY created_at ASC"
                ))?;
                stmt.query_map(params![status.as_str()], row_to_document)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt =
                    reader.prepare(&format!("{DOCUMENT_SELECT} ORDER BY created_at ASC"))?;
                stmt.query_map([], row_to_document)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }

    /// Update document status. Transitions are monotone: the only moves out
    /// of `processing` are to `complete` or `failed`, `failed` may re-enter
    /// `processing`, and `complete` is terminal.
    pub fn update_document_status(&self, id: &str, status: DocumentStatus) -> Result<Document> {
        let current = self.get_document(id)?;
        if !status_transition_allowed(current.status, status) {
            return Err(StoreError::InputInvalid(format!(
                "illegal status transition {} -> {}",
                current.status, status
            )));
        }

        let writer = self.writer()?;
        writer.execute(
            "UPDATE documents SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now_rfc3339(), id],
        )?;
        drop(writer);

        self.get_document(id)
    }

    // ------------------------------------------------------------------
    // OCR results
    // ------------------------------------------------------------------

    /// Record a successful OCR pass: OCR_RESULT provenance, the result row,
    /// and the document's `complete` status flip, atomically.
    pub fn insert_ocr_result(&self, new: NewOcrResult) -> Result<OcrResult> {
        let id = new_id();
        let now = now_rfc3339();
        let content_hash = hash::hash_text(&new.extracted_text);
        let text_length = new.extracted_text.chars().count() as i64;

        let writer = self.writer()?;
        let tx = writer.unchecked_transaction()?;

        let document = Self::get_document_on(&tx, &new.document_id)?
            .ok_or_else(|| StoreError::NotFound(format!("document {}", new.document_id)))?;

        let params_json = serde_json::json!({
            "qualityMode": new.quality_mode.as_str(),
            "pageCount": new.page_count,
        });
        let prov = Self::insert_provenance_on(
            &tx,
            NewProvenance {
                prov_type: ProvenanceType::OcrResult,
                processor: PROCESSOR.into(),
                processor_version: PROCESSOR_VERSION.into(),
                parameters_json: Some(hash::canonical_json(&params_json)),
                content_hash: content_hash.clone(),
                input_hash: Some(document.file_hash.clone()),
                source_id: Some(document.provenance_id.clone()),
                source_type: Some(SourceType::Document),
                parent_id: Some(document.provenance_id.clone()),
                extra_parent_ids: Vec::new(),
                root_document_id: None,
            },
        )?;

        tx.execute(
            "INSERT INTO ocr_results (
                id, document_id, extracted_text, text_length, request_id,
                quality_mode, page_count, quality_score, cost, content_hash,
                blocks, extras, provenance_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                id,
                new.document_id,
                new.extracted_text,
                text_length,
                new.request_id,
                new.quality_mode.as_str(),
                new.page_count,
                new.quality_score,
                new.cost,
                content_hash,
                new.blocks_json,
                new.extras_json,
                prov.id,
                now,
            ],
        )
        .map_err(|e| StoreError::from_sqlite("ocr_results.document_id", e))?;

        tx.execute(
            "UPDATE documents SET status = 'complete', page_count = ?1, updated_at = ?2
             WHERE id = ?3",
            params![new.page_count, now, new.document_id],
        )?;

        Self::refresh_metadata(&tx)?;
        tx.commit()?;

        self.get_ocr_result(&new.document_id)
    }

    /// The document's OCR result, if OCR has completed
    pub fn get_ocr_result(&self, document_id: &str) -> Result<OcrResult> {
        let reader = self.reader()?;
        Self::get_ocr_result_on(&reader, document_id)?
            .ok_or_else(|| StoreError::NotFound(format!("OCR result for document {document_id}")))
    }

    pub(crate) fn get_ocr_result_on(
        conn: &Connection,
        document_id: &str,
    ) -> Result<Option<OcrResult>> {
        let mut stmt = conn.prepare(
            "SELECT id, document_id, extracted_text, text_length, request_id, quality_mode,
                    page_count, quality_score, cost, content_hash, blocks, extras,
                    provenance_id, created_at
             FROM ocr_results WHERE document_id = ?1",
        )?;
        Ok(stmt
            .query_row(params![document_id], row_to_ocr_result)
            .optional()?)
    }

    // ------------------------------------------------------------------
    // Chunks
    // ------------------------------------------------------------------

    /// Batch-insert chunks for a document inside one transaction.
    ///
    /// Ranges are validated against the OCR text length before anything is
    /// written; a bad range aborts the whole batch.
    pub fn insert_chunks(&self, document_id: &str, new_chunks: &[NewChunk]) -> Result<Vec<Chunk>> {
        let writer = self.writer()?;
        let tx = writer.unchecked_transaction()?;

        let ocr = Self::get_ocr_result_on(&tx, document_id)?
            .ok_or_else(|| StoreError::NotFound(format!("OCR result for document {document_id}")))?;

        for chunk in new_chunks {
            if chunk.character_start < 0
                || chunk.character_start >= chunk.character_end
                || chunk.character_end > ocr.text_length
            {
                return Err(StoreError::InputInvalid(format!(
                    "chunk {} range [{}, {}) outside OCR text of length {}",
                    chunk.chunk_index, chunk.character_start, chunk.character_end, ocr.text_length
                )));
            }
        }

        let now = now_rfc3339();
        let mut ids = Vec::with_capacity(new_chunks.len());
        for chunk in new_chunks {
            let id = new_id();
            let text_hash = hash::hash_text(&chunk.text);

            let prov = Self::insert_provenance_on(
                &tx,
                NewProvenance {
                    prov_type: ProvenanceType::Chunk,
                    processor: PROCESSOR.into(),
                    processor_version: PROCESSOR_VERSION.into(),
                    parameters_json: Some(hash::canonical_json(&serde_json::json!({
                        "chunkIndex": chunk.chunk_index,
                        "characterStart": chunk.character_start,
                        "characterEnd": chunk.character_end,
                    }))),
                    content_hash: text_hash.clone(),
                    input_hash: Some(ocr.content_hash.clone()),
                    source_id: Some(ocr.provenance_id.clone()),
                    source_type: Some(SourceType::OcrResult),
                    parent_id: Some(ocr.provenance_id.clone()),
                    extra_parent_ids: Vec::new(),
                    root_document_id: None,
                },
            )?;

            tx.execute(
                "INSERT INTO chunks (
                    id, document_id, ocr_result_id, chunk_index, text,
                    character_start, character_end, page_number,
                    overlap_previous, overlap_next, text_hash,
                    embedding_status, provenance_id, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    id,
                    document_id,
                    ocr.id,
                    chunk.chunk_index,
                    chunk.text,
                    chunk.character_start,
                    chunk.character_end,
                    chunk.page_number,
                    chunk.overlap_previous,
                    chunk.overlap_next,
                    text_hash,
                    EmbeddingStatus::Pending.as_str(),
                    prov.id,
                    now,
                ],
            )
            .map_err(|e| StoreError::from_sqlite("chunks.document_id", e))?;
            ids.push(id);
        }

        Self::refresh_metadata(&tx)?;
        tx.commit()?;
        drop(writer);

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.get_chunk(&id)?);
        }
        Ok(out)
    }

    pub fn get_chunk(&self, id: &str) -> Result<Chunk> {
        let reader = self.reader()?;
        Self::get_chunk_on(&reader, id)?.ok_or_else(|| StoreError::NotFound(format!("chunk {id}")))
    }

    pub(crate) fn get_chunk_on(conn: &Connection, id: &str) -> Result<Option<Chunk>> {
        let mut stmt = conn.prepare(&format!("{CHUNK_SELECT} WHERE id = ?1"))?;
        Ok(stmt.query_row(params![id], row_to_chunk).optional()?)
    }

    /// Chunks of a document in index order
    pub fn list_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let reader = self.reader()?;
        Self::list_chunks_on(&reader, document_id)
    }

    pub(crate) fn list_chunks_on(conn: &Connection, document_id: &str) -> Result<Vec<Chunk>> {
        let mut stmt = conn.prepare(&format!(
            "{CHUNK_SELECT} WHERE document_id = ?1 ORDER BY chunk_index ASC"
        ))?;
        let rows = stmt
            .query_map(params![document_id], row_to_chunk)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Chunks still waiting for an embedding, across all documents unless
    /// one is named
    pub fn list_chunks_pending_embedding(
        &self,
        document_id: Option<&str>,
    ) -> Result<Vec<Chunk>> {
        let reader = self.reader()?;
        let rows = match document_id {
            Some(doc) => {
                let mut stmt = reader.prepare(&format!(
                    "{CHUNK_SELECT} WHERE embedding_status = 'pending' AND document_id = ?1
                     ORDER BY document_id, chunk_index"
                ))?;
                stmt.query_map(params![doc], row_to_chunk)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = reader.prepare(&format!(
                    "{CHUNK_SELECT} WHERE embedding_status = 'pending'
                     ORDER BY document_id, chunk_index"
                ))?;
                stmt.query_map([], row_to_chunk)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }

    /// Full-text search over chunk text via the FTS5 shadow table,
    /// best-ranked first
    pub fn search_chunks(&self, query: &str, limit: i64) -> Result<Vec<Chunk>> {
        let sanitized = crate::search::sanitize_fts5_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT c.id, c.document_id, c.ocr_result_id, c.chunk_index, c.text,
                    c.character_start, c.character_end, c.page_number,
                    c.overlap_previous, c.overlap_next, c.text_hash,
                    c.embedding_status, c.provenance_id, c.created_at
             FROM chunks c
             JOIN chunks_fts fts ON c.id = fts.id
             WHERE chunks_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![sanitized, limit], row_to_chunk)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn update_chunk_embedding_status(
        &self,
        chunk_id: &str,
        status: EmbeddingStatus,
    ) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE chunks SET embedding_status = ?1 WHERE id = ?2",
            params![status.as_str(), chunk_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("chunk {chunk_id}")));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Images / extractions / form fills / comparisons
    // ------------------------------------------------------------------

    /// Store an image, optionally with its VLM description. The description
    /// gets its own VLM_DESCRIPTION provenance row chained under the image.
    pub fn insert_image(
        &self,
        document_id: &str,
        page_number: Option<i64>,
        image_hash: &str,
        vlm_description: Option<&str>,
    ) -> Result<ImageRecord> {
        let id = new_id();
        let now = now_rfc3339();

        let writer = self.writer()?;
        let tx = writer.unchecked_transaction()?;

        let document = Self::get_document_on(&tx, document_id)?
            .ok_or_else(|| StoreError::NotFound(format!("document {document_id}")))?;

        let prov = Self::insert_provenance_on(
            &tx,
            NewProvenance {
                prov_type: ProvenanceType::Image,
                processor: PROCESSOR.into(),
                processor_version: PROCESSOR_VERSION.into(),
                parameters_json: None,
                content_hash: image_hash.to_string(),
                input_hash: Some(document.file_hash.clone()),
                source_id: Some(document.provenance_id.clone()),
                source_type: Some(SourceType::Document),
                parent_id: Some(document.provenance_id.clone()),
                extra_parent_ids: Vec::new(),
                root_document_id: None,
            },
        )?;

        if let Some(description) = vlm_description {
            Self::insert_provenance_on(
                &tx,
                NewProvenance {
                    prov_type: ProvenanceType::VlmDescription,
                    processor: PROCESSOR.into(),
                    processor_version: PROCESSOR_VERSION.into(),
                    parameters_json: None,
                    content_hash: hash::hash_text(description),
                    input_hash: Some(image_hash.to_string()),
                    source_id: Some(prov.id.clone()),
                    source_type: Some(SourceType::Image),
                    parent_id: Some(prov.id.clone()),
                    extra_parent_ids: Vec::new(),
                    root_document_id: None,
                },
            )?;
        }

        tx.execute(
            "INSERT INTO images (
                id, document_id, page_number, image_hash, vlm_description,
                provenance_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                document_id,
                page_number,
                image_hash,
                vlm_description,
                prov.id,
                now
            ],
        )
        .map_err(|e| StoreError::from_sqlite("images.document_id", e))?;

        Self::refresh_metadata(&tx)?;
        tx.commit()?;
        drop(writer);

        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, document_id, page_number, image_hash, vlm_description,
                    provenance_id, created_at
             FROM images WHERE id = ?1",
        )?;
        let image = stmt.query_row(params![id], row_to_image)?;
        Ok(image)
    }

    /// Store a structured extraction
    pub fn insert_extraction(
        &self,
        document_id: &str,
        schema_name: Option<&str>,
        extraction_json: &str,
    ) -> Result<ExtractionRecord> {
        let id = new_id();
        let now = now_rfc3339();

        let writer = self.writer()?;
        let tx = writer.unchecked_transaction()?;

        let document = Self::get_document_on(&tx, document_id)?
            .ok_or_else(|| StoreError::NotFound(format!("document {document_id}")))?;
        let ocr = Self::get_ocr_result_on(&tx, document_id)?;
        let parent = ocr
            .as_ref()
            .map(|o| o.provenance_id.clone())
            .unwrap_or_else(|| document.provenance_id.clone());

        let prov = Self::insert_provenance_on(
            &tx,
            NewProvenance {
                prov_type: ProvenanceType::Extraction,
                processor: PROCESSOR.into(),
                processor_version: PROCESSOR_VERSION.into(),
                parameters_json: schema_name
                    .map(|s| hash::canonical_json(&serde_json::json!({ "schema": s }))),
                content_hash: hash::hash_text(extraction_json),
                input_hash: ocr.as_ref().map(|o| o.content_hash.clone()),
                source_id: Some(parent.clone()),
                source_type: Some(SourceType::OcrResult),
                parent_id: Some(parent),
                extra_parent_ids: Vec::new(),
                root_document_id: None,
            },
        )?;

        tx.execute(
            "INSERT INTO extractions (
                id, document_id, schema_name, extraction_json, provenance_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, document_id, schema_name, extraction_json, prov.id, now],
        )
        .map_err(|e| StoreError::from_sqlite("extractions.document_id", e))?;

        Self::refresh_metadata(&tx)?;
        tx.commit()?;

        self.get_extraction(&id)
    }

    pub fn get_extraction(&self, id: &str) -> Result<ExtractionRecord> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, document_id, schema_name, extraction_json, provenance_id, created_at
             FROM extractions WHERE id = ?1",
        )?;
        stmt.query_row(params![id], row_to_extraction)
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("extraction {id}")))
    }

    /// Store a filled form
    pub fn insert_form_fill(
        &self,
        document_id: &str,
        form_name: Option<&str>,
        fill_json: &str,
    ) -> Result<FormFillRecord> {
        let id = new_id();
        let now = now_rfc3339();

        let writer = self.writer()?;
        let tx = writer.unchecked_transaction()?;

        let document = Self::get_document_on(&tx, document_id)?
            .ok_or_else(|| StoreError::NotFound(format!("document {document_id}")))?;

        let prov = Self::insert_provenance_on(
            &tx,
            NewProvenance {
                prov_type: ProvenanceType::FormFill,
                processor: PROCESSOR.into(),
                processor_version: PROCESSOR_VERSION.into(),
                parameters_json: form_name
                    .map(|f| hash::canonical_json(&serde_json::json!({ "form": f }))),
                content_hash: hash::hash_text(fill_json),
                input_hash: Some(document.file_hash.clone()),
                source_id: Some(document.provenance_id.clone()),
                source_type: Some(SourceType::Document),
                parent_id: Some(document.provenance_id.clone()),
                extra_parent_ids: Vec::new(),
                root_document_id: None,
            },
        )?;

        tx.execute(
            "INSERT INTO form_fills (
                id, document_id, form_name, fill_json, provenance_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, document_id, form_name, fill_json, prov.id, now],
        )
        .map_err(|e| StoreError::from_sqlite("form_fills.document_id", e))?;

        Self::refresh_metadata(&tx)?;
        tx.commit()?;

        self.get_form_fill(&id)
    }

    pub fn get_form_fill(&self, id: &str) -> Result<FormFillRecord> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, document_id, form_name, fill_json, provenance_id, created_at
             FROM form_fills WHERE id = ?1",
        )?;
        stmt.query_row(params![id], row_to_form_fill)
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("form fill {id}")))
    }

    /// Store a cross-document comparison. Provenance carries every
    /// participating document's chain as a parent; the first document hosts
    /// the primary chain.
    pub fn insert_comparison(
        &self,
        document_ids: &[String],
        summary: Option<&str>,
        comparison_json: &str,
    ) -> Result<ComparisonRecord> {
        if document_ids.is_empty() {
            return Err(StoreError::InputInvalid(
                "comparison requires at least one document".into(),
            ));
        }
        let id = new_id();
        let now = now_rfc3339();

        let writer = self.writer()?;
        let tx = writer.unchecked_transaction()?;

        let mut parent_provs = Vec::with_capacity(document_ids.len());
        for doc_id in document_ids {
            let document = Self::get_document_on(&tx, doc_id)?
                .ok_or_else(|| StoreError::NotFound(format!("document {doc_id}")))?;
            parent_provs.push(document.provenance_id);
        }

        let prov = Self::insert_provenance_on(
            &tx,
            NewProvenance {
                prov_type: ProvenanceType::Comparison,
                processor: PROCESSOR.into(),
                processor_version: PROCESSOR_VERSION.into(),
                parameters_json: None,
                content_hash: hash::hash_text(comparison_json),
                input_hash: None,
                source_id: Some(parent_provs[0].clone()),
                source_type: Some(SourceType::Document),
                parent_id: Some(parent_provs[0].clone()),
                extra_parent_ids: parent_provs[1..].to_vec(),
                root_document_id: None,
            },
        )?;

        tx.execute(
            "INSERT INTO comparisons (
                id, document_ids, summary, comparison_json, provenance_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                super::to_json_array(document_ids),
                summary,
                comparison_json,
                prov.id,
                now
            ],
        )?;

        Self::refresh_metadata(&tx)?;
        tx.commit()?;

        self.get_comparison(&id)
    }

    pub fn get_comparison(&self, id: &str) -> Result<ComparisonRecord> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, document_ids, summary, comparison_json, provenance_id, created_at
             FROM comparisons WHERE id = ?1",
        )?;
        stmt.query_row(params![id], row_to_comparison)
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("comparison {id}")))
    }

    /// Comparisons that include the given document
    pub fn list_comparisons_for_document(
        &self,
        document_id: &str,
    ) -> Result<Vec<ComparisonRecord>> {
        let reader = self.reader()?;
        let pattern = format!("%\"{}\"%", document_id);
        let mut stmt = reader.prepare(
            "SELECT id, document_ids, summary, comparison_json, provenance_id, created_at
             FROM comparisons WHERE document_ids LIKE ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![pattern], row_to_comparison)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn status_transition_allowed(from: DocumentStatus, to: DocumentStatus) -> bool {
    use DocumentStatus::*;
    matches!(
        (from, to),
        (Pending, Processing)
            | (Processing, Complete)
            | (Processing, Failed)
            | (Failed, Processing)
    ) || from == to
}

// ============================================================================
// ROW CONVERTERS
// ============================================================================

const DOCUMENT_SELECT: &str = "SELECT id, file_path, file_name, file_hash, file_size, file_type,
        status, page_count, title, author, subject, upload_ref,
        provenance_id, created_at, updated_at FROM documents";

const CHUNK_SELECT: &str = "SELECT id, document_id, ocr_result_id, chunk_index, text,
        character_start, character_end, page_number, overlap_previous,
        overlap_next, text_hash, embedding_status, provenance_id, created_at FROM chunks";

pub(crate) fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    let status_str: String = row.get(6)?;
    let status = DocumentStatus::parse_name(&status_str).ok_or_else(|| {
        invalid_enum_error(6, "document status", &status_str)
    })?;

    Ok(Document {
        id: row.get(0)?,
        file_path: row.get(1)?,
        file_name: row.get(2)?,
        file_hash: row.get(3)?,
        file_size: row.get(4)?,
        file_type: row.get(5)?,
        status,
        page_count: row.get(7)?,
        title: row.get(8)?,
        author: row.get(9)?,
        subject: row.get(10)?,
        upload_ref: row.get(11)?,
        provenance_id: row.get(12)?,
        created_at: parse_timestamp_col(row, 13)?,
        updated_at: parse_timestamp_col(row, 14)?,
    })
}

pub(crate) fn row_to_ocr_result(row: &rusqlite::Row) -> rusqlite::Result<OcrResult> {
    let quality_str: String = row.get(5)?;
    let quality_mode = OcrQuality::parse_name(&quality_str)
        .ok_or_else(|| invalid_enum_error(5, "OCR quality mode", &quality_str))?;

    Ok(OcrResult {
        id: row.get(0)?,
        document_id: row.get(1)?,
        extracted_text: row.get(2)?,
        text_length: row.get(3)?,
        request_id: row.get(4)?,
        quality_mode,
        page_count: row.get(6)?,
        quality_score: row.get(7)?,
        cost: row.get(8)?,
        content_hash: row.get(9)?,
        blocks_json: row.get(10)?,
        extras_json: row.get(11)?,
        provenance_id: row.get(12)?,
        created_at: parse_timestamp_col(row, 13)?,
    })
}

pub(crate) fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<Chunk> {
    let status_str: String = row.get(11)?;
    let embedding_status = EmbeddingStatus::parse_name(&status_str)
        .ok_or_else(|| invalid_enum_error(11, "embedding status", &status_str))?;

    Ok(Chunk {
        id: row.get(0)?,
        document_id: row.get(1)?,
        ocr_result_id: row.get(2)?,
        chunk_index: row.get(3)?,
        text: row.get(4)?,
        character_start: row.get(5)?,
        character_end: row.get(6)?,
        page_number: row.get(7)?,
        overlap_previous: row.get(8)?,
        overlap_next: row.get(9)?,
        text_hash: row.get(10)?,
        embedding_status,
        provenance_id: row.get(12)?,
        created_at: parse_timestamp_col(row, 13)?,
    })
}

fn row_to_image(row: &rusqlite::Row) -> rusqlite::Result<ImageRecord> {
    Ok(ImageRecord {
        id: row.get(0)?,
        document_id: row.get(1)?,
        page_number: row.get(2)?,
        image_hash: row.get(3)?,
        vlm_description: row.get(4)?,
        provenance_id: row.get(5)?,
        created_at: parse_timestamp_col(row, 6)?,
    })
}

fn row_to_extraction(row: &rusqlite::Row) -> rusqlite::Result<ExtractionRecord> {
    Ok(ExtractionRecord {
        id: row.get(0)?,
        document_id: row.get(1)?,
        schema_name: row.get(2)?,
        extraction_json: row.get(3)?,
        provenance_id: row.get(4)?,
        created_at: parse_timestamp_col(row, 5)?,
    })
}

fn row_to_form_fill(row: &rusqlite::Row) -> rusqlite::Result<FormFillRecord> {
    Ok(FormFillRecord {
        id: row.get(0)?,
        document_id: row.get(1)?,
        form_name: row.get(2)?,
        fill_json: row.get(3)?,
        provenance_id: row.get(4)?,
        created_at: parse_timestamp_col(row, 5)?,
    })
}

fn row_to_comparison(row: &rusqlite::Row) -> rusqlite::Result<ComparisonRecord> {
    let document_ids: String = row.get(1)?;
    Ok(ComparisonRecord {
        id: row.get(0)?,
        document_ids: super::from_json_array(&document_ids),
        summary: row.get(2)?,
        comparison_json: row.get(3)?,
        provenance_id: row.get(4)?,
        created_at: parse_timestamp_col(row, 5)?,
    })
}

pub(crate) fn invalid_enum_error(
    idx: usize,
    what: &str,
    value: &str,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unknown {what} '{value}'"),
        )),
    )
}
