//! Embedding Storage
//!
//! Relational embedding rows and vector-index entries are 1:1 and move
//! together: batch inserts write the rows inside one transaction and load
//! the index immediately after commit; deletes (cascade) remove index
//! entries before the rows.

use rusqlite::{params, Connection, OptionalExtension};

use super::documents::{invalid_enum_error, PROCESSOR, PROCESSOR_VERSION};
use super::{blob_to_vector, new_id, now_rfc3339, parse_timestamp_col, vector_to_blob, Store};
use crate::error::{Result, StoreError};
use crate::hash;
use crate::model::{
    EmbeddingRecord, EmbeddingStatus, NewEmbedding, NewProvenance, ProvenanceType, SourceType,
    TaskType, EMBEDDING_DIMENSIONS,
};

impl Store {
    /// Batch-insert embeddings in one transaction.
    ///
    /// Every payload must reference exactly one owner (chunk, image, or
    /// extraction) and carry a 768-dim vector; validation happens before
    /// anything is written. Chunk owners flip to `embedding_status =
    /// complete` in the same transaction.
    pub fn insert_embeddings(&self, batch: &[NewEmbedding]) -> Result<Vec<EmbeddingRecord>> {
        for (i, new) in batch.iter().enumerate() {
            let owners = [
                new.chunk_id.is_some(),
                new.image_id.is_some(),
                new.extraction_id.is_some(),
            ]
            .iter()
            .filter(|v| **v)
            .count();
            if owners != 1 {
                return Err(StoreError::InputInvalid(format!(
                    "embedding {i}: exactly one of chunk_id, image_id, extraction_id required"
                )));
            }
            if new.vector.len() != EMBEDDING_DIMENSIONS {
                return Err(StoreError::InputInvalid(format!(
                    "embedding {i}: expected {EMBEDDING_DIMENSIONS} dimensions, got {}",
                    new.vector.len()
                )));
            }
        }

        let now = now_rfc3339();
        let mut inserted: Vec<(String, Vec<f32>)> = Vec::with_capacity(batch.len());

        {
            let writer = self.writer()?;
            let tx = writer.unchecked_transaction()?;

            for new in batch {
                let id = new_id();
                let (document_id, parent_prov, input_hash) = owner_context(&tx, new)?;

                let prov = Self::insert_provenance_on(
                    &tx,
                    NewProvenance {
                        prov_type: ProvenanceType::Embedding,
                        processor: PROCESSOR.into(),
                        processor_version: PROCESSOR_VERSION.into(),
                        parameters_json: Some(hash::canonical_json(&serde_json::json!({
                            "model": new.model_name,
                            "taskType": new.task_type.as_str(),
                        }))),
                        content_hash: hash::hash_bytes(&vector_to_blob(&new.vector)),
                        input_hash,
                        source_id: Some(parent_prov.clone()),
                        source_type: Some(owner_source_type(new)),
                        parent_id: Some(parent_prov),
                        extra_parent_ids: Vec::new(),
                        root_document_id: None,
                    },
                )?;

                tx.execute(
                    "INSERT INTO embeddings (
                        id, document_id, chunk_id, image_id, extraction_id, vector,
                        dimensions, model_name, model_version, task_type, original_text,
                        provenance_id, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    params![
                        id,
                        document_id,
                        new.chunk_id,
                        new.image_id,
                        new.extraction_id,
                        vector_to_blob(&new.vector),
                        EMBEDDING_DIMENSIONS as i64,
                        new.model_name,
                        new.model_version,
                        new.task_type.as_str(),
                        new.original_text,
                        prov.id,
                        now,
                    ],
                )
                .map_err(|e| StoreError::from_sqlite("embeddings.chunk_id", e))?;

                if let Some(chunk_id) = &new.chunk_id {
                    tx.execute(
                        "UPDATE chunks SET embedding_status = ?1 WHERE id = ?2",
                        params![EmbeddingStatus::Complete.as_str(), chunk_id],
                    )?;
                }

                inserted.push((id, new.vector.clone()));
            }

            Self::refresh_metadata(&tx)?;
            tx.commit()?;
        }

        {
            let mut index = self.embedding_index()?;
            for (id, vector) in &inserted {
                index
                    .insert(id, vector)
                    .map_err(|e| StoreError::VectorIndex(e.to_string()))?;
            }
        }

        let mut out = Vec::with_capacity(inserted.len());
        for (id, _) in inserted {
            out.push(self.get_embedding(&id)?);
        }
        Ok(out)
    }

    pub fn get_embedding(&self, id: &str) -> Result<EmbeddingRecord> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!("{EMBEDDING_SELECT} WHERE id = ?1"))?;
        stmt.query_row(params![id], row_to_embedding)
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("embedding {id}")))
    }

    /// All embeddings for a document
    pub fn list_embeddings_for_document(&self, document_id: &str) -> Result<Vec<EmbeddingRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!(
            "{EMBEDDING_SELECT} WHERE document_id = ?1 ORDER BY created_at ASC"
        ))?;
        let rows = stmt
            .query_map(params![document_id], row_to_embedding)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// k-NN over chunk/image/extraction embeddings.
    /// Returns `(embedding_id, distance)` pairs nearest-first.
    pub fn match_embeddings(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let index = self.embedding_index()?;
        index
            .match_k(query, k)
            .map_err(|e| StoreError::VectorIndex(e.to_string()))
    }
}

fn owner_source_type(new: &NewEmbedding) -> SourceType {
    if new.chunk_id.is_some() {
        SourceType::Chunk
    } else if new.image_id.is_some() {
        SourceType::Image
    } else {
        SourceType::Extraction
    }
}

/// Resolve the owning artifact's document, provenance, and content hash
fn owner_context(
    conn: &Connection,
    new: &NewEmbedding,
) -> Result<(String, String, Option<String>)> {
    if let Some(chunk_id) = &new.chunk_id {
        let chunk = Store::get_chunk_on(conn, chunk_id)?
            .ok_or_else(|| StoreError::NotFound(format!("chunk {chunk_id}")))?;
        return Ok((
            chunk.document_id,
            chunk.provenance_id,
            Some(chunk.text_hash),
        ));
    }
    if let Some(image_id) = &new.image_id {
        let (document_id, provenance_id, image_hash): (String, String, String) = conn
            .query_row(
                "SELECT document_id, provenance_id, image_hash FROM images WHERE id = ?1",
                params![image_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("image {image_id}")))?;
        return Ok((document_id, provenance_id, Some(image_hash)));
    }
    if let Some(extraction_id) = &new.extraction_id {
        let (document_id, provenance_id): (String, String) = conn
            .query_row(
                "SELECT document_id, provenance_id FROM extractions WHERE id = ?1",
                params![extraction_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("extraction {extraction_id}")))?;
        return Ok((document_id, provenance_id, None));
    }
    Err(StoreError::InputInvalid(
        "embedding requires an owner".into(),
    ))
}

const EMBEDDING_SELECT: &str = "SELECT id, document_id, chunk_id, image_id, extraction_id, vector,
        dimensions, model_name, model_version, task_type, original_text,
        provenance_id, created_at FROM embeddings";

fn row_to_embedding(row: &rusqlite::Row) -> rusqlite::Result<EmbeddingRecord> {
    let task_str: String = row.get(9)?;
    let task_type = TaskType::parse_name(&task_str)
        .ok_or_else(|| invalid_enum_error(9, "task type", &task_str))?;
    let blob: Vec<u8> = row.get(5)?;

    Ok(EmbeddingRecord {
        id: row.get(0)?,
        document_id: row.get(1)?,
        chunk_id: row.get(2)?,
        image_id: row.get(3)?,
        extraction_id: row.get(4)?,
        vector: blob_to_vector(&blob),
        dimensions: row.get(6)?,
        model_name: row.get(7)?,
        model_version: row.get(8)?,
        task_type,
        original_text: row.get(10)?,
        provenance_id: row.get(11)?,
        created_at: parse_timestamp_col(row, 12)?,
    })
}
