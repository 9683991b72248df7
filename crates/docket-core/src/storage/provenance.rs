//! Provenance DAG Storage
//!
//! Append-only. Chain bookkeeping (`root_document_id`, `chain_depth`,
//! `chain_path`) is materialized at insert time from the parent row. The
//! only mutation ever applied afterwards is re-parenting
//! `root_document_id` to the `ORPHANED_ROOT` sentinel.

use rusqlite::{params, Connection, OptionalExtension};

use super::{from_json_array, new_id, now_rfc3339, parse_timestamp_col, to_json_array, Store};
use crate::error::{Result, StoreError};
use crate::model::{NewProvenance, ProvenanceRecord, ProvenanceType, SourceType};

impl Store {
    /// Insert a provenance record, deriving chain fields from the parent.
    ///
    /// Roots (`parent_id = None`) must carry `root_document_id`; children
    /// inherit the parent's root and extend its chain path.
    pub fn insert_provenance(&self, spec: NewProvenance) -> Result<ProvenanceRecord> {
        let writer = self.writer()?;
        Self::insert_provenance_on(&writer, spec)
    }

    /// Transaction-friendly variant used by multi-step write operations
    pub(crate) fn insert_provenance_on(
        conn: &Connection,
        spec: NewProvenance,
    ) -> Result<ProvenanceRecord> {
        let id = new_id();
        let now = now_rfc3339();

        let (root_document_id, chain_depth, mut chain_path) = match &spec.parent_id {
            Some(parent_id) => {
                let parent = Self::get_provenance_on(conn, parent_id)?.ok_or_else(|| {
                    StoreError::ForeignKeyViolation {
                        column: "provenance.parent_id".into(),
                        detail: format!("parent provenance {parent_id} does not exist"),
                    }
                })?;
                (
                    parent.root_document_id,
                    parent.chain_depth + 1,
                    parent.chain_path,
                )
            }
            None => {
                let root = spec.root_document_id.clone().ok_or_else(|| {
                    StoreError::InputInvalid(
                        "root provenance requires an explicit root_document_id".into(),
                    )
                })?;
                (root, 0, Vec::new())
            }
        };
        chain_path.push(id.clone());

        let mut parent_ids = Vec::new();
        if let Some(parent_id) = &spec.parent_id {
            parent_ids.push(parent_id.clone());
        }
        for extra in &spec.extra_parent_ids {
            if !parent_ids.contains(extra) {
                parent_ids.push(extra.clone());
            }
        }

        conn.execute(
            "INSERT INTO provenance (
                id, type, processor, processor_version, parameters,
                content_hash, input_hash, source_id, source_type,
                parent_id, parent_ids, root_document_id, chain_depth,
                chain_path, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                id,
                spec.prov_type.as_str(),
                spec.processor,
                spec.processor_version,
                spec.parameters_json,
                spec.content_hash,
                spec.input_hash,
                spec.source_id,
                spec.source_type.map(|s| s.as_str()),
                spec.parent_id,
                to_json_array(&parent_ids),
                root_document_id,
                chain_depth,
                to_json_array(&chain_path),
                now,
            ],
        )
        .map_err(|e| StoreError::from_sqlite("provenance.parent_id", e))?;

        Self::get_provenance_on(conn, &id)?
            .ok_or_else(|| StoreError::NotFound(format!("provenance {id}")))
    }

    /// Fetch a single record with parsed JSON fields
    pub fn get_provenance(&self, id: &str) -> Result<ProvenanceRecord> {
        let reader = self.reader()?;
        Self::get_provenance_on(&reader, id)?
            .ok_or_else(|| StoreError::NotFound(format!("provenance {id}")))
    }

    pub(crate) fn get_provenance_on(
        conn: &Connection,
        id: &str,
    ) -> Result<Option<ProvenanceRecord>> {
        let mut stmt = conn.prepare(
            "SELECT id, type, processor, processor_version, parameters, content_hash,
                    input_hash, source_id, source_type, parent_id, parent_ids,
                    root_document_id, chain_depth, chain_path, created_at
             FROM provenance WHERE id = ?1",
        )?;
        let record = stmt
            .query_row(params![id], row_to_provenance)
            .optional()?;
        Ok(record)
    }

    /// Walk `parent_id` upward until null; current-first, root-last.
    ///
    /// Iterations are bounded by the start record's materialized
    /// `chain_depth`; reaching the bound without terminating means the DAG
    /// is corrupted.
    pub fn get_provenance_chain(&self, id: &str) -> Result<Vec<ProvenanceRecord>> {
        let reader = self.reader()?;
        let start = Self::get_provenance_on(&reader, id)?
            .ok_or_else(|| StoreError::NotFound(format!("provenance {id}")))?;

        let bound = (start.chain_depth as usize) + 1;
        let mut chain = vec![start];

        while let Some(parent_id) = chain
            .last()
            .and_then(|record| record.parent_id.clone())
        {
            if chain.len() >= bound {
                return Err(StoreError::IntegrityViolation(format!(
                    "provenance chain for {id} exceeds materialized depth {bound}; cycle suspected"
                )));
            }
            let parent = Self::get_provenance_on(&reader, &parent_id)?.ok_or_else(|| {
                StoreError::IntegrityViolation(format!(
                    "provenance {parent_id} referenced by chain of {id} does not exist"
                ))
            })?;
            chain.push(parent);
        }

        Ok(chain)
    }

    /// All records sharing a root document, ordered by chain_depth ascending
    pub fn get_provenance_by_root_document(
        &self,
        root_document_id: &str,
    ) -> Result<Vec<ProvenanceRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, type, processor, processor_version, parameters, content_hash,
                    input_hash, source_id, source_type, parent_id, parent_ids,
                    root_document_id, chain_depth, chain_path, created_at
             FROM provenance WHERE root_document_id = ?1
             ORDER BY chain_depth ASC, created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![root_document_id], row_to_provenance)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Direct successors, ordered by creation time
    pub fn get_provenance_children(&self, parent_id: &str) -> Result<Vec<ProvenanceRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, type, processor, processor_version, parameters, content_hash,
                    input_hash, source_id, source_type, parent_id, parent_ids,
                    root_document_id, chain_depth, chain_path, created_at
             FROM provenance WHERE parent_id = ?1
             ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![parent_id], row_to_provenance)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

}

pub(crate) fn row_to_provenance(row: &rusqlite::Row) -> rusqlite::Result<ProvenanceRecord> {
    let type_str: String = row.get(1)?;
    let prov_type = ProvenanceType::parse_name(&type_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown provenance type '{type_str}'"),
            )),
        )
    })?;

    let source_type: Option<String> = row.get(8)?;
    let parent_ids: String = row.get(10)?;
    let chain_path: String = row.get(13)?;

    Ok(ProvenanceRecord {
        id: row.get(0)?,
        prov_type,
        processor: row.get(2)?,
        processor_version: row.get(3)?,
        parameters_json: row.get(4)?,
        content_hash: row.get(5)?,
        input_hash: row.get(6)?,
        source_id: row.get(7)?,
        source_type: source_type.as_deref().and_then(SourceType::parse_name),
        parent_id: row.get(9)?,
        parent_ids: from_json_array(&parent_ids),
        root_document_id: row.get(11)?,
        chain_depth: row.get(12)?,
        chain_path: from_json_array(&chain_path),
        created_at: parse_timestamp_col(row, 14)?,
    })
}
