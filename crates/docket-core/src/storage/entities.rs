//! Entity and Mention Storage
//!
//! The extraction pipeline is the only writer of entities and mentions for
//! a document; everything else reads. Writes run on the pipeline's
//! transaction, so the insert helpers here take a `Connection` rather than
//! locking.

use rusqlite::{params, Connection, OptionalExtension};

use super::documents::invalid_enum_error;
use super::{from_json_array, new_id, now_rfc3339, parse_timestamp_col, to_json_array, Store};
use crate::error::{Result, StoreError};
use crate::model::{Entity, EntityMention, EntityType};

/// Insert payload for an entity row (pipeline internal)
#[derive(Debug, Clone)]
pub(crate) struct NewEntityRow {
    pub document_id: String,
    pub entity_type: EntityType,
    pub raw_text: String,
    pub normalized_text: String,
    pub confidence: f64,
    pub aliases: Vec<String>,
    pub agreement_count: i64,
    pub metadata_json: Option<String>,
    pub provenance_id: String,
}

/// Insert payload for a mention row (pipeline internal)
#[derive(Debug, Clone)]
pub(crate) struct NewMentionRow {
    pub entity_id: String,
    pub document_id: String,
    pub chunk_id: Option<String>,
    pub page_number: Option<i64>,
    pub character_start: Option<i64>,
    pub character_end: Option<i64>,
    pub context: Option<String>,
}

/// Raw extracted relationship row (pipeline internal; knowledge edges are
/// derived from these)
#[derive(Debug, Clone)]
pub(crate) struct RelationshipRow {
    pub id: String,
    pub document_id: String,
    pub source_entity_id: String,
    pub target_entity_id: String,
    pub relationship_type: crate::model::RelationshipType,
    pub confidence: f64,
    pub evidence: Option<String>,
    pub valid_from: Option<String>,
    pub valid_until: Option<String>,
}

impl Store {
    pub(crate) fn insert_entity_on(conn: &Connection, new: &NewEntityRow) -> Result<String> {
        let id = new_id();
        conn.execute(
            "INSERT INTO entities (
                id, document_id, entity_type, raw_text, normalized_text,
                confidence, aliases, agreement_count, metadata, provenance_id,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id,
                new.document_id,
                new.entity_type.as_str(),
                new.raw_text,
                new.normalized_text,
                new.confidence,
                to_json_array(&new.aliases),
                new.agreement_count,
                new.metadata_json,
                new.provenance_id,
                now_rfc3339(),
            ],
        )
        .map_err(|e| StoreError::from_sqlite("entities.document_id", e))?;
        Ok(id)
    }

    pub(crate) fn insert_mention_on(conn: &Connection, new: &NewMentionRow) -> Result<String> {
        let id = new_id();
        conn.execute(
            "INSERT INTO entity_mentions (
                id, entity_id, document_id, chunk_id, page_number,
                character_start, character_end, context, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                new.entity_id,
                new.document_id,
                new.chunk_id,
                new.page_number,
                new.character_start,
                new.character_end,
                new.context,
                now_rfc3339(),
            ],
        )
        .map_err(|e| StoreError::from_sqlite("entity_mentions.chunk_id", e))?;
        Ok(id)
    }

    pub(crate) fn insert_relationship_on(conn: &Connection, new: &RelationshipRow) -> Result<()> {
        conn.execute(
            "INSERT INTO entity_relationships (
                id, document_id, source_entity_id, target_entity_id,
                relationship_type, confidence, evidence, valid_from,
                valid_until, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                new.id,
                new.document_id,
                new.source_entity_id,
                new.target_entity_id,
                new.relationship_type.as_str(),
                new.confidence,
                new.evidence,
                new.valid_from,
                new.valid_until,
                now_rfc3339(),
            ],
        )
        .map_err(|e| StoreError::from_sqlite("entity_relationships.source_entity_id", e))?;
        Ok(())
    }

    /// Raw relationships for one document (graph rebuild input)
    pub(crate) fn list_relationships_for_document_on(
        conn: &Connection,
        document_id: &str,
    ) -> Result<Vec<RelationshipRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, document_id, source_entity_id, target_entity_id,
                    relationship_type, confidence, evidence, valid_from, valid_until
             FROM entity_relationships WHERE document_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![document_id], |row| {
                let type_str: String = row.get(4)?;
                let relationship_type = crate::model::RelationshipType::parse_name(&type_str)
                    .ok_or_else(|| invalid_enum_error(4, "relationship type", &type_str))?;
                Ok(RelationshipRow {
                    id: row.get(0)?,
                    document_id: row.get(1)?,
                    source_entity_id: row.get(2)?,
                    target_entity_id: row.get(3)?,
                    relationship_type,
                    confidence: row.get(5)?,
                    evidence: row.get(6)?,
                    valid_from: row.get(7)?,
                    valid_until: row.get(8)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Re-extraction hygiene: wipe all mentions, entities, and extraction
    /// segments for a document, mentions first (they reference entities and
    /// chunks).
    pub(crate) fn delete_extraction_artifacts_on(
        conn: &Connection,
        document_id: &str,
    ) -> Result<()> {
        conn.execute(
            "DELETE FROM node_entity_links WHERE entity_id IN
                (SELECT id FROM entities WHERE document_id = ?1)",
            params![document_id],
        )?;
        conn.execute(
            "DELETE FROM entity_mentions WHERE document_id = ?1",
            params![document_id],
        )?;
        conn.execute(
            "DELETE FROM entity_relationships WHERE document_id = ?1",
            params![document_id],
        )?;
        conn.execute(
            "DELETE FROM entities WHERE document_id = ?1",
            params![document_id],
        )?;
        conn.execute(
            "DELETE FROM entity_extraction_segments WHERE document_id = ?1",
            params![document_id],
        )?;
        Ok(())
    }

    pub fn get_entity(&self, id: &str) -> Result<Entity> {
        let reader = self.reader()?;
        Self::get_entity_on(&reader, id)?
            .ok_or_else(|| StoreError::NotFound(format!("entity {id}")))
    }

    pub(crate) fn get_entity_on(conn: &Connection, id: &str) -> Result<Option<Entity>> {
        let mut stmt = conn.prepare(&format!("{ENTITY_SELECT} WHERE id = ?1"))?;
        Ok(stmt.query_row(params![id], row_to_entity).optional()?)
    }

    /// Entities of a document, optionally filtered by type
    pub fn list_entities(
        &self,
        document_id: &str,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<Entity>> {
        let reader = self.reader()?;
        let rows = match entity_type {
            Some(ty) => {
                let mut stmt = reader.prepare(&format!(
                    "{ENTITY_SELECT} WHERE document_id = ?1 AND entity_type = ?2
                     ORDER BY normalized_text ASC"
                ))?;
                stmt.query_map(params![document_id, ty.as_str()], row_to_entity)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = reader.prepare(&format!(
                    "{ENTITY_SELECT} WHERE document_id = ?1 ORDER BY normalized_text ASC"
                ))?;
                stmt.query_map(params![document_id], row_to_entity)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }

    /// All entities of one type across every document
    pub fn list_entities_by_type(&self, entity_type: EntityType) -> Result<Vec<Entity>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!(
            "{ENTITY_SELECT} WHERE entity_type = ?1 ORDER BY document_id, normalized_text"
        ))?;
        let rows = stmt
            .query_map(params![entity_type.as_str()], row_to_entity)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Mentions of an entity, position order
    pub fn list_mentions(&self, entity_id: &str) -> Result<Vec<EntityMention>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!(
            "{MENTION_SELECT} WHERE entity_id = ?1
             ORDER BY character_start IS NULL, character_start ASC"
        ))?;
        let rows = stmt
            .query_map(params![entity_id], row_to_mention)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// All mentions in a document
    pub fn list_mentions_for_document(&self, document_id: &str) -> Result<Vec<EntityMention>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!(
            "{MENTION_SELECT} WHERE document_id = ?1
             ORDER BY character_start IS NULL, character_start ASC"
        ))?;
        let rows = stmt
            .query_map(params![document_id], row_to_mention)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

const ENTITY_SELECT: &str = "SELECT id, document_id, entity_type, raw_text, normalized_text,
        confidence, aliases, agreement_count, metadata, provenance_id, created_at FROM entities";

const MENTION_SELECT: &str = "SELECT id, entity_id, document_id, chunk_id, page_number,
        character_start, character_end, context, created_at FROM entity_mentions";

pub(crate) fn row_to_entity(row: &rusqlite::Row) -> rusqlite::Result<Entity> {
    let type_str: String = row.get(2)?;
    let entity_type = EntityType::parse_name(&type_str)
        .ok_or_else(|| invalid_enum_error(2, "entity type", &type_str))?;
    let aliases: String = row.get(6)?;

    Ok(Entity {
        id: row.get(0)?,
        document_id: row.get(1)?,
        entity_type,
        raw_text: row.get(3)?,
        normalized_text: row.get(4)?,
        confidence: row.get(5)?,
        aliases: from_json_array(&aliases),
        agreement_count: row.get(7)?,
        metadata_json: row.get(8)?,
        provenance_id: row.get(9)?,
        created_at: parse_timestamp_col(row, 10)?,
    })
}

pub(crate) fn row_to_mention(row: &rusqlite::Row) -> rusqlite::Result<EntityMention> {
    Ok(EntityMention {
        id: row.get(0)?,
        entity_id: row.get(1)?,
        document_id: row.get(2)?,
        chunk_id: row.get(3)?,
        page_number: row.get(4)?,
        character_start: row.get(5)?,
        character_end: row.get(6)?,
        context: row.get(7)?,
        created_at: parse_timestamp_col(row, 8)?,
    })
}
