//! Knowledge-Graph Storage
//!
//! Low-level node/link/edge rows. Graph semantics (resolution, merge,
//! split, prune, traversal) live in `crate::graph`; everything here runs on
//! a caller-supplied connection so multi-step mutations stay in one
//! transaction.

use rusqlite::{params, Connection, OptionalExtension};

use super::documents::invalid_enum_error;
use super::{from_json_array, new_id, now_rfc3339, parse_timestamp_col, to_json_array, Store};
use crate::error::{Result, StoreError};
use crate::model::{EntityType, KgEdge, KgNode, NodeEntityLink, RelationshipType, ResolutionMethod};

/// Importance is monotone increasing in confidence, document count, and
/// mention count.
pub(crate) fn importance_score(avg_confidence: f64, document_count: i64, mention_count: i64) -> f64 {
    avg_confidence
        * (1.0 + (document_count as f64).ln_1p())
        * (1.0 + (mention_count as f64).ln_1p())
}

/// Insert payload for a node row (engine internal)
#[derive(Debug, Clone)]
pub(crate) struct NewNodeRow {
    pub entity_type: EntityType,
    pub canonical_name: String,
    pub normalized_name: String,
    pub aliases: Vec<String>,
    pub document_count: i64,
    pub mention_count: i64,
    pub avg_confidence: f64,
    pub metadata_json: Option<String>,
    pub provenance_id: String,
}

/// Insert payload for an edge row (engine internal). Endpoints must already
/// satisfy the direction invariant.
#[derive(Debug, Clone)]
pub(crate) struct NewEdgeRow {
    pub source_node_id: String,
    pub target_node_id: String,
    pub relationship_type: RelationshipType,
    pub weight: f64,
    pub normalized_weight: f64,
    pub evidence_count: i64,
    pub document_ids: Vec<String>,
    pub valid_from: Option<String>,
    pub valid_until: Option<String>,
    pub metadata_json: Option<String>,
    pub provenance_id: String,
}

impl Store {
    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    pub(crate) fn insert_node_on(conn: &Connection, new: &NewNodeRow) -> Result<String> {
        let id = new_id();
        let now = now_rfc3339();
        conn.execute(
            "INSERT INTO knowledge_nodes (
                id, entity_type, canonical_name, normalized_name, aliases,
                document_count, mention_count, edge_count, avg_confidence,
                importance_score, metadata, provenance_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                id,
                new.entity_type.as_str(),
                new.canonical_name,
                new.normalized_name,
                to_json_array(&new.aliases),
                new.document_count,
                new.mention_count,
                new.avg_confidence,
                importance_score(new.avg_confidence, new.document_count, new.mention_count),
                new.metadata_json,
                new.provenance_id,
                now,
            ],
        )
        .map_err(|e| StoreError::from_sqlite("knowledge_nodes.provenance_id", e))?;
        Ok(id)
    }

    pub fn get_node(&self, id: &str) -> Result<KgNode> {
        let reader = self.reader()?;
        Self::get_node_on(&reader, id)?
            .ok_or_else(|| StoreError::NotFound(format!("knowledge node {id}")))
    }

    pub(crate) fn get_node_on(conn: &Connection, id: &str) -> Result<Option<KgNode>> {
        let mut stmt = conn.prepare(&format!("{NODE_SELECT} WHERE id = ?1"))?;
        Ok(stmt.query_row(params![id], row_to_node).optional()?)
    }

    /// Exact lookup on (type, normalized name)
    pub(crate) fn find_node_by_normalized_on(
        conn: &Connection,
        entity_type: EntityType,
        normalized_name: &str,
    ) -> Result<Option<KgNode>> {
        let mut stmt = conn.prepare(&format!(
            "{NODE_SELECT} WHERE entity_type = ?1 AND normalized_name = ?2"
        ))?;
        Ok(stmt
            .query_row(params![entity_type.as_str(), normalized_name], row_to_node)
            .optional()?)
    }

    pub(crate) fn list_nodes_by_type_on(
        conn: &Connection,
        entity_type: EntityType,
    ) -> Result<Vec<KgNode>> {
        let mut stmt = conn.prepare(&format!(
            "{NODE_SELECT} WHERE entity_type = ?1 ORDER BY mention_count DESC, normalized_name"
        ))?;
        let rows = stmt
            .query_map(params![entity_type.as_str()], row_to_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// List nodes, optionally by type, ordered by mention count
    pub fn list_nodes(&self, entity_type: Option<EntityType>, limit: i64) -> Result<Vec<KgNode>> {
        let reader = self.reader()?;
        let rows = match entity_type {
            Some(ty) => {
                let mut stmt = reader.prepare(&format!(
                    "{NODE_SELECT} WHERE entity_type = ?1
                     ORDER BY mention_count DESC, normalized_name LIMIT ?2"
                ))?;
                stmt.query_map(params![ty.as_str(), limit], row_to_node)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = reader.prepare(&format!(
                    "{NODE_SELECT} ORDER BY mention_count DESC, normalized_name LIMIT ?1"
                ))?;
                stmt.query_map(params![limit], row_to_node)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }

    /// Targeted node field update (canonical name, aliases, metadata)
    pub fn update_node_fields(
        &self,
        id: &str,
        canonical_name: Option<&str>,
        aliases: Option<&[String]>,
        metadata_json: Option<&str>,
    ) -> Result<KgNode> {
        {
            let writer = self.writer()?;
            let node = Self::get_node_on(&writer, id)?
                .ok_or_else(|| StoreError::NotFound(format!("knowledge node {id}")))?;

            let canonical = canonical_name.unwrap_or(&node.canonical_name);
            let normalized = crate::extraction::normalize_text(canonical);
            let aliases = aliases.map(|a| a.to_vec()).unwrap_or(node.aliases);
            let metadata = metadata_json
                .map(|m| m.to_string())
                .or(node.metadata_json);

            writer.execute(
                "UPDATE knowledge_nodes SET canonical_name = ?1, normalized_name = ?2,
                        aliases = ?3, metadata = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![
                    canonical,
                    normalized,
                    to_json_array(&aliases),
                    metadata,
                    now_rfc3339(),
                    id
                ],
            )?;
        }
        self.get_node(id)
    }

    /// Fold an observed surface form into a node: the canonical contest is
    /// deterministic (longer form wins, ties lexicographic) so build order
    /// never changes the outcome, and every losing form lands in the alias
    /// set.
    pub(crate) fn fold_name_into_node_on(
        conn: &Connection,
        node_id: &str,
        observed: &str,
        observed_aliases: &[String],
    ) -> Result<()> {
        let node = Self::get_node_on(conn, node_id)?
            .ok_or_else(|| StoreError::NotFound(format!("knowledge node {node_id}")))?;

        let mut canonical = node.canonical_name.clone();
        let mut aliases = node.aliases.clone();

        let observed_wins = {
            let (o_len, c_len) = (observed.chars().count(), canonical.chars().count());
            o_len > c_len || (o_len == c_len && observed < canonical.as_str())
        };
        if observed != canonical {
            if observed_wins {
                if !aliases.contains(&canonical) {
                    aliases.push(canonical.clone());
                }
                canonical = observed.to_string();
            } else if !aliases.iter().any(|a| a == observed) {
                aliases.push(observed.to_string());
            }
        }
        for alias in observed_aliases {
            if *alias != canonical && !aliases.contains(alias) {
                aliases.push(alias.clone());
            }
        }
        aliases.retain(|a| *a != canonical);

        conn.execute(
            "UPDATE knowledge_nodes SET canonical_name = ?1, normalized_name = ?2,
                    aliases = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                canonical,
                crate::extraction::normalize_text(&canonical),
                to_json_array(&aliases),
                now_rfc3339(),
                node_id
            ],
        )?;
        Ok(())
    }

    /// Recompute a node's link-derived stats (document count, mention count,
    /// average confidence, importance) from the link set
    pub(crate) fn recompute_node_stats_on(conn: &Connection, node_id: &str) -> Result<()> {
        let document_count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT document_id) FROM node_entity_links WHERE node_id = ?1",
            params![node_id],
            |row| row.get(0),
        )?;
        let mention_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entity_mentions WHERE entity_id IN
                (SELECT entity_id FROM node_entity_links WHERE node_id = ?1)",
            params![node_id],
            |row| row.get(0),
        )?;
        let avg_confidence: f64 = conn.query_row(
            "SELECT COALESCE(AVG(confidence), 0.0) FROM entities WHERE id IN
                (SELECT entity_id FROM node_entity_links WHERE node_id = ?1)",
            params![node_id],
            |row| row.get(0),
        )?;

        conn.execute(
            "UPDATE knowledge_nodes SET document_count = ?1, mention_count = ?2,
                    avg_confidence = ?3, importance_score = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                document_count,
                mention_count,
                avg_confidence,
                importance_score(avg_confidence, document_count, mention_count),
                now_rfc3339(),
                node_id
            ],
        )?;
        Ok(())
    }

    /// Rebuild edge_count from the edge table
    pub(crate) fn recompute_edge_count_on(conn: &Connection, node_id: &str) -> Result<()> {
        conn.execute(
            "UPDATE knowledge_nodes SET edge_count =
                (SELECT COUNT(*) FROM knowledge_edges
                 WHERE source_node_id = ?1 OR target_node_id = ?1),
                updated_at = ?2
             WHERE id = ?1",
            params![node_id, now_rfc3339()],
        )?;
        Ok(())
    }

    pub(crate) fn delete_node_on(conn: &Connection, node_id: &str) -> Result<()> {
        conn.execute(
            "DELETE FROM entity_embeddings WHERE node_id = ?1",
            params![node_id],
        )?;
        conn.execute(
            "DELETE FROM knowledge_nodes WHERE id = ?1",
            params![node_id],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------

    pub(crate) fn insert_link_on(
        conn: &Connection,
        node_id: &str,
        entity_id: &str,
        document_id: &str,
        similarity: f64,
        method: ResolutionMethod,
    ) -> Result<String> {
        let id = new_id();
        conn.execute(
            "INSERT INTO node_entity_links (
                id, node_id, entity_id, document_id, similarity, method, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                node_id,
                entity_id,
                document_id,
                similarity,
                method.as_str(),
                now_rfc3339()
            ],
        )
        .map_err(|e| StoreError::from_sqlite("node_entity_links.node_id", e))?;
        Ok(id)
    }

    /// Links attached to a node
    pub fn list_links_for_node(&self, node_id: &str) -> Result<Vec<NodeEntityLink>> {
        let reader = self.reader()?;
        Self::list_links_for_node_on(&reader, node_id)
    }

    pub(crate) fn list_links_for_node_on(
        conn: &Connection,
        node_id: &str,
    ) -> Result<Vec<NodeEntityLink>> {
        let mut stmt = conn.prepare(&format!(
            "{LINK_SELECT} WHERE node_id = ?1 ORDER BY created_at ASC"
        ))?;
        let rows = stmt
            .query_map(params![node_id], row_to_link)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// The node an entity resolved into, if any
    pub fn find_node_for_entity(&self, entity_id: &str) -> Result<Option<KgNode>> {
        let reader = self.reader()?;
        let node_id: Option<String> = reader
            .query_row(
                "SELECT node_id FROM node_entity_links WHERE entity_id = ?1",
                params![entity_id],
                |row| row.get(0),
            )
            .optional()?;
        match node_id {
            Some(id) => Self::get_node_on(&reader, &id),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------

    pub(crate) fn insert_edge_on(conn: &Connection, new: &NewEdgeRow) -> Result<String> {
        if new.source_node_id >= new.target_node_id {
            return Err(StoreError::IntegrityViolation(format!(
                "edge endpoints out of order: {} >= {}",
                new.source_node_id, new.target_node_id
            )));
        }
        let id = new_id();
        let now = now_rfc3339();
        conn.execute(
            "INSERT INTO knowledge_edges (
                id, source_node_id, target_node_id, relationship_type, weight,
                normalized_weight, evidence_count, contradiction_count,
                document_ids, valid_from, valid_until, metadata, provenance_id,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
            params![
                id,
                new.source_node_id,
                new.target_node_id,
                new.relationship_type.as_str(),
                new.weight,
                new.normalized_weight,
                new.evidence_count,
                to_json_array(&new.document_ids),
                new.valid_from,
                new.valid_until,
                new.metadata_json,
                new.provenance_id,
                now,
            ],
        )
        .map_err(|e| StoreError::from_sqlite("knowledge_edges.source_node_id", e))?;
        Ok(id)
    }

    pub fn get_edge(&self, id: &str) -> Result<KgEdge> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!("{EDGE_SELECT} WHERE id = ?1"))?;
        stmt.query_row(params![id], row_to_edge)
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("knowledge edge {id}")))
    }

    /// The unique edge for an ordered endpoint pair and type
    pub(crate) fn find_edge_on(
        conn: &Connection,
        source_node_id: &str,
        target_node_id: &str,
        relationship_type: RelationshipType,
    ) -> Result<Option<KgEdge>> {
        let mut stmt = conn.prepare(&format!(
            "{EDGE_SELECT} WHERE source_node_id = ?1 AND target_node_id = ?2
             AND relationship_type = ?3"
        ))?;
        Ok(stmt
            .query_row(
                params![source_node_id, target_node_id, relationship_type.as_str()],
                row_to_edge,
            )
            .optional()?)
    }

    /// Edges touching a node, heaviest first
    pub fn list_edges_for_node(&self, node_id: &str) -> Result<Vec<KgEdge>> {
        let reader = self.reader()?;
        Self::list_edges_for_node_on(&reader, node_id)
    }

    pub(crate) fn list_edges_for_node_on(conn: &Connection, node_id: &str) -> Result<Vec<KgEdge>> {
        let mut stmt = conn.prepare(&format!(
            "{EDGE_SELECT} WHERE source_node_id = ?1 OR target_node_id = ?1
             ORDER BY normalized_weight DESC, id"
        ))?;
        let rows = stmt
            .query_map(params![node_id], row_to_edge)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub(crate) fn list_all_edges_on(conn: &Connection) -> Result<Vec<KgEdge>> {
        let mut stmt = conn.prepare(&format!("{EDGE_SELECT} ORDER BY id"))?;
        let rows = stmt
            .query_map([], row_to_edge)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Targeted edge update used by merge/normalize/evidence accumulation
    pub(crate) fn update_edge_on(conn: &Connection, edge: &KgEdge) -> Result<()> {
        conn.execute(
            "UPDATE knowledge_edges SET weight = ?1, normalized_weight = ?2,
                    evidence_count = ?3, contradiction_count = ?4,
                    document_ids = ?5, valid_from = ?6, valid_until = ?7,
                    metadata = ?8, updated_at = ?9
             WHERE id = ?10",
            params![
                edge.weight,
                edge.normalized_weight,
                edge.evidence_count,
                edge.contradiction_count,
                to_json_array(&edge.document_ids),
                edge.valid_from,
                edge.valid_until,
                edge.metadata_json,
                now_rfc3339(),
                edge.id,
            ],
        )?;
        Ok(())
    }

    /// Record contradicting evidence against an edge
    pub fn record_edge_contradiction(&self, edge_id: &str) -> Result<KgEdge> {
        {
            let writer = self.writer()?;
            let changed = writer.execute(
                "UPDATE knowledge_edges SET
                        contradiction_count = contradiction_count + 1,
                        updated_at = ?1
                 WHERE id = ?2",
                params![now_rfc3339(), edge_id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("knowledge edge {edge_id}")));
            }
        }
        self.get_edge(edge_id)
    }

    pub(crate) fn delete_edge_on(conn: &Connection, edge_id: &str) -> Result<()> {
        conn.execute(
            "DELETE FROM knowledge_edges WHERE id = ?1",
            params![edge_id],
        )?;
        Ok(())
    }
}

// ============================================================================
// ROW CONVERTERS
// ============================================================================

const NODE_SELECT: &str = "SELECT id, entity_type, canonical_name, normalized_name, aliases,
        document_count, mention_count, edge_count, avg_confidence,
        importance_score, metadata, provenance_id, created_at, updated_at FROM knowledge_nodes";

const LINK_SELECT: &str = "SELECT id, node_id, entity_id, document_id, similarity, method,
        created_at FROM node_entity_links";

const EDGE_SELECT: &str = "SELECT id, source_node_id, target_node_id, relationship_type, weight,
        normalized_weight, evidence_count, contradiction_count, document_ids,
        valid_from, valid_until, metadata, provenance_id, created_at, updated_at
        FROM knowledge_edges";

pub(crate) fn row_to_node(row: &rusqlite::Row) -> rusqlite::Result<KgNode> {
    let type_str: String = row.get(1)?;
    let entity_type = EntityType::parse_name(&type_str)
        .ok_or_else(|| invalid_enum_error(1, "entity type", &type_str))?;
    let aliases: String = row.get(4)?;

    Ok(KgNode {
        id: row.get(0)?,
        entity_type,
        canonical_name: row.get(2)?,
        normalized_name: row.get(3)?,
        aliases: from_json_array(&aliases),
        document_count: row.get(5)?,
        mention_count: row.get(6)?,
        edge_count: row.get(7)?,
        avg_confidence: row.get(8)?,
        importance_score: row.get(9)?,
        metadata_json: row.get(10)?,
        provenance_id: row.get(11)?,
        created_at: parse_timestamp_col(row, 12)?,
        updated_at: parse_timestamp_col(row, 13)?,
    })
}

fn row_to_link(row: &rusqlite::Row) -> rusqlite::Result<NodeEntityLink> {
    let method_str: String = row.get(5)?;
    let method = ResolutionMethod::parse_name(&method_str)
        .ok_or_else(|| invalid_enum_error(5, "resolution method", &method_str))?;

    Ok(NodeEntityLink {
        id: row.get(0)?,
        node_id: row.get(1)?,
        entity_id: row.get(2)?,
        document_id: row.get(3)?,
        similarity: row.get(4)?,
        method,
        created_at: parse_timestamp_col(row, 6)?,
    })
}

pub(crate) fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<KgEdge> {
    let type_str: String = row.get(3)?;
    let relationship_type = RelationshipType::parse_name(&type_str)
        .ok_or_else(|| invalid_enum_error(3, "relationship type", &type_str))?;
    let document_ids: String = row.get(8)?;

    Ok(KgEdge {
        id: row.get(0)?,
        source_node_id: row.get(1)?,
        target_node_id: row.get(2)?,
        relationship_type,
        weight: row.get(4)?,
        normalized_weight: row.get(5)?,
        evidence_count: row.get(6)?,
        contradiction_count: row.get(7)?,
        document_ids: from_json_array(&document_ids),
        valid_from: row.get(9)?,
        valid_until: row.get(10)?,
        metadata_json: row.get(11)?,
        provenance_id: row.get(12)?,
        created_at: parse_timestamp_col(row, 13)?,
        updated_at: parse_timestamp_col(row, 14)?,
    })
}
