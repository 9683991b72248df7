//! Text Entity Search
//!
//! Normalized LIKE match across per-document entities, with each hit
//! enriched by its knowledge-graph node (when resolved) and that node's
//! top connected neighbors.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::extraction::normalize_text;
use crate::model::{Entity, EntityType, RelationshipType};
use crate::storage::Store;

/// Neighbors reported per enriched hit
const NEIGHBOR_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySearchOptions {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_ids: Option<Vec<String>>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborSummary {
    pub node_id: String,
    pub canonical_name: String,
    pub relationship_type: RelationshipType,
    pub normalized_weight: f64,
}

/// Knowledge-graph context attached to a hit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KgEnrichment {
    pub node_id: String,
    pub canonical_name: String,
    pub aliases: Vec<String>,
    pub document_count: i64,
    pub edge_count: i64,
    pub neighbors: Vec<NeighborSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityHit {
    pub entity: Entity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kg: Option<KgEnrichment>,
}

/// LIKE search over normalized entity text
pub fn search_entities(store: &Store, options: &EntitySearchOptions) -> Result<Vec<EntityHit>> {
    let normalized = normalize_text(&options.query);
    if normalized.is_empty() {
        return Err(StoreError::InputInvalid("query must not be empty".into()));
    }
    let pattern = format!("%{}%", normalized.replace('%', "").replace('_', " "));

    let entities: Vec<Entity> = {
        let reader = store.reader()?;
        let ids: Vec<String> = match options.entity_type {
            Some(ty) => {
                let mut stmt = reader.prepare(
                    "SELECT id FROM entities
                     WHERE normalized_text LIKE ?1 AND entity_type = ?2
                     ORDER BY confidence DESC, normalized_text LIMIT ?3",
                )?;
                let ids = stmt
                    .query_map(
                        rusqlite::params![pattern, ty.as_str(), options.limit as i64],
                        |row| row.get(0),
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                ids
            }
            None => {
                let mut stmt = reader.prepare(
                    "SELECT id FROM entities
                     WHERE normalized_text LIKE ?1
                     ORDER BY confidence DESC, normalized_text LIMIT ?2",
                )?;
                let ids = stmt
                    .query_map(rusqlite::params![pattern, options.limit as i64], |row| {
                        row.get(0)
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                ids
            }
        };
        drop(reader);

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(store.get_entity(&id)?);
        }
        out
    };

    let mut hits = Vec::with_capacity(entities.len());
    for entity in entities {
        if let Some(filter) = &options.document_ids {
            if !filter.contains(&entity.document_id) {
                continue;
            }
        }

        let kg = match store.find_node_for_entity(&entity.id)? {
            Some(node) => {
                let mut neighbors = Vec::new();
                for edge in store.list_edges_for_node(&node.id)? {
                    if neighbors.len() >= NEIGHBOR_LIMIT {
                        break;
                    }
                    let other_id = if edge.source_node_id == node.id {
                        &edge.target_node_id
                    } else {
                        &edge.source_node_id
                    };
                    let other = store.get_node(other_id)?;
                    neighbors.push(NeighborSummary {
                        node_id: other.id,
                        canonical_name: other.canonical_name,
                        relationship_type: edge.relationship_type,
                        normalized_weight: edge.normalized_weight,
                    });
                }
                Some(KgEnrichment {
                    node_id: node.id,
                    canonical_name: node.canonical_name,
                    aliases: node.aliases,
                    document_count: node.document_count,
                    edge_count: node.edge_count,
                    neighbors,
                })
            }
            None => None,
        };

        hits.push(EntityHit { entity, kg });
    }

    Ok(hits)
}
