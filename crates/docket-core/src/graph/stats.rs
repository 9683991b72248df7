//! Graph Statistics

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{EntityType, RelationshipType};
use crate::storage::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopNode {
    pub node_id: String,
    pub canonical_name: String,
    pub entity_type: EntityType,
    pub edge_count: i64,
    pub mention_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub node_count: i64,
    pub edge_count: i64,
    pub nodes_by_type: BTreeMap<EntityType, i64>,
    pub edges_by_type: BTreeMap<RelationshipType, i64>,
    pub top_connected: Vec<TopNode>,
    pub avg_edges_per_node: f64,
}

/// Totals, per-type histograms, and the most connected nodes
pub fn graph_stats(store: &Store, top_limit: usize) -> Result<GraphStats> {
    let reader = store.reader()?;

    let node_count: i64 =
        reader.query_row("SELECT COUNT(*) FROM knowledge_nodes", [], |row| row.get(0))?;
    let edge_count: i64 =
        reader.query_row("SELECT COUNT(*) FROM knowledge_edges", [], |row| row.get(0))?;

    let mut nodes_by_type = BTreeMap::new();
    {
        let mut stmt = reader
            .prepare("SELECT entity_type, COUNT(*) FROM knowledge_nodes GROUP BY entity_type")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (type_str, count) = row?;
            if let Some(entity_type) = EntityType::parse_name(&type_str) {
                nodes_by_type.insert(entity_type, count);
            }
        }
    }

    let mut edges_by_type = BTreeMap::new();
    {
        let mut stmt = reader.prepare(
            "SELECT relationship_type, COUNT(*) FROM knowledge_edges GROUP BY relationship_type",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (type_str, count) = row?;
            if let Some(relationship_type) = RelationshipType::parse_name(&type_str) {
                edges_by_type.insert(relationship_type, count);
            }
        }
    }

    let top_connected = {
        let mut stmt = reader.prepare(
            "SELECT id, canonical_name, entity_type, edge_count, mention_count
             FROM knowledge_nodes
             ORDER BY edge_count DESC, mention_count DESC, id
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([top_limit as i64], |row| {
                let type_str: String = row.get(2)?;
                let entity_type = EntityType::parse_name(&type_str).unwrap_or(EntityType::Other);
                Ok(TopNode {
                    node_id: row.get(0)?,
                    canonical_name: row.get(1)?,
                    entity_type,
                    edge_count: row.get(3)?,
                    mention_count: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    let avg_edges_per_node: f64 = reader.query_row(
        "SELECT COALESCE(AVG(edge_count), 0.0) FROM knowledge_nodes",
        [],
        |row| row.get(0),
    )?;

    Ok(GraphStats {
        node_count,
        edge_count,
        nodes_by_type,
        edges_by_type,
        top_connected,
        avg_edges_per_node,
    })
}
