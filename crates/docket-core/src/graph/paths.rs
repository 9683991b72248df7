//! Path-Finding
//!
//! BFS over the undirected projection of the edge table, returning all
//! shortest paths between two nodes. Neighbor expansion follows decreasing
//! normalized weight, so path enumeration order is heaviest-evidence first.
//! Edges can be filtered by relationship type and by temporal validity
//! before traversal.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::model::{KgEdge, KgNode, RelationshipType};
use crate::storage::Store;

/// Hop ceiling; requests above this clamp down
pub const MAX_HOPS: usize = 6;

/// Evidence chunks fetched per edge by default
const DEFAULT_EVIDENCE_LIMIT: usize = 3;

/// Inclusive ISO-date query window. An edge passes when its validity
/// interval intersects the window; edges without temporal bounds always
/// pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathOptions {
    /// Maximum path length in hops (clamped to [`MAX_HOPS`])
    pub max_hops: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_types: Option<Vec<RelationshipType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub include_evidence_chunks: bool,
    #[serde(default)]
    pub include_contradictions: bool,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            max_hops: MAX_HOPS,
            relationship_types: None,
            time_range: None,
            include_evidence_chunks: false,
            include_contradictions: false,
        }
    }
}

/// A chunk whose text mentions one of an edge's endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkEvidence {
    pub chunk_id: String,
    pub document_id: String,
    pub page_number: Option<i64>,
    pub excerpt: String,
}

/// One edge along a returned path
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathEdge {
    pub edge: KgEdge,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_chunks: Vec<ChunkEvidence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contradiction_count: Option<i64>,
}

/// An ordered node/edge sequence from start to end
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathResult {
    pub nodes: Vec<KgNode>,
    pub edges: Vec<PathEdge>,
    pub hops: usize,
}

/// All shortest paths between two nodes, or empty when none exists within
/// the hop budget.
pub fn find_paths(
    store: &Store,
    start_node_id: &str,
    end_node_id: &str,
    options: &PathOptions,
) -> Result<Vec<PathResult>> {
    let start = store.get_node(start_node_id)?;
    let end = store.get_node(end_node_id)?;
    if start.id == end.id {
        return Err(StoreError::InputInvalid(
            "path endpoints must differ".into(),
        ));
    }
    let max_hops = options.max_hops.clamp(1, MAX_HOPS);

    // Load and filter the edge set once, then traverse in memory
    let edges: Vec<KgEdge> = {
        let reader = store.reader()?;
        Store::list_all_edges_on(&reader)?
            .into_iter()
            .filter(|edge| edge_passes(edge, options))
            .collect()
    };

    let mut adjacency: HashMap<&str, Vec<(usize, &str)>> = HashMap::new();
    for (i, edge) in edges.iter().enumerate() {
        adjacency
            .entry(edge.source_node_id.as_str())
            .or_default()
            .push((i, edge.target_node_id.as_str()));
        adjacency
            .entry(edge.target_node_id.as_str())
            .or_default()
            .push((i, edge.source_node_id.as_str()));
    }
    for neighbors in adjacency.values_mut() {
        neighbors.sort_by(|(a, _), (b, _)| {
            edges[*b]
                .normalized_weight
                .partial_cmp(&edges[*a].normalized_weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| edges[*a].id.cmp(&edges[*b].id))
        });
    }

    // Layered BFS keeping every shortest predecessor
    let mut depth: HashMap<&str, usize> = HashMap::new();
    let mut predecessors: HashMap<&str, Vec<(&str, usize)>> = HashMap::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    depth.insert(start.id.as_str(), 0);
    queue.push_back(start.id.as_str());

    while let Some(current) = queue.pop_front() {
        let current_depth = depth[current];
        if current_depth >= max_hops {
            continue;
        }
        let Some(neighbors) = adjacency.get(current) else {
            continue;
        };
        for &(edge_idx, neighbor) in neighbors {
            match depth.get(neighbor) {
                None => {
                    depth.insert(neighbor, current_depth + 1);
                    predecessors
                        .entry(neighbor)
                        .or_default()
                        .push((current, edge_idx));
                    queue.push_back(neighbor);
                }
                Some(&d) if d == current_depth + 1 => {
                    predecessors
                        .entry(neighbor)
                        .or_default()
                        .push((current, edge_idx));
                }
                Some(_) => {}
            }
        }
    }

    if !depth.contains_key(end.id.as_str()) {
        return Ok(Vec::new());
    }

    // Walk predecessor lists backwards to enumerate every shortest path
    let mut raw_paths: Vec<Vec<(String, Option<usize>)>> = Vec::new();
    let mut stack: Vec<Vec<(&str, Option<usize>)>> = vec![vec![(end.id.as_str(), None)]];
    while let Some(partial) = stack.pop() {
        let (head, _) = partial[partial.len() - 1];
        if head == start.id.as_str() {
            let mut path: Vec<(String, Option<usize>)> = partial
                .iter()
                .map(|(node, edge)| (node.to_string(), *edge))
                .collect();
            path.reverse();
            raw_paths.push(path);
            continue;
        }
        if let Some(preds) = predecessors.get(head) {
            for &(pred, edge_idx) in preds {
                let mut extended = partial.clone();
                let last = extended.len() - 1;
                extended[last].1 = Some(edge_idx);
                extended.push((pred, None));
                stack.push(extended);
            }
        }
    }

    let mut results = Vec::with_capacity(raw_paths.len());
    for raw in raw_paths {
        let mut nodes = Vec::with_capacity(raw.len());
        let mut path_edges = Vec::with_capacity(raw.len().saturating_sub(1));
        for (node_id, edge_idx) in &raw {
            nodes.push(store.get_node(node_id)?);
            if let Some(edge_idx) = edge_idx {
                let edge = edges[*edge_idx].clone();
                let evidence_chunks = if options.include_evidence_chunks {
                    evidence_for_edge(store, &edge)?
                } else {
                    Vec::new()
                };
                let contradiction_count = options
                    .include_contradictions
                    .then_some(edge.contradiction_count);
                path_edges.push(PathEdge {
                    edge,
                    evidence_chunks,
                    contradiction_count,
                });
            }
        }
        let hops = path_edges.len();
        results.push(PathResult {
            nodes,
            edges: path_edges,
            hops,
        });
    }

    Ok(results)
}

fn edge_passes(edge: &KgEdge, options: &PathOptions) -> bool {
    if let Some(types) = &options.relationship_types {
        if !types.contains(&edge.relationship_type) {
            return false;
        }
    }
    if let Some(range) = &options.time_range {
        // ISO dates compare lexicographically
        if let (Some(from), Some(valid_until)) = (&range.from, &edge.valid_until) {
            if valid_until < from {
                return false;
            }
        }
        if let (Some(until), Some(valid_from)) = (&range.until, &edge.valid_from) {
            if valid_from > until {
                return false;
            }
        }
    }
    true
}

/// Up to K chunks whose text mentions either endpoint's canonical name
fn evidence_for_edge(store: &Store, edge: &KgEdge) -> Result<Vec<ChunkEvidence>> {
    let source = store.get_node(&edge.source_node_id)?;
    let target = store.get_node(&edge.target_node_id)?;

    let reader = store.reader()?;
    let mut stmt = reader.prepare(
        "SELECT id, document_id, page_number, text FROM chunks
         WHERE text LIKE ?1 OR text LIKE ?2
         ORDER BY document_id, chunk_index
         LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(
            rusqlite::params![
                format!("%{}%", source.canonical_name),
                format!("%{}%", target.canonical_name),
                DEFAULT_EVIDENCE_LIMIT as i64,
            ],
            |row| {
                let text: String = row.get(3)?;
                Ok(ChunkEvidence {
                    chunk_id: row.get(0)?,
                    document_id: row.get(1)?,
                    page_number: row.get(2)?,
                    excerpt: text.chars().take(200).collect(),
                })
            },
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
