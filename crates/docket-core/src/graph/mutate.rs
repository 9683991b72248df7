//! Graph Mutations: Merge, Split, Prune
//!
//! All three run inside one transaction and leave the denormalized node
//! counters correct on every node they touch.

use std::collections::{BTreeMap, HashSet};

use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::extraction::normalized_edge_weight;
use crate::hash;
use crate::model::{
    KgEdge, KgNode, NewProvenance, ProvenanceType, RelationshipType, SourceType,
};
use crate::storage::Store;

// ============================================================================
// MERGE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub target: KgNode,
    pub links_moved: usize,
    pub edges_merged: usize,
    pub edges_repointed: usize,
    pub edges_deleted: usize,
}

/// Merge `source` into `target`: links move, aliases union, edges re-point
/// (or combine with an existing parallel edge), the source node disappears.
pub fn merge_nodes(store: &Store, source_id: &str, target_id: &str) -> Result<MergeReport> {
    if source_id == target_id {
        return Err(StoreError::InputInvalid(
            "cannot merge a node into itself".into(),
        ));
    }

    let report;
    {
        let writer = store.writer()?;
        let tx = writer.unchecked_transaction()?;

        let source = Store::get_node_on(&tx, source_id)?
            .ok_or_else(|| StoreError::NotFound(format!("knowledge node {source_id}")))?;
        let target = Store::get_node_on(&tx, target_id)?
            .ok_or_else(|| StoreError::NotFound(format!("knowledge node {target_id}")))?;
        if source.entity_type != target.entity_type {
            return Err(StoreError::InputInvalid(format!(
                "cannot merge {} node into {} node",
                source.entity_type, target.entity_type
            )));
        }

        // 1. Move every link
        let links_moved = tx.execute(
            "UPDATE node_entity_links SET node_id = ?1 WHERE node_id = ?2",
            params![target_id, source_id],
        )?;

        // 2. Alias union: source's canonical and aliases fold into target
        {
            let mut aliases = target.aliases.clone();
            for candidate in std::iter::once(&source.canonical_name).chain(source.aliases.iter()) {
                if *candidate != target.canonical_name && !aliases.contains(candidate) {
                    aliases.push(candidate.clone());
                }
            }
            aliases.retain(|a| *a != target.canonical_name);
            tx.execute(
                "UPDATE knowledge_nodes SET aliases = ?1, updated_at = ?2 WHERE id = ?3",
                params![
                    serde_json::to_string(&aliases)?,
                    crate::storage::now_rfc3339(),
                    target_id
                ],
            )?;
        }

        // 3. Counters from the new link set
        Store::recompute_node_stats_on(&tx, target_id)?;

        // 4. Edges attached to source
        let mut edges_merged = 0;
        let mut edges_repointed = 0;
        let mut edges_deleted = 0;
        let mut touched: HashSet<String> = HashSet::new();

        for edge in Store::list_edges_for_node_on(&tx, source_id)? {
            let other = if edge.source_node_id == source_id {
                edge.target_node_id.clone()
            } else {
                edge.source_node_id.clone()
            };

            if other == target_id {
                // Would become a self-loop
                Store::delete_edge_on(&tx, &edge.id)?;
                edges_deleted += 1;
                continue;
            }
            touched.insert(other.clone());

            let (a, b) = KgEdge::order_endpoints(target_id, &other);
            match Store::find_edge_on(&tx, a, b, edge.relationship_type)? {
                Some(mut existing) if existing.id != edge.id => {
                    existing.weight = existing.weight.max(edge.weight);
                    existing.evidence_count += edge.evidence_count;
                    for doc in &edge.document_ids {
                        if !existing.document_ids.contains(doc) {
                            existing.document_ids.push(doc.clone());
                        }
                    }
                    existing.contradiction_count += edge.contradiction_count;
                    existing.normalized_weight = normalized_edge_weight(
                        existing.evidence_count,
                        existing.relationship_type,
                        None,
                    );
                    Store::update_edge_on(&tx, &existing)?;
                    Store::delete_edge_on(&tx, &edge.id)?;
                    edges_merged += 1;
                }
                _ => {
                    tx.execute(
                        "UPDATE knowledge_edges SET source_node_id = ?1, target_node_id = ?2,
                                updated_at = ?3
                         WHERE id = ?4",
                        params![a, b, crate::storage::now_rfc3339(), edge.id],
                    )?;
                    edges_repointed += 1;
                }
            }
        }

        // 5. Edge counters from the actual edge table
        Store::recompute_edge_count_on(&tx, target_id)?;
        for node_id in &touched {
            Store::recompute_edge_count_on(&tx, node_id)?;
        }

        // 6. Source node goes; its provenance follows when nothing else
        //    references it
        Store::delete_node_on(&tx, source_id)?;
        delete_provenance_if_unreferenced(&tx, &source.provenance_id)?;

        Store::refresh_metadata(&tx)?;

        let merged_target = Store::get_node_on(&tx, target_id)?.ok_or_else(|| {
            StoreError::IntegrityViolation(format!("target node {target_id} vanished mid-merge"))
        })?;
        tx.commit()?;

        report = MergeReport {
            target: merged_target,
            links_moved,
            edges_merged,
            edges_repointed,
            edges_deleted,
        };
    }

    {
        let mut index = store.entity_index()?;
        let _ = index.remove(source_id);
    }

    tracing::info!(
        "Merged node {} into {}: {} links moved, {} edges merged",
        source_id,
        target_id,
        report.links_moved,
        report.edges_merged
    );
    Ok(report)
}

/// Drop a provenance row when no artifact or child chain references it
fn delete_provenance_if_unreferenced(
    tx: &rusqlite::Connection,
    provenance_id: &str,
) -> Result<()> {
    const REFERRERS: &[&str] = &[
        "documents",
        "ocr_results",
        "chunks",
        "images",
        "extractions",
        "form_fills",
        "comparisons",
        "embeddings",
        "entities",
        "knowledge_nodes",
        "knowledge_edges",
    ];
    for table in REFERRERS {
        let count: i64 = tx.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE provenance_id = ?1"),
            params![provenance_id],
            |row| row.get(0),
        )?;
        if count > 0 {
            return Ok(());
        }
    }
    let children: i64 = tx.query_row(
        "SELECT COUNT(*) FROM provenance WHERE parent_id = ?1 OR source_id = ?1",
        params![provenance_id],
        |row| row.get(0),
    )?;
    if children > 0 {
        return Ok(());
    }
    tx.execute(
        "DELETE FROM provenance WHERE id = ?1",
        params![provenance_id],
    )?;
    Ok(())
}

// ============================================================================
// SPLIT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitReport {
    pub original: KgNode,
    pub new_node: KgNode,
    pub entities_moved: usize,
}

/// Split a set of linked entities out of a node into a new node. The new
/// node's canonical name comes from the highest-confidence moved entity and
/// its provenance records the split under the original node's chain.
pub fn split_node(
    store: &Store,
    node_id: &str,
    entity_ids_to_move: &[String],
) -> Result<SplitReport> {
    if entity_ids_to_move.is_empty() {
        return Err(StoreError::InputInvalid(
            "split requires at least one entity to move".into(),
        ));
    }

    let report = {
        let writer = store.writer()?;
        let tx = writer.unchecked_transaction()?;

        let original = Store::get_node_on(&tx, node_id)?
            .ok_or_else(|| StoreError::NotFound(format!("knowledge node {node_id}")))?;

        let links = Store::list_links_for_node_on(&tx, node_id)?;
        let linked: HashSet<&str> = links.iter().map(|l| l.entity_id.as_str()).collect();
        for entity_id in entity_ids_to_move {
            if !linked.contains(entity_id.as_str()) {
                return Err(StoreError::InputInvalid(format!(
                    "entity {entity_id} is not linked to node {node_id}"
                )));
            }
        }
        if entity_ids_to_move.len() >= links.len() {
            return Err(StoreError::InputInvalid(
                "split must leave at least one entity on the original node".into(),
            ));
        }

        // Canonical for the new node: highest confidence, then longest raw
        // text, then lexicographic
        let mut moved_entities = Vec::with_capacity(entity_ids_to_move.len());
        for entity_id in entity_ids_to_move {
            let entity = Store::get_entity_on(&tx, entity_id)?
                .ok_or_else(|| StoreError::NotFound(format!("entity {entity_id}")))?;
            moved_entities.push(entity);
        }
        moved_entities.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.raw_text.chars().count().cmp(&a.raw_text.chars().count()))
                .then_with(|| a.raw_text.cmp(&b.raw_text))
        });
        let winner = &moved_entities[0];

        let split_prov = Store::insert_provenance_on(
            &tx,
            NewProvenance {
                prov_type: ProvenanceType::KnowledgeGraph,
                processor: "docket-core".into(),
                processor_version: env!("CARGO_PKG_VERSION").into(),
                parameters_json: Some(hash::canonical_json(&serde_json::json!({
                    "split_from": original.id,
                    "entities_moved": entity_ids_to_move.len(),
                }))),
                content_hash: hash::hash_json(&serde_json::json!({
                    "name": winner.raw_text,
                    "type": winner.entity_type.as_str(),
                })),
                input_hash: None,
                source_id: Some(original.provenance_id.clone()),
                source_type: Some(SourceType::KgNode),
                parent_id: Some(original.provenance_id.clone()),
                extra_parent_ids: Vec::new(),
                root_document_id: None,
            },
        )?;

        let mut aliases: Vec<String> = Vec::new();
        for entity in &moved_entities {
            if entity.raw_text != winner.raw_text && !aliases.contains(&entity.raw_text) {
                aliases.push(entity.raw_text.clone());
            }
            for alias in &entity.aliases {
                if *alias != winner.raw_text && !aliases.contains(alias) {
                    aliases.push(alias.clone());
                }
            }
        }

        let new_node_id = Store::insert_node_on(
            &tx,
            &crate::storage::NewNodeRow {
                entity_type: winner.entity_type,
                canonical_name: winner.raw_text.clone(),
                normalized_name: winner.normalized_text.clone(),
                aliases,
                document_count: 0,
                mention_count: 0,
                avg_confidence: winner.confidence,
                metadata_json: None,
                provenance_id: split_prov.id,
            },
        )?;

        for entity_id in entity_ids_to_move {
            tx.execute(
                "UPDATE node_entity_links SET node_id = ?1
                 WHERE node_id = ?2 AND entity_id = ?3",
                params![new_node_id, node_id, entity_id],
            )?;
        }

        Store::recompute_node_stats_on(&tx, node_id)?;
        Store::recompute_node_stats_on(&tx, &new_node_id)?;
        Store::recompute_edge_count_on(&tx, &new_node_id)?;
        Store::refresh_metadata(&tx)?;

        let original_after = Store::get_node_on(&tx, node_id)?.ok_or_else(|| {
            StoreError::IntegrityViolation(format!("node {node_id} vanished mid-split"))
        })?;
        let new_node = Store::get_node_on(&tx, &new_node_id)?.ok_or_else(|| {
            StoreError::IntegrityViolation(format!("new node {new_node_id} vanished mid-split"))
        })?;
        tx.commit()?;

        SplitReport {
            original: original_after,
            new_node,
            entities_moved: entity_ids_to_move.len(),
        }
    };

    tracing::info!(
        "Split {} entities out of node {} into {}",
        report.entities_moved,
        node_id,
        report.new_node.id
    );
    Ok(report)
}

// ============================================================================
// PRUNE
// ============================================================================

/// Prune criteria; at least one of the thresholds must be set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_evidence: Option<i64>,
    /// Restrict to these relationship types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_types: Option<Vec<RelationshipType>>,
    #[serde(default)]
    pub dry_run: bool,
    /// Required for the destructive path
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneSample {
    pub edge_id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    pub relationship_type: RelationshipType,
    pub normalized_weight: f64,
    pub evidence_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrunePreview {
    /// Matched (dry run) or deleted (confirmed) edge count
    pub count: usize,
    pub by_type: BTreeMap<RelationshipType, usize>,
    /// Up to 20 matched edges
    pub samples: Vec<PruneSample>,
    pub deleted: bool,
}

/// Remove weak edges: `normalized_weight < min_weight` OR `evidence_count <
/// min_evidence`, optionally restricted by type. Dry-run previews; the
/// destructive path requires `confirm`.
pub fn prune_edges(store: &Store, options: &PruneOptions) -> Result<PrunePreview> {
    if options.min_weight.is_none() && options.min_evidence.is_none() {
        return Err(StoreError::InputInvalid(
            "prune requires min_weight and/or min_evidence".into(),
        ));
    }
    if !options.dry_run && !options.confirm {
        return Err(StoreError::InputInvalid(
            "destructive prune requires confirm=true".into(),
        ));
    }

    let writer = store.writer()?;
    let tx = writer.unchecked_transaction()?;

    let mut matched: Vec<KgEdge> = Vec::new();
    for edge in Store::list_all_edges_on(&tx)? {
        if let Some(types) = &options.relationship_types {
            if !types.contains(&edge.relationship_type) {
                continue;
            }
        }
        let below_weight = options
            .min_weight
            .map(|w| edge.normalized_weight < w)
            .unwrap_or(false);
        let below_evidence = options
            .min_evidence
            .map(|e| edge.evidence_count < e)
            .unwrap_or(false);
        if below_weight || below_evidence {
            matched.push(edge);
        }
    }

    let mut by_type: BTreeMap<RelationshipType, usize> = BTreeMap::new();
    for edge in &matched {
        *by_type.entry(edge.relationship_type).or_insert(0) += 1;
    }
    let samples: Vec<PruneSample> = matched
        .iter()
        .take(20)
        .map(|edge| PruneSample {
            edge_id: edge.id.clone(),
            source_node_id: edge.source_node_id.clone(),
            target_node_id: edge.target_node_id.clone(),
            relationship_type: edge.relationship_type,
            normalized_weight: edge.normalized_weight,
            evidence_count: edge.evidence_count,
        })
        .collect();

    if options.dry_run {
        // Read-only pass; nothing to commit
        return Ok(PrunePreview {
            count: matched.len(),
            by_type,
            samples,
            deleted: false,
        });
    }

    let mut touched: HashSet<String> = HashSet::new();
    for edge in &matched {
        touched.insert(edge.source_node_id.clone());
        touched.insert(edge.target_node_id.clone());
        Store::delete_edge_on(&tx, &edge.id)?;
    }
    for node_id in &touched {
        Store::recompute_edge_count_on(&tx, node_id)?;
    }
    Store::refresh_metadata(&tx)?;
    tx.commit()?;

    tracing::info!("Pruned {} edges", matched.len());
    Ok(PrunePreview {
        count: matched.len(),
        by_type,
        samples,
        deleted: true,
    })
}
