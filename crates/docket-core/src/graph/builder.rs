//! Graph Construction
//!
//! Full build clears every node, link, and edge and reconstructs from the
//! stored entities and raw relationships. Incremental build re-resolves one
//! document set against the surviving graph, creating nodes only where no
//! match exists. Both end with the same edge construction.

use std::collections::{HashMap, HashSet};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::resolve::{find_match, ResolutionOracle};
use crate::error::{Result, StoreError};
use crate::extraction::normalized_edge_weight;
use crate::hash;
use crate::model::{
    KgEdge, NewProvenance, ProvenanceType, ResolutionMethod, SourceType,
};
use crate::storage::{NewEdgeRow, NewNodeRow, Store};

/// How entities are matched to existing nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Exact,
    Fuzzy,
    Ai,
}

impl BuildMode {
    fn creation_method(self) -> ResolutionMethod {
        match self {
            BuildMode::Exact => ResolutionMethod::Exact,
            BuildMode::Fuzzy => ResolutionMethod::Fuzzy,
            BuildMode::Ai => ResolutionMethod::Ai,
        }
    }
}

/// Outcome of a build pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub documents_processed: usize,
    pub nodes_created: usize,
    pub nodes_matched: usize,
    pub nodes_deleted: usize,
    pub links_created: usize,
    pub edges_created: usize,
    pub edges_updated: usize,
}

/// Knowledge-graph builder over one store
pub struct GraphBuilder<'a> {
    store: &'a Store,
    mode: BuildMode,
    resolver: Option<&'a dyn ResolutionOracle>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(store: &'a Store, mode: BuildMode) -> Self {
        Self {
            store,
            mode,
            resolver: None,
        }
    }

    /// Attach the disambiguation oracle required by `BuildMode::Ai`
    pub fn with_resolver(mut self, resolver: &'a dyn ResolutionOracle) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Clear the graph and reconstruct it from every stored entity and raw
    /// relationship.
    pub fn full_build(&self) -> Result<BuildReport> {
        if self.mode == BuildMode::Ai && self.resolver.is_none() {
            return Err(StoreError::InputInvalid(
                "ai build mode requires a resolution oracle".into(),
            ));
        }

        let mut report = BuildReport::default();
        let mut removed_node_ids: Vec<String> = Vec::new();
        let document_ids: Vec<String> = self
            .store
            .list_documents(None)?
            .into_iter()
            .map(|d| d.id)
            .collect();

        {
            let writer = self.store.writer()?;
            let tx = writer.unchecked_transaction()?;

            {
                let mut stmt = tx.prepare("SELECT id FROM knowledge_nodes")?;
                removed_node_ids = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
            }
            report.nodes_deleted = removed_node_ids.len();

            tx.execute("DELETE FROM knowledge_edges", [])?;
            tx.execute("DELETE FROM node_entity_links", [])?;
            tx.execute("DELETE FROM entity_embeddings", [])?;
            tx.execute("DELETE FROM knowledge_nodes", [])?;

            for document_id in &document_ids {
                self.build_document(&tx, document_id, &mut report)?;
                report.documents_processed += 1;
            }

            Store::refresh_metadata(&tx)?;
            tx.commit()?;
        }

        let mut index = self.store.entity_index()?;
        for id in &removed_node_ids {
            let _ = index.remove(id);
        }
        drop(index);

        tracing::info!(
            "Full graph build: {} documents, {} nodes created, {} edges",
            report.documents_processed,
            report.nodes_created,
            report.edges_created
        );
        Ok(report)
    }

    /// Re-resolve a document set against the existing graph. Nodes left
    /// with no links afterwards are deleted along with their edges.
    pub fn incremental_build(&self, document_ids: &[String]) -> Result<BuildReport> {
        if self.mode == BuildMode::Ai && self.resolver.is_none() {
            return Err(StoreError::InputInvalid(
                "ai build mode requires a resolution oracle".into(),
            ));
        }
        if document_ids.is_empty() {
            return Err(StoreError::InputInvalid(
                "incremental build requires at least one document".into(),
            ));
        }

        let mut report = BuildReport::default();
        let mut removed_node_ids: Vec<String> = Vec::new();

        {
            let writer = self.store.writer()?;
            let tx = writer.unchecked_transaction()?;

            for document_id in document_ids {
                Store::get_document_on(&tx, document_id)?
                    .ok_or_else(|| StoreError::NotFound(format!("document {document_id}")))?;
            }

            let mut previously_linked: HashSet<String> = HashSet::new();
            for document_id in document_ids {
                let mut stmt = tx.prepare(
                    "SELECT DISTINCT node_id FROM node_entity_links WHERE document_id = ?1",
                )?;
                let rows = stmt
                    .query_map([document_id.as_str()], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                previously_linked.extend(rows);
                tx.execute(
                    "DELETE FROM node_entity_links WHERE document_id = ?1",
                    [document_id.as_str()],
                )?;
            }

            // Nodes fed only by this doc set go away BEFORE re-resolution;
            // otherwise every entity exact-matches its own stale node and
            // fuzzy coalescing never gets a chance
            let mut survivors: Vec<String> = Vec::new();
            for node_id in &previously_linked {
                let remaining: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM node_entity_links WHERE node_id = ?1",
                    [node_id.as_str()],
                    |row| row.get(0),
                )?;
                if remaining == 0 {
                    for edge in Store::list_edges_for_node_on(&tx, node_id)? {
                        let other = if edge.source_node_id == *node_id {
                            edge.target_node_id.clone()
                        } else {
                            edge.source_node_id.clone()
                        };
                        Store::delete_edge_on(&tx, &edge.id)?;
                        Store::recompute_edge_count_on(&tx, &other)?;
                    }
                    Store::delete_node_on(&tx, node_id)?;
                    removed_node_ids.push(node_id.clone());
                    report.nodes_deleted += 1;
                } else {
                    survivors.push(node_id.clone());
                }
            }

            let mut relinked: HashSet<String> = HashSet::new();
            for document_id in document_ids {
                let linked = self.build_document(&tx, document_id, &mut report)?;
                relinked.extend(linked);
                report.documents_processed += 1;
            }

            for node_id in &survivors {
                if !relinked.contains(node_id) {
                    Store::recompute_node_stats_on(&tx, node_id)?;
                }
            }

            Store::refresh_metadata(&tx)?;
            tx.commit()?;
        }

        let mut index = self.store.entity_index()?;
        for id in &removed_node_ids {
            let _ = index.remove(id);
        }

        Ok(report)
    }

    /// Resolve one document's entities into nodes and rebuild its edges.
    /// Returns the node ids this document now links to.
    fn build_document(
        &self,
        tx: &Connection,
        document_id: &str,
        report: &mut BuildReport,
    ) -> Result<Vec<String>> {
        let document = Store::get_document_on(tx, document_id)?
            .ok_or_else(|| StoreError::NotFound(format!("document {document_id}")))?;

        let mut entity_nodes: HashMap<String, String> = HashMap::new();

        let entities = {
            let mut stmt = tx.prepare(
                "SELECT id FROM entities WHERE document_id = ?1 ORDER BY entity_type, normalized_text",
            )?;
            let ids = stmt
                .query_map([document_id], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            ids
        };

        for entity_id in entities {
            let entity = Store::get_entity_on(tx, &entity_id)?.ok_or_else(|| {
                StoreError::IntegrityViolation(format!("entity {entity_id} vanished mid-build"))
            })?;
            let mention_count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM entity_mentions WHERE entity_id = ?1",
                [entity_id.as_str()],
                |row| row.get(0),
            )?;

            let resolved = find_match(
                tx,
                entity.entity_type,
                &entity.normalized_text,
                self.mode,
                self.resolver,
            )?;

            let node_id = match resolved {
                Some((node, similarity, method)) => {
                    Store::insert_link_on(
                        tx,
                        &node.id,
                        &entity.id,
                        document_id,
                        similarity,
                        method,
                    )?;
                    Store::fold_name_into_node_on(tx, &node.id, &entity.raw_text, &entity.aliases)?;
                    Store::recompute_node_stats_on(tx, &node.id)?;
                    report.nodes_matched += 1;
                    node.id
                }
                None => {
                    let node_prov = Store::insert_provenance_on(
                        tx,
                        NewProvenance {
                            prov_type: ProvenanceType::KnowledgeGraph,
                            processor: "docket-core".into(),
                            processor_version: env!("CARGO_PKG_VERSION").into(),
                            parameters_json: None,
                            content_hash: hash::hash_json(&serde_json::json!({
                                "name": entity.raw_text,
                                "type": entity.entity_type.as_str(),
                            })),
                            input_hash: None,
                            source_id: Some(document.provenance_id.clone()),
                            source_type: Some(SourceType::Document),
                            parent_id: Some(document.provenance_id.clone()),
                            extra_parent_ids: Vec::new(),
                            root_document_id: None,
                        },
                    )?;
                    let node_id = Store::insert_node_on(
                        tx,
                        &NewNodeRow {
                            entity_type: entity.entity_type,
                            canonical_name: entity.raw_text.clone(),
                            normalized_name: entity.normalized_text.clone(),
                            aliases: entity.aliases.clone(),
                            document_count: 1,
                            mention_count: mention_count.max(1),
                            avg_confidence: entity.confidence,
                            metadata_json: None,
                            provenance_id: node_prov.id,
                        },
                    )?;
                    Store::insert_link_on(
                        tx,
                        &node_id,
                        &entity.id,
                        document_id,
                        1.0,
                        self.mode.creation_method(),
                    )?;
                    report.nodes_created += 1;
                    node_id
                }
            };
            report.links_created += 1;
            entity_nodes.insert(entity.id, node_id);
        }

        // Edge construction from the document's raw relationships
        let mut edge_touched: HashSet<String> = HashSet::new();
        for rel in Store::list_relationships_for_document_on(tx, document_id)? {
            let (Some(source), Some(target)) = (
                entity_nodes.get(&rel.source_entity_id),
                entity_nodes.get(&rel.target_entity_id),
            ) else {
                continue;
            };
            if source == target {
                continue;
            }
            let (a, b) = KgEdge::order_endpoints(source, target);
            edge_touched.insert(a.to_string());
            edge_touched.insert(b.to_string());

            match Store::find_edge_on(tx, a, b, rel.relationship_type)? {
                Some(mut edge) => {
                    edge.weight = edge.weight.max(rel.confidence);
                    if !edge.document_ids.iter().any(|d| d == document_id) {
                        edge.document_ids.push(document_id.to_string());
                        edge.evidence_count += 1;
                    }
                    edge.normalized_weight =
                        normalized_edge_weight(edge.evidence_count, rel.relationship_type, None);
                    if edge.valid_from.is_none() {
                        edge.valid_from = rel.valid_from.clone();
                    }
                    if edge.valid_until.is_none() {
                        edge.valid_until = rel.valid_until.clone();
                    }
                    Store::update_edge_on(tx, &edge)?;
                    report.edges_updated += 1;
                }
                None => {
                    let edge_prov = Store::insert_provenance_on(
                        tx,
                        NewProvenance {
                            prov_type: ProvenanceType::KnowledgeGraph,
                            processor: "docket-core".into(),
                            processor_version: env!("CARGO_PKG_VERSION").into(),
                            parameters_json: None,
                            content_hash: hash::hash_json(&serde_json::json!({
                                "source": a,
                                "target": b,
                                "type": rel.relationship_type.as_str(),
                            })),
                            input_hash: None,
                            source_id: Some(document.provenance_id.clone()),
                            source_type: Some(SourceType::Document),
                            parent_id: Some(document.provenance_id.clone()),
                            extra_parent_ids: Vec::new(),
                            root_document_id: None,
                        },
                    )?;
                    Store::insert_edge_on(
                        tx,
                        &NewEdgeRow {
                            source_node_id: a.to_string(),
                            target_node_id: b.to_string(),
                            relationship_type: rel.relationship_type,
                            weight: rel.confidence,
                            normalized_weight: normalized_edge_weight(
                                1,
                                rel.relationship_type,
                                None,
                            ),
                            evidence_count: 1,
                            document_ids: vec![document_id.to_string()],
                            valid_from: rel.valid_from.clone(),
                            valid_until: rel.valid_until.clone(),
                            metadata_json: rel.evidence.as_deref().map(|e| {
                                hash::canonical_json(&serde_json::json!({ "evidence": [e] }))
                            }),
                            provenance_id: edge_prov.id,
                        },
                    )?;
                    report.edges_created += 1;
                }
            }
        }

        for node_id in &edge_touched {
            Store::recompute_edge_count_on(tx, node_id)?;
        }

        Ok(entity_nodes.into_values().collect())
    }
}
