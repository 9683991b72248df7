//! Document Cascade Delete
//!
//! One transaction, fixed order, because the FK graph constrains it:
//! embeddings go before chunks/images/extractions, mentions and links go
//! before entities and chunks, the document row goes before its provenance,
//! and provenance rows fall in descending chain_depth so the
//! self-referential parent/source FKs stay satisfied at every step.

use std::collections::HashSet;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use super::{from_json_array, to_json_array, Store};
use crate::error::{Result, StoreError};
use crate::model::ORPHANED_ROOT;

/// What a cascade delete removed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeDeleteReport {
    pub document_id: String,
    pub embeddings_deleted: usize,
    pub mentions_deleted: usize,
    pub chunks_deleted: usize,
    pub entities_deleted: usize,
    pub nodes_deleted: usize,
    pub nodes_kept: usize,
    pub edges_deleted: usize,
    pub provenance_deleted: usize,
}

impl Store {
    /// Delete a document and every artifact derived from it.
    ///
    /// Knowledge-graph nodes that other documents still link to survive with
    /// decremented counters; their provenance is re-parented under the
    /// `ORPHANED_ROOT` sentinel. Any failure rolls the whole transaction
    /// back.
    pub fn delete_document(&self, document_id: &str) -> Result<CascadeDeleteReport> {
        let mut removed_embedding_ids: Vec<String> = Vec::new();
        let mut removed_node_ids: Vec<String> = Vec::new();

        let report = {
            let writer = self.writer()?;
            let tx = writer.unchecked_transaction()?;

            Self::get_document_on(&tx, document_id)?
                .ok_or_else(|| StoreError::NotFound(format!("document {document_id}")))?;

            // Nodes this document contributed to, captured before links go
            let affected_nodes: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT DISTINCT node_id FROM node_entity_links WHERE document_id = ?1",
                )?;
                let rows = stmt
                    .query_map(params![document_id], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                rows
            };

            // 1. Embeddings: index entries go after commit, rows go now
            {
                let mut stmt =
                    tx.prepare("SELECT id FROM embeddings WHERE document_id = ?1")?;
                removed_embedding_ids = stmt
                    .query_map(params![document_id], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
            }
            let embeddings_deleted = tx.execute(
                "DELETE FROM embeddings WHERE document_id = ?1",
                params![document_id],
            )?;

            // 2. Mentions before chunks (mentions reference chunk ids), and
            //    links before entities
            let mentions_deleted = tx.execute(
                "DELETE FROM entity_mentions WHERE document_id = ?1",
                params![document_id],
            )?;
            tx.execute(
                "DELETE FROM entity_relationships WHERE document_id = ?1",
                params![document_id],
            )?;
            tx.execute(
                "DELETE FROM node_entity_links WHERE document_id = ?1",
                params![document_id],
            )?;

            // 3. Per-document artifact tables
            let chunks_deleted = tx.execute(
                "DELETE FROM chunks WHERE document_id = ?1",
                params![document_id],
            )?;
            tx.execute(
                "DELETE FROM ocr_results WHERE document_id = ?1",
                params![document_id],
            )?;
            let entities_deleted = tx.execute(
                "DELETE FROM entities WHERE document_id = ?1",
                params![document_id],
            )?;
            tx.execute(
                "DELETE FROM images WHERE document_id = ?1",
                params![document_id],
            )?;
            tx.execute(
                "DELETE FROM extractions WHERE document_id = ?1",
                params![document_id],
            )?;
            tx.execute(
                "DELETE FROM form_fills WHERE document_id = ?1",
                params![document_id],
            )?;
            tx.execute(
                "DELETE FROM entity_extraction_segments WHERE document_id = ?1",
                params![document_id],
            )?;
            tx.execute(
                "DELETE FROM comparisons WHERE document_ids LIKE ?1",
                params![format!("%\"{}\"%", document_id)],
            )?;

            // 4. The document row itself
            tx.execute(
                "DELETE FROM documents WHERE id = ?1",
                params![document_id],
            )?;

            // 5. Knowledge-graph cleanup
            let (nodes_deleted, nodes_kept, edges_deleted, mut edge_touched) =
                Self::cleanup_graph_for_document(&tx, document_id, &affected_nodes,
                    &mut removed_node_ids)?;

            // Scrub the deleted document out of surviving edges; an edge
            // whose evidence came only from this document goes away with it
            let mut scrubbed_edges_deleted = 0;
            {
                let candidates: Vec<(String, String, String, String)> = {
                    let mut stmt = tx.prepare(
                        "SELECT id, source_node_id, target_node_id, document_ids
                         FROM knowledge_edges WHERE document_ids LIKE ?1",
                    )?;
                    let rows = stmt
                        .query_map(params![format!("%\"{}\"%", document_id)], |row| {
                            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                        })?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    rows
                };
                for (edge_id, source, target, doc_ids_json) in candidates {
                    let mut doc_ids = from_json_array(&doc_ids_json);
                    doc_ids.retain(|d| d != document_id);
                    edge_touched.insert(source);
                    edge_touched.insert(target);
                    if doc_ids.is_empty() {
                        tx.execute(
                            "DELETE FROM knowledge_edges WHERE id = ?1",
                            params![edge_id],
                        )?;
                        scrubbed_edges_deleted += 1;
                    } else {
                        tx.execute(
                            "UPDATE knowledge_edges SET document_ids = ?1 WHERE id = ?2",
                            params![to_json_array(&doc_ids), edge_id],
                        )?;
                    }
                }
            }

            for node_id in &edge_touched {
                // Deleted nodes are gone; the UPDATE is a no-op for them
                Self::recompute_edge_count_on(&tx, node_id)?;
            }

            Self::orphan_surviving_provenance(&tx, document_id)?;

            // 6. Provenance rows rooted at this document, deepest first
            let provenance_ids: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM provenance WHERE root_document_id = ?1
                     ORDER BY chain_depth DESC",
                )?;
                let rows = stmt
                    .query_map(params![document_id], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                rows
            };
            for prov_id in &provenance_ids {
                tx.execute("DELETE FROM provenance WHERE id = ?1", params![prov_id])?;
            }

            // 7. Denormalized totals
            Self::refresh_metadata(&tx)?;

            crate::storage::migrations::verify_foreign_keys(&tx)?;
            tx.commit()?;

            CascadeDeleteReport {
                document_id: document_id.to_string(),
                embeddings_deleted,
                mentions_deleted,
                chunks_deleted,
                entities_deleted,
                nodes_deleted,
                nodes_kept,
                edges_deleted: edges_deleted + scrubbed_edges_deleted,
                provenance_deleted: provenance_ids.len(),
            }
        };

        {
            let mut index = self.embedding_index()?;
            for id in &removed_embedding_ids {
                let _ = index.remove(id);
            }
        }
        {
            let mut index = self.entity_index()?;
            for id in &removed_node_ids {
                let _ = index.remove(id);
            }
        }

        tracing::info!(
            "Cascade-deleted document {}: {} embeddings, {} chunks, {} entities, {} nodes",
            document_id,
            report.embeddings_deleted,
            report.chunks_deleted,
            report.entities_deleted,
            report.nodes_deleted,
        );
        Ok(report)
    }

    /// Decrement or delete the nodes a document contributed to.
    ///
    /// A node whose last contributing document disappears takes its links,
    /// edges, and entity embedding with it. A surviving node keeps its rows
    /// but gets recomputed stats, and if its own provenance was rooted at
    /// the deleted document, that provenance is re-parented to the orphan
    /// sentinel (parent references cleared so the rooted chain can be
    /// deleted underneath it).
    fn cleanup_graph_for_document(
        tx: &Connection,
        document_id: &str,
        affected_nodes: &[String],
        removed_node_ids: &mut Vec<String>,
    ) -> Result<(usize, usize, usize, HashSet<String>)> {
        let mut nodes_deleted = 0;
        let mut nodes_kept = 0;
        let mut edges_deleted = 0;
        let mut edge_touched: HashSet<String> = HashSet::new();

        for node_id in affected_nodes {
            let remaining_links: i64 = tx.query_row(
                "SELECT COUNT(*) FROM node_entity_links WHERE node_id = ?1",
                params![node_id],
                |row| row.get(0),
            )?;

            if remaining_links == 0 {
                let edges = Self::list_edges_for_node_on(tx, node_id)?;
                for edge in edges {
                    let other = if edge.source_node_id == *node_id {
                        edge.target_node_id.clone()
                    } else {
                        edge.source_node_id.clone()
                    };
                    edge_touched.insert(other);
                    Self::delete_edge_on(tx, &edge.id)?;
                    edges_deleted += 1;
                }

                // The node's provenance stays behind as append-only history
                // unless it is rooted at the deleted document, in which case
                // it falls with the chain below.
                Self::delete_node_on(tx, node_id)?;
                removed_node_ids.push(node_id.clone());
                nodes_deleted += 1;
            } else {
                Self::recompute_node_stats_on(tx, node_id)?;
                nodes_kept += 1;
            }
        }

        Ok((nodes_deleted, nodes_kept, edges_deleted, edge_touched))
    }

    /// Re-parent provenance of surviving cross-document artifacts (nodes,
    /// edges) whose chain was rooted at the deleted document. Root becomes
    /// the `ORPHANED_ROOT` sentinel and the parent/source references are
    /// cleared so the rooted chain can be deleted underneath.
    fn orphan_surviving_provenance(tx: &Connection, document_id: &str) -> Result<usize> {
        let mut orphaned = 0;
        for table in ["knowledge_nodes", "knowledge_edges"] {
            orphaned += tx.execute(
                &format!(
                    "UPDATE provenance SET root_document_id = ?1, parent_id = NULL,
                            source_id = NULL, chain_depth = 0, chain_path = json_array(id)
                     WHERE root_document_id = ?2
                       AND id IN (SELECT provenance_id FROM {table})"
                ),
                params![ORPHANED_ROOT, document_id],
            )?;
        }
        Ok(orphaned)
    }
}
