//! Edge Weight Normalization
//!
//! `normalized_weight = ln(1 + evidence_count) * type_multiplier`, with
//! caller-supplied multiplier overrides and optional scoping to edges whose
//! evidence intersects a document set.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::extraction::normalized_edge_weight;
use crate::model::RelationshipType;
use crate::storage::Store;

/// Normalization parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeOptions {
    /// Per-type multiplier overrides; missing types use the defaults
    #[serde(default)]
    pub multipliers: HashMap<RelationshipType, f64>,
    /// Only touch edges whose document_ids intersect this set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeReport {
    pub edges_seen: usize,
    pub edges_updated: usize,
}

/// Recompute normalized weights across the edge table in one transaction
pub fn normalize_weights(store: &Store, options: &NormalizeOptions) -> Result<NormalizeReport> {
    let mut report = NormalizeReport::default();

    let writer = store.writer()?;
    let tx = writer.unchecked_transaction()?;

    let overrides = if options.multipliers.is_empty() {
        None
    } else {
        Some(&options.multipliers)
    };

    for mut edge in Store::list_all_edges_on(&tx)? {
        if let Some(scope) = &options.document_ids {
            let intersects = edge.document_ids.iter().any(|d| scope.contains(d));
            if !intersects {
                continue;
            }
        }
        report.edges_seen += 1;

        let normalized =
            normalized_edge_weight(edge.evidence_count, edge.relationship_type, overrides);
        if (normalized - edge.normalized_weight).abs() > f64::EPSILON {
            edge.normalized_weight = normalized;
            Store::update_edge_on(&tx, &edge)?;
            report.edges_updated += 1;
        }
    }

    tx.commit()?;
    Ok(report)
}
