//! Entity Resolution
//!
//! Matching a per-document entity against existing nodes. Never crosses
//! entity types. Three modes:
//!
//! - exact: normalized name + type equality
//! - fuzzy: Sørensen-Dice coefficient on character bigrams over a per-type
//!   threshold, ties broken by importance then node id
//! - ai: oracle disambiguation between the candidate and the top-K nodes of
//!   the same type

use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::extraction::OracleError;
use crate::model::{EntityType, KgNode, ResolutionMethod};
use crate::storage::Store;

/// Candidates handed to the ai-mode disambiguation oracle
const AI_CANDIDATE_LIMIT: usize = 10;

/// A node offered to the disambiguation oracle
#[derive(Debug, Clone)]
pub struct CandidateNode {
    pub node_id: String,
    pub canonical_name: String,
    pub aliases: Vec<String>,
}

/// Oracle seam for ai-mode resolution: which candidate (if any) is the same
/// real-world entity as `name`?
pub trait ResolutionOracle: Send + Sync {
    fn disambiguate(
        &self,
        name: &str,
        entity_type: EntityType,
        candidates: &[CandidateNode],
    ) -> std::result::Result<Option<String>, OracleError>;
}

/// Sørensen-Dice coefficient on character bigrams
pub fn dice_coefficient(a: &str, b: &str) -> f64 {
    let a_bigrams = bigrams(a);
    let b_bigrams = bigrams(b);
    if a_bigrams.is_empty() || b_bigrams.is_empty() {
        return if a == b { 1.0 } else { 0.0 };
    }

    let mut b_pool = b_bigrams.clone();
    let mut matches = 0usize;
    for bigram in &a_bigrams {
        if let Some(pos) = b_pool.iter().position(|x| x == bigram) {
            b_pool.swap_remove(pos);
            matches += 1;
        }
    }

    (2.0 * matches as f64) / (a_bigrams.len() + b_bigrams.len()) as f64
}

fn bigrams(s: &str) -> Vec<[char; 2]> {
    let chars: Vec<char> = s.chars().collect();
    chars.windows(2).map(|w| [w[0], w[1]]).collect()
}

/// Fuzzy-match floor per entity type. Name-like types tolerate more surface
/// variation; identifier-like types are effectively exact.
fn fuzzy_threshold(entity_type: EntityType) -> f64 {
    match entity_type {
        EntityType::Person => 0.45,
        EntityType::Organization => 0.50,
        EntityType::Location
        | EntityType::Medication
        | EntityType::Diagnosis
        | EntityType::MedicalDevice => 0.60,
        EntityType::Statute | EntityType::Exhibit | EntityType::Other => 0.70,
        EntityType::Date | EntityType::Amount | EntityType::CaseNumber => 0.95,
    }
}

/// Resolve an entity name against existing nodes of its type.
/// Returns `(node, similarity, method)` or `None` when a new node is
/// warranted.
pub(crate) fn find_match(
    conn: &Connection,
    entity_type: EntityType,
    normalized_name: &str,
    mode: super::BuildMode,
    resolver: Option<&dyn ResolutionOracle>,
) -> Result<Option<(KgNode, f64, ResolutionMethod)>> {
    // Exact equality short-circuits every mode
    if let Some(node) = Store::find_node_by_normalized_on(conn, entity_type, normalized_name)? {
        return Ok(Some((node, 1.0, ResolutionMethod::Exact)));
    }

    match mode {
        super::BuildMode::Exact => Ok(None),
        super::BuildMode::Fuzzy => {
            let threshold = fuzzy_threshold(entity_type);
            let nodes = Store::list_nodes_by_type_on(conn, entity_type)?;

            let mut best: Option<(KgNode, f64)> = None;
            for node in nodes {
                let mut score = dice_coefficient(normalized_name, &node.normalized_name);
                for alias in &node.aliases {
                    let alias_score = dice_coefficient(
                        normalized_name,
                        &crate::extraction::normalize_text(alias),
                    );
                    score = score.max(alias_score);
                }
                if score < threshold {
                    continue;
                }
                let better = match &best {
                    Some((current, current_score)) => {
                        score > *current_score
                            || (score == *current_score
                                && (node.importance_score > current.importance_score
                                    || (node.importance_score == current.importance_score
                                        && node.id < current.id)))
                    }
                    None => true,
                };
                if better {
                    best = Some((node, score));
                }
            }

            Ok(best.map(|(node, score)| (node, score, ResolutionMethod::Fuzzy)))
        }
        super::BuildMode::Ai => {
            let Some(resolver) = resolver else {
                return Err(StoreError::InputInvalid(
                    "ai build mode requires a resolution oracle".into(),
                ));
            };
            let nodes = Store::list_nodes_by_type_on(conn, entity_type)?;
            let candidates: Vec<CandidateNode> = nodes
                .iter()
                .take(AI_CANDIDATE_LIMIT)
                .map(|n| CandidateNode {
                    node_id: n.id.clone(),
                    canonical_name: n.canonical_name.clone(),
                    aliases: n.aliases.clone(),
                })
                .collect();
            if candidates.is_empty() {
                return Ok(None);
            }

            let choice = resolver
                .disambiguate(normalized_name, entity_type, &candidates)
                .map_err(|e| StoreError::OracleFailure(e.to_string()))?;
            match choice {
                Some(node_id) => {
                    let node = nodes.into_iter().find(|n| n.id == node_id).ok_or_else(|| {
                        StoreError::OracleFailure(format!(
                            "disambiguation oracle returned unknown node id {node_id}"
                        ))
                    })?;
                    Ok(Some((node, 0.9, ResolutionMethod::Ai)))
                }
                None => Ok(None),
            }
        }
    }
}
