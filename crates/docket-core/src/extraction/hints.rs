//! KG Hint Block
//!
//! Bounded priming: a type-grouped digest of the busiest known entities is
//! appended to the extraction prompt so the model reuses canonical names
//! instead of inventing near-duplicates.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::{EntityType, KgNode};
use crate::storage::Store;

/// Most-mentioned nodes considered for the hint block
const HINT_NODE_LIMIT: i64 = 200;

/// Total hint size cap, characters
const HINT_CHAR_CAP: usize = 5_000;

/// Entity types whose aliases are worth the prompt budget
const ALIAS_TYPES: &[EntityType] = &[
    EntityType::Person,
    EntityType::Organization,
    EntityType::Medication,
    EntityType::Diagnosis,
    EntityType::MedicalDevice,
];

/// Build the prompt-appended hint string, or `None` when the graph is empty.
pub fn build_kg_hints(store: &Store) -> Result<Option<String>> {
    let nodes = store.list_nodes(None, HINT_NODE_LIMIT)?;
    if nodes.is_empty() {
        return Ok(None);
    }

    // Group by type; order groups by their total mention count
    let mut groups: BTreeMap<EntityType, Vec<&KgNode>> = BTreeMap::new();
    for node in &nodes {
        groups.entry(node.entity_type).or_default().push(node);
    }
    let mut ordered: Vec<(EntityType, Vec<&KgNode>)> = groups.into_iter().collect();
    ordered.sort_by_key(|(_, members)| {
        std::cmp::Reverse(members.iter().map(|n| n.mention_count).sum::<i64>())
    });

    let header = "Known entities from prior documents (reuse these canonical names):\n";
    let mut out = String::from(header);

    'groups: for (entity_type, members) in ordered {
        let group_prefix = format!("[{}] ", entity_type.as_str());
        let mut line = String::new();

        for node in members {
            let mut item = node.canonical_name.clone();
            if ALIAS_TYPES.contains(&entity_type) && !node.aliases.is_empty() {
                item.push_str(&format!(" (aka: {})", node.aliases.join(", ")));
            }

            let separator = if line.is_empty() { "" } else { "; " };
            let pending = if line.is_empty() {
                group_prefix.len() + item.len() + 1
            } else {
                separator.len() + item.len() + 1
            };
            if out.len() + line.len() + pending > HINT_CHAR_CAP {
                if !line.is_empty() {
                    out.push_str(&group_prefix);
                    out.push_str(&line);
                    out.push('\n');
                }
                break 'groups;
            }
            line.push_str(separator);
            line.push_str(&item);
        }

        if !line.is_empty() {
            out.push_str(&group_prefix);
            out.push_str(&line);
            out.push('\n');
        }
    }

    if out.len() == header.len() {
        return Ok(None);
    }
    Ok(Some(out))
}
