//! Timeline Construction
//!
//! Collects date-typed entities, parses each into an ISO date, optionally
//! filters by document set, KG-path-derived documents, or co-occurrence
//! with named entities, and returns entries sorted ascending. Unparseable
//! dates sort after parsed ones, by raw text.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::extraction::normalize_text;
use crate::graph::{find_paths, PathOptions};
use crate::model::EntityType;
use crate::storage::Store;

/// Derive the document filter from the shortest paths between two nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathFilter {
    pub start_node_id: String,
    pub end_node_id: String,
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
}

fn default_max_hops() -> usize {
    crate::graph::MAX_HOPS
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_ids: Option<Vec<String>>,
    /// Keep only dates that co-occur with at least one of these entities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathFilter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    /// ISO date when the raw text parsed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub raw_text: String,
    pub entity_id: String,
    pub document_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineResult {
    pub entries: Vec<TimelineEntry>,
    /// Set when a path filter found no path (empty timeline, not an error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// Parse a date literal in any of the supported surface formats
pub fn parse_date_literal(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    const FORMATS: &[&str] = &[
        "%Y-%m-%d",
        "%m/%d/%Y",
        "%m/%d/%y",
        "%B %d, %Y",
        "%B %d %Y",
        "%d %B %Y",
    ];
    for format in FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    None
}

/// Build a timeline from date entities
pub fn build_timeline(store: &Store, options: &TimelineOptions) -> Result<TimelineResult> {
    // Resolve the path filter into a document set first; no path means an
    // empty timeline with a diagnostic rather than an error
    let mut document_filter: Option<Vec<String>> = options.document_ids.clone();
    if let Some(path) = &options.path {
        let paths = find_paths(
            store,
            &path.start_node_id,
            &path.end_node_id,
            &PathOptions {
                max_hops: path.max_hops,
                ..PathOptions::default()
            },
        )?;
        if paths.is_empty() {
            return Ok(TimelineResult {
                entries: Vec::new(),
                diagnostic: Some(format!(
                    "no path between {} and {} within {} hops",
                    path.start_node_id, path.end_node_id, path.max_hops
                )),
            });
        }
        let mut docs: Vec<String> = Vec::new();
        for path in &paths {
            for edge in &path.edges {
                for doc in &edge.edge.document_ids {
                    if !docs.contains(doc) {
                        docs.push(doc.clone());
                    }
                }
            }
        }
        match &mut document_filter {
            Some(existing) => existing.retain(|d| docs.contains(d)),
            None => document_filter = Some(docs),
        }
    }

    let date_entities = store.list_entities_by_type(EntityType::Date)?;

    let mut entries: Vec<TimelineEntry> = Vec::new();
    for entity in date_entities {
        if let Some(filter) = &document_filter {
            if !filter.contains(&entity.document_id) {
                continue;
            }
        }

        let mentions = store.list_mentions(&entity.id)?;
        let primary = mentions.first();

        if let Some(names) = &options.entity_names {
            if !co_occurs_with_named(store, &entity.id, &mentions, names)? {
                continue;
            }
        }

        entries.push(TimelineEntry {
            date: parse_date_literal(&entity.raw_text).map(|d| d.format("%Y-%m-%d").to_string()),
            raw_text: entity.raw_text.clone(),
            entity_id: entity.id.clone(),
            document_id: entity.document_id.clone(),
            chunk_id: primary.and_then(|m| m.chunk_id.clone()),
            page_number: primary.and_then(|m| m.page_number),
            context: primary.and_then(|m| m.context.clone()),
        });
    }

    // Parsed dates ascending, then unparseable by raw text
    entries.sort_by(|a, b| match (&a.date, &b.date) {
        (Some(da), Some(db)) => da.cmp(db).then_with(|| a.raw_text.cmp(&b.raw_text)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.raw_text.cmp(&b.raw_text),
    });

    Ok(TimelineResult {
        entries,
        diagnostic: None,
    })
}

/// Co-occurrence test: the date shares a chunk with a mention of a named
/// entity, or (fallback) the date's mention context contains the name.
fn co_occurs_with_named(
    store: &Store,
    date_entity_id: &str,
    date_mentions: &[crate::model::EntityMention],
    names: &[String],
) -> Result<bool> {
    let normalized_names: Vec<String> = names.iter().map(|n| normalize_text(n)).collect();

    let chunk_ids: Vec<&str> = date_mentions
        .iter()
        .filter_map(|m| m.chunk_id.as_deref())
        .collect();

    if !chunk_ids.is_empty() {
        let reader = store.reader()?;
        for chunk_id in &chunk_ids {
            let mut stmt = reader.prepare(
                "SELECT e.normalized_text FROM entity_mentions m
                 JOIN entities e ON e.id = m.entity_id
                 WHERE m.chunk_id = ?1 AND m.entity_id != ?2",
            )?;
            let co_mentioned = stmt
                .query_map(rusqlite::params![chunk_id, date_entity_id], |row| {
                    row.get::<_, String>(0)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for text in co_mentioned {
                if normalized_names
                    .iter()
                    .any(|name| text.contains(name.as_str()))
                {
                    return Ok(true);
                }
            }
        }
    }

    // Fallback: the surrounding context mentions the name
    for mention in date_mentions {
        if let Some(context) = &mention.context {
            let context_normalized = normalize_text(context);
            if normalized_names
                .iter()
                .any(|name| context_normalized.contains(name.as_str()))
            {
                return Ok(true);
            }
        }
    }

    Ok(false)
}
