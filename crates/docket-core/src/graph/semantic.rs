//! Semantic Entity Search
//!
//! Entity-name embeddings are generated on demand from
//! `"{canonical} ({type}). Also known as: ..."`, stored in the
//! `entity_embeddings` table and the entity vector index together, then
//! queried by k-NN with a similarity floor.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::extraction::EmbeddingOracle;
use crate::model::{EntityType, KgNode, TaskType, EMBEDDING_DIMENSIONS};
use crate::storage::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticSearchOptions {
    pub limit: usize,
    /// Keep hits with `1 - distance >= similarity_threshold`
    pub similarity_threshold: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
}

impl Default for SemanticSearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            similarity_threshold: 0.5,
            entity_type: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySearchHit {
    pub node: KgNode,
    pub similarity: f32,
}

/// k-NN entity search over node-name embeddings, ordered by similarity
/// descending.
pub fn semantic_entity_search<E: EmbeddingOracle>(
    store: &Store,
    oracle: &E,
    query: &str,
    options: &SemanticSearchOptions,
) -> Result<Vec<EntitySearchHit>> {
    if query.trim().is_empty() {
        return Err(StoreError::InputInvalid("query must not be empty".into()));
    }

    ensure_entity_embeddings(store, oracle)?;

    // Query embeddings are memoized; repeated searches skip the oracle
    let query_vector = {
        let cached = {
            let mut cache = store.query_cache()?;
            cache.get(query).cloned()
        };
        match cached {
            Some(vector) => vector,
            None => {
                let vector = oracle
                    .embed(query, TaskType::SearchQuery)
                    .map_err(|e| StoreError::OracleFailure(e.to_string()))?;
                if vector.len() != EMBEDDING_DIMENSIONS {
                    return Err(StoreError::OracleFailure(format!(
                        "embedding oracle returned {} dimensions, expected {}",
                        vector.len(),
                        EMBEDDING_DIMENSIONS
                    )));
                }
                let mut cache = store.query_cache()?;
                cache.put(query.to_string(), vector.clone());
                vector
            }
        }
    };

    let overfetch = options.limit.max(1) * 4;
    let matches = {
        let index = store.entity_index()?;
        index
            .match_k(&query_vector, overfetch)
            .map_err(|e| StoreError::VectorIndex(e.to_string()))?
    };

    let mut hits = Vec::new();
    for (node_id, distance) in matches {
        let similarity = 1.0 - distance;
        if similarity < options.similarity_threshold {
            continue;
        }
        let node = match store.get_node(&node_id) {
            Ok(node) => node,
            Err(StoreError::NotFound(_)) => continue,
            Err(e) => return Err(e),
        };
        if let Some(wanted) = options.entity_type {
            if node.entity_type != wanted {
                continue;
            }
        }
        hits.push(EntitySearchHit { node, similarity });
        if hits.len() >= options.limit {
            break;
        }
    }

    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(hits)
}

/// Text an entity embedding is computed from
pub(crate) fn embedding_text(node: &KgNode) -> String {
    let mut text = format!("{} ({})", node.canonical_name, node.entity_type.as_str());
    if !node.aliases.is_empty() {
        text.push_str(". Also known as: ");
        text.push_str(&node.aliases.join(", "));
    }
    text
}

/// Generate embeddings for nodes that have none, batch-storing rows and
/// index entries inside one transaction per batch.
pub fn ensure_entity_embeddings<E: EmbeddingOracle>(store: &Store, oracle: &E) -> Result<usize> {
    let missing: Vec<KgNode> = {
        let reader = store.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id FROM knowledge_nodes WHERE id NOT IN
                (SELECT node_id FROM entity_embeddings)
             ORDER BY mention_count DESC, id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        drop(reader);
        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            nodes.push(store.get_node(&id)?);
        }
        nodes
    };
    if missing.is_empty() {
        return Ok(0);
    }

    let texts: Vec<String> = missing.iter().map(embedding_text).collect();
    let vectors = oracle
        .embed_batch(&texts, TaskType::SearchDocument)
        .map_err(|e| StoreError::OracleFailure(e.to_string()))?;
    if vectors.len() != missing.len() {
        return Err(StoreError::OracleFailure(format!(
            "embedding oracle returned {} vectors for {} texts",
            vectors.len(),
            missing.len()
        )));
    }
    for vector in &vectors {
        if vector.len() != EMBEDDING_DIMENSIONS {
            return Err(StoreError::OracleFailure(format!(
                "embedding oracle returned {} dimensions, expected {}",
                vector.len(),
                EMBEDDING_DIMENSIONS
            )));
        }
    }

    {
        let writer = store.writer()?;
        let tx = writer.unchecked_transaction()?;
        for (node, vector) in missing.iter().zip(&vectors) {
            tx.execute(
                "INSERT OR REPLACE INTO entity_embeddings (
                    node_id, vector, dimensions, model_name, task_type,
                    embedded_text, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    node.id,
                    crate::storage::vector_to_blob(vector),
                    EMBEDDING_DIMENSIONS as i64,
                    "external",
                    TaskType::SearchDocument.as_str(),
                    embedding_text(node),
                    crate::storage::now_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;
    }

    let mut index = store.entity_index()?;
    for (node, vector) in missing.iter().zip(&vectors) {
        index
            .insert(&node.id, vector)
            .map_err(|e| StoreError::VectorIndex(e.to_string()))?;
    }

    tracing::debug!("Generated {} entity embeddings", missing.len());
    Ok(missing.len())
}
