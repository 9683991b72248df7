//! Witness Analysis Composer
//!
//! Assembles one structured prompt from everything the store knows about a
//! witness: OCR text from the documents that mention them (truncated to a
//! per-document budget), prior comparison summaries, and their
//! knowledge-graph connections. The oracle's output is returned as-is with
//! token-usage metadata.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::extraction::{normalize_text, AnalysisOracle, TokenUsage};
use crate::model::EntityType;
use crate::storage::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WitnessOptions {
    pub witness_name: String,
    /// Restrict source documents; default is every document that mentions
    /// the witness
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_ids: Option<Vec<String>>,
    /// Characters of OCR text included per document
    #[serde(default = "default_document_budget")]
    pub per_document_chars: usize,
}

fn default_document_budget() -> usize {
    8_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WitnessReport {
    pub witness_name: String,
    pub analysis: String,
    pub documents_used: Vec<String>,
    pub prompt_chars: usize,
    pub token_usage: TokenUsage,
}

/// Compose and run the witness analysis
pub fn compose_witness_analysis<O: AnalysisOracle>(
    store: &Store,
    oracle: &O,
    options: &WitnessOptions,
) -> Result<WitnessReport> {
    let normalized = normalize_text(&options.witness_name);
    if normalized.is_empty() {
        return Err(StoreError::InputInvalid(
            "witness name must not be empty".into(),
        ));
    }

    // Documents that mention the witness
    let mut document_ids: Vec<String> = {
        let reader = store.reader()?;
        let mut stmt = reader.prepare(
            "SELECT DISTINCT document_id FROM entities
             WHERE entity_type = 'person' AND normalized_text LIKE ?1
             ORDER BY document_id",
        )?;
        let ids = stmt
            .query_map([format!("%{normalized}%")], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        ids
    };
    if let Some(filter) = &options.document_ids {
        document_ids.retain(|d| filter.contains(d));
    }
    if document_ids.is_empty() {
        return Err(StoreError::NotFound(format!(
            "no documents mention witness '{}'",
            options.witness_name
        )));
    }

    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Analyze the witness \"{}\" across the following materials.\n\n",
        options.witness_name
    ));

    // Per-document OCR excerpts under a fixed budget
    prompt.push_str("## Document excerpts\n");
    for document_id in &document_ids {
        let document = store.get_document(document_id)?;
        match store.get_ocr_result(document_id) {
            Ok(ocr) => {
                let excerpt: String = ocr
                    .extracted_text
                    .chars()
                    .take(options.per_document_chars)
                    .collect();
                prompt.push_str(&format!(
                    "### {} ({})\n{}\n\n",
                    document.file_name, document_id, excerpt
                ));
            }
            Err(StoreError::NotFound(_)) => continue,
            Err(e) => return Err(e),
        }
    }

    // Prior comparison summaries
    let mut comparison_lines: Vec<String> = Vec::new();
    for document_id in &document_ids {
        for comparison in store.list_comparisons_for_document(document_id)? {
            if let Some(summary) = comparison.summary {
                let line = format!("- [{}] {}", comparison.id, summary);
                if !comparison_lines.contains(&line) {
                    comparison_lines.push(line);
                }
            }
        }
    }
    if !comparison_lines.is_empty() {
        prompt.push_str("## Prior comparisons\n");
        for line in &comparison_lines {
            prompt.push_str(line);
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    // Cross-document knowledge-graph connections
    let node = {
        let reader = store.reader()?;
        Store::find_node_by_normalized_on(&reader, EntityType::Person, &normalized)?
    };
    if let Some(node) = node {
        prompt.push_str("## Knowledge-graph connections\n");
        for edge in store.list_edges_for_node(&node.id)? {
            let other_id = if edge.source_node_id == node.id {
                &edge.target_node_id
            } else {
                &edge.source_node_id
            };
            let other = store.get_node(other_id)?;
            prompt.push_str(&format!(
                "- {} --{}--> {} (weight {:.2}, {} documents)\n",
                node.canonical_name,
                edge.relationship_type.as_str(),
                other.canonical_name,
                edge.normalized_weight,
                edge.document_ids.len(),
            ));
        }
        prompt.push('\n');
    }

    let prompt_chars = prompt.chars().count();
    let reply = oracle
        .analyze(&prompt)
        .map_err(|e| StoreError::OracleFailure(e.to_string()))?;

    Ok(WitnessReport {
        witness_name: options.witness_name.clone(),
        analysis: reply.text,
        documents_used: document_ids,
        prompt_chars,
        token_usage: reply.usage,
    })
}
