//! Extraction Orchestration
//!
//! Drives one document through the oracle and lands the results in a single
//! write transaction: entities, mentions, extraction segments, and the
//! knowledge-graph rows they imply. A cancelled or failed extraction leaves
//! the database untouched because nothing commits until post-processing has
//! finished.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::dates::{scan_dates, REGEX_DATE_CONFIDENCE};
use super::filters::{apply_noise_filters, FilterOutcome};
use super::hints::build_kg_hints;
use super::mentions::{map_mentions, MentionSpan};
use super::normalize_text;
use super::oracle::{
    ExtractionOracle, OracleEntity, OracleReply, OracleRequest, OracleResponse, PromptKind,
    TokenUsage,
};
use super::recovery::recover_partial_json;
use crate::error::{Result, StoreError};
use crate::hash;
use crate::model::{
    EntityType, NewProvenance, ProvenanceType, RelationshipType, ResolutionMethod, SourceType,
};
use crate::storage::Store;

/// Size policy and fallback thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionConfig {
    /// One oracle call up to this many characters
    pub single_call_char_limit: usize,
    /// Total overlap between the two halves of a split
    pub segment_overlap_chars: usize,
    /// A response under this many output tokens on a large input is
    /// suspicious and triggers the two-pass fallback
    pub two_pass_min_output_tokens: i64,
    pub two_pass_min_input_chars: usize,
    /// Cooldown between segment calls, seconds (provider throttling)
    pub segment_cooldown_secs: u64,
    /// Per-call oracle timeout, seconds
    pub oracle_timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            single_call_char_limit: 750_000,
            segment_overlap_chars: 20_000,
            two_pass_min_output_tokens: 2_000,
            two_pass_min_input_chars: 50_000,
            segment_cooldown_secs: 3,
            oracle_timeout_secs: 300,
        }
    }
}

/// What one extraction run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionReport {
    pub document_id: String,
    pub entity_count: usize,
    pub relationship_count: usize,
    pub mention_count: usize,
    pub nodes_created: usize,
    pub nodes_matched: usize,
    pub edges_created: usize,
    pub edges_updated: usize,
    pub segment_count: usize,
    pub token_usage: TokenUsage,
    pub warnings: Vec<String>,
}

/// Entity-extraction driver for one store + oracle pair
pub struct Extractor<'a, O: ExtractionOracle> {
    store: &'a Store,
    oracle: &'a O,
    config: ExtractionConfig,
}

/// An entity after cross-segment merge and filtering
#[derive(Debug, Clone)]
struct MergedEntity {
    entity_type: EntityType,
    canonical: String,
    confidence: f64,
    aliases: Vec<String>,
    /// Distinct segments that produced this entity
    occurrences: i64,
    last_segment: usize,
}

#[derive(Debug, Clone)]
struct MergedRelationship {
    source_key: (EntityType, String),
    target_key: (EntityType, String),
    relationship_type: RelationshipType,
    confidence: f64,
    evidence: Option<String>,
    temporal: Option<String>,
}

type EntityKey = (EntityType, String);

impl<'a, O: ExtractionOracle> Extractor<'a, O> {
    pub fn new(store: &'a Store, oracle: &'a O) -> Self {
        Self {
            store,
            oracle,
            config: ExtractionConfig::default(),
        }
    }

    pub fn with_config(store: &'a Store, oracle: &'a O, config: ExtractionConfig) -> Self {
        Self {
            store,
            oracle,
            config,
        }
    }

    /// Extract entities and relationships for a document whose OCR is
    /// complete. Re-running replaces the previous extraction for the
    /// document; stale mentions never survive.
    pub fn run(&self, document_id: &str) -> Result<ExtractionReport> {
        self.store.get_document(document_id)?;
        let ocr = self.store.get_ocr_result(document_id)?;
        let chunks = self.store.list_chunks(document_id)?;
        let hints = build_kg_hints(self.store)?;

        let mut warnings: Vec<String> = Vec::new();
        let mut usage = TokenUsage::default();

        let segments = segment_text(
            &ocr.extracted_text,
            self.config.single_call_char_limit,
            self.config.segment_overlap_chars,
        );
        tracing::debug!(
            "Extracting document {} in {} segment(s)",
            document_id,
            segments.len()
        );

        let mut responses: Vec<OracleResponse> = Vec::with_capacity(segments.len());
        for (i, (_, segment)) in segments.iter().enumerate() {
            if i > 0 && self.config.segment_cooldown_secs > 0 {
                std::thread::sleep(std::time::Duration::from_secs(
                    self.config.segment_cooldown_secs,
                ));
            }
            let response =
                self.call_segment(segment, hints.as_deref(), &mut usage, &mut warnings)?;
            responses.push(response);
        }

        let (mut entities, relationships) = merge_segments(&responses, &mut warnings);

        // Regex date supplement, deduplicated against the LLM's dates
        for literal in scan_dates(&ocr.extracted_text) {
            let key: EntityKey = (EntityType::Date, normalize_text(&literal));
            entities.entry(key).or_insert(MergedEntity {
                entity_type: EntityType::Date,
                canonical: literal,
                confidence: REGEX_DATE_CONFIDENCE,
                aliases: Vec::new(),
                occurrences: 1,
                last_segment: usize::MAX,
            });
        }

        // Mention mapping over the full OCR text
        let mut mention_map: HashMap<EntityKey, Vec<MentionSpan>> = HashMap::new();
        for (key, entity) in &entities {
            let spans = map_mentions(
                &ocr.extracted_text,
                &entity.canonical,
                &entity.aliases,
                &chunks,
            );
            mention_map.insert(key.clone(), spans);
        }

        let report = self.persist(
            document_id,
            &ocr.provenance_id,
            &ocr.content_hash,
            &segments,
            &responses,
            &entities,
            &relationships,
            &mention_map,
            usage,
            warnings,
        )?;

        Ok(report)
    }

    /// One segment through the oracle: joint call, strict parse, partial
    /// recovery, two-pass fallback for suspiciously small responses.
    fn call_segment(
        &self,
        text: &str,
        hints: Option<&str>,
        usage: &mut TokenUsage,
        warnings: &mut Vec<String>,
    ) -> Result<OracleResponse> {
        let reply = self
            .oracle
            .complete(&OracleRequest {
                kind: PromptKind::Joint,
                text: text.to_string(),
                hints: hints.map(|h| h.to_string()),
                known_entities: Vec::new(),
                timeout_secs: self.config.oracle_timeout_secs,
            })
            .map_err(|e| StoreError::OracleFailure(e.to_string()))?;
        usage.accumulate(reply.usage);

        let suspicious = reply.usage.output_tokens < self.config.two_pass_min_output_tokens
            && text.chars().count() > self.config.two_pass_min_input_chars;
        if suspicious {
            tracing::warn!(
                "Joint extraction returned only {} output tokens on a {}-char segment; \
                 falling back to two-pass",
                reply.usage.output_tokens,
                text.chars().count()
            );
            return self.two_pass(text, hints, usage, warnings);
        }

        self.parse_reply(&reply, warnings)
    }

    /// Two-pass fallback: entities with schema 1, then relationships over
    /// those entities with schema 2
    fn two_pass(
        &self,
        text: &str,
        hints: Option<&str>,
        usage: &mut TokenUsage,
        warnings: &mut Vec<String>,
    ) -> Result<OracleResponse> {
        let entities_reply = self
            .oracle
            .complete(&OracleRequest {
                kind: PromptKind::EntitiesOnly,
                text: text.to_string(),
                hints: hints.map(|h| h.to_string()),
                known_entities: Vec::new(),
                timeout_secs: self.config.oracle_timeout_secs,
            })
            .map_err(|e| StoreError::OracleFailure(e.to_string()))?;
        usage.accumulate(entities_reply.usage);
        let entities = self.parse_reply(&entities_reply, warnings)?.entities;

        let relationships_reply = self
            .oracle
            .complete(&OracleRequest {
                kind: PromptKind::RelationshipsOnly,
                text: text.to_string(),
                hints: None,
                known_entities: entities.clone(),
                timeout_secs: self.config.oracle_timeout_secs,
            })
            .map_err(|e| StoreError::OracleFailure(e.to_string()))?;
        usage.accumulate(relationships_reply.usage);
        let relationships = self
            .parse_reply(&relationships_reply, warnings)?
            .relationships;

        Ok(OracleResponse {
            entities,
            relationships,
        })
    }

    fn parse_reply(
        &self,
        reply: &OracleReply,
        warnings: &mut Vec<String>,
    ) -> Result<OracleResponse> {
        match serde_json::from_str::<OracleResponse>(&reply.text) {
            Ok(parsed) => Ok(parsed),
            Err(parse_err) => match recover_partial_json(&reply.text) {
                Some(recovered) => {
                    warnings.push(format!(
                        "oracle response failed strict parse ({parse_err}); recovered {} \
                         entities and {} relationships",
                        recovered.entities.len(),
                        recovered.relationships.len()
                    ));
                    Ok(recovered)
                }
                None => Err(StoreError::OracleFailure(format!(
                    "unparseable oracle response: {parse_err}"
                ))),
            },
        }
    }

    /// The single post-extraction write transaction
    #[allow(clippy::too_many_arguments)]
    fn persist(
        &self,
        document_id: &str,
        ocr_provenance_id: &str,
        ocr_content_hash: &str,
        segments: &[(usize, String)],
        responses: &[OracleResponse],
        entities: &BTreeMap<EntityKey, MergedEntity>,
        relationships: &[MergedRelationship],
        mention_map: &HashMap<EntityKey, Vec<MentionSpan>>,
        usage: TokenUsage,
        warnings: Vec<String>,
    ) -> Result<ExtractionReport> {
        use crate::storage::{NewEntityRow, NewMentionRow};

        let mut removed_node_ids: Vec<String> = Vec::new();
        let mut nodes_created = 0;
        let mut nodes_matched = 0;
        let mut edges_created = 0;
        let mut edges_updated = 0;
        let mut mention_count = 0;

        {
            let writer = self.store.writer()?;
            let tx = writer.unchecked_transaction()?;

            // Nodes the previous extraction of this document touched
            let previously_linked: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT DISTINCT node_id FROM node_entity_links WHERE document_id = ?1",
                )?;
                let rows = stmt
                    .query_map([document_id], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                rows
            };

            // Idempotence: re-extraction never leaves stale rows behind
            Store::delete_extraction_artifacts_on(&tx, document_id)?;

            let run_prov = Store::insert_provenance_on(
                &tx,
                NewProvenance {
                    prov_type: ProvenanceType::EntityExtraction,
                    processor: "docket-core".into(),
                    processor_version: env!("CARGO_PKG_VERSION").into(),
                    parameters_json: Some(hash::canonical_json(&serde_json::json!({
                        "segmentCount": segments.len(),
                        "inputTokens": usage.input_tokens,
                        "outputTokens": usage.output_tokens,
                    }))),
                    content_hash: entity_set_hash(entities),
                    input_hash: Some(ocr_content_hash.to_string()),
                    source_id: Some(ocr_provenance_id.to_string()),
                    source_type: Some(SourceType::OcrResult),
                    parent_id: Some(ocr_provenance_id.to_string()),
                    extra_parent_ids: Vec::new(),
                    root_document_id: None,
                },
            )?;

            // Entities + mentions
            let mut entity_ids: HashMap<EntityKey, String> = HashMap::new();
            for (key, entity) in entities {
                let entity_id = Store::insert_entity_on(
                    &tx,
                    &NewEntityRow {
                        document_id: document_id.to_string(),
                        entity_type: entity.entity_type,
                        raw_text: entity.canonical.clone(),
                        normalized_text: key.1.clone(),
                        confidence: entity.confidence,
                        aliases: entity.aliases.clone(),
                        agreement_count: entity.occurrences,
                        metadata_json: None,
                        provenance_id: run_prov.id.clone(),
                    },
                )?;

                let spans = mention_map.get(key).map(|s| s.as_slice()).unwrap_or(&[]);
                if spans.is_empty() {
                    // Position unknown; keep one fallback mention
                    Store::insert_mention_on(
                        &tx,
                        &NewMentionRow {
                            entity_id: entity_id.clone(),
                            document_id: document_id.to_string(),
                            chunk_id: None,
                            page_number: None,
                            character_start: None,
                            character_end: None,
                            context: None,
                        },
                    )?;
                    mention_count += 1;
                } else {
                    for span in spans {
                        Store::insert_mention_on(
                            &tx,
                            &NewMentionRow {
                                entity_id: entity_id.clone(),
                                document_id: document_id.to_string(),
                                chunk_id: span.chunk_id.clone(),
                                page_number: span.page_number,
                                character_start: Some(span.character_start),
                                character_end: Some(span.character_end),
                                context: Some(span.context.clone()),
                            },
                        )?;
                        mention_count += 1;
                    }
                }
                entity_ids.insert(key.clone(), entity_id);
            }

            // Raw relationships; knowledge edges derive from these rows
            for rel in relationships {
                let (Some(source_entity), Some(target_entity)) = (
                    entity_ids.get(&rel.source_key),
                    entity_ids.get(&rel.target_key),
                ) else {
                    continue;
                };
                let (valid_from, valid_until) = parse_temporal(rel.temporal.as_deref());
                Store::insert_relationship_on(
                    &tx,
                    &crate::storage::RelationshipRow {
                        id: crate::storage::new_id(),
                        document_id: document_id.to_string(),
                        source_entity_id: source_entity.clone(),
                        target_entity_id: target_entity.clone(),
                        relationship_type: rel.relationship_type,
                        confidence: rel.confidence,
                        evidence: rel.evidence.clone(),
                        valid_from,
                        valid_until,
                    },
                )?;
            }

            // Knowledge-graph nodes: exact resolution against the existing
            // graph, creation only when nothing matches
            let mut node_ids: HashMap<EntityKey, String> = HashMap::new();
            for (key, entity) in entities {
                let entity_id = &entity_ids[key];
                let span_count = mention_map
                    .get(key)
                    .map(|s| s.len().max(1))
                    .unwrap_or(1) as i64;

                match Store::find_node_by_normalized_on(&tx, key.0, &key.1)? {
                    Some(node) => {
                        Store::insert_link_on(
                            &tx,
                            &node.id,
                            entity_id,
                            document_id,
                            1.0,
                            ResolutionMethod::Exact,
                        )?;
                        Store::fold_name_into_node_on(&tx, &node.id, &entity.canonical, &entity.aliases)?;
                        Store::recompute_node_stats_on(&tx, &node.id)?;
                        node_ids.insert(key.clone(), node.id);
                        nodes_matched += 1;
                    }
                    None => {
                        let node_prov = Store::insert_provenance_on(
                            &tx,
                            NewProvenance {
                                prov_type: ProvenanceType::KnowledgeGraph,
                                processor: "docket-core".into(),
                                processor_version: env!("CARGO_PKG_VERSION").into(),
                                parameters_json: None,
                                content_hash: hash::hash_json(&serde_json::json!({
                                    "name": entity.canonical,
                                    "type": entity.entity_type.as_str(),
                                })),
                                input_hash: None,
                                source_id: Some(run_prov.id.clone()),
                                source_type: Some(SourceType::Extraction),
                                parent_id: Some(run_prov.id.clone()),
                                extra_parent_ids: Vec::new(),
                                root_document_id: None,
                            },
                        )?;
                        let node_id = Store::insert_node_on(
                            &tx,
                            &crate::storage::NewNodeRow {
                                entity_type: entity.entity_type,
                                canonical_name: entity.canonical.clone(),
                                normalized_name: key.1.clone(),
                                aliases: entity.aliases.clone(),
                                document_count: 1,
                                mention_count: span_count,
                                avg_confidence: entity.confidence,
                                metadata_json: None,
                                provenance_id: node_prov.id,
                            },
                        )?;
                        Store::insert_link_on(
                            &tx,
                            &node_id,
                            entity_id,
                            document_id,
                            1.0,
                            ResolutionMethod::GeminiCoreference,
                        )?;
                        node_ids.insert(key.clone(), node_id);
                        nodes_created += 1;
                    }
                }
            }

            // Edges, direction invariant enforced by endpoint ordering
            let mut edge_touched: HashSet<String> = HashSet::new();
            for rel in relationships {
                let (Some(source), Some(target)) =
                    (node_ids.get(&rel.source_key), node_ids.get(&rel.target_key))
                else {
                    continue;
                };
                if source == target {
                    continue;
                }
                let (a, b) = crate::model::KgEdge::order_endpoints(source, target);
                edge_touched.insert(a.to_string());
                edge_touched.insert(b.to_string());

                let (valid_from, valid_until) = parse_temporal(rel.temporal.as_deref());
                match Store::find_edge_on(&tx, a, b, rel.relationship_type)? {
                    Some(mut edge) => {
                        edge.weight = edge.weight.max(rel.confidence);
                        // Evidence counts once per document; re-extraction
                        // must not inflate it
                        if !edge.document_ids.iter().any(|d| d == document_id) {
                            edge.document_ids.push(document_id.to_string());
                            edge.evidence_count += 1;
                        }
                        edge.normalized_weight = normalized_edge_weight(
                            edge.evidence_count,
                            rel.relationship_type,
                            None,
                        );
                        if edge.valid_from.is_none() {
                            edge.valid_from = valid_from;
                        }
                        if edge.valid_until.is_none() {
                            edge.valid_until = valid_until;
                        }
                        if let Some(evidence) = &rel.evidence {
                            edge.metadata_json =
                                Some(append_evidence(edge.metadata_json.as_deref(), evidence));
                        }
                        Store::update_edge_on(&tx, &edge)?;
                        edges_updated += 1;
                    }
                    None => {
                        let edge_prov = Store::insert_provenance_on(
                            &tx,
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
                                source_id: Some(run_prov.id.clone()),
                                source_type: Some(SourceType::Extraction),
                                parent_id: Some(run_prov.id.clone()),
                                extra_parent_ids: Vec::new(),
                                root_document_id: None,
                            },
                        )?;
                        Store::insert_edge_on(
                            &tx,
                            &crate::storage::NewEdgeRow {
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
                                valid_from,
                                valid_until,
                                metadata_json: rel
                                    .evidence
                                    .as_deref()
                                    .map(|e| append_evidence(None, e)),
                                provenance_id: edge_prov.id,
                            },
                        )?;
                        edges_created += 1;
                    }
                }
            }

            for node_id in &edge_touched {
                Store::recompute_edge_count_on(&tx, node_id)?;
            }

            // Nodes orphaned by re-extraction (previous links gone, no new
            // ones landed)
            let current: HashSet<&String> = node_ids.values().collect();
            for node_id in previously_linked {
                if current.contains(&node_id) {
                    continue;
                }
                let remaining: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM node_entity_links WHERE node_id = ?1",
                    [&node_id],
                    |row| row.get(0),
                )?;
                if remaining == 0 {
                    for edge in Store::list_edges_for_node_on(&tx, &node_id)? {
                        let other = if edge.source_node_id == node_id {
                            edge.target_node_id.clone()
                        } else {
                            edge.source_node_id.clone()
                        };
                        Store::delete_edge_on(&tx, &edge.id)?;
                        Store::recompute_edge_count_on(&tx, &other)?;
                    }
                    Store::delete_node_on(&tx, &node_id)?;
                    removed_node_ids.push(node_id);
                } else {
                    Store::recompute_node_stats_on(&tx, &node_id)?;
                    Store::recompute_edge_count_on(&tx, &node_id)?;
                }
            }

            // Segment bookkeeping
            for (i, (offset, segment)) in segments.iter().enumerate() {
                let response = responses.get(i);
                tx.execute(
                    "INSERT INTO entity_extraction_segments (
                        id, document_id, segment_index, character_start, character_end,
                        entity_count, relationship_count, token_usage, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    rusqlite::params![
                        crate::storage::new_id(),
                        document_id,
                        i as i64,
                        *offset as i64,
                        (*offset + segment.chars().count()) as i64,
                        response.map(|r| r.entities.len() as i64).unwrap_or(0),
                        response.map(|r| r.relationships.len() as i64).unwrap_or(0),
                        serde_json::to_string(&usage)?,
                        crate::storage::now_rfc3339(),
                    ],
                )?;
            }

            Store::refresh_metadata(&tx)?;
            tx.commit()?;
        }

        {
            let mut index = self.store.entity_index()?;
            for id in &removed_node_ids {
                let _ = index.remove(id);
            }
        }

        Ok(ExtractionReport {
            document_id: document_id.to_string(),
            entity_count: entities.len(),
            relationship_count: relationships.len(),
            mention_count,
            nodes_created,
            nodes_matched,
            edges_created,
            edges_updated,
            segment_count: segments.len(),
            token_usage: usage,
            warnings,
        })
    }
}

// ============================================================================
// MERGE AND POST-PROCESSING
// ============================================================================

/// Merge per-segment responses: dedupe entities by (type, normalized text)
/// keeping the stronger canonical form, boost confidence by cross-segment
/// agreement, and resolve relationship local ids.
fn merge_segments(
    responses: &[OracleResponse],
    warnings: &mut Vec<String>,
) -> (BTreeMap<EntityKey, MergedEntity>, Vec<MergedRelationship>) {
    let mut entities: BTreeMap<EntityKey, MergedEntity> = BTreeMap::new();
    // (segment, local id) -> merged key
    let mut local_ids: HashMap<(usize, String), EntityKey> = HashMap::new();

    for (segment, response) in responses.iter().enumerate() {
        for raw in &response.entities {
            let type_str = raw.entity_type.to_lowercase();
            let Some(mut entity_type) = EntityType::parse_name(&type_str) else {
                warnings.push(format!(
                    "dropped entity '{}' with unknown type '{}'",
                    raw.canonical_name, raw.entity_type
                ));
                continue;
            };

            match apply_noise_filters(entity_type, &raw.canonical_name) {
                FilterOutcome::Drop(reason) => {
                    tracing::debug!(
                        "Noise filter dropped '{}' ({})",
                        raw.canonical_name,
                        reason
                    );
                    continue;
                }
                FilterOutcome::Reclassify(new_type) => entity_type = new_type,
                FilterOutcome::Keep => {}
            }

            let key: EntityKey = (entity_type, normalize_text(&raw.canonical_name));
            if key.1.is_empty() {
                continue;
            }
            local_ids.insert((segment, raw.id.clone()), key.clone());

            match entities.get_mut(&key) {
                Some(existing) => {
                    if better_canonical(raw, existing) {
                        if existing.canonical != raw.canonical_name
                            && !existing.aliases.contains(&existing.canonical)
                        {
                            existing.aliases.push(existing.canonical.clone());
                        }
                        existing.canonical = raw.canonical_name.clone();
                    }
                    existing.confidence = existing.confidence.max(raw.confidence);
                    for alias in &raw.aliases {
                        if *alias != existing.canonical && !existing.aliases.contains(alias) {
                            existing.aliases.push(alias.clone());
                        }
                    }
                    if existing.last_segment != segment {
                        existing.occurrences += 1;
                        existing.last_segment = segment;
                    }
                }
                None => {
                    entities.insert(
                        key,
                        MergedEntity {
                            entity_type,
                            canonical: raw.canonical_name.clone(),
                            confidence: raw.confidence,
                            aliases: raw
                                .aliases
                                .iter()
                                .filter(|a| **a != raw.canonical_name)
                                .cloned()
                                .collect(),
                            occurrences: 1,
                            last_segment: segment,
                        },
                    );
                }
            }
        }
    }

    // Cross-segment agreement boost
    for entity in entities.values_mut() {
        if entity.occurrences > 1 {
            let boost = (0.05 * (entity.occurrences - 1) as f64).min(0.15);
            entity.confidence = (entity.confidence + boost).min(1.0);
        }
    }

    // Relationships: resolve local ids, drop unknown references and types,
    // dedupe on (source, target, type) keeping the max confidence
    let mut merged_rels: BTreeMap<(EntityKey, EntityKey, RelationshipType), MergedRelationship> =
        BTreeMap::new();
    for (segment, response) in responses.iter().enumerate() {
        for raw in &response.relationships {
            let Some(rel_type) = RelationshipType::parse_name(&raw.relationship_type.to_lowercase())
            else {
                warnings.push(format!(
                    "dropped relationship with unknown type '{}'",
                    raw.relationship_type
                ));
                continue;
            };
            let (Some(source_key), Some(target_key)) = (
                local_ids.get(&(segment, raw.source_id.clone())),
                local_ids.get(&(segment, raw.target_id.clone())),
            ) else {
                warnings.push(format!(
                    "dropped relationship {} -> {} referencing unknown entity ids",
                    raw.source_id, raw.target_id
                ));
                continue;
            };

            let dedupe_key = (source_key.clone(), target_key.clone(), rel_type);
            match merged_rels.get_mut(&dedupe_key) {
                Some(existing) => {
                    existing.confidence = existing.confidence.max(raw.confidence);
                    if existing.evidence.is_none() {
                        existing.evidence = raw.evidence.clone();
                    }
                    if existing.temporal.is_none() {
                        existing.temporal = raw.temporal.clone();
                    }
                }
                None => {
                    merged_rels.insert(
                        dedupe_key,
                        MergedRelationship {
                            source_key: source_key.clone(),
                            target_key: target_key.clone(),
                            relationship_type: rel_type,
                            confidence: raw.confidence,
                            evidence: raw.evidence.clone(),
                            temporal: raw.temporal.clone(),
                        },
                    );
                }
            }
        }
    }

    (entities, merged_rels.into_values().collect())
}

/// Deterministic canonical-form contest: higher confidence wins, then the
/// longer surface form, then lexicographic order
fn better_canonical(candidate: &OracleEntity, incumbent: &MergedEntity) -> bool {
    if candidate.confidence != incumbent.confidence {
        return candidate.confidence > incumbent.confidence;
    }
    let (c_len, i_len) = (
        candidate.canonical_name.chars().count(),
        incumbent.canonical.chars().count(),
    );
    if c_len != i_len {
        return c_len > i_len;
    }
    candidate.canonical_name < incumbent.canonical
}

/// `ln(1 + evidence_count) * type_multiplier`, with optional overrides
pub(crate) fn normalized_edge_weight(
    evidence_count: i64,
    relationship_type: RelationshipType,
    overrides: Option<&HashMap<RelationshipType, f64>>,
) -> f64 {
    let multiplier = overrides
        .and_then(|m| m.get(&relationship_type).copied())
        .unwrap_or_else(|| relationship_type.default_multiplier());
    (1.0 + evidence_count as f64).ln() * multiplier
}

/// Hash over the deterministic JSON serialization of the deduplicated,
/// sorted entity set
fn entity_set_hash(entities: &BTreeMap<EntityKey, MergedEntity>) -> String {
    let array: Vec<serde_json::Value> = entities
        .iter()
        .map(|((entity_type, normalized), entity)| {
            serde_json::json!({
                "type": entity_type.as_str(),
                "normalized": normalized,
                "canonical": entity.canonical,
                "confidence": entity.confidence,
            })
        })
        .collect();
    hash::hash_json(&serde_json::Value::Array(array))
}

fn append_evidence(metadata_json: Option<&str>, evidence: &str) -> String {
    let mut value: serde_json::Value = metadata_json
        .and_then(|m| serde_json::from_str(m).ok())
        .unwrap_or_else(|| serde_json::json!({}));
    let list = value
        .as_object_mut()
        .map(|obj| {
            obj.entry("evidence")
                .or_insert_with(|| serde_json::json!([]))
        })
        .and_then(|v| v.as_array_mut());
    if let Some(list) = list {
        if !list.iter().any(|v| v.as_str() == Some(evidence)) {
            list.push(serde_json::json!(evidence));
        }
    }
    hash::canonical_json(&value)
}

fn temporal_range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(\d{4}-\d{2}-\d{2})(?:\s*(?:to|–|—|-)\s*(\d{4}-\d{2}-\d{2}))?$",
        )
        .expect("static regex")
    })
}

/// `YYYY-MM-DD` -> valid_from; `YYYY-MM-DD (to|-) YYYY-MM-DD` -> both bounds
fn parse_temporal(temporal: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(text) = temporal else {
        return (None, None);
    };
    let Some(caps) = temporal_range_re().captures(text.trim()) else {
        return (None, None);
    };
    (
        caps.get(1).map(|m| m.as_str().to_string()),
        caps.get(2).map(|m| m.as_str().to_string()),
    )
}

/// Single segment under the limit; otherwise two overlapping halves split
/// at the sentence boundary nearest the midpoint
fn segment_text(text: &str, limit: usize, overlap: usize) -> Vec<(usize, String)> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= limit {
        return vec![(0, text.to_string())];
    }

    let midpoint = chars.len() / 2;
    let boundary = find_sentence_boundary(&chars, midpoint);
    let half_overlap = overlap / 2;

    let first_end = (boundary + half_overlap).min(chars.len());
    let second_start = boundary.saturating_sub(half_overlap);

    vec![
        (0, chars[..first_end].iter().collect()),
        (second_start, chars[second_start..].iter().collect()),
    ]
}

/// Nearest ". " to the midpoint within a 10k-char window, else the midpoint
fn find_sentence_boundary(chars: &[char], midpoint: usize) -> usize {
    const WINDOW: usize = 10_000;
    let from = midpoint.saturating_sub(WINDOW);
    let to = (midpoint + WINDOW).min(chars.len().saturating_sub(1));

    let mut best: Option<usize> = None;
    for i in from..to {
        if chars[i] == '.' && chars.get(i + 1).map(|c| c.is_whitespace()).unwrap_or(false) {
            let candidate = i + 2;
            let better = match best {
                Some(current) => {
                    candidate.abs_diff(midpoint) < current.abs_diff(midpoint)
                }
                None => true,
            };
            if better {
                best = Some(candidate);
            }
        }
    }
    best.unwrap_or(midpoint)
}
