//! Provenance DAG Rows
//!
//! Every durable artifact is produced by a processing step recorded as a
//! `ProvenanceRecord`. Records are append-only: once written, the only
//! mutation ever applied is re-parenting `root_document_id` to the
//! `ORPHANED_ROOT` sentinel when the root document is deleted but the
//! artifact survives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel root for provenance whose originating document was deleted.
/// A reserved string, never a real row id; comparisons are literal.
pub const ORPHANED_ROOT: &str = "ORPHANED_ROOT";

/// Closed set of processing-step types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvenanceType {
    Document,
    OcrResult,
    Chunk,
    Image,
    VlmDescription,
    Embedding,
    Extraction,
    FormFill,
    EntityExtraction,
    KnowledgeGraph,
    Comparison,
}

impl ProvenanceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvenanceType::Document => "DOCUMENT",
            ProvenanceType::OcrResult => "OCR_RESULT",
            ProvenanceType::Chunk => "CHUNK",
            ProvenanceType::Image => "IMAGE",
            ProvenanceType::VlmDescription => "VLM_DESCRIPTION",
            ProvenanceType::Embedding => "EMBEDDING",
            ProvenanceType::Extraction => "EXTRACTION",
            ProvenanceType::FormFill => "FORM_FILL",
            ProvenanceType::EntityExtraction => "ENTITY_EXTRACTION",
            ProvenanceType::KnowledgeGraph => "KNOWLEDGE_GRAPH",
            ProvenanceType::Comparison => "COMPARISON",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "DOCUMENT" => Some(ProvenanceType::Document),
            "OCR_RESULT" => Some(ProvenanceType::OcrResult),
            "CHUNK" => Some(ProvenanceType::Chunk),
            "IMAGE" => Some(ProvenanceType::Image),
            "VLM_DESCRIPTION" => Some(ProvenanceType::VlmDescription),
            "EMBEDDING" => Some(ProvenanceType::Embedding),
            "EXTRACTION" => Some(ProvenanceType::Extraction),
            "FORM_FILL" => Some(ProvenanceType::FormFill),
            "ENTITY_EXTRACTION" => Some(ProvenanceType::EntityExtraction),
            "KNOWLEDGE_GRAPH" => Some(ProvenanceType::KnowledgeGraph),
            "COMPARISON" => Some(ProvenanceType::Comparison),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProvenanceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Source-artifact kind referenced by `source_id` (parallel closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    File,
    Document,
    OcrResult,
    Chunk,
    Image,
    Extraction,
    KgNode,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::File => "FILE",
            SourceType::Document => "DOCUMENT",
            SourceType::OcrResult => "OCR_RESULT",
            SourceType::Chunk => "CHUNK",
            SourceType::Image => "IMAGE",
            SourceType::Extraction => "EXTRACTION",
            SourceType::KgNode => "KG_NODE",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "FILE" => Some(SourceType::File),
            "DOCUMENT" => Some(SourceType::Document),
            "OCR_RESULT" => Some(SourceType::OcrResult),
            "CHUNK" => Some(SourceType::Chunk),
            "IMAGE" => Some(SourceType::Image),
            "EXTRACTION" => Some(SourceType::Extraction),
            "KG_NODE" => Some(SourceType::KgNode),
            _ => None,
        }
    }
}

/// An append-only node in the provenance DAG
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceRecord {
    pub id: String,
    pub prov_type: ProvenanceType,
    /// Processor that produced the artifact
    pub processor: String,
    pub processor_version: String,
    /// Processing parameters, canonical JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters_json: Option<String>,
    /// `sha256:<hex>` over the produced artifact
    pub content_hash: String,
    /// Hash of the input the step consumed, when meaningful
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_hash: Option<String>,
    /// Upstream artifact reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type: Option<SourceType>,
    /// Primary chain parent; null only for roots
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// All parents (DAG); `parent_id` is always the first element when set
    pub parent_ids: Vec<String>,
    /// Root document of the chain, or [`ORPHANED_ROOT`]
    pub root_document_id: String,
    /// `chain_depth == chain_path.len() - 1`
    pub chain_depth: i64,
    /// Ids from root to this record, inclusive
    pub chain_path: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a provenance record; chain fields (`root_document_id`,
/// `chain_depth`, `chain_path`) are derived from the parent at insert time
#[derive(Debug, Clone)]
pub struct NewProvenance {
    pub prov_type: ProvenanceType,
    pub processor: String,
    pub processor_version: String,
    pub parameters_json: Option<String>,
    pub content_hash: String,
    pub input_hash: Option<String>,
    pub source_id: Option<String>,
    pub source_type: Option<SourceType>,
    /// Primary chain parent; `None` starts a new root chain (DOCUMENT only)
    pub parent_id: Option<String>,
    /// Additional DAG parents beyond `parent_id`
    pub extra_parent_ids: Vec<String>,
    /// Root document id; required when `parent_id` is `None`, ignored (and
    /// inherited from the parent) otherwise
    pub root_document_id: Option<String>,
}
