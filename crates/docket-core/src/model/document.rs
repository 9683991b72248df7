//! Document Artifacts
//!
//! Rows produced by ingest and OCR: the document identity itself, the
//! immutable OCR result, contiguous text chunks, and embedding records.
//! Each row carries a `provenance_id` pointing at the processing step that
//! produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Embedding vector width. Chunk, image-description, and entity embeddings
/// all share this dimension; the vector index rejects anything else.
pub const EMBEDDING_DIMENSIONS: usize = 768;

// ============================================================================
// ENUMS
// ============================================================================

/// Lifecycle status of an ingested document
///
/// Transitions are monotone except `processing -> failed` and
/// `processing -> complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    Pending,
    Processing,
    Complete,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Complete => "complete",
            DocumentStatus::Failed => "failed",
        }
    }

    /// Parse from the stored column value. Unknown strings are rejected.
    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DocumentStatus::Pending),
            "processing" => Some(DocumentStatus::Processing),
            "complete" => Some(DocumentStatus::Complete),
            "failed" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// OCR quality mode requested from the OCR service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OcrQuality {
    Fast,
    #[default]
    Balanced,
    Accurate,
}

impl OcrQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrQuality::Fast => "fast",
            OcrQuality::Balanced => "balanced",
            OcrQuality::Accurate => "accurate",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "fast" => Some(OcrQuality::Fast),
            "balanced" => Some(OcrQuality::Balanced),
            "accurate" => Some(OcrQuality::Accurate),
            _ => None,
        }
    }
}

/// Embedding progress for a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingStatus {
    #[default]
    Pending,
    Complete,
    Failed,
}

impl EmbeddingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingStatus::Pending => "pending",
            EmbeddingStatus::Complete => "complete",
            EmbeddingStatus::Failed => "failed",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EmbeddingStatus::Pending),
            "complete" => Some(EmbeddingStatus::Complete),
            "failed" => Some(EmbeddingStatus::Failed),
            _ => None,
        }
    }
}

/// Embedding task type, passed through to the embedding oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    SearchDocument,
    SearchQuery,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::SearchDocument => "search_document",
            TaskType::SearchQuery => "search_query",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "search_document" => Some(TaskType::SearchDocument),
            "search_query" => Some(TaskType::SearchQuery),
            _ => None,
        }
    }
}

// ============================================================================
// DOCUMENT
// ============================================================================

/// Identity of an ingested file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Absolute path of the source file at ingest time
    pub file_path: String,
    pub file_name: String,
    /// `sha256:<hex>` over the raw bytes
    pub file_hash: String,
    pub file_size: i64,
    /// File type label (pdf, tiff, png, ...)
    pub file_type: String,
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<i64>,
    /// Optional source metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// External upload reference (OCR service file handle)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_ref: Option<String>,
    /// Owning DOCUMENT-typed provenance row
    pub provenance_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a new document
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    pub file_path: String,
    pub file_name: String,
    pub file_hash: String,
    pub file_size: i64,
    pub file_type: String,
    pub page_count: Option<i64>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub upload_ref: Option<String>,
}

// ============================================================================
// OCR RESULT
// ============================================================================

/// Immutable OCR output, one per document once OCR succeeds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResult {
    pub id: String,
    pub document_id: String,
    pub extracted_text: String,
    /// Character length of `extracted_text`; chunk ranges are bounded by it
    pub text_length: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub quality_mode: OcrQuality,
    pub page_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// `sha256:<hex>` over `extracted_text`
    pub content_hash: String,
    /// Structured block tree from the OCR engine, opaque JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extras_json: Option<String>,
    pub provenance_id: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for an OCR result
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewOcrResult {
    pub document_id: String,
    pub extracted_text: String,
    pub request_id: Option<String>,
    pub quality_mode: OcrQuality,
    pub page_count: i64,
    pub quality_score: Option<f64>,
    pub cost: Option<f64>,
    pub blocks_json: Option<String>,
    pub extras_json: Option<String>,
}

// ============================================================================
// CHUNK
// ============================================================================

/// A contiguous span of OCR text, identified by a half-open character range
/// `[character_start, character_end)` within the OCR text
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub ocr_result_id: String,
    /// 0-based, dense per document
    pub chunk_index: i64,
    pub text: String,
    pub character_start: i64,
    pub character_end: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<i64>,
    /// Bytes shared with the previous / next chunk
    pub overlap_previous: i64,
    pub overlap_next: i64,
    /// `sha256:<hex>` over `text`
    pub text_hash: String,
    pub embedding_status: EmbeddingStatus,
    pub provenance_id: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a chunk (batch insert friendly)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewChunk {
    pub chunk_index: i64,
    pub text: String,
    pub character_start: i64,
    pub character_end: i64,
    pub page_number: Option<i64>,
    pub overlap_previous: i64,
    pub overlap_next: i64,
}

// ============================================================================
// EMBEDDING
// ============================================================================

/// A stored vector for a chunk, an image description, or a structured
/// extraction record
///
/// Exactly one of `chunk_id`, `image_id`, `extraction_id` is non-null; the
/// schema enforces this with a CHECK constraint. A matching row in the
/// vector index exists with the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingRecord {
    pub id: String,
    pub document_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub vector: Vec<f32>,
    pub dimensions: i64,
    pub model_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    pub task_type: TaskType,
    /// Text the vector was computed from; kept for image descriptions so the
    /// FTS shadow table can index them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
    pub provenance_id: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for an embedding. Exactly one of `chunk_id`, `image_id`,
/// `extraction_id` must be set.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewEmbedding {
    pub chunk_id: Option<String>,
    pub image_id: Option<String>,
    pub extraction_id: Option<String>,
    pub vector: Vec<f32>,
    pub model_name: String,
    pub model_version: Option<String>,
    pub task_type: TaskType,
    pub original_text: Option<String>,
}

// ============================================================================
// IMAGE / EXTRACTION / FORM FILL / COMPARISON
// ============================================================================

/// An image extracted from a document page, optionally described by a VLM
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub id: String,
    pub document_id: String,
    pub page_number: Option<i64>,
    pub image_hash: String,
    pub vlm_description: Option<String>,
    pub provenance_id: String,
    pub created_at: DateTime<Utc>,
}

/// A structured extraction produced against a named schema
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRecord {
    pub id: String,
    pub document_id: String,
    pub schema_name: Option<String>,
    pub extraction_json: String,
    pub provenance_id: String,
    pub created_at: DateTime<Utc>,
}

/// A filled form derived from a document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormFillRecord {
    pub id: String,
    pub document_id: String,
    pub form_name: Option<String>,
    pub fill_json: String,
    pub provenance_id: String,
    pub created_at: DateTime<Utc>,
}

/// A cross-document comparison summary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRecord {
    pub id: String,
    /// Documents that participated in the comparison
    pub document_ids: Vec<String>,
    pub summary: Option<String>,
    pub comparison_json: String,
    pub provenance_id: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// DATABASE METADATA
// ============================================================================

/// Single-row metadata carried by each database file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseMetadata {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub document_count: i64,
    pub chunk_count: i64,
    pub embedding_count: i64,
    pub entity_count: i64,
    pub node_count: i64,
    pub edge_count: i64,
}

/// Result row of `Store::list` - one per readable database file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    pub name: String,
    pub path: String,
    pub file_size: i64,
    pub metadata: DatabaseMetadata,
}
