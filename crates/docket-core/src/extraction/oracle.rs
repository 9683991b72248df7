//! Oracle Seams
//!
//! The LLM extractor and the embedding model are external collaborators.
//! The pipeline consumes them through these traits; production adapters
//! live with the caller, mocks live in the e2e test crate.

use serde::{Deserialize, Serialize};

use crate::model::TaskType;

/// Failure modes an oracle call can surface
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    #[error("oracle call timed out after {0}s")]
    Timeout(u64),
    #[error("oracle call cancelled")]
    Cancelled,
    #[error("oracle call failed: {0}")]
    Failed(String),
}

/// Token accounting for one or more oracle calls
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
}

impl TokenUsage {
    pub fn accumulate(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Which response schema a call asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// Entities and relationships in one coordinated pass
    Joint,
    /// Pass 1 of the two-pass fallback: entities only
    EntitiesOnly,
    /// Pass 2 of the two-pass fallback: relationships over known entities
    RelationshipsOnly,
}

/// One extraction call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleRequest {
    pub kind: PromptKind,
    pub text: String,
    /// Bounded hint block built from the current knowledge graph
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<String>,
    /// Pass-1 entities handed to a RelationshipsOnly call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub known_entities: Vec<OracleEntity>,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
}

/// Raw oracle reply: response text plus token accounting. The pipeline owns
/// parsing so it can attempt partial recovery on malformed JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleReply {
    pub text: String,
    pub usage: TokenUsage,
}

/// LLM extraction oracle: `(text, hints) -> (entities, relationships)`
pub trait ExtractionOracle: Send + Sync {
    fn complete(&self, request: &OracleRequest) -> Result<OracleReply, OracleError>;
}

/// Free-form LLM analysis (witness composer and similar surfaces). The
/// response is passed through as-is; only token usage is interpreted.
pub trait AnalysisOracle: Send + Sync {
    fn analyze(&self, prompt: &str) -> Result<OracleReply, OracleError>;
}

/// Embedding oracle: `embed(text) -> f32[768]`
pub trait EmbeddingOracle: Send + Sync {
    fn embed(&self, text: &str, task: TaskType) -> Result<Vec<f32>, OracleError>;

    fn embed_batch(&self, texts: &[String], task: TaskType) -> Result<Vec<Vec<f32>>, OracleError> {
        texts.iter().map(|t| self.embed(t, task)).collect()
    }
}

// ============================================================================
// RESPONSE SCHEMA
// ============================================================================

/// Entity shape in the strict response schema. `id` is a local token used
/// only to link relationships within the same response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleEntity {
    pub id: String,
    pub canonical_name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub confidence: f64,
}

/// Relationship shape in the strict response schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleRelationship {
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    /// `YYYY-MM-DD` or `YYYY-MM-DD (to|-) YYYY-MM-DD`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<String>,
}

/// Full strict-schema response envelope
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OracleResponse {
    #[serde(default)]
    pub entities: Vec<OracleEntity>,
    #[serde(default)]
    pub relationships: Vec<OracleRelationship>,
}
