//! Mock Oracles
//!
//! The LLM and embedding services are trait seams in the core; these mocks
//! script them for deterministic tests.

use std::sync::Mutex;

use docket_core::{
    AnalysisOracle, EmbeddingOracle, ExtractionOracle, OracleEntity, OracleError,
    OracleRelationship, OracleReply, OracleRequest, OracleResponse, TaskType, TokenUsage,
    EMBEDDING_DIMENSIONS,
};

/// One scripted reply: raw text plus reported token usage
#[derive(Debug, Clone)]
pub struct ScriptedReply {
    pub text: String,
    pub usage: TokenUsage,
}

impl ScriptedReply {
    /// A well-formed reply carrying the given response
    pub fn ok(response: &OracleResponse) -> Self {
        Self {
            text: serde_json::to_string(response).expect("serialize mock response"),
            usage: TokenUsage {
                input_tokens: 1_000,
                output_tokens: 5_000,
            },
        }
    }

    /// Raw text reply (malformed-JSON and recovery tests)
    pub fn raw(text: &str) -> Self {
        Self {
            text: text.to_string(),
            usage: TokenUsage {
                input_tokens: 1_000,
                output_tokens: 5_000,
            },
        }
    }

    pub fn with_output_tokens(mut self, output_tokens: i64) -> Self {
        self.usage.output_tokens = output_tokens;
        self
    }
}

/// Scripted extraction oracle: pops one reply per call, records every
/// request for assertions. An exhausted script fails the call.
pub struct MockExtractionOracle {
    script: Mutex<Vec<ScriptedReply>>,
    pub requests: Mutex<Vec<OracleRequest>>,
}

impl MockExtractionOracle {
    pub fn with_script(replies: Vec<ScriptedReply>) -> Self {
        let mut script = replies;
        script.reverse();
        Self {
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always-the-same-response oracle for single-call tests
    pub fn returning(response: &OracleResponse) -> Self {
        Self::with_script(vec![ScriptedReply::ok(response)])
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

impl ExtractionOracle for MockExtractionOracle {
    fn complete(&self, request: &OracleRequest) -> Result<OracleReply, OracleError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        let reply = self
            .script
            .lock()
            .expect("script lock")
            .pop()
            .ok_or_else(|| OracleError::Failed("mock script exhausted".into()))?;
        Ok(OracleReply {
            text: reply.text,
            usage: reply.usage,
        })
    }
}

/// Analysis oracle that echoes a canned report
pub struct MockAnalysisOracle {
    pub response: String,
}

impl MockAnalysisOracle {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
        }
    }
}

impl AnalysisOracle for MockAnalysisOracle {
    fn analyze(&self, _prompt: &str) -> Result<OracleReply, OracleError> {
        Ok(OracleReply {
            text: self.response.clone(),
            usage: TokenUsage {
                input_tokens: 2_000,
                output_tokens: 800,
            },
        })
    }
}

/// Deterministic embedding oracle: the vector depends only on the first
/// word of the text, so "Alice Johnson (person)" and the query "alice"
/// embed identically while unrelated names land far apart.
pub struct MockEmbeddingOracle;

impl EmbeddingOracle for MockEmbeddingOracle {
    fn embed(&self, text: &str, _task: TaskType) -> Result<Vec<f32>, OracleError> {
        let key: String = text
            .to_lowercase()
            .chars()
            .take_while(|c| c.is_alphanumeric())
            .collect();
        let mut state: u64 = 0x9E3779B97F4A7C15;
        for b in key.bytes() {
            state = state.wrapping_mul(0x100000001B3).wrapping_add(b as u64);
        }

        let mut vector = Vec::with_capacity(EMBEDDING_DIMENSIONS);
        for _ in 0..EMBEDDING_DIMENSIONS {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            vector.push(((state >> 33) as f32 / (1u64 << 31) as f32) - 1.0);
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        Ok(vector.into_iter().map(|v| v / norm.max(1e-6)).collect())
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

/// Entity literal for mock responses
pub fn entity(id: &str, name: &str, entity_type: &str, confidence: f64) -> OracleEntity {
    OracleEntity {
        id: id.to_string(),
        canonical_name: name.to_string(),
        entity_type: entity_type.to_string(),
        aliases: Vec::new(),
        confidence,
    }
}

/// Relationship literal for mock responses
pub fn relationship(
    source_id: &str,
    target_id: &str,
    relationship_type: &str,
    confidence: f64,
) -> OracleRelationship {
    OracleRelationship {
        source_id: source_id.to_string(),
        target_id: target_id.to_string(),
        relationship_type: relationship_type.to_string(),
        confidence,
        evidence: None,
        temporal: None,
    }
}
