//! Extraction Pipeline
//!
//! Sits between the LLM extraction oracle and durable storage: size policy
//! and segmenting, strict parse with partial-JSON recovery, noise filtering,
//! the regex date supplement, cross-segment agreement, mention mapping, and
//! the single post-extraction write transaction that lands entities,
//! mentions, knowledge-graph nodes, links, and edges together.

mod dates;
mod filters;
mod hints;
mod mentions;
mod oracle;
mod pipeline;
mod recovery;

pub use dates::scan_dates;
pub use filters::{apply_noise_filters, FilterOutcome};
pub use hints::build_kg_hints;
pub use mentions::map_mentions;
pub use oracle::{
    AnalysisOracle, EmbeddingOracle, ExtractionOracle, OracleEntity, OracleError,
    OracleRelationship, OracleReply, OracleRequest, OracleResponse, PromptKind, TokenUsage,
};
pub use pipeline::{ExtractionConfig, ExtractionReport, Extractor};
pub(crate) use pipeline::normalized_edge_weight;
pub use recovery::recover_partial_json;

/// Matching form of an entity name: lowercased, whitespace collapsed,
/// trimmed.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
