//! # Docket Core
//!
//! Document-provenance knowledge store. Ingests OCR-processed documents,
//! persists every derived artifact (text chunks, entities, embeddings,
//! structured extractions, knowledge-graph nodes and edges) together with a
//! full provenance chain back to the source bytes, and exposes query
//! operations for entity search, timeline construction, path-finding, and
//! graph mutation.
//!
//! Four cooperating layers:
//!
//! - **Store** — one SQLite file per corpus: migrations, typed CRUD,
//!   FK-ordered cascade delete, WAL journaling, FTS5 shadow tables
//! - **Provenance graph** — append-only DAG of processing events with chain
//!   traversal and orphan re-parenting
//! - **Extraction pipeline** — joint entity+relationship extraction through
//!   an LLM oracle, noise filtering, the regex date supplement, mention
//!   mapping, and a single commit boundary
//! - **Knowledge-graph engine** — entity resolution (exact/fuzzy/ai), edge
//!   weighting, merge/split/prune, BFS path-finding, semantic entity search
//!
//! The LLM, embedding, and OCR services are external collaborators consumed
//! through trait seams ([`ExtractionOracle`], [`EmbeddingOracle`],
//! [`AnalysisOracle`]); the MCP/JSON-RPC shell is a caller. Every operation
//! takes and returns serde-typed values, so a dispatch shell can wrap the
//! surface 1:1.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docket_core::{Store, NewDocument, NewOcrResult, Extractor};
//!
//! let store = Store::create(Some(root.as_ref()), "case-2024")?;
//! let document = store.insert_document(NewDocument {
//!     file_path: "/evidence/filing.pdf".into(),
//!     file_name: "filing.pdf".into(),
//!     file_hash: "sha256:...".into(),
//!     ..Default::default()
//! })?;
//! store.insert_ocr_result(NewOcrResult {
//!     document_id: document.id.clone(),
//!     extracted_text: text,
//!     ..Default::default()
//! })?;
//!
//! let extractor = Extractor::new(&store, &llm);
//! let report = extractor.run(&document.id)?;
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod error;
pub mod extraction;
pub mod graph;
pub mod hash;
pub mod model;
pub mod query;
pub mod search;
pub mod storage;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Errors
pub use error::{Result, StoreError};

// Data model
pub use model::{
    Chunk, ComparisonRecord, DatabaseInfo, DatabaseMetadata, Document, DocumentStatus,
    EmbeddingRecord, EmbeddingStatus, Entity, EntityMention, EntityType, ExtractionRecord,
    FormFillRecord, ImageRecord, KgEdge, KgNode, NewChunk, NewDocument, NewEmbedding,
    NewOcrResult, NewProvenance, NodeEntityLink, OcrQuality, OcrResult, ProvenanceRecord,
    ProvenanceType, RelationshipType, ResolutionMethod, SourceType, TaskType,
    EMBEDDING_DIMENSIONS, ORPHANED_ROOT,
};

// Storage layer
pub use storage::{CascadeDeleteReport, Store};

// Extraction pipeline and oracle seams
pub use extraction::{
    AnalysisOracle, EmbeddingOracle, ExtractionConfig, ExtractionOracle, ExtractionReport,
    Extractor, OracleEntity, OracleError, OracleRelationship, OracleReply, OracleRequest,
    OracleResponse, PromptKind, TokenUsage,
};

// Knowledge-graph engine
pub use graph::{
    dice_coefficient, ensure_entity_embeddings, find_paths, graph_stats, merge_nodes,
    normalize_weights, prune_edges, semantic_entity_search, split_node, BuildMode, BuildReport,
    CandidateNode, EntitySearchHit, GraphBuilder, GraphStats, MergeReport, NormalizeOptions,
    NormalizeReport, PathEdge, PathOptions, PathResult, PruneOptions, PrunePreview,
    ResolutionOracle, SemanticSearchOptions, SplitReport, TimeRange,
};

// Query surfaces
pub use query::{
    build_timeline, compose_witness_analysis, search_entities, EntityHit, EntitySearchOptions,
    KgEnrichment, TimelineEntry, TimelineOptions, TimelineResult, WitnessOptions, WitnessReport,
};

// Vector search
pub use search::{VectorIndex, VectorIndexConfig, VectorIndexStats, VectorSearchError};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        BuildMode, Document, DocumentStatus, Entity, EntityType, ExtractionReport, Extractor,
        GraphBuilder, KgEdge, KgNode, NewChunk, NewDocument, NewEmbedding, NewOcrResult,
        ProvenanceRecord, ProvenanceType, RelationshipType, Result, Store, StoreError,
    };
}
