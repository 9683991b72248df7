//! Data Model
//!
//! Typed rows for every durable artifact: documents and their OCR output,
//! chunks, embeddings, per-document entities with their mentions, the shared
//! knowledge graph, and the provenance DAG that ties all of it back to
//! source bytes.
//!
//! Closed enumerations (`DocumentStatus`, `EntityType`, `RelationshipType`,
//! `ProvenanceType`, ...) are tagged variants here and compact strings in
//! the database; unknown strings are rejected at the write boundary.

mod document;
mod entity;
mod graph;
mod provenance;

pub use document::{
    Chunk, ComparisonRecord, DatabaseInfo, DatabaseMetadata, Document, DocumentStatus,
    EmbeddingRecord, EmbeddingStatus, ExtractionRecord, FormFillRecord, ImageRecord, NewChunk,
    NewDocument, NewEmbedding, NewOcrResult, OcrQuality, OcrResult, TaskType,
    EMBEDDING_DIMENSIONS,
};
pub use entity::{Entity, EntityMention, EntityType};
pub use graph::{KgEdge, KgNode, NodeEntityLink, RelationshipType, ResolutionMethod};
pub use provenance::{NewProvenance, ProvenanceRecord, ProvenanceType, SourceType, ORPHANED_ROOT};
