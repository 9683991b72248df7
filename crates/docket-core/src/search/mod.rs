//! Search Support
//!
//! - HNSW vector index (USearch) behind the opaque interface the store
//!   consumes: `insert(id, vector)` / `match_k(query, k) -> (id, distance)`
//! - FTS5 query sanitizing for the full-text shadow tables

mod fts;
mod vector;

pub use fts::sanitize_fts5_query;
pub use vector::{VectorIndex, VectorIndexConfig, VectorIndexStats, VectorSearchError};
