//! Knowledge-Graph Engine
//!
//! Entity resolution (exact / fuzzy / ai), full and incremental builds,
//! edge-weight normalization, merge/split/prune mutations, cascade-side
//! document cleanup, BFS path-finding, semantic entity search, and graph
//! statistics. Every destructive operation runs in one transaction.

mod builder;
mod mutate;
mod normalize;
mod paths;
mod resolve;
mod semantic;
mod stats;

pub use builder::{BuildMode, BuildReport, GraphBuilder};
pub use mutate::{
    merge_nodes, prune_edges, split_node, MergeReport, PruneOptions, PrunePreview, PruneSample,
    SplitReport,
};
pub use normalize::{normalize_weights, NormalizeOptions, NormalizeReport};
pub use paths::{find_paths, ChunkEvidence, PathEdge, PathOptions, PathResult, TimeRange, MAX_HOPS};
pub use resolve::{dice_coefficient, CandidateNode, ResolutionOracle};
pub use semantic::{
    ensure_entity_embeddings, semantic_entity_search, EntitySearchHit, SemanticSearchOptions,
};
pub use stats::{graph_stats, GraphStats, TopNode};
