//! Query Surfaces
//!
//! Composed read operations over the four lower layers: text entity search
//! with knowledge-graph enrichment, timeline construction from date
//! entities, and the witness-analysis prompt composer.

mod entity_search;
mod timeline;
mod witness;

pub use entity_search::{
    search_entities, EntityHit, EntitySearchOptions, KgEnrichment, NeighborSummary,
};
pub use timeline::{
    build_timeline, parse_date_literal, PathFilter, TimelineEntry, TimelineOptions,
    TimelineResult,
};
pub use witness::{compose_witness_analysis, WitnessOptions, WitnessReport};
