//! Vector Index
//!
//! The opaque ANN interface the store consumes: `insert(id, f32[D])` and
//! `match_k(query, k) -> (id, distance)`, backed by a USearch HNSW index.
//! One instance holds chunk/image/extraction embeddings keyed by embedding
//! id, a second holds entity-name embeddings keyed by node id. Both are
//! rebuilt from their relational tables at open time, which keeps table
//! rows and index entries 1:1 without a separate persistence format.
//!
//! USearch addresses vectors by `u64` keys and wants capacity reserved up
//! front, so artifact ids live in a slot table: slot *i* names the artifact
//! registered under key *i*, removals push the slot onto a free list, and
//! capacity grows a block at a time.

use std::collections::HashMap;

use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::model::EMBEDDING_DIMENSIONS;

/// Capacity is reserved in blocks of this many vectors. Matches the order
/// of magnitude of one document's chunk-embedding batch, so a typical
/// ingest reserves once.
const RESERVE_BLOCK: usize = 256;

/// Vector index error type
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum VectorSearchError {
    /// The underlying index rejected an operation
    #[error("vector index backend: {0}")]
    Backend(String),
    /// Vector width does not match the index
    #[error("vector has {got} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// HNSW tuning knobs
#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
    pub dimensions: usize,
    /// Graph degree; raising it trades memory for recall
    pub connectivity: usize,
    /// Candidate-list width while building
    pub expansion_add: usize,
    /// Candidate-list width while querying
    pub expansion_search: usize,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            dimensions: EMBEDDING_DIMENSIONS,
            connectivity: 24,
            expansion_add: 96,
            expansion_search: 48,
        }
    }
}

/// Index statistics
#[derive(Debug, Clone)]
pub struct VectorIndexStats {
    pub total_vectors: usize,
    pub dimensions: usize,
    pub memory_bytes: usize,
}

/// HNSW index keyed by artifact id strings
pub struct VectorIndex {
    index: Index,
    dimensions: usize,
    /// Slot `i` holds the artifact id registered under usearch key `i`
    slots: Vec<Option<String>>,
    by_id: HashMap<String, u64>,
    /// Recycled slots from removals, reused before the table grows
    free: Vec<u64>,
}

impl VectorIndex {
    /// 768-dimension cosine index with default tuning
    pub fn new() -> Result<Self, VectorSearchError> {
        Self::with_config(VectorIndexConfig::default())
    }

    pub fn with_config(config: VectorIndexConfig) -> Result<Self, VectorSearchError> {
        let index = Index::new(&IndexOptions {
            dimensions: config.dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: config.connectivity,
            expansion_add: config.expansion_add,
            expansion_search: config.expansion_search,
            multi: false,
        })
        .map_err(backend)?;

        Ok(Self {
            index,
            dimensions: config.dimensions,
            slots: Vec::new(),
            by_id: HashMap::new(),
            free: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Register a vector under an id. An id that is already present is
    /// evicted first, so insert doubles as replace.
    pub fn insert(&mut self, id: &str, vector: &[f32]) -> Result<(), VectorSearchError> {
        self.check_width(vector.len())?;
        self.evict(id)?;

        let key = match self.free.pop() {
            Some(recycled) => recycled,
            None => {
                self.slots.push(None);
                (self.slots.len() - 1) as u64
            }
        };

        if self.index.size() >= self.index.capacity() {
            self.index
                .reserve(self.index.size() + RESERVE_BLOCK)
                .map_err(backend)?;
        }
        self.index.add(key, vector).map_err(backend)?;

        self.slots[key as usize] = Some(id.to_string());
        self.by_id.insert(id.to_string(), key);
        Ok(())
    }

    /// Remove a vector by id; returns whether it was present
    pub fn remove(&mut self, id: &str) -> Result<bool, VectorSearchError> {
        self.evict(id)
    }

    fn evict(&mut self, id: &str) -> Result<bool, VectorSearchError> {
        let Some(key) = self.by_id.remove(id) else {
            return Ok(false);
        };
        self.index.remove(key).map_err(backend)?;
        self.slots[key as usize] = None;
        self.free.push(key);
        Ok(true)
    }

    /// k-NN query. Returns `(id, distance)` pairs nearest-first; cosine
    /// distance, so `similarity = 1.0 - distance`.
    pub fn match_k(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(String, f32)>, VectorSearchError> {
        self.check_width(query.len())?;
        if k == 0 || self.by_id.is_empty() {
            return Ok(Vec::new());
        }

        let found = self.index.search(query, k).map_err(backend)?;
        let matches = found
            .keys
            .iter()
            .zip(&found.distances)
            .filter_map(|(key, distance)| {
                let slot = self.slots.get(*key as usize)?;
                slot.as_ref().map(|id| (id.clone(), *distance))
            })
            .collect();
        Ok(matches)
    }

    pub fn stats(&self) -> VectorIndexStats {
        VectorIndexStats {
            total_vectors: self.len(),
            dimensions: self.dimensions,
            memory_bytes: self.index.serialized_length(),
        }
    }

    fn check_width(&self, got: usize) -> Result<(), VectorSearchError> {
        if got == self.dimensions {
            Ok(())
        } else {
            Err(VectorSearchError::DimensionMismatch {
                expected: self.dimensions,
                got,
            })
        }
    }
}

fn backend(err: impl std::fmt::Display) -> VectorSearchError {
    VectorSearchError::Backend(err.to_string())
}
