//! Knowledge Graph Rows
//!
//! `KgNode` is a canonical entity shared across documents; `NodeEntityLink`
//! ties it to the per-document `Entity` rows that contributed to it; `KgEdge`
//! is a typed, weighted relationship between two nodes.
//!
//! Edge direction invariant: `source_node_id < target_node_id`
//! lexicographically, and at most one row exists per
//! `(source, target, relationship_type)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntityType;

// ============================================================================
// RELATIONSHIP TYPES
// ============================================================================

/// Closed set of edge relationship types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    CoLocated,
    CoMentioned,
    WorksAt,
    Represents,
    LocatedIn,
    FiledIn,
    Cites,
    References,
    PartyTo,
    RelatedTo,
    Precedes,
    OccurredAt,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::CoLocated => "co_located",
            RelationshipType::CoMentioned => "co_mentioned",
            RelationshipType::WorksAt => "works_at",
            RelationshipType::Represents => "represents",
            RelationshipType::LocatedIn => "located_in",
            RelationshipType::FiledIn => "filed_in",
            RelationshipType::Cites => "cites",
            RelationshipType::References => "references",
            RelationshipType::PartyTo => "party_to",
            RelationshipType::RelatedTo => "related_to",
            RelationshipType::Precedes => "precedes",
            RelationshipType::OccurredAt => "occurred_at",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "co_located" => Some(RelationshipType::CoLocated),
            "co_mentioned" => Some(RelationshipType::CoMentioned),
            "works_at" => Some(RelationshipType::WorksAt),
            "represents" => Some(RelationshipType::Represents),
            "located_in" => Some(RelationshipType::LocatedIn),
            "filed_in" => Some(RelationshipType::FiledIn),
            "cites" => Some(RelationshipType::Cites),
            "references" => Some(RelationshipType::References),
            "party_to" => Some(RelationshipType::PartyTo),
            "related_to" => Some(RelationshipType::RelatedTo),
            "precedes" => Some(RelationshipType::Precedes),
            "occurred_at" => Some(RelationshipType::OccurredAt),
            _ => None,
        }
    }

    /// Default weight multiplier used by normalization
    /// (`normalized_weight = ln(1 + evidence_count) * multiplier`)
    pub fn default_multiplier(&self) -> f64 {
        match self {
            RelationshipType::CoLocated => 1.5,
            RelationshipType::CoMentioned => 1.0,
            RelationshipType::WorksAt => 2.0,
            RelationshipType::Represents => 2.0,
            RelationshipType::LocatedIn => 1.5,
            RelationshipType::FiledIn => 1.5,
            RelationshipType::Cites => 1.5,
            RelationshipType::References => 1.0,
            RelationshipType::PartyTo => 2.0,
            RelationshipType::RelatedTo => 1.0,
            RelationshipType::Precedes => 1.0,
            RelationshipType::OccurredAt => 1.0,
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// RESOLUTION METHOD
// ============================================================================

/// How a `NodeEntityLink` was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    Exact,
    Fuzzy,
    Ai,
    GeminiCoreference,
}

impl ResolutionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionMethod::Exact => "exact",
            ResolutionMethod::Fuzzy => "fuzzy",
            ResolutionMethod::Ai => "ai",
            ResolutionMethod::GeminiCoreference => "gemini_coreference",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "exact" => Some(ResolutionMethod::Exact),
            "fuzzy" => Some(ResolutionMethod::Fuzzy),
            "ai" => Some(ResolutionMethod::Ai),
            "gemini_coreference" => Some(ResolutionMethod::GeminiCoreference),
            _ => None,
        }
    }
}

// ============================================================================
// NODE / LINK / EDGE
// ============================================================================

/// A canonical entity shared across documents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KgNode {
    pub id: String,
    pub entity_type: EntityType,
    /// Chosen display form; all other observed forms become aliases
    pub canonical_name: String,
    pub normalized_name: String,
    /// Ordered set of alternate surface forms (no duplicates, insertion order)
    pub aliases: Vec<String>,
    /// Distinct documents contributing linked entities
    pub document_count: i64,
    /// Total mentions across linked entities
    pub mention_count: i64,
    /// Edges touching this node
    pub edge_count: i64,
    pub avg_confidence: f64,
    /// Monotone in confidence, document count, and mention count
    pub importance_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_json: Option<String>,
    pub provenance_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Many-to-many link from a node to a per-document entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEntityLink {
    pub id: String,
    pub node_id: String,
    pub entity_id: String,
    pub document_id: String,
    pub similarity: f64,
    pub method: ResolutionMethod,
    pub created_at: DateTime<Utc>,
}

/// Typed relationship between two nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KgEdge {
    pub id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    pub relationship_type: RelationshipType,
    /// Raw weight (max observed extraction confidence)
    pub weight: f64,
    /// `ln(1 + evidence_count) * type_multiplier`
    pub normalized_weight: f64,
    pub evidence_count: i64,
    pub contradiction_count: i64,
    /// Documents in which evidence for this edge was observed
    pub document_ids: Vec<String>,
    /// Temporal validity bounds, ISO dates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<String>,
    /// Evidence snippets and other edge metadata, opaque JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_json: Option<String>,
    pub provenance_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KgEdge {
    /// Order two node ids per the direction invariant
    pub fn order_endpoints<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
        if a <= b { (a, b) } else { (b, a) }
    }
}
