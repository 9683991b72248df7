//! Entities and Mentions
//!
//! An `Entity` is a per-document mention cluster: one row per canonical
//! entity *within* a document. Cross-document identity lives in the
//! knowledge graph (`KgNode`), linked through `node_entity_links`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of entity types accepted from the extraction oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Date,
    Amount,
    CaseNumber,
    Location,
    Statute,
    Exhibit,
    Medication,
    Diagnosis,
    MedicalDevice,
    Other,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Organization => "organization",
            EntityType::Date => "date",
            EntityType::Amount => "amount",
            EntityType::CaseNumber => "case_number",
            EntityType::Location => "location",
            EntityType::Statute => "statute",
            EntityType::Exhibit => "exhibit",
            EntityType::Medication => "medication",
            EntityType::Diagnosis => "diagnosis",
            EntityType::MedicalDevice => "medical_device",
            EntityType::Other => "other",
        }
    }

    /// Parse the stored column value. Unknown strings are rejected at the
    /// write boundary rather than coerced.
    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "person" => Some(EntityType::Person),
            "organization" => Some(EntityType::Organization),
            "date" => Some(EntityType::Date),
            "amount" => Some(EntityType::Amount),
            "case_number" => Some(EntityType::CaseNumber),
            "location" => Some(EntityType::Location),
            "statute" => Some(EntityType::Statute),
            "exhibit" => Some(EntityType::Exhibit),
            "medication" => Some(EntityType::Medication),
            "diagnosis" => Some(EntityType::Diagnosis),
            "medical_device" => Some(EntityType::MedicalDevice),
            "other" => Some(EntityType::Other),
            _ => None,
        }
    }

    /// Types considered medical for the short-token noise filter
    pub fn is_medical(&self) -> bool {
        matches!(
            self,
            EntityType::Medication | EntityType::Diagnosis | EntityType::MedicalDevice
        )
    }

    /// All accepted variants, in stored-string order
    pub fn all() -> &'static [EntityType] {
        &[
            EntityType::Person,
            EntityType::Organization,
            EntityType::Date,
            EntityType::Amount,
            EntityType::CaseNumber,
            EntityType::Location,
            EntityType::Statute,
            EntityType::Exhibit,
            EntityType::Medication,
            EntityType::Diagnosis,
            EntityType::MedicalDevice,
            EntityType::Other,
        ]
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A per-document entity mention cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub document_id: String,
    pub entity_type: EntityType,
    /// Text exactly as extracted
    pub raw_text: String,
    /// Lowercased, whitespace-collapsed form used for matching
    pub normalized_text: String,
    pub confidence: f64,
    /// Alternate surface forms observed in this document
    pub aliases: Vec<String>,
    /// Number of extraction segments that independently produced this entity
    pub agreement_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_json: Option<String>,
    pub provenance_id: String,
    pub created_at: DateTime<Utc>,
}

/// One textual occurrence of an entity, positioned in OCR text
///
/// `chunk_id` and the character range are null for fallback mentions whose
/// position could not be located.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMention {
    pub id: String,
    pub entity_id: String,
    pub document_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_start: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_end: Option<i64>,
    /// ~100 chars of surrounding text, trimmed to word boundaries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
}
