//! Partial JSON Recovery
//!
//! LLM responses occasionally truncate or wrap the JSON envelope. Rather
//! than failing the whole extraction, scan the text for balanced JSON
//! objects at nesting depths 1 and 2, parse each independently, and keep
//! any that match the entity or relationship shape.

use super::oracle::{OracleEntity, OracleRelationship, OracleResponse};

/// Scan malformed response text for recoverable entity/relationship
/// objects. Returns `None` when nothing matched either shape.
pub fn recover_partial_json(text: &str) -> Option<OracleResponse> {
    let mut response = OracleResponse::default();

    for candidate in balanced_objects(text) {
        // Entity first: its shape is a strict superset of nothing the
        // relationship shape would accept (disjoint required fields)
        if let Ok(entity) = serde_json::from_str::<OracleEntity>(candidate) {
            response.entities.push(entity);
            continue;
        }
        if let Ok(rel) = serde_json::from_str::<OracleRelationship>(candidate) {
            response.relationships.push(rel);
        }
    }

    if response.entities.is_empty() && response.relationships.is_empty() {
        None
    } else {
        tracing::warn!(
            "Recovered {} entities and {} relationships from malformed oracle JSON",
            response.entities.len(),
            response.relationships.len()
        );
        Some(response)
    }
}

/// Slices of `text` that form balanced `{...}` objects whose opening brace
/// sits at depth 1 or 2, skipping braces inside string literals
fn balanced_objects(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut objects = Vec::new();
    let mut stack: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => stack.push(i),
            b'}' => {
                if let Some(start) = stack.pop() {
                    // Depth of the object that just closed = stack.len() + 1
                    let depth = stack.len() + 1;
                    if depth == 1 || depth == 2 {
                        objects.push(&text[start..=i]);
                    }
                }
            }
            _ => {}
        }
    }

    objects
}
