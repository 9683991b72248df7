//! Content Hashing
//!
//! All content hashes are `sha256:<hex>` over UTF-8 bytes. JSON payloads are
//! hashed through a canonical (recursively key-sorted) serialization so the
//! hash is stable across serializer ordering.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hash arbitrary bytes into the `sha256:<hex>` format
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}

/// Hash a text artifact (OCR text, chunk text, prompt)
pub fn hash_text(text: &str) -> String {
    hash_bytes(text.as_bytes())
}

/// Hash a JSON value through its canonical serialization
pub fn hash_json(value: &Value) -> String {
    hash_text(&canonical_json(value))
}

/// Serialize JSON with object keys sorted recursively. Arrays keep their
/// order; scalars serialize as serde_json renders them.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Object keys are plain strings; serde escaping applies
                out.push_str(&serde_json::to_string(key).unwrap_or_else(|_| "\"\"".into()));
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => {
            out.push_str(&serde_json::to_string(scalar).unwrap_or_else(|_| "null".into()));
        }
    }
}
