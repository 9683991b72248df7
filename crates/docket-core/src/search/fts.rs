//! FTS5 Query Sanitizing
//!
//! User text goes into FTS5 MATCH expressions for chunk search. Raw input
//! can contain FTS5 operators (`"`, `*`, `NOT`, parens) that either change
//! semantics or fail to parse, so every token is double-quoted.

/// Sanitize free text into a safe FTS5 MATCH expression.
///
/// Splits on whitespace, strips embedded double quotes, and emits each token
/// as a quoted phrase joined by implicit AND.
pub fn sanitize_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| {
            let cleaned: String = token.chars().filter(|c| *c != '"').collect();
            format!("\"{}\"", cleaned)
        })
        .collect::<Vec<_>>()
        .join(" ")
}
