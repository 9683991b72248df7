//! Mention Mapping
//!
//! Every surviving entity is located in the OCR text: a case-insensitive
//! scan for the canonical name and each alias, one mention per distinct
//! start offset, each mention pinned to the chunk whose half-open range
//! contains its start position and wrapped in ~100 characters of context
//! trimmed to word boundaries.

use std::collections::BTreeMap;

use crate::model::Chunk;

/// Context window on each side of a match, in characters
const CONTEXT_RADIUS: usize = 100;

/// One located occurrence
#[derive(Debug, Clone)]
pub struct MentionSpan {
    /// Character offsets, half-open
    pub character_start: i64,
    pub character_end: i64,
    pub chunk_id: Option<String>,
    pub page_number: Option<i64>,
    pub context: String,
}

/// Scan `text` for every occurrence of `canonical` and each alias.
///
/// Offsets are character-based (matching chunk ranges). Occurrences are
/// deduplicated by start offset; when the canonical name and an alias match
/// at the same position, the first needle wins.
pub fn map_mentions(
    text: &str,
    canonical: &str,
    aliases: &[String],
    chunks: &[Chunk],
) -> Vec<MentionSpan> {
    let haystack: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();
    let original: Vec<char> = text.chars().collect();

    let mut by_start: BTreeMap<usize, MentionSpan> = BTreeMap::new();

    let mut needles: Vec<&str> = vec![canonical];
    needles.extend(aliases.iter().map(|a| a.as_str()));

    for needle in needles {
        let needle_chars: Vec<char> = needle.chars().map(|c| c.to_ascii_lowercase()).collect();
        if needle_chars.is_empty() || needle_chars.len() > haystack.len() {
            continue;
        }

        for start in 0..=(haystack.len() - needle_chars.len()) {
            if haystack[start..start + needle_chars.len()] != needle_chars[..] {
                continue;
            }
            let end = start + needle_chars.len();
            by_start.entry(start).or_insert_with(|| {
                let (chunk_id, page_number) = locate_chunk(chunks, start as i64);
                MentionSpan {
                    character_start: start as i64,
                    character_end: end as i64,
                    chunk_id,
                    page_number,
                    context: context_snippet(&original, start, end),
                }
            });
        }
    }

    by_start.into_values().collect()
}

/// Start-position rule: the chunk whose `[character_start, character_end)`
/// range contains the mention's start offset
fn locate_chunk(chunks: &[Chunk], start: i64) -> (Option<String>, Option<i64>) {
    for chunk in chunks {
        if chunk.character_start <= start && start < chunk.character_end {
            return (Some(chunk.id.clone()), chunk.page_number);
        }
    }
    (None, None)
}

/// ~CONTEXT_RADIUS characters either side, trimmed inward to word
/// boundaries so the snippet never starts or ends mid-word
fn context_snippet(text: &[char], start: usize, end: usize) -> String {
    let mut from = start.saturating_sub(CONTEXT_RADIUS);
    let mut to = (end + CONTEXT_RADIUS).min(text.len());

    if from > 0 && !text[from - 1].is_whitespace() {
        while from < start && !text[from].is_whitespace() {
            from += 1;
        }
    }
    while from < start && text[from].is_whitespace() {
        from += 1;
    }

    if to < text.len() && !text[to].is_whitespace() {
        while to > end && !text[to - 1].is_whitespace() {
            to -= 1;
        }
    }
    while to > end && text[to - 1].is_whitespace() {
        to -= 1;
    }

    text[from..to].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::model::EmbeddingStatus;

    fn chunk(id: &str, start: i64, end: i64) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: "doc".into(),
            ocr_result_id: "ocr".into(),
            chunk_index: 0,
            text: String::new(),
            character_start: start,
            character_end: end,
            page_number: Some(1),
            overlap_previous: 0,
            overlap_next: 0,
            text_hash: String::new(),
            embedding_status: EmbeddingStatus::Pending,
            provenance_id: "prov".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn finds_case_insensitive_occurrences() {
        let text = "Alice met Bob. Later ALICE left.";
        let chunks = vec![chunk("c0", 0, 14), chunk("c1", 14, 32)];
        let mentions = map_mentions(text, "Alice", &[], &chunks);

        assert_eq!(mentions.len(), 2);
        assert_eq!(mentions[0].character_start, 0);
        assert_eq!(mentions[0].chunk_id.as_deref(), Some("c0"));
        assert_eq!(mentions[1].character_start, 21);
        assert_eq!(mentions[1].chunk_id.as_deref(), Some("c1"));
    }

    #[test]
    fn aliases_are_scanned_and_deduped_by_start() {
        let text = "Dr. Smith saw the patient. Smith signed.";
        let mentions = map_mentions(text, "Dr. Smith", &["Smith".to_string()], &[]);

        // "Dr. Smith" at 0 and alias "Smith" at 4 and 27; the position-4
        // alias hit is distinct from the canonical hit at 0
        let starts: Vec<i64> = mentions.iter().map(|m| m.character_start).collect();
        assert_eq!(starts, vec![0, 4, 27]);
        assert!(mentions.iter().all(|m| m.chunk_id.is_none()));
    }

    #[test]
    fn context_trims_to_word_boundaries() {
        let text = "word ".repeat(60);
        let mentions = map_mentions(&text, "word", &[], &[]);
        let mid = &mentions[25];
        assert!(!mid.context.starts_with(' '));
        assert!(!mid.context.ends_with(' '));
        assert!(mid.context.chars().count() <= 2 * CONTEXT_RADIUS + 4);
    }

    #[test]
    fn no_occurrences_yields_empty() {
        assert!(map_mentions("nothing here", "Zelda", &[], &[]).is_empty());
    }
}
