//! Regex Date Supplement
//!
//! The LLM misses plenty of literal dates in long OCR text, so a regex scan
//! runs alongside it. Matches are validated (month 1-12, day 1-31),
//! deduplicated by literal text, and merged into the entity set at a fixed
//! 0.85 confidence by the pipeline.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// Confidence assigned to regex-supplemented dates
pub const REGEX_DATE_CONFIDENCE: f64 = 0.85;

const MONTHS: &[&str] = &[
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

fn numeric_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // MM/DD/YYYY and MM/DD/YY
    RE.get_or_init(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4}|\d{2})\b").expect("static regex"))
}

fn iso_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("static regex"))
}

fn month_name_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "January 2, 2024" and "2 January 2024"
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:([A-Za-z]+)\s+(\d{1,2}),?\s+(\d{4})|(\d{1,2})\s+([A-Za-z]+)\s+(\d{4}))\b",
        )
        .expect("static regex")
    })
}

/// Scan text for literal dates. Returns matched literals in first-seen
/// order, deduplicated by exact text.
pub fn scan_dates(text: &str) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();

    for caps in numeric_date_re().captures_iter(text) {
        let month: u32 = caps[1].parse().unwrap_or(0);
        let day: u32 = caps[2].parse().unwrap_or(0);
        if valid_month_day(month, day) {
            push_unique(&mut out, &mut seen, caps[0].to_string());
        }
    }

    for caps in iso_date_re().captures_iter(text) {
        let month: u32 = caps[2].parse().unwrap_or(0);
        let day: u32 = caps[3].parse().unwrap_or(0);
        if valid_month_day(month, day) {
            push_unique(&mut out, &mut seen, caps[0].to_string());
        }
    }

    for caps in month_name_date_re().captures_iter(text) {
        // Branch 1 of the alternation: "January 2, 2024"; branch 2:
        // "2 January 2024"
        let (month_name, day) = match (caps.get(1), caps.get(2), caps.get(4), caps.get(5)) {
            (Some(m), Some(d), _, _) => (m.as_str(), d.as_str()),
            (None, None, Some(d), Some(m)) => (m.as_str(), d.as_str()),
            _ => continue,
        };
        let day: u32 = day.parse().unwrap_or(0);
        if MONTHS.contains(&month_name.to_lowercase().as_str()) && (1..=31).contains(&day) {
            push_unique(&mut out, &mut seen, caps[0].to_string());
        }
    }

    out
}

fn valid_month_day(month: u32, day: u32) -> bool {
    (1..=12).contains(&month) && (1..=31).contains(&day)
}

fn push_unique(out: &mut Vec<String>, seen: &mut HashSet<String>, literal: String) {
    if seen.insert(literal.clone()) {
        out.push(literal);
    }
}
