//! Entity Noise Filters
//!
//! OCR-derived extractions are noisy in predictable ways: times read as
//! dates, SSNs and phone numbers read as case numbers, blood pressures read
//! as amounts, bare honorifics read as people. Every surviving entity must
//! pass all predicates here; ICD-10 codes mislabeled as case numbers are
//! reclassified instead of dropped.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::EntityType;

/// Verdict for one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    Keep,
    /// Keep, but under a different type (ICD-10 as case_number -> diagnosis)
    Reclassify(EntityType),
    /// Drop, with the predicate that fired
    Drop(&'static str),
}

fn hhmm_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{1,2}:\d{2}(\s?[ap]\.?m\.?)?$").expect("static regex"))
}

fn ssn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{3}-\d{2}-\d{4}$").expect("static regex"))
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // North-American forms: (555) 123-4567, 555-123-4567, 555.123.4567,
    // +1 555 123 4567
    RE.get_or_init(|| {
        Regex::new(r"^(\+?1[\s.-]?)?(\(\d{3}\)[\s.-]?|\d{3}[\s.-])\d{3}[\s.-]\d{4}$")
            .expect("static regex")
    })
}

fn blood_pressure_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2,3}/\d{2,3}$").expect("static regex"))
}

fn bare_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+([.,]\d+)*$").expect("static regex"))
}

fn icd10_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z]\d{2}\.?\d*$").expect("static regex"))
}

fn pure_digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+$").expect("static regex"))
}

/// Short tokens that are real medical/legal entities despite their length
const SHORT_TOKEN_ALLOWLIST: &[&str] = &["mg", "ml", "iv", "rx", "dx", "er", "ed", "od"];

/// Run every noise predicate against one entity
pub fn apply_noise_filters(entity_type: EntityType, raw_text: &str) -> FilterOutcome {
    let trimmed = raw_text.trim();

    // Length gate counts letters and digits, so "Dr." is a two-letter token
    let significant: String = trimmed
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    if significant.chars().count() <= 2
        && !entity_type.is_medical()
        && !SHORT_TOKEN_ALLOWLIST.contains(&significant.as_str())
    {
        return FilterOutcome::Drop("short token");
    }

    if hhmm_re().is_match(trimmed) {
        return FilterOutcome::Drop("time of day");
    }
    if ssn_re().is_match(trimmed) {
        return FilterOutcome::Drop("SSN");
    }
    if phone_re().is_match(trimmed) {
        return FilterOutcome::Drop("phone number");
    }
    if blood_pressure_re().is_match(trimmed) {
        return FilterOutcome::Drop("blood pressure reading");
    }

    if entity_type == EntityType::Amount && bare_number_re().is_match(trimmed) {
        return FilterOutcome::Drop("bare number as amount");
    }

    if entity_type == EntityType::CaseNumber {
        if icd10_re().is_match(trimmed) {
            return FilterOutcome::Reclassify(EntityType::Diagnosis);
        }
        if pure_digits_re().is_match(trimmed) {
            return FilterOutcome::Drop("pure-digit case number");
        }
    }

    FilterOutcome::Keep
}
