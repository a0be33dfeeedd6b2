//! Text helpers shared by the query modules.
//!
//! Script names in the archive were typed by hand and some carry stray
//! whitespace or decomposed kana/accents. Every exact-name comparison goes
//! through [`normalize`] on both sides.

use serde::Serialize;
use unicode_normalization::UnicodeNormalization;

/// Canonical form of a script name: surrounding whitespace trimmed, then NFC.
pub fn normalize(raw: &str) -> String {
    raw.trim().nfc().collect()
}

/// Case-insensitive substring test using full Unicode lowercasing.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Builds a `LIKE '%…%'` pattern that matches `needle` literally.
/// Use with `ESCAPE '\'`.
pub fn like_pattern(needle: &str) -> String {
    format!("%{}%", escape_like(needle))
}

/// Builds a `LIKE '…%'` pattern matching values that start with `prefix`.
pub fn like_prefix(prefix: &str) -> String {
    format!("{}%", escape_like(prefix))
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Byte- and character-level view of a stored name, used to track down names
/// that look identical but do not compare equal.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NameDiagnostics {
    pub length: usize,
    pub repr: String,
    pub hex: String,
    pub ends_with_space: bool,
    pub trimmed: String,
    pub trimmed_length: usize,
    pub normalized: String,
    pub is_canonical: bool,
}

pub fn diagnose(name: &str) -> NameDiagnostics {
    let trimmed = name.trim();
    let normalized = normalize(name);
    NameDiagnostics {
        length: name.chars().count(),
        repr: serde_json::to_string(name).unwrap_or_else(|_| format!("{:?}", name)),
        hex: name.bytes().map(|b| format!("{:02x}", b)).collect(),
        ends_with_space: name.ends_with(char::is_whitespace),
        trimmed: trimmed.to_string(),
        trimmed_length: trimmed.chars().count(),
        is_canonical: normalized == name,
        normalized,
    }
}
