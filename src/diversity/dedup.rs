//! Exact and normalized near-duplicate detection for accepted records.
//!
//! Each record is reduced to a [`DedupSignature`]: the SHA-256 of its
//! normalized, field-name-ordered content. Two records that differ only in
//! case, whitespace, edge punctuation or (in prose fields) stop-words share
//! a signature.

use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::records::Record;

/// English stop-words ignored in long-text fields.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "do", "does", "for",
    "from", "has", "have", "how", "if", "in", "into", "is", "it", "its", "of", "on", "or", "so",
    "such", "than", "that", "the", "their", "then", "there", "these", "they", "this", "those",
    "to", "was", "were", "what", "when", "which", "while", "who", "why", "will", "with",
];

/// Separates fields in the hashed representation.
const FIELD_SEPARATOR: char = '\u{1f}';

/// Normalized content signature of a record.
///
/// Stored as a hex-encoded SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupSignature(String);

impl DedupSignature {
    /// Computes the signature of a record.
    pub fn of(record: &Record) -> Self {
        let format = record.format();
        let long_text = format.long_text_fields();

        let mut fields = record.field_values();
        fields.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut canonical = String::from(format.as_str());
        for (name, value) in fields {
            canonical.push(FIELD_SEPARATOR);
            canonical.push_str(name);
            canonical.push('=');
            if name == "metadata" {
                // Already canonical JSON with sorted keys.
                canonical.push_str(&collapse_whitespace(&value.to_lowercase()));
            } else {
                canonical.push_str(&normalize_text(&value, long_text.contains(&name)));
            }
        }

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Get the hex string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DedupSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercases, strips punctuation at token edges and collapses whitespace.
/// With `drop_stop_words`, common English function words are removed.
pub fn normalize_text(text: &str, drop_stop_words: bool) -> String {
    text.to_lowercase()
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|token| !token.is_empty())
        .filter(|token| !(drop_stop_words && STOP_WORDS.contains(token)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Signatures of every record accepted in one run.
#[derive(Debug, Default)]
pub struct DedupIndex {
    seen: HashSet<DedupSignature>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a record with this signature has already been accepted.
    pub fn contains(&self, signature: &DedupSignature) -> bool {
        self.seen.contains(signature)
    }

    /// Records a signature. Returns `false` if it was already present.
    pub fn insert(&mut self, signature: DedupSignature) -> bool {
        self.seen.insert(signature)
    }

    /// Number of distinct signatures recorded.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
