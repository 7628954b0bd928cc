//! Phrase normalization (§3 of the specification).
//!
//! A phrase is lowercased, NFC-normalized, trimmed, has internal whitespace
//! collapsed to single spaces, and has trailing punctuation stripped. The
//! result is the unit the Prefix Index, Trending Tracker, and History Tracker
//! all key on.

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Maximum length, in Unicode scalar values, of a normalized phrase.
pub const MAX_PHRASE_CHARS: usize = 128;

/// Maximum length, in bytes, of raw text accepted at the API boundary before
/// normalization is even attempted (§6).
pub const MAX_RAW_BYTES: usize = 256;

const TRAILING_PUNCTUATION: &[char] = &['.', ',', '!', '?', ';', ':', '。', '，', '！', '？', '；', '：'];

/// A normalized phrase: the unit of indexing throughout the engine.
///
/// Construct via [`Phrase::normalize_ingest`] or [`Phrase::normalize_lookup`];
/// there is no public constructor that skips normalization, so a `Phrase` in
/// hand is always already in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Phrase(String);

/// Why a raw string could not be normalized for ingest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    /// The phrase was empty after normalization.
    #[error("phrase is empty after normalization")]
    Empty,
    /// The phrase exceeded [`MAX_PHRASE_CHARS`] after normalization.
    #[error("phrase exceeds {MAX_PHRASE_CHARS} characters after normalization")]
    TooLong,
    /// The raw input exceeded [`MAX_RAW_BYTES`] before normalization.
    #[error("raw input exceeds {MAX_RAW_BYTES} bytes")]
    RawTooLong,
}

impl Phrase {
    /// Normalize for ingest (§4.6 step 1): empty or over-long results are
    /// rejected rather than silently truncated, since ingest is the one path
    /// that creates durable counts.
    pub fn normalize_ingest(raw: &str) -> Result<Self, NormalizeError> {
        if raw.len() > MAX_RAW_BYTES {
            return Err(NormalizeError::RawTooLong);
        }
        let normalized = normalize_text(raw);
        if normalized.is_empty() {
            return Err(NormalizeError::Empty);
        }
        if normalized.chars().count() > MAX_PHRASE_CHARS {
            return Err(NormalizeError::TooLong);
        }
        Ok(Self(normalized))
    }

    /// Normalize for lookup: over-long prefixes are truncated rather than
    /// rejected (§3), since a lookup is read-only and truncation is a safe
    /// approximation of "the user typed more than we index".
    ///
    /// An empty result is a valid, meaningful value here — it represents the
    /// empty prefix, which `suggest` treats as a request for the global top-K.
    pub fn normalize_lookup(raw: &str) -> Self {
        let raw = if raw.len() > MAX_RAW_BYTES {
            // Truncate on a char boundary at or before the byte cap.
            let mut end = MAX_RAW_BYTES;
            while end > 0 && !raw.is_char_boundary(end) {
                end -= 1;
            }
            &raw[..end]
        } else {
            raw
        };
        let mut normalized = normalize_text(raw);
        if normalized.chars().count() > MAX_PHRASE_CHARS {
            normalized = normalized.chars().take(MAX_PHRASE_CHARS).collect();
        }
        Self(normalized)
    }

    /// Borrow the normalized phrase text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of Unicode scalar values in the normalized phrase.
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }

    /// `true` for the empty prefix (global top-K request).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The first character of the normalized phrase, if any.
    ///
    /// Used by the cache-invalidation-by-first-character admin operation
    /// (§9 open question: cleared for every phrase whose normalized first
    /// character matches, not just the raw input's first byte).
    pub fn first_char(&self) -> Option<char> {
        self.0.chars().next()
    }

    /// Consume into the underlying owned string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Phrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for Phrase {
    fn borrow(&self) -> &str {
        &self.0
    }
}

fn normalize_text(raw: &str) -> String {
    let nfc: String = raw.nfc().collect();
    let lower: String = nfc.to_lowercase();
    let collapsed = lower.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed_end = collapsed.trim_end_matches(TRAILING_PUNCTUATION);
    trimmed_end.to_string()
}
