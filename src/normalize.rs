//! Text normalization for lyrics dedup.
//!
//! Reduces display names and lyrics bodies to canonical forms so that
//! formatting differences do not defeat deduplication. All functions are
//! pure and total.
//!
//! CRITICAL: changing anything here changes which records count as
//! duplicates. Run tests after changes.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::borrow::Cow;

use crate::models::Fingerprint;

/// Width of a duration bucket in seconds for the metadata key.
pub const DURATION_BUCKET_SEC: f64 = 30.0;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Inline LRC timestamp: "[0:12]", "[01:02.34]", "[1:02.345]", "[00:01.1234]"
pub static TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\d+:\d+(?:[.:]\d+)?\]").unwrap());

/// Ad-lib / backing vocal annotation in lyrics: "(yeah)", "（オーオー）".
/// Innermost span only and never across a line break, so an unclosed
/// parenthesis cannot swallow the rest of the song.
pub static LYRICS_PAREN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[(（][^()（）\n]*[)）]").unwrap());

/// Everything that is not a word character
pub static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").unwrap());

/// Bracketed annotation in names: "(Remix)", "[Live]", "（TV Size）", "【MV】"
pub static NAME_BRACKET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*(?:\([^)]*\)|（[^）]*）|\[[^\]]*\]|【[^】]*】)").unwrap()
});

/// Characters that are neither word characters nor whitespace
pub static NAME_SYMBOL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());

/// Trailing featured-artist clause: "x feat y", "x ft y", "x with y"
pub static FEAT_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+(?:feat|ft|with)\s+.*$").unwrap());

// ============================================================================
// NAME NORMALIZATION
// ============================================================================

/// Normalize a track or artist name for the metadata dedup key.
///
/// Lowercases, drops bracketed annotations, symbols and a trailing
/// feat/ft/with clause, then collapses whitespace.
/// e.g., "Lemon (Official MV)" → "lemon", "DECO*27 feat. 初音ミク" → "deco27"
///
/// Brackets are removed before symbols: once symbols are gone there are no
/// brackets left to match. Symbols are removed before the feat clause so
/// "feat." and "ft." match as well. The result is idempotent.
pub fn normalize_name(name: &str) -> String {
    let lower = name.to_lowercase();
    let no_brackets = NAME_BRACKET.replace_all(&lower, "");
    let no_symbols = NAME_SYMBOL.replace_all(&no_brackets, "");
    let no_feat = FEAT_CLAUSE.replace(&no_symbols, "");
    no_feat.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// LYRICS HELPERS
// ============================================================================

/// Remove inline timestamp markers, borrowing when there are none.
pub fn strip_timestamps(body: &str) -> Cow<'_, str> {
    TIMESTAMP.replace_all(body, "")
}

/// Number of lines in a raw lyrics body (newlines + 1).
pub fn count_lines(body: &str) -> usize {
    body.bytes().filter(|&b| b == b'\n').count() + 1
}

/// Duration bucket: duration / 30s rounded to nearest, unknown duration is bucket 0.
/// 58s and 62s both land in bucket 2.
pub fn duration_bucket(duration: Option<f64>) -> i64 {
    (duration.unwrap_or(0.0) / DURATION_BUCKET_SEC).round() as i64
}

// ============================================================================
// FINGERPRINT
// ============================================================================

/// Lyrics fingerprint of a raw body. `None` means there is no usable text.
pub fn fingerprint(lyrics_body: &str) -> Option<Fingerprint> {
    fingerprint_stripped(&strip_timestamps(lyrics_body))
}

/// Fingerprint of a body whose timestamps were already removed.
pub fn fingerprint_stripped(text_no_ts: &str) -> Option<Fingerprint> {
    let text = LYRICS_PAREN.replace_all(text_no_ts, "");
    let text = NON_WORD.replace_all(&text, "");
    if text.is_empty() {
        return None;
    }
    let text = text.to_lowercase();
    Some(Sha256::digest(text.as_bytes()).into())
}

// ============================================================================
// TESTS
// ============================================================================
