//! Structural quality gate, run before the classifier and dedup.
//!
//! Cheapest checks first: line count is a byte scan, the text length check
//! needs the timestamps stripped.
//!
//! The duration floor is normally applied by the source query
//! (`duration IS NULL OR duration >= 60`). When the source cannot prefilter,
//! the engine applies [`is_too_short`] itself so the output is the same.

use std::borrow::Cow;

use crate::models::Record;
use crate::normalize::{count_lines, strip_timestamps};

/// Minimum lines in the raw body (newlines + 1).
pub const MIN_LINES: usize = 10;

/// Minimum characters left after stripping timestamps and outer whitespace.
pub const MIN_TEXT_CHARS: usize = 100;

/// Minimum duration in seconds; records without a duration are kept.
pub const MIN_DURATION_SEC: f64 = 60.0;

/// True if a known duration is below the floor.
pub fn is_too_short(duration: Option<f64>) -> bool {
    duration.is_some_and(|d| d < MIN_DURATION_SEC)
}

/// Run the gate and hand back the timestamp-stripped body for the later stages.
pub fn evaluate(record: &Record) -> Option<Cow<'_, str>> {
    if count_lines(&record.lyrics_body) < MIN_LINES {
        return None;
    }
    let text_no_ts = strip_timestamps(&record.lyrics_body);
    let trimmed = text_no_ts.trim();
    if trimmed.len() < MIN_TEXT_CHARS
        || trimmed.chars().take(MIN_TEXT_CHARS).count() < MIN_TEXT_CHARS
    {
        return None;
    }
    Some(text_no_ts)
}

/// True if the record clears the line count and text length checks.
pub fn passes(record: &Record) -> bool {
    evaluate(record).is_some()
}
