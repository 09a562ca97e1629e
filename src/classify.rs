//! Script-based language classification for lyrics.
//!
//! A fixed rule set, not a statistical model: count characters per script
//! in one pass and stop as soon as the answer is known. Most Japanese and
//! Korean lyrics resolve within the first few lines.

use crate::models::Lang;

/// Texts shorter than this (in characters) are never classified.
pub const MIN_CLASSIFY_CHARS: usize = 30;

/// Kana count that decides Japanese.
pub const JA_THRESHOLD: u32 = 10;

/// Hangul syllable count that decides Korean.
pub const KO_THRESHOLD: u32 = 10;

/// Minimum Latin letters to accept as English.
pub const LATIN_THRESHOLD: u32 = 30;

/// Excluded-script count above which a text is rejected.
pub const EXCLUDE_THRESHOLD: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Japanese,
    Korean,
    Latin,
    Excluded,
    Other,
}

fn script_of(c: char) -> Script {
    match c as u32 {
        // Hiragana, Katakana
        0x3040..=0x309F | 0x30A0..=0x30FF => Script::Japanese,
        // Hangul syllables
        0xAC00..=0xD7AF => Script::Korean,
        // ASCII letters, Latin-1 Supplement letters through Latin Extended-B
        0x41..=0x5A | 0x61..=0x7A | 0xC0..=0x24F => Script::Latin,
        // Cyrillic, Arabic, Devanagari, Thai
        0x400..=0x4FF | 0x600..=0x6FF | 0x900..=0x97F | 0xE00..=0xE7F => Script::Excluded,
        _ => Script::Other,
    }
}

/// Classify a lyrics body whose timestamps have already been removed.
///
/// Japanese and Korean exit as soon as their counter reaches the threshold.
/// Excluded scripts reject mid-scan as soon as they pass the threshold,
/// whatever the Latin count. After the scan, excluded > threshold and
/// excluded > Latin rejects as well. A Latin text with a few excluded
/// characters is kept.
pub fn classify(text_no_ts: &str) -> Option<Lang> {
    if text_no_ts.len() < MIN_CLASSIFY_CHARS
        || text_no_ts.chars().take(MIN_CLASSIFY_CHARS).count() < MIN_CLASSIFY_CHARS
    {
        return None;
    }

    let (mut ja, mut ko, mut latin, mut exclude) = (0u32, 0u32, 0u32, 0u32);
    for c in text_no_ts.chars() {
        match script_of(c) {
            Script::Japanese => {
                ja += 1;
                if ja >= JA_THRESHOLD {
                    return Some(Lang::Ja);
                }
            }
            Script::Korean => {
                ko += 1;
                if ko >= KO_THRESHOLD {
                    return Some(Lang::Ko);
                }
            }
            Script::Latin => latin += 1,
            Script::Excluded => {
                exclude += 1;
                if exclude > EXCLUDE_THRESHOLD {
                    return None;
                }
            }
            Script::Other => {}
        }
    }

    if exclude > EXCLUDE_THRESHOLD && exclude > latin {
        return None;
    }
    if latin >= LATIN_THRESHOLD {
        return Some(Lang::En);
    }
    None
}
