//! Core data models for the lyrics filter.
//!
//! Records as read from the source dump, accepted records as written to the
//! output, the metadata dedup key, and run statistics.

use rustc_hash::FxHashMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Type Aliases
// ============================================================================

/// SHA-256 digest of a lyrics body with timestamps, ad-libs and symbols removed.
pub type Fingerprint = [u8; 32];

// ============================================================================
// String Interning
// ============================================================================

/// String interner for deduplicating normalized artist names in the metadata index.
/// Most keys share an artist with many other keys, so one allocation per artist
/// is enough.
pub struct StringInterner {
    strings: FxHashMap<Arc<str>, Arc<str>>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self {
            strings: FxHashMap::default(),
        }
    }

    /// Intern a string, returning a reference-counted handle.
    /// If the string was seen before, returns the existing Arc.
    pub fn intern(&mut self, s: &str) -> Arc<str> {
        if let Some(existing) = self.strings.get(s) {
            return Arc::clone(existing);
        }
        let arc: Arc<str> = Arc::from(s);
        self.strings.insert(Arc::clone(&arc), Arc::clone(&arc));
        arc
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Records
// ============================================================================

/// Raw lyrics row from the source dump.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub id: i64,
    pub track_name: String,
    pub artist_name: String,
    pub album_name: Option<String>,
    pub duration: Option<f64>,
    /// Synced lyrics: one line per lyric line, each prefixed by `[m:ss.cc]`.
    pub lyrics_body: String,
}

/// Language tag assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Ja,
    Ko,
    En,
}

impl Lang {
    pub const ALL: [Lang; 3] = [Lang::Ja, Lang::Ko, Lang::En];

    pub fn as_str(self) -> &'static str {
        match self {
            Lang::Ja => "ja",
            Lang::Ko => "ko",
            Lang::En => "en",
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record that survived every gate, tagged with its language.
#[derive(Clone, Debug, PartialEq)]
pub struct AcceptedRecord {
    pub record: Record,
    pub lang: Lang,
}

/// Metadata dedup key: (artist_norm, track_norm, duration bucket).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MetaKey {
    pub artist: Arc<str>,
    pub track: Box<str>,
    pub bucket: i64,
}

// ============================================================================
// Pipeline Outcomes
// ============================================================================

/// Why a record was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Too few lines, too little text, or too short
    Quality,
    /// No supported language detected
    Lang,
    /// Lyrics fingerprint already accepted
    FingerprintDup,
    /// Same metadata key with an equal-or-longer winner already kept
    MetaDup,
}

/// Terminal action taken for one input record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Discarded(DropReason),
    Inserted { lang: Lang },
    /// Inserted after deleting the previous winner for the same metadata key.
    Replaced { previous_id: i64, lang: Lang },
}

/// Write operation buffered by the engine and applied by a sink.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    Insert(AcceptedRecord),
    Delete(i64),
}

// ============================================================================
// Statistics
// ============================================================================

/// Running counters for one filter pass.
///
/// `meta_dedup` includes superseded winners, so
/// `quality + lang + fp_dedup + meta_dedup + kept == processed` at all times.
#[derive(Default, Debug, Clone, PartialEq, Serialize)]
pub struct FilterStats {
    pub processed: u64,
    pub quality: u64,
    pub lang: u64,
    pub fp_dedup: u64,
    pub meta_dedup: u64,
    /// Earlier winners deleted because a longer duplicate arrived
    pub superseded: u64,
    pub inserted: u64,
    /// Live accepted records (inserted - superseded)
    pub kept: u64,
    pub batches_committed: u64,

    // Filled in by the pipeline after the pass
    pub kept_ja: u64,
    pub kept_ko: u64,
    pub kept_en: u64,
    pub elapsed_seconds: f64,
}

impl FilterStats {
    /// Count one dropped record
    pub fn record_drop(&mut self, reason: DropReason) {
        match reason {
            DropReason::Quality => self.quality += 1,
            DropReason::Lang => self.lang += 1,
            DropReason::FingerprintDup => self.fp_dedup += 1,
            DropReason::MetaDup => self.meta_dedup += 1,
        }
    }

    /// Sum of every terminal bucket; equals `processed`.
    pub fn accounted(&self) -> u64 {
        self.quality + self.lang + self.fp_dedup + self.meta_dedup + self.kept
    }

    pub fn set_lang_count(&mut self, lang: Lang, count: u64) {
        match lang {
            Lang::Ja => self.kept_ja = count,
            Lang::Ko => self.kept_ko = count,
            Lang::En => self.kept_en = count,
        }
    }

    /// Log stats to stderr in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            eprintln!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Print the human-readable counter summary
    pub fn print_summary(&self) {
        println!("  Processed:  {}", self.processed);
        println!("  quality:    {}", self.quality);
        println!("  lang:       {}", self.lang);
        println!("  fp_dedup:   {}", self.fp_dedup);
        println!("  meta_dedup: {} ({} superseded)", self.meta_dedup, self.superseded);
        println!("  kept:       {}", self.kept);
    }
}
