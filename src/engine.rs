//! Single-pass dedup engine.
//!
//! Pulls records one at a time, runs the quality gate, the classifier, the
//! fingerprint layer and the metadata layer, and buffers the resulting
//! inserts/deletes for a [`RecordSink`] in bounded batches.
//!
//! All dedup state lives in the two in-memory indexes owned here; nothing is
//! ever read back from the destination, so batch boundaries have no effect
//! on which records survive.

use anyhow::{Context, Result};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::classify::classify;
use crate::models::{
    AcceptedRecord, DropReason, FilterStats, Fingerprint, MetaKey, Outcome, Record,
    StringInterner, WriteOp,
};
use crate::normalize::{count_lines, duration_bucket, fingerprint_stripped, normalize_name};
use crate::quality;

/// Flush once this many write operations are buffered.
pub const DEFAULT_MAX_PENDING_OPS: usize = 50_000;

/// Also flush whenever the kept count reaches a multiple of this.
pub const DEFAULT_COMMIT_EVERY: u64 = 100_000;

/// Destination of accepted records. One call = one atomic batch.
pub trait RecordSink {
    /// Apply every operation in order, all or nothing.
    fn apply(&mut self, ops: &[WriteOp]) -> Result<()>;
}

/// Batch thresholds. Only affect write amplification, never dedup results.
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub max_pending_ops: usize,
    pub commit_every: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_pending_ops: DEFAULT_MAX_PENDING_OPS,
            commit_every: DEFAULT_COMMIT_EVERY,
        }
    }
}

// ============================================================================
// Indexes
// ============================================================================

/// Fingerprints accepted so far. Entries are never removed.
#[derive(Default)]
pub struct FingerprintIndex {
    seen: FxHashSet<Fingerprint>,
}

impl FingerprintIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: FxHashSet::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    /// Register a fingerprint; false if it was already present.
    pub fn insert(&mut self, fp: Fingerprint) -> bool {
        self.seen.insert(fp)
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.seen.contains(fp)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Current winner for a metadata key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaEntry {
    pub id: i64,
    pub line_count: usize,
}

/// Metadata key → current winner.
#[derive(Default)]
pub struct MetaIndex {
    winners: FxHashMap<MetaKey, MetaEntry>,
    interner: StringInterner,
}

impl MetaIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            winners: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            interner: StringInterner::new(),
        }
    }

    /// Build the key for a record: (artist_norm, track_norm, duration bucket).
    pub fn key_for(&mut self, record: &Record) -> MetaKey {
        let artist = self.interner.intern(&normalize_name(&record.artist_name));
        MetaKey {
            artist,
            track: normalize_name(&record.track_name).into_boxed_str(),
            bucket: duration_bucket(record.duration),
        }
    }

    pub fn get(&self, key: &MetaKey) -> Option<MetaEntry> {
        self.winners.get(key).copied()
    }

    pub fn set(&mut self, key: MetaKey, entry: MetaEntry) {
        self.winners.insert(key, entry);
    }

    pub fn len(&self) -> usize {
        self.winners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.winners.is_empty()
    }

    pub fn unique_artists(&self) -> usize {
        self.interner.len()
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct DedupEngine<S: RecordSink> {
    sink: S,
    fingerprints: FingerprintIndex,
    meta: MetaIndex,
    pending: Vec<WriteOp>,
    config: BatchConfig,
    /// Apply the duration floor here because the source did not prefilter
    duration_floor: bool,
    stats: FilterStats,
}

impl<S: RecordSink> DedupEngine<S> {
    pub fn new(sink: S, config: BatchConfig) -> Self {
        Self::with_indexes(sink, config, FingerprintIndex::new(), MetaIndex::new())
    }

    /// Start from caller-provided indexes (pre-sized, or fresh per test).
    pub fn with_indexes(
        sink: S,
        config: BatchConfig,
        fingerprints: FingerprintIndex,
        meta: MetaIndex,
    ) -> Self {
        Self {
            sink,
            fingerprints,
            meta,
            pending: Vec::with_capacity(config.max_pending_ops.min(DEFAULT_MAX_PENDING_OPS)),
            config,
            duration_floor: false,
            stats: FilterStats::default(),
        }
    }

    /// Reject records shorter than the duration floor as quality failures.
    /// Needed when the source yields unfiltered rows.
    pub fn with_duration_floor(mut self, enabled: bool) -> Self {
        self.duration_floor = enabled;
        self
    }

    /// Decide the fate of one record and buffer the resulting writes.
    pub fn process(&mut self, record: Record) -> Result<Outcome> {
        self.stats.processed += 1;
        let outcome = self.decide(record);

        match outcome {
            Outcome::Discarded(reason) => self.stats.record_drop(reason),
            Outcome::Inserted { .. } => {
                self.stats.inserted += 1;
                self.stats.kept += 1;
            }
            Outcome::Replaced { .. } => {
                // Previous winner leaves kept and counts as a metadata duplicate
                self.stats.superseded += 1;
                self.stats.meta_dedup += 1;
                self.stats.inserted += 1;
            }
        }

        if self.should_flush(&outcome) {
            self.flush()?;
        }
        Ok(outcome)
    }

    fn decide(&mut self, record: Record) -> Outcome {
        if self.duration_floor && quality::is_too_short(record.duration) {
            return Outcome::Discarded(DropReason::Quality);
        }
        let lang = {
            let text_no_ts = match quality::evaluate(&record) {
                Some(text) => text,
                None => return Outcome::Discarded(DropReason::Quality),
            };

            let lang = match classify(&text_no_ts) {
                Some(lang) => lang,
                None => return Outcome::Discarded(DropReason::Lang),
            };

            // Registered before the metadata decision and never rolled back: a
            // record that loses the metadata tie-break still consumes its fingerprint.
            if let Some(fp) = fingerprint_stripped(&text_no_ts) {
                if !self.fingerprints.insert(fp) {
                    return Outcome::Discarded(DropReason::FingerprintDup);
                }
            }
            lang
        };

        let key = self.meta.key_for(&record);
        let line_count = count_lines(&record.lyrics_body);
        let entry = MetaEntry {
            id: record.id,
            line_count,
        };

        let previous = self.meta.get(&key);
        if let Some(prev) = previous {
            if line_count <= prev.line_count {
                return Outcome::Discarded(DropReason::MetaDup);
            }
            self.pending.push(WriteOp::Delete(prev.id));
        }
        self.meta.set(key, entry);
        self.pending.push(WriteOp::Insert(AcceptedRecord { record, lang }));

        match previous {
            Some(prev) => Outcome::Replaced {
                previous_id: prev.id,
                lang,
            },
            None => Outcome::Inserted { lang },
        }
    }

    fn should_flush(&self, outcome: &Outcome) -> bool {
        if self.pending.len() >= self.config.max_pending_ops {
            return true;
        }
        matches!(outcome, Outcome::Inserted { .. } | Outcome::Replaced { .. })
            && self.config.commit_every > 0
            && self.stats.kept % self.config.commit_every == 0
    }

    /// Commit buffered operations as one batch. On failure the batch is left
    /// uncommitted and stays buffered.
    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let count = self.pending.len();
        self.sink
            .apply(&self.pending)
            .with_context(|| format!("Failed to commit batch of {} operations", count))?;
        self.pending.clear();
        self.stats.batches_committed += 1;
        Ok(())
    }

    /// Flush the tail batch after the last record.
    pub fn finish(&mut self) -> Result<()> {
        self.flush()
    }

    pub fn stats(&self) -> &FilterStats {
        &self.stats
    }

    /// Operations buffered but not yet committed
    pub fn pending_ops(&self) -> usize {
        self.pending.len()
    }

    pub fn fingerprints(&self) -> &FingerprintIndex {
        &self.fingerprints
    }

    pub fn meta_index(&self) -> &MetaIndex {
        &self.meta
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
