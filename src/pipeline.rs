//! The `lrclib-filter` command: one streaming pass from the LRCLIB dump to a
//! filtered, deduplicated lyrics database.
//!
//! Phases:
//! 1. Safety check and output reset
//! 2. Stream every source record through the dedup engine, committing in batches
//! 3. Indexes, ANALYZE, optional VACUUM
//! 4. Per-language counts and the final summary

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::engine::{BatchConfig, DedupEngine, FingerprintIndex, MetaIndex, RecordSink};
use crate::models::FilterStats;
use crate::progress::{create_spinner, format_duration, PassProgress};
use crate::safety::{validate_output_path, OUTPUT_PATTERN};
use crate::store::{SqliteSink, SqliteSource};

/// Default record count between progress reports
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 500_000;

/// Upper bound on index pre-allocation, whatever the source size
const INDEX_CAPACITY_HINT: u64 = 5_000_000;

pub struct FilterArgs {
    pub source: PathBuf,
    pub output: PathBuf,
    /// Push the duration floor into the source query
    pub prefilter: bool,
    pub batch: BatchConfig,
    pub progress_interval: u64,
    pub stats_json: Option<PathBuf>,
    pub vacuum: bool,
}

impl FilterArgs {
    pub fn new(source: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
            prefilter: true,
            batch: BatchConfig::default(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            stats_json: None,
            vacuum: false,
        }
    }
}

/// Run the filter command and return the final counters.
pub fn run(args: &FilterArgs) -> Result<FilterStats> {
    let start = Instant::now();

    validate_output_path(&args.output, OUTPUT_PATTERN, &[&args.source])?;
    if !args.source.exists() {
        bail!("Source database not found: {}", args.source.display());
    }
    remove_existing_output(&args.output)?;

    println!("Opening source database: {:?}", args.source);
    let source = SqliteSource::open(&args.source, args.prefilter)?;
    let total = source.count()?;
    if args.prefilter {
        println!("Found {} candidate records (duration prefilter on)", total);
    } else {
        println!("Found {} records (duration checked per record)", total);
    }

    println!("Creating output database: {:?}", args.output);
    let sink = SqliteSink::create(&args.output)?;

    let capacity = total.min(INDEX_CAPACITY_HINT) as usize;
    let mut engine = DedupEngine::with_indexes(
        sink,
        args.batch,
        FingerprintIndex::with_capacity(capacity),
        MetaIndex::with_capacity(capacity),
    )
    .with_duration_floor(!args.prefilter);

    println!("Phase 1: Filtering and deduplicating...");
    if let Err(e) = filter_pass(&source, &mut engine, total, args.progress_interval) {
        let stats = engine.stats();
        eprintln!(
            "Filtering aborted after {} records ({} operations not committed, {} batches committed)",
            stats.processed,
            engine.pending_ops(),
            stats.batches_committed
        );
        stats.log_phase("aborted");
        return Err(e);
    }
    drop(source);

    println!(
        "  {} fingerprints, {} metadata keys, {} unique artists",
        engine.fingerprints().len(),
        engine.meta_index().len(),
        engine.meta_index().unique_artists()
    );

    let mut stats = engine.stats().clone();
    let sink = engine.into_sink();

    println!("Phase 2: Building indexes...");
    let spinner = create_spinner("Building indexes");
    let idx_start = Instant::now();
    sink.build_indexes()?;
    spinner.finish_and_clear();
    println!("  Indexes built in {}", format_duration(idx_start.elapsed()));

    if args.vacuum {
        println!("Vacuuming output...");
        let spinner = create_spinner("Vacuuming");
        sink.vacuum()?;
        spinner.finish_and_clear();
    }

    for (lang, count) in sink.lang_counts()? {
        stats.set_lang_count(lang, count);
    }
    debug_assert_eq!(stats.accounted(), stats.processed);
    drop(sink);

    stats.elapsed_seconds = start.elapsed().as_secs_f64();
    print_report(&args.output, &stats);

    if let Some(path) = &args.stats_json {
        stats
            .write_to_file(path)
            .with_context(|| format!("Failed to write stats to {}", path.display()))?;
        println!("Stats written to {:?}", path);
    }

    Ok(stats)
}

/// Stream the source through the engine and flush the tail batch.
fn filter_pass<S: RecordSink>(
    source: &SqliteSource,
    engine: &mut DedupEngine<S>,
    total: u64,
    interval: u64,
) -> Result<()> {
    let progress = PassProgress::new("FILTER", total, interval);
    let mut cursor = source.prepare()?;

    let result = (|| -> Result<()> {
        for record in cursor.records()? {
            let record = record.context("Failed to read source record")?;
            engine.process(record)?;
            let stats = engine.stats();
            progress.tick(stats.processed, stats.kept);
        }
        engine.finish()
    })();

    match result {
        Ok(()) => {
            let stats = engine.stats();
            progress.finish(stats.processed, stats.kept);
            Ok(())
        }
        Err(e) => {
            progress.abandon();
            Err(e)
        }
    }
}

/// Delete a previous output and its WAL sidecar files.
fn remove_existing_output(output: &Path) -> Result<()> {
    if output.exists() {
        println!("Removing existing output file: {:?}", output);
        std::fs::remove_file(output).context("Failed to remove existing output file")?;
    }
    for suffix in ["-wal", "-shm"] {
        let mut sidecar = output.as_os_str().to_owned();
        sidecar.push(suffix);
        let sidecar = PathBuf::from(sidecar);
        if sidecar.exists() {
            std::fs::remove_file(&sidecar)
                .with_context(|| format!("Failed to remove {}", sidecar.display()))?;
        }
    }
    Ok(())
}

fn print_report(output: &Path, stats: &FilterStats) {
    let file_size = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);

    println!("\n{:=<60}", "");
    println!("Filtering complete!");
    stats.print_summary();
    println!("  By language:");
    println!("    ja: {}", stats.kept_ja);
    println!("    ko: {}", stats.kept_ko);
    println!("    en: {}", stats.kept_en);
    println!("  Batches committed: {}", stats.batches_committed);
    println!("  Output size: {:.2} MB", file_size as f64 / 1_048_576.0);
    println!("  Elapsed: {:.2}s", stats.elapsed_seconds);
    println!("{:=<60}", "");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::{params, Connection};

    fn synced(lines: &[&str]) -> String {
        lines
            .iter()
            .enumerate()
            .map(|(i, l)| format!("[00:{:02}.00]{}", i, l))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn english(tag: &str, lines: usize) -> String {
        let owned: Vec<String> = (0..lines)
            .map(|i| format!("{} we are singing line number {}", tag, i))
            .collect();
        synced(&owned.iter().map(String::as_str).collect::<Vec<_>>())
    }

    fn japanese() -> String {
        let line = "きみのなまえをよんでいるよ";
        synced(&[line; 12])
    }

    type Row<'a> = (i64, &'a str, &'a str, Option<f64>, String);

    fn write_source(path: &Path, rows: &[Row<'_>]) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE lyrics (
                id INTEGER PRIMARY KEY,
                track_name TEXT NOT NULL,
                artist_name TEXT NOT NULL,
                album_name TEXT,
                duration REAL,
                synced_lyrics TEXT NOT NULL
            );",
        )
        .unwrap();
        for (id, track, artist, duration, body) in rows {
            conn.execute(
                "INSERT INTO lyrics VALUES (?1, ?2, ?3, NULL, ?4, ?5)",
                params![id, track, artist, duration, body],
            )
            .unwrap();
        }
    }

    fn output_ids(path: &Path) -> Vec<(i64, String)> {
        let conn = Connection::open(path).unwrap();
        let mut stmt = conn
            .prepare("SELECT id, lang FROM lyrics ORDER BY id")
            .unwrap();
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        rows
    }

    fn fixture() -> Vec<Row<'static>> {
        vec![
            // Accepted
            (1, "Song A", "Band", Some(200.0), english("alpha", 12)),
            // Exact lyrics duplicate of 1 under another name
            (2, "Song A (Live)", "Other", Some(210.0), english("alpha", 12)),
            // Same metadata as 1 with different, longer lyrics: supersedes 1
            (3, "Song A [Remix]", "BAND", Some(205.0), english("beta", 15)),
            // Too short to play
            (4, "Jingle", "Band", Some(30.0), english("gamma", 12)),
            // Too few lines
            (5, "Tiny", "Band", Some(100.0), english("delta", 5)),
            // Japanese
            (6, "Kimi", "Artist", None, japanese()),
            // Digits only, no language
            (7, "Numbers", "Band", Some(100.0), synced(&["1234567890 1234567890"; 12])),
        ]
    }

    #[test]
    fn test_run_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("lrclib.sqlite3");
        let output = dir.path().join("lrclib-filtered.sqlite3");
        let stats_path = dir.path().join("stats.json");
        write_source(&source, &fixture());

        let mut args = FilterArgs::new(&source, &output);
        args.stats_json = Some(stats_path.clone());
        args.progress_interval = 2;
        let stats = run(&args).unwrap();

        // Record 4 never leaves the source query
        assert_eq!(stats.processed, 6);
        assert_eq!(stats.quality, 1);
        assert_eq!(stats.lang, 1);
        assert_eq!(stats.fp_dedup, 1);
        assert_eq!(stats.meta_dedup, 1);
        assert_eq!(stats.superseded, 1);
        assert_eq!(stats.kept, 2);
        assert_eq!(stats.accounted(), stats.processed);
        assert_eq!(stats.kept_en, 1);
        assert_eq!(stats.kept_ja, 1);

        assert_eq!(
            output_ids(&output),
            vec![(3, "en".to_string()), (6, "ja".to_string())]
        );

        let json = std::fs::read_to_string(&stats_path).unwrap();
        assert!(json.contains("\"kept\": 2"));
    }

    #[test]
    fn test_run_without_prefilter_matches_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("lrclib.sqlite3");
        let output = dir.path().join("lrclib-filtered.sqlite3");
        write_source(&source, &fixture());

        let mut args = FilterArgs::new(&source, &output);
        args.prefilter = false;
        let stats = run(&args).unwrap();

        // Record 4 is now seen and rejected by the engine
        assert_eq!(stats.processed, 7);
        assert_eq!(stats.quality, 2);
        assert_eq!(stats.kept, 2);
        assert_eq!(
            output_ids(&output),
            vec![(3, "en".to_string()), (6, "ja".to_string())]
        );
    }

    #[test]
    fn test_run_replaces_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("lrclib.sqlite3");
        let output = dir.path().join("lrclib-filtered.sqlite3");
        write_source(&source, &fixture());

        let mut args = FilterArgs::new(&source, &output);
        args.vacuum = true;
        run(&args).unwrap();
        let stats = run(&args).unwrap();
        assert_eq!(stats.kept, 2);
        assert_eq!(output_ids(&output).len(), 2);
    }

    #[test]
    fn test_run_small_batches() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("lrclib.sqlite3");
        let output = dir.path().join("lrclib-filtered.sqlite3");
        write_source(&source, &fixture());

        let mut args = FilterArgs::new(&source, &output);
        args.batch = BatchConfig {
            max_pending_ops: 1,
            commit_every: 1,
        };
        let stats = run(&args).unwrap();
        assert!(stats.batches_committed >= 3);
        assert_eq!(
            output_ids(&output),
            vec![(3, "en".to_string()), (6, "ja".to_string())]
        );
    }

    #[test]
    fn test_run_rejects_unsafe_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("lrclib.sqlite3");
        write_source(&source, &fixture());

        let args = FilterArgs::new(&source, dir.path().join("out.sqlite3"));
        assert!(run(&args).is_err());
        // Source untouched
        assert!(source.exists());
    }

    #[test]
    fn test_run_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let args = FilterArgs::new(
            dir.path().join("missing.sqlite3"),
            dir.path().join("lrclib-filtered.sqlite3"),
        );
        let err = run(&args).unwrap_err();
        assert!(err.to_string().contains("Source database not found"));
    }
}
