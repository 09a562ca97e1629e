use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use lrclib_filter::engine::{BatchConfig, DEFAULT_COMMIT_EVERY, DEFAULT_MAX_PENDING_OPS};
use lrclib_filter::pipeline::{self, FilterArgs, DEFAULT_PROGRESS_INTERVAL};
use lrclib_filter::progress::set_log_only;

#[derive(Parser)]
#[command(name = "lrclib-filter")]
#[command(about = "Filter an LRCLIB dump down to deduplicated ja/ko/en synced lyrics")]
struct Args {
    /// LRCLIB SQLite dump (read-only)
    source: PathBuf,

    /// Output database; the name must contain "filtered"
    output: PathBuf,

    /// Hide progress bars and print periodic log lines instead
    #[arg(long)]
    log_only: bool,

    /// Read every row and check the duration floor per record
    #[arg(long)]
    no_prefilter: bool,

    /// Flush after this many buffered write operations
    #[arg(long, default_value_t = DEFAULT_MAX_PENDING_OPS)]
    batch_size: usize,

    /// Also flush whenever the kept count reaches a multiple of this (0 = never)
    #[arg(long, default_value_t = DEFAULT_COMMIT_EVERY)]
    commit_every: u64,

    /// Records between progress reports
    #[arg(long, default_value_t = DEFAULT_PROGRESS_INTERVAL)]
    progress_interval: u64,

    /// Write the final counters to this JSON file
    #[arg(long)]
    stats_json: Option<PathBuf>,

    /// VACUUM the output after indexing
    #[arg(long)]
    vacuum: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    set_log_only(args.log_only);

    let filter_args = FilterArgs {
        source: args.source,
        output: args.output,
        prefilter: !args.no_prefilter,
        batch: BatchConfig {
            max_pending_ops: args.batch_size.max(1),
            commit_every: args.commit_every,
        },
        progress_interval: args.progress_interval,
        stats_json: args.stats_json,
        vacuum: args.vacuum,
    };

    pipeline::run(&filter_args)?;
    Ok(())
}
