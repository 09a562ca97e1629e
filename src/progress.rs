//! Progress display for the filter pass.
//!
//! Interactive runs get an indicatif bar. With `--log-only` the bar is hidden
//! and a plain line goes to stderr every `interval` records instead, so the
//! output stays readable under `tail -f` or in a log file.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Global flag for log-only mode (set from args in main)
pub static LOG_ONLY: AtomicBool = AtomicBool::new(false);

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Human-readable duration: "42.0s", "3.5m", "1.2h"
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}

/// Records per second, 0 when nothing has elapsed yet.
pub fn rate(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

/// Progress bar with consistent styling, hidden in log-only mode.
pub fn create_progress_bar(len: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        let style = ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA: {eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb
}

/// Spinner for steps without a known length, hidden in log-only mode.
pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        let style = ProgressStyle::default_spinner()
            .template("{msg} {spinner} [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(100));
    }
    pb.set_message(msg.to_string());
    pb
}

/// Plain progress line, e.g. `[FILTER] 500000/2000000 (25.0%) 41234/s kept=120311`
pub fn format_progress_line(
    phase: &str,
    current: u64,
    total: u64,
    elapsed: Duration,
    kept: u64,
) -> String {
    let pct = if total > 0 {
        100.0 * current as f64 / total as f64
    } else {
        100.0
    };
    format!(
        "[{}] {}/{} ({:.1}%) {:.0}/s kept={}",
        phase,
        current,
        total,
        pct,
        rate(current, elapsed),
        kept
    )
}

/// Drives the bar and the periodic log line for one pass.
pub struct PassProgress {
    phase: &'static str,
    total: u64,
    interval: u64,
    start: Instant,
    bar: ProgressBar,
}

impl PassProgress {
    pub fn new(phase: &'static str, total: u64, interval: u64) -> Self {
        Self {
            phase,
            total,
            interval: interval.max(1),
            start: Instant::now(),
            bar: create_progress_bar(total, phase),
        }
    }

    /// True when `current` falls on a reporting boundary.
    pub fn is_due(&self, current: u64) -> bool {
        current % self.interval == 0
    }

    /// Update the bar and, on a boundary, emit the log line.
    pub fn tick(&self, current: u64, kept: u64) {
        if !self.is_due(current) {
            return;
        }
        self.bar.set_position(current);
        self.bar.set_message(format!("{} (kept {})", self.phase, kept));
        if is_log_only() {
            eprintln!(
                "{}",
                format_progress_line(self.phase, current, self.total, self.start.elapsed(), kept)
            );
        }
    }

    /// Final position; always logs once in log-only mode.
    pub fn finish(&self, current: u64, kept: u64) {
        self.bar.set_position(current);
        self.bar
            .finish_with_message(format!("{} done (kept {})", self.phase, kept));
        if is_log_only() {
            eprintln!(
                "{}",
                format_progress_line(self.phase, current, self.total, self.start.elapsed(), kept)
            );
        }
    }

    /// Leave the bar where it is after a failure.
    pub fn abandon(&self) {
        self.bar.abandon();
    }
}
