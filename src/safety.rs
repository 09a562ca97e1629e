//! Guard against overwriting the source dump.
//!
//! The pipeline deletes an existing output file before it starts, so the
//! output path is checked before anything touches the disk.

use anyhow::{bail, Result};
use std::path::Path;

/// Every output filename must contain this.
pub const OUTPUT_PATTERN: &str = "filtered";

/// Names of source dumps that must never be written to.
const SOURCE_PATTERNS: [&str; 3] = ["lrclib-db-dump", "lrclib-dump", "db-dump"];

/// Validate that `output` is safe to delete and recreate.
///
/// - the filename contains `required_pattern`
/// - the path is not one of `source_paths` (also after resolving symlinks
///   and relative components, when both files exist)
/// - the filename does not look like a raw dump
pub fn validate_output_path(
    output: &Path,
    required_pattern: &str,
    source_paths: &[&Path],
) -> Result<()> {
    let output_name = output.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if !output_name.contains(required_pattern) {
        bail!(
            "Safety check failed: output file '{}' must contain '{}' in the name",
            output.display(),
            required_pattern
        );
    }

    for source in source_paths {
        if output == *source || same_file(output, source) {
            bail!(
                "Safety check failed: output '{}' cannot be the same as source '{}'",
                output.display(),
                source.display()
            );
        }
    }

    for pattern in SOURCE_PATTERNS {
        if output_name.contains(pattern) {
            bail!(
                "Safety check failed: output '{}' matches source database pattern '{}'",
                output.display(),
                pattern
            );
        }
    }

    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
