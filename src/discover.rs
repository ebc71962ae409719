//! Candidate file discovery under the CSV source directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::{debug, warn};
use regex::RegexBuilder;
use walkdir::WalkDir;

/// Recursively lists files under `root` whose full path matches `pattern`
/// (case-insensitive search). Entries are visited in file-name order.
pub fn discover_files(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Source directory {root:?} does not exist");
    }
    let matcher = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .with_context(|| format!("Compiling file search pattern '{pattern}'"))?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable entry under {root:?}: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if matcher.is_match(&path.to_string_lossy()) {
            files.push(path.to_path_buf());
        } else {
            debug!("Ignoring {path:?}");
        }
    }
    Ok(files)
}
