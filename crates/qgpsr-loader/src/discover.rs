//! Locating result files inside a results directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::DiscoveryError;

/// List the files under `directory` matching any of `patterns`.
///
/// Patterns are glob patterns relative to `directory` (`*.sca`, `**/*.vec`).
/// Directories are ignored, files matched by several patterns are listed once,
/// and the result is sorted so that callers see a deterministic order.
pub fn discover(directory: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, DiscoveryError> {
    if !directory.is_dir() {
        return Err(DiscoveryError::DirectoryNotFound(directory.to_path_buf()));
    }

    let root = glob::Pattern::escape(&directory.to_string_lossy());
    let mut files = BTreeSet::new();
    for pattern in patterns {
        let full = format!("{root}/{pattern}");
        let entries = glob::glob(&full).map_err(|e| DiscoveryError::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        files.extend(entries.filter_map(|entry| match entry {
            Ok(path) if path.is_file() => Some(path),
            _ => None,
        }));
    }

    Ok(files.into_iter().collect())
}
