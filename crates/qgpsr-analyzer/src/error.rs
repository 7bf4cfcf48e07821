use std::path::PathBuf;

use qgpsr_loader::DiscoveryError;
use thiserror::Error;

/// Fatal pipeline failures. Per-file problems never end up here; they are
/// recorded as skipped files in the summary instead.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("results directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("no result files in {} match {}", directory.display(), patterns.join(", "))]
    EmptyResultSet {
        directory: PathBuf,
        patterns: Vec<String>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to start parser workers: {0}")]
    WorkerPool(String),
}

impl From<DiscoveryError> for AnalysisError {
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::DirectoryNotFound(path) => AnalysisError::DirectoryNotFound(path),
            DiscoveryError::InvalidPattern { pattern, message } => {
                AnalysisError::InvalidPattern { pattern, message }
            }
        }
    }
}
