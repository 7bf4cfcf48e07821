use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to read one result file. Always scoped to that file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}: {message}", path.display())]
    Format {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error(
        "{}:{line}: vector {vector_id} goes back in time ({found} after {previous})",
        path.display()
    )]
    OrderingViolation {
        path: PathBuf,
        line: usize,
        vector_id: u32,
        previous: f64,
        found: f64,
    },
}

/// Coarse classification carried into reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorKind {
    Io,
    Format,
    OrderingViolation,
}

impl ParseError {
    pub fn kind(&self) -> ParseErrorKind {
        match self {
            ParseError::Io { .. } => ParseErrorKind::Io,
            ParseError::Format { .. } => ParseErrorKind::Format,
            ParseError::OrderingViolation { .. } => ParseErrorKind::OrderingViolation,
        }
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            ParseError::Io { path, .. }
            | ParseError::Format { path, .. }
            | ParseError::OrderingViolation { path, .. } => path,
        }
    }
}

/// Failure to enumerate the result files of a directory.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("results directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}
