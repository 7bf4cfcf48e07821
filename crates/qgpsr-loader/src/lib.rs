//! Readers for simulation result files.
//!
//! [`load_file`] is the per-file entry point: it picks a reader from the file
//! extension and returns a [`ParsedFile`], which either carries everything the
//! file declared or the error that made the file unusable.

pub mod discover;
pub mod error;
mod header;
mod lexer;
pub mod scalar;
pub mod vector;

use std::path::{Path, PathBuf};

use qgpsr_abstract::{RunSection, ScalarRecord, VectorRecord};
use tracing::debug;

pub use discover::discover;
pub use error::{DiscoveryError, ParseError, ParseErrorKind};
pub use scalar::{ScalarFile, ScalarItem, ScalarStream, read_scalars};
pub use vector::{VectorDecl, VectorFile, VectorItem, VectorStream, read_vectors};

/// Kind of result file, decided from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFileKind {
    Scalar,
    Vector,
    Unrecognized,
}

impl ResultFileKind {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("sca") => ResultFileKind::Scalar,
            Some("vec") => ResultFileKind::Vector,
            _ => ResultFileKind::Unrecognized,
        }
    }
}

/// Outcome of reading one file.
#[derive(Debug)]
pub enum ParsedFile {
    Scalar {
        path: PathBuf,
        runs: Vec<RunSection>,
        records: Vec<ScalarRecord>,
    },
    Vector {
        path: PathBuf,
        runs: Vec<RunSection>,
        records: Vec<VectorRecord>,
    },
    /// The file could not be read; none of its records are usable.
    Failed { path: PathBuf, error: ParseError },
    /// Matched by a pattern but not a result file this crate reads (e.g. `.vci`).
    Ignored { path: PathBuf },
}

impl ParsedFile {
    pub fn path(&self) -> &Path {
        match self {
            ParsedFile::Scalar { path, .. }
            | ParsedFile::Vector { path, .. }
            | ParsedFile::Failed { path, .. }
            | ParsedFile::Ignored { path } => path,
        }
    }

    pub fn record_count(&self) -> usize {
        match self {
            ParsedFile::Scalar { records, .. } => records.len(),
            ParsedFile::Vector { records, .. } => records.len(),
            ParsedFile::Failed { .. } | ParsedFile::Ignored { .. } => 0,
        }
    }
}

/// Read one result file completely.
pub fn load_file(path: &Path) -> ParsedFile {
    let path_buf = path.to_path_buf();
    let outcome = match ResultFileKind::from_path(path) {
        ResultFileKind::Scalar => ScalarFile::new(path)
            .stream()
            .and_then(read_scalars)
            .map(|batch| ParsedFile::Scalar {
                path: path_buf.clone(),
                runs: batch.runs,
                records: batch.records,
            }),
        ResultFileKind::Vector => VectorFile::new(path)
            .stream()
            .and_then(read_vectors)
            .map(|batch| ParsedFile::Vector {
                path: path_buf.clone(),
                runs: batch.runs,
                records: batch.records,
            }),
        ResultFileKind::Unrecognized => Ok(ParsedFile::Ignored {
            path: path_buf.clone(),
        }),
    };

    let parsed = outcome.unwrap_or_else(|error| ParsedFile::Failed {
        path: path_buf,
        error,
    });
    debug!(
        "Loaded {} ({} records)",
        parsed.path().display(),
        parsed.record_count()
    );
    parsed
}
