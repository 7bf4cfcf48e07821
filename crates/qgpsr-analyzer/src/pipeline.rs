//! Staged entry points: discover and parse files into a frozen repository,
//! then compute the summary from it.

use std::path::Path;

use qgpsr_abstract::AnalysisConfig;
use qgpsr_loader::{ParsedFile, discover, load_file};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::aggregate::aggregate;
use crate::error::AnalysisError;
use crate::metrics::{RunOutcome, compute_run};
use crate::report::AnalysisSummary;
use crate::repository::{RepositoryHandle, ResultRepository};

pub fn validate(config: &AnalysisConfig) -> Result<(), AnalysisError> {
    let level = config.confidence_level;
    if !(level > 0.0 && level < 1.0) {
        return Err(AnalysisError::InvalidConfig(format!(
            "confidence level must lie strictly between 0 and 1, got {level}"
        )));
    }
    if config.patterns.is_empty() {
        return Err(AnalysisError::InvalidConfig(
            "at least one file pattern is required".to_string(),
        ));
    }
    Ok(())
}

fn thread_pool(workers: usize, stage: &'static str) -> Result<rayon::ThreadPool, AnalysisError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(move |i| format!("qgpsr-{stage}-{i}"))
        .build()
        .map_err(|e| AnalysisError::WorkerPool(e.to_string()))
}

/// Run `op` on a pool of `workers` threads. Falls back to the global pool
/// when the bounded one cannot be built.
fn with_workers<R: Send>(
    workers: usize,
    stage: &'static str,
    op: impl FnOnce() -> R + Send,
) -> R {
    match thread_pool(workers, stage) {
        Ok(pool) => pool.install(op),
        Err(e) => {
            warn!("{e}; running {stage} on the global pool");
            op()
        }
    }
}

/// Parse every file in `directory` matching one of `patterns`.
///
/// Files are parsed in parallel on a pool of `config.workers` threads, then
/// merged on the calling thread in path order. A file that fails to parse is
/// recorded as skipped and contributes nothing.
pub fn parse_results(
    directory: &Path,
    patterns: &[String],
    config: &AnalysisConfig,
) -> Result<RepositoryHandle, AnalysisError> {
    validate(config)?;
    let files = discover(directory, patterns)?;
    if files.is_empty() {
        return Err(AnalysisError::EmptyResultSet {
            directory: directory.to_path_buf(),
            patterns: patterns.to_vec(),
        });
    }
    info!("Parsing {} result files from {}", files.len(), directory.display());

    let pool = thread_pool(config.workers, "parse")?;
    let parsed: Vec<ParsedFile> = pool.install(|| files.par_iter().map(|p| load_file(p)).collect());

    let mut repository = ResultRepository::new();
    for file in parsed {
        debug!("Merging {} ({} records)", file.path().display(), file.record_count());
        repository.ingest(file);
    }
    info!(
        "Loaded {} runs from {} files ({} skipped)",
        repository.run_count(),
        repository.files_ingested(),
        repository.skipped_files().len()
    );
    Ok(repository.freeze())
}

/// [`parse_results`] with the directory and patterns taken from `config`.
pub fn parse_configured(config: &AnalysisConfig) -> Result<RepositoryHandle, AnalysisError> {
    parse_results(&config.results_dir, &config.patterns, config)
}

/// Per-run metrics, then per-configuration aggregates.
///
/// Runs are computed in parallel on a pool of `config.workers` threads, the
/// same bound [`parse_results`] uses.
pub fn compute_statistics(handle: &RepositoryHandle, config: &AnalysisConfig) -> AnalysisSummary {
    let runs: Vec<_> = handle.runs().collect();
    let outcomes: Vec<RunOutcome> = with_workers(config.workers, "metrics", || {
        runs.par_iter()
            .map(|run| compute_run(*run, &config.metrics))
            .collect()
    });
    let configurations = aggregate(&outcomes, config.confidence_level);
    info!(
        "Computed metrics for {} runs in {} configurations",
        outcomes.len(),
        configurations.len()
    );
    AnalysisSummary::build(handle, outcomes, configurations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_runs_on_a_bounded_named_pool() {
        assert_eq!(with_workers(3, "metrics", rayon::current_num_threads), 3);
        let name = with_workers(1, "metrics", || {
            std::thread::current().name().map(str::to_string)
        });
        assert_eq!(name.as_deref(), Some("qgpsr-metrics-0"));
    }

    #[test]
    fn confidence_level_must_be_a_fraction() {
        let config = AnalysisConfig {
            confidence_level: 0.0,
            ..AnalysisConfig::default()
        };
        assert!(matches!(validate(&config), Err(AnalysisError::InvalidConfig(_))));
        assert!(validate(&AnalysisConfig::default()).is_ok());
    }
}
