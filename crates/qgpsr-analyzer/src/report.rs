//! The analysis summary and its Markdown rendering.

use std::fmt::{self, Write};
use std::path::PathBuf;

use serde::Serialize;

use crate::aggregate::{ConfigurationAggregate, RatioAggregate};
use crate::metrics::{DelayDistribution, MetricCell, MetricFamily, RunMetrics, RunOutcome};
use crate::repository::{Anomaly, RepositoryHandle, SkippedFile, UnitAnnotation};
use crate::stats::AcrossRuns;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileStats {
    pub ingested: usize,
    pub skipped: usize,
    pub ignored: usize,
}

/// A (run, metric) cell that could not be computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsufficientCell {
    pub config_name: String,
    pub run_label: String,
    pub run_number: u32,
    pub metric: MetricFamily,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSummary {
    pub files: FileStats,
    pub runs: Vec<RunMetrics>,
    pub configurations: Vec<ConfigurationAggregate>,
    pub skipped_files: Vec<SkippedFile>,
    pub ignored_files: Vec<PathBuf>,
    pub anomalies: Vec<Anomaly>,
    pub unit_annotations: Vec<UnitAnnotation>,
    pub insufficient_data: Vec<InsufficientCell>,
}

impl AnalysisSummary {
    pub(crate) fn build(
        handle: &RepositoryHandle,
        outcomes: Vec<RunOutcome>,
        configurations: Vec<ConfigurationAggregate>,
    ) -> Self {
        let runs: Vec<RunMetrics> = outcomes.into_iter().map(|o| o.metrics).collect();
        let insufficient_data = runs
            .iter()
            .flat_map(|run| {
                run.insufficient_cells()
                    .into_iter()
                    .map(move |(metric, reason)| InsufficientCell {
                        config_name: run.run.config_name.clone(),
                        run_label: run.run_label.clone(),
                        run_number: run.run.run_number,
                        metric,
                        reason: reason.to_string(),
                    })
            })
            .collect();
        Self {
            files: FileStats {
                ingested: handle.files_ingested(),
                skipped: handle.skipped_files().len(),
                ignored: handle.ignored_files().len(),
            },
            runs,
            configurations,
            skipped_files: handle.skipped_files().to_vec(),
            ignored_files: handle.ignored_files().to_vec(),
            anomalies: handle.anomalies().to_vec(),
            unit_annotations: handle.unit_annotations(),
            insufficient_data,
        }
    }

    pub fn configuration(&self, name: &str) -> Option<&ConfigurationAggregate> {
        self.configurations.iter().find(|c| c.config_name == name)
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = self.write_markdown(&mut out);
        out
    }

    fn write_markdown(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "# Queue-GPSR results\n")?;
        writeln!(
            out,
            "{} files read, {} skipped, {} ignored; {} runs in {} configurations.\n",
            self.files.ingested,
            self.files.skipped,
            self.files.ignored,
            self.runs.len(),
            self.configurations.len()
        )?;

        writeln!(out, "## Configurations\n")?;
        writeln!(
            out,
            "| configuration | runs | delay mean (pooled) | delay p95 (pooled) | PDR (pooled) | PDR mean ± CI | overhead (pooled) | queue mean ± CI |"
        )?;
        writeln!(out, "|---|---|---|---|---|---|---|---|")?;
        for config in &self.configurations {
            let pooled_delay = config
                .end_to_end_delay
                .value()
                .and_then(|d| d.pooled.as_ref());
            writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} | {} | {} |",
                config.config_name,
                config.runs,
                opt(pooled_delay.map(|p| p.mean)),
                opt(pooled_delay.map(|p| p.p95)),
                pooled(&config.delivery_ratio),
                ratio_ci(&config.delivery_ratio),
                pooled(&config.routing_overhead),
                across(&config.queue_utilization),
            )?;
        }

        writeln!(out, "\n## Runs\n")?;
        writeln!(
            out,
            "| run | delay source | delay mean | delay p99 | PDR | overhead | queue mean | queue max |"
        )?;
        writeln!(out, "|---|---|---|---|---|---|---|---|")?;
        for run in &self.runs {
            let delay = run.end_to_end_delay.value();
            let p99 = delay.and_then(|d| match d.distribution {
                DelayDistribution::Samples(s) => Some(s.p99),
                DelayDistribution::Moments { .. } => None,
            });
            let queue = run.queue_utilization.value();
            writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} | {} | {} |",
                run.run,
                delay.map_or_else(|| "-".to_string(), |d| format!("{:?}", d.source)),
                opt(delay.map(|d| d.distribution.mean())),
                opt(p99),
                opt(run.delivery_ratio.value().map(|r| r.ratio)),
                opt(run.routing_overhead.value().map(|r| r.ratio)),
                opt(queue.map(|q| q.mean)),
                opt(queue.map(|q| q.max)),
            )?;
        }

        if !self.skipped_files.is_empty() {
            writeln!(out, "\n## Skipped files\n")?;
            for file in &self.skipped_files {
                writeln!(out, "- `{}`: {}", file.path.display(), file.message)?;
            }
        }

        if !self.anomalies.is_empty() {
            writeln!(out, "\n## Anomalies\n")?;
            for anomaly in &self.anomalies {
                let Anomaly::DuplicateDefinition {
                    run,
                    record_kind,
                    module,
                    metric,
                    source,
                } = anomaly;
                write!(out, "- duplicate {record_kind} `{module}.{metric}` in {run}")?;
                match source {
                    Some(path) => writeln!(out, " (kept the one from `{}`)", path.display())?,
                    None => writeln!(out)?,
                }
            }
        }

        if !self.unit_annotations.is_empty() {
            writeln!(out, "\n## Unit mismatches\n")?;
            for note in &self.unit_annotations {
                let units: Vec<&str> = note
                    .units
                    .iter()
                    .map(|u| u.as_deref().unwrap_or("(none)"))
                    .collect();
                writeln!(
                    out,
                    "- {} `{}`: {}",
                    note.record_kind,
                    note.metric,
                    units.join(", ")
                )?;
            }
        }

        if !self.insufficient_data.is_empty() {
            writeln!(out, "\n## Insufficient data\n")?;
            for cell in &self.insufficient_data {
                writeln!(
                    out,
                    "- {} run {} ({}): {}: {}",
                    cell.config_name, cell.run_number, cell.run_label, cell.metric, cell.reason
                )?;
            }
        }
        Ok(())
    }
}

fn opt(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"))
}

fn pooled(cell: &MetricCell<RatioAggregate>) -> String {
    opt(cell.value().map(|r| r.pooled))
}

fn with_ci(stats: &AcrossRuns) -> String {
    match stats.ci_half_width {
        Some(hw) => format!("{:.4} ± {:.4}", stats.mean, hw),
        None => format!("{:.4}", stats.mean),
    }
}

fn ratio_ci(cell: &MetricCell<RatioAggregate>) -> String {
    cell.value()
        .map_or_else(|| "n/a".to_string(), |r| with_ci(&r.across_runs))
}

fn across(cell: &MetricCell<AcrossRuns>) -> String {
    cell.value().map_or_else(|| "n/a".to_string(), with_ci)
}
