//! Second pass: fold per-run results into per-configuration statistics.
//!
//! Runs arrive in repository order (configuration, then run number) and every
//! fold below is order-insensitive up to that ordering, so the aggregates do
//! not depend on the order files were read in.

use serde::Serialize;

use crate::metrics::{DelayDistribution, MetricCell, RatioValue, RunOutcome};
use crate::stats::{AcrossRuns, DistributionSummary, Moments};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRatio {
    pub run_label: String,
    pub run_number: u32,
    pub ratio: f64,
}

/// Per-run ratios, their across-run statistics and the pooled ratio
/// (sum of numerators over sum of denominators). The two are reported side by
/// side because they differ whenever runs have different denominators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatioAggregate {
    pub per_run: Vec<RunRatio>,
    pub across_runs: AcrossRuns,
    pub pooled: f64,
    pub pooled_numerator: f64,
    pub pooled_denominator: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelayAggregate {
    /// Distribution of every sample of every sample-level run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pooled: Option<DistributionSummary>,
    /// Statistics of the per-run mean delays, over all runs with a delay.
    pub run_means: AcrossRuns,
    /// Runs whose samples went into `pooled`.
    pub pooled_runs: usize,
    /// Runs that only had a moment summary.
    pub scalar_only_runs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigurationAggregate {
    pub config_name: String,
    pub runs: usize,
    pub end_to_end_delay: MetricCell<DelayAggregate>,
    pub delivery_ratio: MetricCell<RatioAggregate>,
    pub routing_overhead: MetricCell<RatioAggregate>,
    pub queue_utilization: MetricCell<AcrossRuns>,
}

fn no_runs(total: usize) -> String {
    format!("no computed value in any of {total} runs")
}

fn aggregate_ratio<'a>(
    runs: impl Iterator<Item = (&'a RunOutcome, &'a MetricCell<RatioValue>)>,
    total: usize,
    confidence_level: f64,
) -> MetricCell<RatioAggregate> {
    let mut per_run = Vec::new();
    let mut moments = Moments::new();
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (outcome, cell) in runs {
        let Some(value) = cell.value() else {
            continue;
        };
        moments.push(value.ratio);
        numerator += value.numerator;
        denominator += value.denominator;
        per_run.push(RunRatio {
            run_label: outcome.metrics.run_label.clone(),
            run_number: outcome.metrics.run.run_number,
            ratio: value.ratio,
        });
    }
    match AcrossRuns::from_moments(&moments, confidence_level) {
        Some(across_runs) if denominator != 0.0 => MetricCell::computed(RatioAggregate {
            per_run,
            across_runs,
            pooled: numerator / denominator,
            pooled_numerator: numerator,
            pooled_denominator: denominator,
        }),
        _ => MetricCell::insufficient(no_runs(total)),
    }
}

fn aggregate_delay(runs: &[&RunOutcome], confidence_level: f64) -> MetricCell<DelayAggregate> {
    let mut means = Moments::new();
    let mut pooled_samples = Vec::new();
    let mut pooled_runs = 0;
    let mut scalar_only_runs = 0;
    for outcome in runs {
        let Some(stats) = outcome.metrics.end_to_end_delay.value() else {
            continue;
        };
        means.push(stats.distribution.mean());
        match stats.distribution {
            DelayDistribution::Samples(_) => {
                pooled_runs += 1;
                pooled_samples.extend_from_slice(&outcome.delay_samples);
            }
            DelayDistribution::Moments { .. } => scalar_only_runs += 1,
        }
    }
    let Some(run_means) = AcrossRuns::from_moments(&means, confidence_level) else {
        return MetricCell::insufficient(no_runs(runs.len()));
    };
    MetricCell::computed(DelayAggregate {
        pooled: DistributionSummary::from_samples(&pooled_samples),
        run_means,
        pooled_runs,
        scalar_only_runs,
    })
}

fn aggregate_queue(runs: &[&RunOutcome], confidence_level: f64) -> MetricCell<AcrossRuns> {
    let moments: Moments = runs
        .iter()
        .filter_map(|o| o.metrics.queue_utilization.value())
        .map(|q| q.mean)
        .collect();
    match AcrossRuns::from_moments(&moments, confidence_level) {
        Some(value) => MetricCell::computed(value),
        None => MetricCell::insufficient(no_runs(runs.len())),
    }
}

/// Group `outcomes` by configuration and aggregate each group.
///
/// `outcomes` must be in repository run order; runs of one configuration are
/// then contiguous.
pub fn aggregate(outcomes: &[RunOutcome], confidence_level: f64) -> Vec<ConfigurationAggregate> {
    outcomes
        .chunk_by(|a, b| a.metrics.run.config_name == b.metrics.run.config_name)
        .map(|group| {
            let runs: Vec<&RunOutcome> = group.iter().collect();
            ConfigurationAggregate {
                config_name: group[0].metrics.run.config_name.clone(),
                runs: runs.len(),
                end_to_end_delay: aggregate_delay(&runs, confidence_level),
                delivery_ratio: aggregate_ratio(
                    runs.iter().map(|o| (*o, &o.metrics.delivery_ratio)),
                    runs.len(),
                    confidence_level,
                ),
                routing_overhead: aggregate_ratio(
                    runs.iter().map(|o| (*o, &o.metrics.routing_overhead)),
                    runs.len(),
                    confidence_level,
                ),
                queue_utilization: aggregate_queue(&runs, confidence_level),
            }
        })
        .collect()
}
