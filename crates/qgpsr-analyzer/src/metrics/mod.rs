//! Per-run metric computation.
//!
//! Every function here looks at exactly one run. Cross-run aggregation lives in
//! [`crate::aggregate`] and only consumes the [`RunOutcome`]s produced here.

pub mod delay;
pub mod queue;
pub mod ratio;

use std::fmt;

use qgpsr_abstract::{MetricNames, RunIdentity};
use serde::Serialize;
use tracing::debug;

use crate::repository::RunView;

pub use delay::{DelayDistribution, DelaySource, DelayStats, PairingCounts};
pub use queue::{QueueUtilization, time_weighted_average};
pub use ratio::RatioValue;

/// The four metric families the engine reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFamily {
    EndToEndDelay,
    DeliveryRatio,
    RoutingOverhead,
    QueueUtilization,
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MetricFamily::EndToEndDelay => "end-to-end delay",
            MetricFamily::DeliveryRatio => "packet delivery ratio",
            MetricFamily::RoutingOverhead => "routing overhead",
            MetricFamily::QueueUtilization => "queue utilization",
        })
    }
}

/// One (run, metric) or (configuration, metric) cell of the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetricCell<T> {
    Computed { value: T },
    InsufficientData { reason: String },
}

impl<T> MetricCell<T> {
    pub fn computed(value: T) -> Self {
        MetricCell::Computed { value }
    }

    pub fn insufficient(reason: impl Into<String>) -> Self {
        MetricCell::InsufficientData {
            reason: reason.into(),
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            MetricCell::Computed { value } => Some(value),
            MetricCell::InsufficientData { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            MetricCell::Computed { .. } => None,
            MetricCell::InsufficientData { reason } => Some(reason),
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, MetricCell::Computed { .. })
    }
}

/// The four families for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetrics {
    pub run: RunIdentity,
    /// Latest run id the run was declared under.
    pub run_label: String,
    pub end_to_end_delay: MetricCell<DelayStats>,
    pub delivery_ratio: MetricCell<RatioValue>,
    pub routing_overhead: MetricCell<RatioValue>,
    pub queue_utilization: MetricCell<QueueUtilization>,
}

impl RunMetrics {
    /// `(family, reason)` for every cell that could not be computed.
    pub fn insufficient_cells(&self) -> Vec<(MetricFamily, &str)> {
        [
            (MetricFamily::EndToEndDelay, self.end_to_end_delay.reason()),
            (MetricFamily::DeliveryRatio, self.delivery_ratio.reason()),
            (MetricFamily::RoutingOverhead, self.routing_overhead.reason()),
            (MetricFamily::QueueUtilization, self.queue_utilization.reason()),
        ]
        .into_iter()
        .filter_map(|(family, reason)| reason.map(|r| (family, r)))
        .collect()
    }
}

/// Per-run result plus the raw delay samples the pooled distribution needs.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub metrics: RunMetrics,
    /// Sorted end-to-end delays; empty unless the delay came from samples.
    pub delay_samples: Vec<f64>,
}

pub fn compute_run(run: RunView<'_>, names: &MetricNames) -> RunOutcome {
    let delay = delay::compute(run, names);
    let metrics = RunMetrics {
        run: run.identity().clone(),
        run_label: run
            .label()
            .map_or_else(|| run.identity().to_string(), str::to_string),
        end_to_end_delay: delay.cell,
        delivery_ratio: ratio::delivery_ratio(run, names),
        routing_overhead: ratio::routing_overhead(run, names),
        queue_utilization: queue::compute(run, names),
    };
    debug!(
        "Run {}: {} of 4 metrics computed",
        metrics.run_label,
        4 - metrics.insufficient_cells().len()
    );
    RunOutcome {
        metrics,
        delay_samples: delay.samples,
    }
}
