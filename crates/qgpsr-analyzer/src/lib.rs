//! Metrics engine for Queue-GPSR simulation results.
//!
//! [`parse_results`] turns a results directory into a frozen
//! [`RepositoryHandle`]; [`compute_statistics`] derives per-run metrics and
//! per-configuration aggregates from it as an [`AnalysisSummary`].

pub mod aggregate;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod repository;
pub mod stats;

pub use aggregate::{ConfigurationAggregate, DelayAggregate, RatioAggregate, RunRatio};
pub use error::AnalysisError;
pub use metrics::{
    DelayDistribution, DelaySource, DelayStats, MetricCell, MetricFamily, PairingCounts,
    QueueUtilization, RatioValue, RunMetrics,
};
pub use pipeline::{compute_statistics, parse_configured, parse_results};
pub use report::{AnalysisSummary, FileStats, InsufficientCell};
pub use repository::{
    Anomaly, RecordRef, RepositoryHandle, ResultRepository, RunFilter, RunView, SkippedFile,
    UnitAnnotation,
};
pub use stats::{AcrossRuns, DistributionSummary, Moments};
