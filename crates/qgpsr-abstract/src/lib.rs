pub mod config;
pub mod record;
pub mod run;

pub use config::{AnalysisConfig, ConfigOverride, MetricNames};
pub use record::{OrderingError, Record, RecordKey, RecordKind, Sample, ScalarRecord, VectorRecord};
pub use run::{RunIdentity, RunSection};
