use crate::run::RunIdentity;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Scalar and vector records live in independent namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Scalar,
    Vector,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Scalar => f.write_str("scalar"),
            RecordKind::Vector => f.write_str("vector"),
        }
    }
}

/// Unique key of a record within one run and one kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    /// Module hierarchy path, e.g. `QueueGpsrNetwork.host[3].app[0]`
    pub module: String,
    pub name: String,
}

impl RecordKey {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}

/// One named measurement taken once per run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarRecord {
    pub run: Arc<RunIdentity>,
    pub module: String,
    pub name: String,
    pub value: f64,
    pub unit: Option<String>,
}

impl ScalarRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.module.clone(), self.name.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(time: f64, value: f64) -> Self {
        Self { time, value }
    }
}

/// A sample arrived with a timestamp lower than its predecessor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderingError {
    pub previous: f64,
    pub found: f64,
}

/// A measurement sampled over simulated time.
///
/// Samples are kept in non-decreasing timestamp order; `push` refuses anything
/// that would break that.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub run: Arc<RunIdentity>,
    pub id: u32,
    pub module: String,
    pub name: String,
    pub unit: Option<String>,
    samples: Vec<Sample>,
}

impl VectorRecord {
    pub fn new(
        run: Arc<RunIdentity>,
        id: u32,
        module: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            run,
            id,
            module: module.into(),
            name: name.into(),
            unit: None,
            samples: Vec::new(),
        }
    }

    pub fn with_unit(mut self, unit: Option<String>) -> Self {
        self.unit = unit;
        self
    }

    pub fn push(&mut self, sample: Sample) -> Result<(), OrderingError> {
        if let Some(last) = self.samples.last()
            && sample.time < last.time
        {
            return Err(OrderingError {
                previous: last.time,
                found: sample.time,
            });
        }
        self.samples.push(sample);
        Ok(())
    }

    /// Build a record from an already collected series, validating order.
    pub fn from_samples(
        run: Arc<RunIdentity>,
        id: u32,
        module: impl Into<String>,
        name: impl Into<String>,
        samples: impl IntoIterator<Item = Sample>,
    ) -> Result<Self, OrderingError> {
        let mut record = Self::new(run, id, module, name);
        for sample in samples {
            record.push(sample)?;
        }
        Ok(record)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last_time(&self) -> Option<f64> {
        self.samples.last().map(|s| s.time)
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.module.clone(), self.name.clone())
    }
}

/// Either kind of record, as handed to the repository.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Scalar(ScalarRecord),
    Vector(VectorRecord),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Scalar(_) => RecordKind::Scalar,
            Record::Vector(_) => RecordKind::Vector,
        }
    }

    pub fn run(&self) -> &Arc<RunIdentity> {
        match self {
            Record::Scalar(s) => &s.run,
            Record::Vector(v) => &v.run,
        }
    }

    pub fn key(&self) -> RecordKey {
        match self {
            Record::Scalar(s) => s.key(),
            Record::Vector(v) => v.key(),
        }
    }

    pub fn unit(&self) -> Option<&str> {
        match self {
            Record::Scalar(s) => s.unit.as_deref(),
            Record::Vector(v) => v.unit.as_deref(),
        }
    }
}
