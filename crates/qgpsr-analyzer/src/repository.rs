//! In-memory dataset of every run's raw observations.
//!
//! A [`ResultRepository`] is filled file by file through [`ResultRepository::ingest`]
//! and then frozen into a [`RepositoryHandle`], the read-only view the metrics
//! engine works from.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use qgpsr_abstract::{
    Record, RecordKey, RecordKind, RunIdentity, RunSection, ScalarRecord, VectorRecord,
};
use qgpsr_loader::{ParseErrorKind, ParsedFile};
use serde::Serialize;
use tracing::{debug, warn};

/// Non-fatal irregularity noticed while merging files.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// A record was defined twice for the same run; the later one won.
    DuplicateDefinition {
        run: RunIdentity,
        record_kind: RecordKind,
        module: String,
        metric: String,
        /// File the overriding record came from, when known.
        source: Option<PathBuf>,
    },
}

/// A metric recorded with different units in different runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitAnnotation {
    pub record_kind: RecordKind,
    pub metric: String,
    pub units: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub error: ParseErrorKind,
    pub message: String,
}

#[derive(Debug, Default)]
struct RunEntry {
    /// Run ids of every section declaring this run, in ingestion order.
    labels: Vec<String>,
    parameters: BTreeMap<String, String>,
    scalars: BTreeMap<RecordKey, ScalarRecord>,
    vectors: BTreeMap<RecordKey, VectorRecord>,
}

/// Which runs a query looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunFilter {
    pub config_name: Option<String>,
    pub run_label: Option<String>,
}

impl RunFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn config(name: impl Into<String>) -> Self {
        Self {
            config_name: Some(name.into()),
            run_label: None,
        }
    }

    pub fn run(label: impl Into<String>) -> Self {
        Self {
            config_name: None,
            run_label: Some(label.into()),
        }
    }

    /// A run matches a label when any file declared it under that run id.
    pub fn matches(&self, run: RunView<'_>) -> bool {
        self.config_name
            .as_deref()
            .is_none_or(|c| c == run.identity.config_name)
            && self
                .run_label
                .as_deref()
                .is_none_or(|l| run.entry.labels.iter().any(|label| label == l))
    }
}

/// Borrowed record of either kind, as returned by [`ResultRepository::query`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordRef<'a> {
    Scalar(&'a ScalarRecord),
    Vector(&'a VectorRecord),
}

impl RecordRef<'_> {
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordRef::Scalar(_) => RecordKind::Scalar,
            RecordRef::Vector(_) => RecordKind::Vector,
        }
    }

    pub fn run(&self) -> &RunIdentity {
        match self {
            RecordRef::Scalar(s) => &s.run,
            RecordRef::Vector(v) => &v.run,
        }
    }
}

#[derive(Debug, Default)]
pub struct ResultRepository {
    runs: BTreeMap<RunIdentity, RunEntry>,
    anomalies: Vec<Anomaly>,
    skipped: Vec<SkippedFile>,
    ignored: Vec<PathBuf>,
    files_ingested: usize,
}

impl ResultRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge everything one parsed file produced.
    pub fn ingest(&mut self, file: ParsedFile) {
        match file {
            ParsedFile::Scalar {
                path,
                runs,
                records,
            } => {
                self.register_runs(runs);
                for record in records {
                    self.insert(Record::Scalar(record), Some(&path));
                }
                self.files_ingested += 1;
            }
            ParsedFile::Vector {
                path,
                runs,
                records,
            } => {
                self.register_runs(runs);
                for record in records {
                    self.insert(Record::Vector(record), Some(&path));
                }
                self.files_ingested += 1;
            }
            ParsedFile::Failed { path, error } => {
                warn!("Skipping {}: {error}", path.display());
                self.skipped.push(SkippedFile {
                    path,
                    error: error.kind(),
                    message: error.to_string(),
                });
            }
            ParsedFile::Ignored { path } => {
                debug!("Ignoring {}", path.display());
                self.ignored.push(path);
            }
        }
    }

    /// Merge loose records that did not come from a file.
    pub fn ingest_records(&mut self, records: impl IntoIterator<Item = Record>) {
        for record in records {
            self.insert(record, None);
        }
    }

    fn register_runs(&mut self, sections: Vec<RunSection>) {
        for section in sections {
            let entry = self.entry(&section.identity);
            if !entry.labels.contains(&section.label) {
                entry.labels.push(section.label);
            }
            entry.parameters.extend(section.parameters);
        }
    }

    fn entry(&mut self, run: &RunIdentity) -> &mut RunEntry {
        self.runs.entry(run.clone()).or_default()
    }

    fn insert(&mut self, record: Record, source: Option<&Path>) {
        let run = record.run().clone();
        let key = record.key();
        let kind = record.kind();
        let entry = self.entry(&run);
        let replaced = match record {
            Record::Scalar(s) => entry.scalars.insert(key.clone(), s).is_some(),
            Record::Vector(v) => entry.vectors.insert(key.clone(), v).is_some(),
        };
        if replaced {
            warn!("Duplicate {kind} {key} for run {run}; keeping the later definition");
            self.anomalies.push(Anomaly::DuplicateDefinition {
                run: RunIdentity::clone(&run),
                record_kind: kind,
                module: key.module,
                metric: key.name,
                source: source.map(Path::to_path_buf),
            });
        }
    }

    pub fn freeze(self) -> RepositoryHandle {
        RepositoryHandle {
            inner: Arc::new(self),
        }
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    pub fn runs(&self) -> impl Iterator<Item = RunView<'_>> {
        self.runs.iter().map(|(identity, entry)| RunView { identity, entry })
    }

    pub fn run(&self, identity: &RunIdentity) -> Option<RunView<'_>> {
        self.runs
            .get_key_value(identity)
            .map(|(identity, entry)| RunView { identity, entry })
    }

    /// All records named `metric` in runs matching `filter`, scalars first.
    pub fn query<'a>(
        &'a self,
        filter: &'a RunFilter,
        metric: &'a str,
    ) -> impl Iterator<Item = RecordRef<'a>> + 'a {
        self.runs()
            .filter(move |run| filter.matches(*run))
            .flat_map(move |run| {
                let entry = run.entry;
                let scalars = entry
                    .scalars
                    .values()
                    .filter(move |s| s.name == metric)
                    .map(RecordRef::Scalar);
                let vectors = entry
                    .vectors
                    .values()
                    .filter(move |v| v.name == metric)
                    .map(RecordRef::Vector);
                scalars.chain(vectors)
            })
    }

    pub fn scalars<'a>(
        &'a self,
        filter: &'a RunFilter,
        metric: &'a str,
    ) -> impl Iterator<Item = &'a ScalarRecord> + 'a {
        self.query(filter, metric).filter_map(|r| match r {
            RecordRef::Scalar(s) => Some(s),
            RecordRef::Vector(_) => None,
        })
    }

    pub fn vectors<'a>(
        &'a self,
        filter: &'a RunFilter,
        metric: &'a str,
    ) -> impl Iterator<Item = &'a VectorRecord> + 'a {
        self.query(filter, metric).filter_map(|r| match r {
            RecordRef::Vector(v) => Some(v),
            RecordRef::Scalar(_) => None,
        })
    }

    /// Metrics whose unit differs between records of the same kind.
    pub fn unit_annotations(&self) -> Vec<UnitAnnotation> {
        let mut units: BTreeMap<(RecordKind, &str), BTreeSet<Option<&str>>> = BTreeMap::new();
        for entry in self.runs.values() {
            for s in entry.scalars.values() {
                units
                    .entry((RecordKind::Scalar, s.name.as_str()))
                    .or_default()
                    .insert(s.unit.as_deref());
            }
            for v in entry.vectors.values() {
                units
                    .entry((RecordKind::Vector, v.name.as_str()))
                    .or_default()
                    .insert(v.unit.as_deref());
            }
        }
        units
            .into_iter()
            .filter(|(_, seen)| seen.len() > 1)
            .map(|((record_kind, metric), seen)| UnitAnnotation {
                record_kind,
                metric: metric.to_string(),
                units: seen.into_iter().map(|u| u.map(str::to_string)).collect(),
            })
            .collect()
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    pub fn skipped_files(&self) -> &[SkippedFile] {
        &self.skipped
    }

    pub fn ignored_files(&self) -> &[PathBuf] {
        &self.ignored
    }

    pub fn files_ingested(&self) -> usize {
        self.files_ingested
    }
}

/// Shared, read-only view of a fully ingested repository.
#[derive(Debug, Clone)]
pub struct RepositoryHandle {
    inner: Arc<ResultRepository>,
}

impl Deref for RepositoryHandle {
    type Target = ResultRepository;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Everything recorded for one run.
#[derive(Debug, Clone, Copy)]
pub struct RunView<'a> {
    identity: &'a RunIdentity,
    entry: &'a RunEntry,
}

impl<'a> RunView<'a> {
    pub fn identity(&self) -> &'a RunIdentity {
        self.identity
    }

    /// Latest run id this run was declared under; `None` for runs only
    /// known from loose records.
    pub fn label(&self) -> Option<&'a str> {
        self.entry.labels.last().map(String::as_str)
    }

    pub fn labels(&self) -> &'a [String] {
        &self.entry.labels
    }

    pub fn parameter(&self, key: &str) -> Option<&'a str> {
        self.entry.parameters.get(key).map(String::as_str)
    }

    pub fn parameters(&self) -> &'a BTreeMap<String, String> {
        &self.entry.parameters
    }

    pub fn scalar_count(&self) -> usize {
        self.entry.scalars.len()
    }

    pub fn vector_count(&self) -> usize {
        self.entry.vectors.len()
    }

    /// Scalars named `name`, one per module, in module order.
    pub fn scalars_named(self, name: &'a str) -> impl Iterator<Item = &'a ScalarRecord> + 'a {
        self.entry.scalars.values().filter(move |s| s.name == name)
    }

    pub fn vectors_named(self, name: &'a str) -> impl Iterator<Item = &'a VectorRecord> + 'a {
        self.entry.vectors.values().filter(move |v| v.name == name)
    }

    pub fn scalar(&self, module: &str, name: &str) -> Option<&'a ScalarRecord> {
        self.entry.scalars.get(&RecordKey::new(module, name))
    }

    /// Sum of the scalar `name` over all modules; `None` if no module recorded it.
    pub fn scalar_sum(&self, name: &str) -> Option<f64> {
        let mut seen = false;
        let mut total = 0.0;
        for s in self.entry.scalars.values().filter(|s| s.name == name) {
            seen = true;
            total += s.value;
        }
        seen.then_some(total)
    }

    /// Latest timestamp of any vector sample in the run.
    pub fn latest_time(&self) -> Option<f64> {
        self.entry
            .vectors
            .values()
            .filter_map(VectorRecord::last_time)
            .reduce(f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qgpsr_abstract::Sample;

    fn run(config: &str, number: u32) -> Arc<RunIdentity> {
        Arc::new(RunIdentity::new(config, number, "0"))
    }

    fn scalar_file(
        name: &str,
        run: &Arc<RunIdentity>,
        label: &str,
        records: Vec<Record>,
    ) -> ParsedFile {
        ParsedFile::Scalar {
            path: PathBuf::from(name),
            runs: vec![RunSection {
                identity: run.clone(),
                label: label.to_string(),
                parameters: BTreeMap::new(),
            }],
            records: records
                .into_iter()
                .filter_map(|r| match r {
                    Record::Scalar(s) => Some(s),
                    Record::Vector(_) => None,
                })
                .collect(),
        }
    }

    fn scalar(run: &Arc<RunIdentity>, module: &str, name: &str, value: f64) -> Record {
        Record::Scalar(ScalarRecord {
            run: run.clone(),
            module: module.to_string(),
            name: name.to_string(),
            value,
            unit: None,
        })
    }

    #[test]
    fn duplicate_scalar_overwrites_and_is_reported_once() {
        let a = run("A", 0);
        let mut repo = ResultRepository::new();
        repo.ingest_records([
            scalar(&a, "net.host[0].app[0]", "packetSent:count", 10.0),
            scalar(&a, "net.host[1].app[0]", "packetSent:count", 5.0),
        ]);
        repo.ingest_records([scalar(&a, "net.host[0].app[0]", "packetSent:count", 12.0)]);

        assert_eq!(repo.anomalies().len(), 1);
        let Anomaly::DuplicateDefinition {
            module, metric, ..
        } = &repo.anomalies()[0];
        assert_eq!(module, "net.host[0].app[0]");
        assert_eq!(metric, "packetSent:count");

        let view = repo.run(&a).unwrap();
        assert_eq!(view.scalar_sum("packetSent:count"), Some(17.0));
        assert_eq!(view.scalar_sum("packetReceived:count"), None);
    }

    #[test]
    fn scalar_and_vector_namespaces_are_independent() {
        let a = run("A", 0);
        let mut repo = ResultRepository::new();
        let vector = VectorRecord::from_samples(a.clone(), 0, "m", "x", [Sample::new(0.0, 1.0)])
            .unwrap();
        repo.ingest_records([scalar(&a, "m", "x", 1.0), Record::Vector(vector)]);
        assert!(repo.anomalies().is_empty());

        let all = RunFilter::all();
        let kinds: Vec<_> = repo.query(&all, "x").map(|r| r.kind()).collect();
        assert_eq!(kinds, vec![RecordKind::Scalar, RecordKind::Vector]);
    }

    #[test]
    fn query_honours_run_filter() {
        let a = run("A", 0);
        let b = run("B", 0);
        let mut repo = ResultRepository::new();
        repo.ingest(scalar_file("A-0.sca", &a, "A-0-1", vec![scalar(&a, "m", "x", 1.0)]));
        repo.ingest(scalar_file("B-0.sca", &b, "B-0-2", vec![scalar(&b, "m", "x", 2.0)]));

        let only_b = RunFilter::config("B");
        let values: Vec<f64> = repo.scalars(&only_b, "x").map(|s| s.value).collect();
        assert_eq!(values, vec![2.0]);

        let by_label = RunFilter::run("A-0-1");
        assert_eq!(repo.scalars(&by_label, "x").count(), 1);
        assert_eq!(repo.vectors(&by_label, "x").count(), 0);
    }

    #[test]
    fn rerun_with_new_id_merges_into_one_run() {
        let a = run("A", 1);
        let mut repo = ResultRepository::new();
        let first = "A-1-20240101-10:00:00-11";
        let second = "A-1-20240102-08:00:00-42";
        repo.ingest(scalar_file(
            "first.sca",
            &a,
            first,
            vec![scalar(&a, "m", "packetSent:count", 10.0)],
        ));
        repo.ingest(scalar_file(
            "second.sca",
            &a,
            second,
            vec![scalar(&a, "m", "packetSent:count", 20.0)],
        ));

        assert_eq!(repo.run_count(), 1);
        assert_eq!(repo.anomalies().len(), 1);
        let view = repo.runs().next().unwrap();
        assert_eq!(view.label(), Some(second));
        assert_eq!(view.labels().len(), 2);
        assert_eq!(view.scalar_sum("packetSent:count"), Some(20.0));
        let by_first_id = RunFilter::run(first);
        assert_eq!(repo.scalars(&by_first_id, "packetSent:count").count(), 1);
    }

    #[test]
    fn unit_mismatch_is_annotated() {
        let a = run("A", 0);
        let b = run("B", 0);
        let mut repo = ResultRepository::new();
        let with_unit = |r: &Arc<RunIdentity>, unit: Option<&str>| {
            Record::Scalar(ScalarRecord {
                run: r.clone(),
                module: "m".to_string(),
                name: "delay".to_string(),
                value: 1.0,
                unit: unit.map(str::to_string),
            })
        };
        repo.ingest_records([with_unit(&a, Some("s")), with_unit(&b, Some("ms"))]);
        let notes = repo.unit_annotations();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].metric, "delay");
        assert_eq!(
            notes[0].units,
            vec![Some("ms".to_string()), Some("s".to_string())]
        );
    }

    #[test]
    fn frozen_handle_reads_through() {
        let a = run("A", 0);
        let mut repo = ResultRepository::new();
        repo.ingest_records([scalar(&a, "m", "x", 1.0)]);
        let handle = repo.freeze();
        let copy = handle.clone();
        assert_eq!(copy.run_count(), 1);
        assert_eq!(handle.runs().next().unwrap().scalar_count(), 1);
    }
}
