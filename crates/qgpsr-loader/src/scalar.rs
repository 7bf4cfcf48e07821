//! Reader for `.sca` scalar result files.
//!
//! The reader is a single forward pass. Each `scalar` line becomes one
//! [`ScalarRecord`]; each `field` line of a `statistic` block becomes a record
//! named `<statistic>:<field>`. Records are held back until their block ends,
//! so a trailing `attr unit` reaches the scalar before it or every field of
//! the statistic above it.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use qgpsr_abstract::{RunIdentity, RunSection, ScalarRecord};
use std::sync::Arc;
use tracing::trace;

use crate::error::ParseError;
use crate::header::RunHeader;
use crate::lexer::{is_skippable, parse_number, tokenize};

#[derive(Debug, Clone, PartialEq)]
pub enum ScalarItem {
    Scalar(ScalarRecord),
    /// Emitted once a run section is complete, after all of its records.
    Run(RunSection),
}

#[derive(Debug)]
enum Context {
    Run,
    Scalar,
    Statistic {
        module: String,
        name: String,
        unit: Option<String>,
    },
    Other,
}

/// A scalar file on disk. Every call to [`ScalarFile::stream`] starts a fresh
/// pass over the file.
#[derive(Debug, Clone)]
pub struct ScalarFile {
    path: PathBuf,
}

impl ScalarFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn stream(&self) -> Result<ScalarStream<BufReader<File>>, ParseError> {
        let file = File::open(&self.path).map_err(|source| ParseError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(ScalarStream::new(BufReader::new(file), self.path.clone()))
    }
}

pub struct ScalarStream<R> {
    reader: R,
    source: PathBuf,
    line_no: usize,
    buf: String,
    run: Option<RunHeader>,
    context: Context,
    /// Records of the current `scalar` or `statistic` block.
    pending: Vec<ScalarRecord>,
    ready: VecDeque<ScalarItem>,
    error: Option<ParseError>,
    finished: bool,
}

impl<R: BufRead> ScalarStream<R> {
    pub fn new(reader: R, source: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            source: source.into(),
            line_no: 0,
            buf: String::new(),
            run: None,
            context: Context::Other,
            pending: Vec::new(),
            ready: VecDeque::new(),
            error: None,
            finished: false,
        }
    }

    /// Only the scalar records, dropping run-section notifications.
    pub fn records(self) -> impl Iterator<Item = Result<ScalarRecord, ParseError>> {
        self.filter_map(|item| match item {
            Ok(ScalarItem::Scalar(record)) => Some(Ok(record)),
            Ok(ScalarItem::Run(_)) => None,
            Err(e) => Some(Err(e)),
        })
    }

    fn advance(&mut self) -> Result<(), ParseError> {
        self.buf.clear();
        let read = self
            .reader
            .read_line(&mut self.buf)
            .map_err(|source| ParseError::Io {
                path: self.source.clone(),
                source,
            })?;
        if read == 0 {
            self.finish_section();
            self.finished = true;
            return Ok(());
        }
        self.line_no += 1;

        let line = std::mem::take(&mut self.buf);
        let result = self.handle_line(line.trim());
        self.buf = line;
        result
    }

    fn handle_line(&mut self, line: &str) -> Result<(), ParseError> {
        if is_skippable(line) {
            return Ok(());
        }
        let fields = tokenize(line).map_err(|m| self.format_error(m))?;
        let Some(keyword) = fields.first().map(|f| &**f) else {
            return Ok(());
        };

        match keyword {
            "run" => {
                self.finish_section();
                let label = self.field(&fields, 1, "run id")?;
                self.run = Some(RunHeader::new(label));
                self.context = Context::Run;
            }
            "attr" => {
                let key = self.field(&fields, 1, "attribute name")?;
                let value = self.field(&fields, 2, "attribute value")?;
                self.apply_attr(key, value);
            }
            "itervar" | "config" => {
                let key = self.field(&fields, 1, "name")?;
                let value = self.field(&fields, 2, "value")?;
                self.header()?.add_parameter(key, value);
            }
            "param" => {
                self.flush_pending();
                let key = self.field(&fields, 1, "parameter pattern")?;
                let value = self.field(&fields, 2, "parameter value")?;
                self.header()?.add_parameter(key, value);
                self.context = Context::Other;
            }
            "par" => {
                self.flush_pending();
                let module = self.field(&fields, 1, "module")?;
                let name = self.field(&fields, 2, "parameter name")?;
                let value = self.field(&fields, 3, "parameter value")?;
                self.header()?
                    .add_parameter(format!("{module}.{name}"), value);
                self.context = Context::Other;
            }
            "scalar" => {
                self.flush_pending();
                let module = self.field(&fields, 1, "module")?.to_string();
                let name = self.field(&fields, 2, "scalar name")?.to_string();
                let value = self.number(&fields, 3)?;
                let run = self.identity()?;
                self.pending.push(ScalarRecord {
                    run,
                    module,
                    name,
                    value,
                    unit: None,
                });
                self.context = Context::Scalar;
            }
            "statistic" => {
                self.flush_pending();
                let module = self.field(&fields, 1, "module")?.to_string();
                let name = self.field(&fields, 2, "statistic name")?.to_string();
                self.identity()?;
                self.context = Context::Statistic {
                    module,
                    name,
                    unit: None,
                };
            }
            "field" => {
                let field_name = self.field(&fields, 1, "field name")?.to_string();
                let value = self.number(&fields, 2)?;
                if let Context::Statistic { module, name, unit } = &self.context {
                    let module = module.clone();
                    let name = format!("{name}:{field_name}");
                    let unit = unit.clone();
                    let record = ScalarRecord {
                        run: self.identity()?,
                        module,
                        name,
                        value,
                        unit,
                    };
                    self.pending.push(record);
                } else {
                    trace!("{}:{}: field outside statistic", self.source.display(), self.line_no);
                }
            }
            other => {
                // version, bin, vector and anything newer than this reader
                trace!("{}:{}: skipping '{other}' line", self.source.display(), self.line_no);
                if other != "version" && other != "bin" {
                    self.flush_pending();
                    self.context = Context::Other;
                }
            }
        }
        Ok(())
    }

    fn apply_attr(&mut self, key: &str, value: &str) {
        match &mut self.context {
            Context::Run => {
                if let Some(header) = self.run.as_mut() {
                    header.add_parameter(key, value);
                }
            }
            Context::Scalar => {
                if key == "unit" {
                    for record in &mut self.pending {
                        record.unit = Some(value.to_string());
                    }
                }
            }
            Context::Statistic { unit, .. } => {
                // older writers put the unit before the fields, newer ones after
                if key == "unit" {
                    *unit = Some(value.to_string());
                    for record in &mut self.pending {
                        record.unit = Some(value.to_string());
                    }
                }
            }
            Context::Other => {}
        }
    }

    fn flush_pending(&mut self) {
        self.ready
            .extend(self.pending.drain(..).map(ScalarItem::Scalar));
    }

    fn finish_section(&mut self) {
        self.flush_pending();
        if let Some(header) = self.run.take() {
            self.ready.push_back(ScalarItem::Run(header.into_section()));
        }
        self.context = Context::Other;
    }

    fn header(&mut self) -> Result<&mut RunHeader, ParseError> {
        self.run.as_mut().ok_or_else(|| ParseError::Format {
            path: self.source.clone(),
            line: self.line_no,
            message: "line appears before any run declaration".to_string(),
        })
    }

    fn identity(&mut self) -> Result<Arc<RunIdentity>, ParseError> {
        Ok(self.header()?.identity())
    }

    fn field<'f>(
        &self,
        fields: &'f [std::borrow::Cow<'_, str>],
        idx: usize,
        what: &str,
    ) -> Result<&'f str, ParseError> {
        fields
            .get(idx)
            .map(|f| &**f)
            .ok_or_else(|| self.format_error(format!("missing {what}")))
    }

    fn number(&self, fields: &[std::borrow::Cow<'_, str>], idx: usize) -> Result<f64, ParseError> {
        let text = self.field(fields, idx, "value")?;
        parse_number(text).ok_or_else(|| self.format_error(format!("value '{text}' is not numeric")))
    }

    fn format_error(&self, message: String) -> ParseError {
        ParseError::Format {
            path: self.source.clone(),
            line: self.line_no,
            message,
        }
    }
}

impl<R: BufRead> Iterator for ScalarStream<R> {
    type Item = Result<ScalarItem, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Some(Ok(item));
            }
            if let Some(e) = self.error.take() {
                return Some(Err(e));
            }
            if self.finished {
                return None;
            }
            if let Err(e) = self.advance() {
                self.finished = true;
                self.error = Some(e);
            }
        }
    }
}

/// Everything one scalar file declared.
#[derive(Debug, Default)]
pub struct ScalarBatch {
    pub runs: Vec<RunSection>,
    pub records: Vec<ScalarRecord>,
}

/// Drain a stream, failing on the first error.
pub fn read_scalars<R: BufRead>(stream: ScalarStream<R>) -> Result<ScalarBatch, ParseError> {
    let mut batch = ScalarBatch::default();
    for item in stream {
        match item? {
            ScalarItem::Scalar(record) => batch.records.push(record),
            ScalarItem::Run(section) => batch.runs.push(section),
        }
    }
    Ok(batch)
}
