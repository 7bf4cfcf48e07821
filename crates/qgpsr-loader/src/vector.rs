//! Streaming reader for `.vec` vector result files.
//!
//! Vector bodies are the bulk of a result set, so nothing here holds a whole
//! series: [`VectorStream`] yields declarations and samples one line at a time
//! and only remembers, per declared vector, its column layout and the last
//! timestamp seen. [`read_vectors`] is the one place that assembles series.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use qgpsr_abstract::{RunIdentity, RunSection, Sample, VectorRecord};
use tracing::trace;

use crate::error::ParseError;
use crate::header::RunHeader;
use crate::lexer::{is_skippable, parse_number, tokenize};

/// Position of the time and value columns in a data line (after the id).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Columns {
    time: usize,
    value: usize,
    width: usize,
}

impl Columns {
    /// Parse a column spec such as `ETV` or `TV`.
    pub fn parse(spec: &str) -> Option<Self> {
        let mut time = None;
        let mut value = None;
        for (idx, c) in spec.chars().enumerate() {
            match c {
                'T' if time.is_none() => time = Some(idx),
                'V' if value.is_none() => value = Some(idx),
                'E' => {}
                _ => return None,
            }
        }
        Some(Self {
            time: time?,
            value: value?,
            width: spec.len(),
        })
    }
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            time: 0,
            value: 1,
            width: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorDecl {
    pub run: Arc<RunIdentity>,
    pub id: u32,
    pub module: String,
    pub name: String,
    pub unit: Option<String>,
    pub columns: Columns,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VectorItem {
    Declared(VectorDecl),
    Sample { vector_id: u32, sample: Sample },
    /// Emitted once a run section is complete, after all of its samples.
    Run(RunSection),
}

#[derive(Debug)]
struct Track {
    columns: Columns,
    last_time: Option<f64>,
}

/// A vector file on disk. Every call to [`VectorFile::stream`] restarts from
/// the first line.
#[derive(Debug, Clone)]
pub struct VectorFile {
    path: PathBuf,
}

impl VectorFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn stream(&self) -> Result<VectorStream<BufReader<File>>, ParseError> {
        let file = File::open(&self.path).map_err(|source| ParseError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(VectorStream::new(BufReader::new(file), self.path.clone()))
    }
}

pub struct VectorStream<R> {
    reader: R,
    source: PathBuf,
    line_no: usize,
    buf: String,
    run: Option<RunHeader>,
    tracks: HashMap<u32, Track>,
    /// Declaration held back for a trailing `attr unit`.
    pending: Option<VectorDecl>,
    ready: VecDeque<VectorItem>,
    error: Option<ParseError>,
    finished: bool,
}

impl<R: BufRead> VectorStream<R> {
    pub fn new(reader: R, source: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            source: source.into(),
            line_no: 0,
            buf: String::new(),
            run: None,
            tracks: HashMap::new(),
            pending: None,
            ready: VecDeque::new(),
            error: None,
            finished: false,
        }
    }

    /// Line number of the last line read.
    pub fn line(&self) -> usize {
        self.line_no
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
        if line.as_bytes()[0].is_ascii_digit() {
            self.flush_pending();
            return self.handle_data(line);
        }

        let fields = tokenize(line).map_err(|m| self.format_error(m))?;
        let Some(keyword) = fields.first().map(|f| &**f) else {
            return Ok(());
        };
        let field = |idx: usize, what: &str| {
            fields
                .get(idx)
                .map(|f| &**f)
                .ok_or_else(|| self.format_error(format!("missing {what}")))
        };

        match keyword {
            "run" => {
                let label = field(1, "run id")?.to_string();
                self.finish_section();
                self.run = Some(RunHeader::new(label));
            }
            "attr" => {
                let key = field(1, "attribute name")?.to_string();
                let value = field(2, "attribute value")?.to_string();
                if let Some(decl) = self.pending.as_mut() {
                    if key == "unit" {
                        decl.unit = Some(value);
                    }
                } else if let Some(header) = self.run.as_mut() {
                    header.add_parameter(key, value);
                }
            }
            "itervar" | "config" | "param" => {
                let key = field(1, "name")?.to_string();
                let value = field(2, "value")?.to_string();
                self.flush_pending();
                self.header()?.add_parameter(key, value);
            }
            "par" => {
                let key = format!("{}.{}", field(1, "module")?, field(2, "parameter name")?);
                let value = field(3, "parameter value")?.to_string();
                self.flush_pending();
                self.header()?.add_parameter(key, value);
            }
            "vector" => {
                let id_text = field(1, "vector id")?;
                let id: u32 = id_text
                    .parse()
                    .map_err(|_| self.format_error(format!("invalid vector id '{id_text}'")))?;
                let module = field(2, "module")?.to_string();
                let name = field(3, "vector name")?.to_string();
                let columns = match fields.get(4) {
                    Some(spec) => Columns::parse(spec).ok_or_else(|| {
                        self.format_error(format!("unsupported column spec '{spec}'"))
                    })?,
                    None => Columns::default(),
                };
                self.declare(id, module, name, columns)?;
            }
            other => {
                trace!("{}:{}: skipping '{other}' line", self.source.display(), self.line_no);
                self.flush_pending();
            }
        }
        Ok(())
    }

    fn declare(
        &mut self,
        id: u32,
        module: String,
        name: String,
        columns: Columns,
    ) -> Result<(), ParseError> {
        self.flush_pending();
        let run = self.header()?.identity();
        if self.tracks.contains_key(&id) {
            return Err(self.format_error(format!("vector {id} declared twice in one run")));
        }
        self.tracks.insert(
            id,
            Track {
                columns,
                last_time: None,
            },
        );
        self.pending = Some(VectorDecl {
            run,
            id,
            module,
            name,
            unit: None,
            columns,
        });
        Ok(())
    }

    fn handle_data(&mut self, line: &str) -> Result<(), ParseError> {
        let mut parts = line.split_ascii_whitespace();
        let id_text = parts.next().unwrap_or_default();
        let vector_id: u32 = id_text
            .parse()
            .map_err(|_| self.format_error(format!("invalid vector id '{id_text}'")))?;
        let Some(track) = self.tracks.get(&vector_id) else {
            return Err(self.format_error(format!("sample for undeclared vector {vector_id}")));
        };
        let columns = track.columns;
        let previous = track.last_time;

        let mut time = None;
        let mut value = None;
        let mut width = 0;
        for (idx, text) in parts.enumerate() {
            width = idx + 1;
            if idx == columns.time {
                time = Some(text);
            } else if idx == columns.value {
                value = Some(text);
            }
        }
        if width != columns.width {
            return Err(self.format_error(format!(
                "vector {vector_id} expects {} columns, found {width}",
                columns.width
            )));
        }
        let (Some(time_text), Some(value_text)) = (time, value) else {
            return Err(self.format_error("incomplete data line".to_string()));
        };

        let time = parse_number(time_text)
            .filter(|t| t.is_finite())
            .ok_or_else(|| self.format_error(format!("invalid timestamp '{time_text}'")))?;
        let value = parse_number(value_text)
            .ok_or_else(|| self.format_error(format!("value '{value_text}' is not numeric")))?;

        if let Some(previous) = previous
            && time < previous
        {
            return Err(ParseError::OrderingViolation {
                path: self.source.clone(),
                line: self.line_no,
                vector_id,
                previous,
                found: time,
            });
        }
        if let Some(track) = self.tracks.get_mut(&vector_id) {
            track.last_time = Some(time);
        }

        self.ready.push_back(VectorItem::Sample {
            vector_id,
            sample: Sample::new(time, value),
        });
        Ok(())
    }

    fn flush_pending(&mut self) {
        if let Some(decl) = self.pending.take() {
            self.ready.push_back(VectorItem::Declared(decl));
        }
    }

    fn finish_section(&mut self) {
        self.flush_pending();
        self.tracks.clear();
        if let Some(header) = self.run.take() {
            self.ready.push_back(VectorItem::Run(header.into_section()));
        }
    }

    fn header(&mut self) -> Result<&mut RunHeader, ParseError> {
        self.run.as_mut().ok_or_else(|| ParseError::Format {
            path: self.source.clone(),
            line: self.line_no,
            message: "line appears before any run declaration".to_string(),
        })
    }

    fn format_error(&self, message: String) -> ParseError {
        ParseError::Format {
            path: self.source.clone(),
            line: self.line_no,
            message,
        }
    }
}

impl<R: BufRead> Iterator for VectorStream<R> {
    type Item = Result<VectorItem, ParseError>;

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

/// Every vector of one file, assembled.
#[derive(Debug, Default)]
pub struct VectorBatch {
    pub runs: Vec<RunSection>,
    pub records: Vec<VectorRecord>,
}

/// Drain a stream into complete vector records. Any error discards the batch.
pub fn read_vectors<R: BufRead>(mut stream: VectorStream<R>) -> Result<VectorBatch, ParseError> {
    let mut batch = VectorBatch::default();
    let mut open: BTreeMap<u32, VectorRecord> = BTreeMap::new();

    while let Some(item) = stream.next() {
        match item? {
            VectorItem::Declared(decl) => {
                let record =
                    VectorRecord::new(decl.run, decl.id, decl.module, decl.name).with_unit(decl.unit);
                open.insert(decl.id, record);
            }
            VectorItem::Sample { vector_id, sample } => {
                let Some(record) = open.get_mut(&vector_id) else {
                    continue;
                };
                record
                    .push(sample)
                    .map_err(|e| ParseError::OrderingViolation {
                        path: stream.source.clone(),
                        line: stream.line(),
                        vector_id,
                        previous: e.previous,
                        found: e.found,
                    })?;
            }
            VectorItem::Run(section) => {
                batch.runs.push(section);
                batch.records.extend(std::mem::take(&mut open).into_values());
            }
        }
    }
    Ok(batch)
}
