//! Chunked CSV reader with encoding and dialect fallback.
//!
//! [`CsvSource`] tries each text encoding with each [`Engine`] in turn and
//! keeps the first combination that yields a first batch without error.
//! After that the combination is fixed for the rest of the read; records
//! that cannot be tokenized or decoded are skipped and counted.
//!
//! Every raw column is produced as nullable `Utf8`. Empty cells and the
//! usual NA spellings (`NA`, `NaN`, `null`, ...) become null.

use std::{
    borrow::Cow,
    collections::HashSet,
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::{
    array::{ArrayRef, RecordBatch, StringBuilder},
    datatypes::{DataType, Field, Schema, SchemaRef},
};
use encoding_rs::{Encoding, UTF_8, WINDOWS_1251};
use tracing::{debug, info, warn};

use crate::{
    error::{Error, Result},
    streaming::DataSource,
};

/// Cells read as missing.
const NA_VALUES: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Delimiters considered when none is forced, in tie-break order.
const SNIFF_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Default rows per batch.
pub const DEFAULT_BATCH_SIZE: usize = 50_000;

/// Tokenizer configuration tried for each encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// Strict quoting; records whose width differs from the header are
    /// skipped. Fails the probe if nothing in the first batch is well formed.
    Fast,
    /// Accepts backslash escapes and pads short records with nulls.
    Lenient,
}

impl Engine {
    const ALL: [Engine; 2] = [Engine::Fast, Engine::Lenient];

    fn accepts_width(self, width: usize, header: usize) -> bool {
        match self {
            Self::Fast => width == header,
            Self::Lenient => width <= header,
        }
    }
}

/// Options for reading a CSV file in chunks.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Rows per batch.
    pub batch_size: usize,
    /// Forced encoding label (`utf-8`, `cp1251`, ...); tried alone.
    pub encoding: Option<String>,
    /// Forced delimiter; sniffed from the header when `None`.
    pub delimiter: Option<u8>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            encoding: None,
            delimiter: None,
        }
    }
}

impl ReadOptions {
    /// Creates read options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of rows per batch.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Forces an encoding label.
    #[must_use]
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Forces the delimiter.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    fn candidates(&self) -> Result<Vec<(String, &'static Encoding)>> {
        match &self.encoding {
            Some(label) => {
                let lookup = label.trim().to_lowercase();
                let lookup = lookup.strip_suffix("-sig").unwrap_or(&lookup);
                let encoding = Encoding::for_label(lookup.as_bytes()).ok_or_else(|| {
                    Error::invalid_config(format!("unknown encoding '{}'", label))
                })?;
                Ok(vec![(label.clone(), encoding)])
            }
            None => Ok(vec![
                ("utf-8".to_string(), UTF_8),
                ("utf-8-sig".to_string(), UTF_8),
                ("cp1251".to_string(), WINDOWS_1251),
            ]),
        }
    }
}

/// Counters for one read of the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Records turned into rows.
    pub rows: usize,
    /// Records skipped as malformed or undecodable.
    pub skipped: usize,
}

/// A restartable [`DataSource`] over a delimited text file.
///
/// # Example
///
/// ```no_run
/// use hhprep::{reader::{CsvSource, ReadOptions}, streaming::DataSource};
///
/// let mut source = CsvSource::open("hh.csv", ReadOptions::new().with_batch_size(10_000)).unwrap();
/// while let Some(batch) = source.next_batch().unwrap() {
///     println!("{} rows", batch.num_rows());
/// }
/// ```
pub struct CsvSource {
    path: PathBuf,
    options: ReadOptions,
    schema: SchemaRef,
    reader: CommittedReader,
    pending: Option<RecordBatch>,
}

impl CsvSource {
    /// Opens `path`, probing encodings and engines until one yields a first
    /// batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an unknown forced encoding or a
    /// zero batch size, and [`Error::ReadExhausted`] with the last failure
    /// when no combination can read the file.
    pub fn open(path: impl AsRef<Path>, options: ReadOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if options.batch_size == 0 {
            return Err(Error::invalid_config("batch_size must be positive"));
        }

        let mut last_err = None;
        for (label, encoding) in options.candidates()? {
            for engine in Engine::ALL {
                info!(path = %path.display(), encoding = %label, engine = ?engine, "reading CSV");
                match CommittedReader::probe(&path, &label, encoding, engine, &options) {
                    Ok((reader, pending)) => {
                        return Ok(Self {
                            schema: Arc::clone(&reader.schema),
                            path,
                            options,
                            reader,
                            pending,
                        });
                    }
                    Err(e) => {
                        debug!(encoding = %label, engine = ?engine, error = %e, "read attempt failed");
                        last_err = Some(e);
                    }
                }
            }
        }

        let last = last_err.unwrap_or_else(|| Error::parse("no encoding candidates"));
        Err(Error::read_exhausted(path, last))
    }

    /// The input path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Label of the encoding in use.
    pub fn encoding(&self) -> &str {
        &self.reader.label
    }

    /// Engine in use.
    pub fn engine(&self) -> Engine {
        self.reader.engine
    }

    /// Delimiter in use.
    pub fn delimiter(&self) -> u8 {
        self.reader.delimiter
    }

    /// Counters since the file was last opened.
    pub fn stats(&self) -> ReadStats {
        self.reader.stats
    }
}

impl DataSource for CsvSource {
    fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if let Some(batch) = self.pending.take() {
            return Ok(Some(batch));
        }
        self.reader.read_batch(self.options.batch_size, false)
    }

    fn reset(&mut self) -> Result<()> {
        *self = Self::open(&self.path, self.options.clone())?;
        Ok(())
    }

    fn skipped_records(&self) -> usize {
        self.reader.stats.skipped
    }
}

impl std::fmt::Debug for CsvSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvSource")
            .field("path", &self.path)
            .field("encoding", &self.reader.label)
            .field("engine", &self.reader.engine)
            .field("stats", &self.reader.stats)
            .finish_non_exhaustive()
    }
}

/// A tokenizer bound to one encoding/engine combination.
struct CommittedReader {
    csv: csv::Reader<BufReader<File>>,
    label: String,
    encoding: &'static Encoding,
    engine: Engine,
    delimiter: u8,
    schema: SchemaRef,
    record: csv::ByteRecord,
    stats: ReadStats,
}

impl CommittedReader {
    fn probe(
        path: &Path,
        label: &str,
        encoding: &'static Encoding,
        engine: Engine,
        options: &ReadOptions,
    ) -> Result<(Self, Option<RecordBatch>)> {
        let delimiter = match options.delimiter {
            Some(delimiter) => delimiter,
            None => sniff_delimiter(path, encoding)?,
        };
        let file = File::open(path).map_err(|e| Error::io(e, path))?;
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(delimiter)
            .escape((engine == Engine::Lenient).then_some(b'\\'))
            .from_reader(BufReader::new(file));

        let header = csv.byte_headers()?.clone();
        if header.is_empty() {
            return Err(Error::parse(format!("{} has no header row", path.display())));
        }
        let names = decode_header(&header, encoding, label)?;
        let fields: Vec<Field> = names
            .into_iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect();

        let mut reader = Self {
            csv,
            label: label.to_string(),
            encoding,
            engine,
            delimiter,
            schema: Arc::new(Schema::new(fields)),
            record: csv::ByteRecord::new(),
            stats: ReadStats::default(),
        };
        let first = reader.read_batch(options.batch_size, true)?;
        Ok((reader, first))
    }

    /// Reads up to `limit` rows. While probing, undecodable records fail the
    /// attempt instead of being skipped.
    fn read_batch(&mut self, limit: usize, probing: bool) -> Result<Option<RecordBatch>> {
        let width = self.schema.fields().len();
        let mut builders: Vec<StringBuilder> = (0..width).map(|_| StringBuilder::new()).collect();
        let mut rows = 0;
        let mut seen = 0;

        while rows < limit {
            match self.csv.read_byte_record(&mut self.record) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    seen += 1;
                    self.skip(&format!("tokenizer error: {e}"));
                    continue;
                }
            }
            seen += 1;

            if !self.engine.accepts_width(self.record.len(), width) {
                let reason = format!("{} fields, header has {}", self.record.len(), width);
                self.skip(&reason);
                continue;
            }

            let Some(cells) = decode_record(&self.record, self.encoding) else {
                if probing {
                    return Err(Error::parse(format!(
                        "line {} is not valid {}",
                        self.line(),
                        self.label
                    )));
                }
                let reason = format!("not valid {}", self.label);
                self.skip(&reason);
                continue;
            };

            for (idx, builder) in builders.iter_mut().enumerate() {
                match cells.get(idx).map(|cell| &**cell) {
                    Some(value) if !NA_VALUES.contains(&value) => builder.append_value(value),
                    _ => builder.append_null(),
                }
            }
            rows += 1;
        }

        if probing && self.engine == Engine::Fast && seen > 0 && rows == 0 {
            return Err(Error::parse(format!(
                "no well-formed records with delimiter {:?}",
                char::from(self.delimiter)
            )));
        }
        if rows == 0 {
            return Ok(None);
        }

        self.stats.rows += rows;
        let arrays: Vec<ArrayRef> = builders
            .iter_mut()
            .map(|b| Arc::new(b.finish()) as ArrayRef)
            .collect();
        Ok(Some(RecordBatch::try_new(Arc::clone(&self.schema), arrays)?))
    }

    fn line(&self) -> u64 {
        self.record.position().map_or(0, csv::Position::line)
    }

    fn skip(&mut self, reason: &str) {
        self.stats.skipped += 1;
        warn!(line = self.line(), reason = %reason, "skipping malformed line");
    }
}

/// Decodes every field, or `None` if any field is invalid in `encoding`.
fn decode_record<'a>(record: &'a csv::ByteRecord, encoding: &'static Encoding) -> Option<Vec<Cow<'a, str>>> {
    record
        .iter()
        .map(|field| encoding.decode_without_bom_handling_and_without_replacement(field))
        .collect()
}

fn decode_header(header: &csv::ByteRecord, encoding: &'static Encoding, label: &str) -> Result<Vec<String>> {
    let decoded = decode_record(header, encoding)
        .ok_or_else(|| Error::parse(format!("header is not valid {}", label)))?;

    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(decoded.len());
    for (idx, raw) in decoded.iter().enumerate() {
        let raw = if idx == 0 { raw.trim_start_matches('\u{feff}') } else { raw.as_ref() };
        let base = if raw.trim().is_empty() {
            format!("Unnamed: {}", idx)
        } else {
            raw.to_string()
        };
        let mut name = base.clone();
        let mut suffix = 1;
        while !seen.insert(name.clone()) {
            name = format!("{}.{}", base, suffix);
            suffix += 1;
        }
        names.push(name);
    }
    Ok(names)
}

/// Picks the most frequent candidate delimiter outside quotes in the first
/// line, defaulting to a comma.
fn sniff_delimiter(path: &Path, encoding: &'static Encoding) -> Result<u8> {
    let file = File::open(path).map_err(|e| Error::io(e, path))?;
    let mut first_line = Vec::new();
    BufReader::new(file)
        .read_until(b'\n', &mut first_line)
        .map_err(|e| Error::io(e, path))?;
    let (text, _) = encoding.decode_without_bom_handling(&first_line);

    let mut counts = [0usize; SNIFF_DELIMITERS.len()];
    let mut in_quotes = false;
    for ch in text.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        if let Some(idx) = SNIFF_DELIMITERS.iter().position(|d| char::from(*d) == ch) {
            counts[idx] += 1;
        }
    }

    let mut best = 0;
    for idx in 1..counts.len() {
        if counts[idx] > counts[best] {
            best = idx;
        }
    }
    Ok(SNIFF_DELIMITERS[best])
}
