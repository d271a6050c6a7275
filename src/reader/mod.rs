// Reader facade: configuration, construction of the decode pipeline, and
// the row/record pull API.
//
// A reader is constructed once and consumed once; there is no seek and no
// restart. The first failure latches into the status and is returned again
// on every subsequent call.

mod parser;

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::ops::Index;
use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::core::bom::sniff_bom;
use crate::core::decoder::ScalarDecoder;
use crate::core::delimiter::Delimiter;
use crate::core::source::ByteSource;
use crate::core::stream::ScalarStream;
use crate::encoding::Encoding;
use crate::error::{ConfigError, ParseKind, ReadError};

use parser::RowParser;

/// Where the header row comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderStrategy {
    /// No header row; every parsed row is data.
    #[default]
    None,
    /// The first row is the header.
    FirstLine,
    /// Skip this many rows, then take the next as the header.
    LineNumber(usize),
}

/// Immutable reader configuration.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Encoding hint; when absent, BOM inference then UTF-8.
    pub encoding: Option<Encoding>,
    pub field_delimiter: Vec<char>,
    pub row_delimiter: Vec<char>,
    /// The escaping scalar, or None to treat it as ordinary data.
    pub escape: Option<char>,
    /// Scalars stripped at field boundaries.
    pub trim: Vec<char>,
    pub header: HeaderStrategy,
    /// Materialize the entire input before parsing: costs memory, buys the
    /// input size and full-input encoding validation up front.
    pub presample: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            encoding: None,
            field_delimiter: vec![','],
            row_delimiter: vec!['\n'],
            escape: Some('"'),
            trim: Vec::new(),
            header: HeaderStrategy::None,
            presample: false,
        }
    }
}

impl ReaderConfig {
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    pub fn delimiters(mut self, field: &str, row: &str) -> Self {
        self.field_delimiter = field.chars().collect();
        self.row_delimiter = row.chars().collect();
        self
    }

    pub fn escape(mut self, escape: Option<char>) -> Self {
        self.escape = escape;
        self
    }

    pub fn trim(mut self, scalars: &str) -> Self {
        self.trim = scalars.chars().collect();
        self
    }

    pub fn header(mut self, strategy: HeaderStrategy) -> Self {
        self.header = strategy;
        self
    }

    pub fn presample(mut self, on: bool) -> Self {
        self.presample = on;
        self
    }

    pub(crate) fn validate(&self) -> Result<(Delimiter, Delimiter), ConfigError> {
        let field = Delimiter::new(self.field_delimiter.clone())?;
        let row = Delimiter::new(self.row_delimiter.clone())?;
        if field == row {
            return Err(ConfigError::DelimiterClash);
        }
        if let Some(escape) = self.escape {
            if self.trim.contains(&escape) {
                return Err(ConfigError::EscapeInTrimSet(escape));
            }
        }
        Ok((field, row))
    }
}

/// Rows and fields seen so far. Rows include the header when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub rows: usize,
    pub fields: usize,
}

/// Terminal-state tracking: once not Active, the reader stays that way.
#[derive(Debug, Clone)]
pub enum ReaderStatus {
    Active,
    Finished,
    Failed(ReadError),
}

enum LookupState {
    Unbuilt,
    Built(Arc<HashMap<String, usize>>),
    Failed(ReadError),
}

/// One data row together with the header lookup, addressable by column
/// index or header name.
#[derive(Debug, Clone)]
pub struct Record {
    fields: Vec<String>,
    lookup: Arc<HashMap<String, usize>>,
}

impl Record {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.lookup
            .get(name)
            .and_then(|&i| self.fields.get(i))
            .map(String::as_str)
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_fields(self) -> Vec<String> {
        self.fields
    }
}

impl Index<usize> for Record {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        &self.fields[index]
    }
}

pub struct Reader {
    parser: RowParser,
    headers: Vec<String>,
    header_row: usize,
    lookup: LookupState,
    status: ReaderStatus,
    data_rows: usize,
    encoding: Encoding,
    input_size: Option<usize>,
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("headers", &self.headers)
            .field("header_row", &self.header_row)
            .field("status", &self.status)
            .field("data_rows", &self.data_rows)
            .field("encoding", &self.encoding)
            .field("input_size", &self.input_size)
            .finish()
    }
}

impl Reader {
    /// Read from a Unicode string. The scalars are already decoded, so the
    /// configured encoding hint is ignored.
    pub fn from_string(input: impl Into<String>, config: ReaderConfig) -> Result<Self, ReadError> {
        let mut config = config;
        config.encoding = Some(Encoding::Utf8);
        Self::build(ByteSource::from_bytes(input.into().into_bytes()), config)
    }

    /// Read from an in-memory byte buffer.
    pub fn from_bytes(input: Vec<u8>, config: ReaderConfig) -> Result<Self, ReadError> {
        Self::build(ByteSource::from_bytes(input), config)
    }

    /// Read from a file. The file is owned for the reader's lifetime and
    /// closed on drop.
    pub fn from_path(path: impl AsRef<Path>, config: ReaderConfig) -> Result<Self, ReadError> {
        let file = File::open(path).map_err(ReadError::stream)?;
        Self::build(ByteSource::from_reader(Box::new(file)), config)
    }

    /// Read from an arbitrary byte stream.
    pub fn from_reader(input: impl Read + 'static, config: ReaderConfig) -> Result<Self, ReadError> {
        Self::build(ByteSource::from_reader(Box::new(input)), config)
    }

    fn build(source: ByteSource, config: ReaderConfig) -> Result<Self, ReadError> {
        let (field_delimiter, row_delimiter) = config.validate()?;

        let mut source = source;
        let mut input_size = None;
        if config.presample {
            let bytes = source.read_to_end()?;
            input_size = Some(bytes.len());
            source = ByteSource::from_bytes(bytes);
        }

        let inferred = sniff_bom(&mut source);
        let encoding = Encoding::select(config.encoding, inferred)?;
        debug!(
            "reader: encoding {encoding} (inferred {inferred:?}), field delimiter {:?}, row delimiter {:?}",
            config.field_delimiter, config.row_delimiter
        );

        if config.presample {
            // The whole input is in memory; decode it once up front so an
            // encoding error surfaces at construction rather than mid-file.
            if let Some(probe_source) = source.try_clone_in_memory() {
                let mut probe = ScalarDecoder::new(probe_source, encoding);
                while probe.next_scalar()?.is_some() {}
            }
        }

        let stream = ScalarStream::new(ScalarDecoder::new(source, encoding));
        let mut parser = RowParser::new(
            stream,
            field_delimiter,
            row_delimiter,
            config.escape,
            config.trim.clone(),
        );

        let mut headers = Vec::new();
        let mut header_row = 0;
        match config.header {
            HeaderStrategy::None => {}
            HeaderStrategy::FirstLine => {
                headers = Self::read_header(&mut parser)?;
            }
            HeaderStrategy::LineNumber(skip) => {
                for _ in 0..skip {
                    if parser.parse_row()?.is_none() {
                        return Err(ReadError::Parse {
                            kind: ParseKind::EmptyHeader,
                            row: parser.rows_parsed(),
                            field: 0,
                        });
                    }
                }
                header_row = parser.rows_parsed();
                headers = Self::read_header(&mut parser)?;
            }
        }

        Ok(Reader {
            parser,
            headers,
            header_row,
            lookup: LookupState::Unbuilt,
            status: ReaderStatus::Active,
            data_rows: 0,
            encoding,
            input_size,
        })
    }

    fn read_header(parser: &mut RowParser) -> Result<Vec<String>, ReadError> {
        match parser.parse_row()? {
            Some(row) => Ok(row),
            None => Err(ReadError::Parse {
                kind: ParseKind::EmptyHeader,
                row: parser.rows_parsed(),
                field: 0,
            }),
        }
    }

    /// Pull the next data row. The first failure latches; every later call
    /// returns the same error.
    pub fn read_row(&mut self) -> Result<Option<Vec<String>>, ReadError> {
        match &self.status {
            ReaderStatus::Failed(err) => Err(err.clone()),
            ReaderStatus::Finished => Ok(None),
            ReaderStatus::Active => match self.parser.parse_row() {
                Ok(Some(row)) => {
                    self.data_rows += 1;
                    Ok(Some(row))
                }
                Ok(None) => {
                    self.status = ReaderStatus::Finished;
                    Ok(None)
                }
                Err(err) => {
                    self.status = ReaderStatus::Failed(err.clone());
                    Err(err)
                }
            },
        }
    }

    /// Pull the next data row as a Record with header-name access. Fails on
    /// first use if two headers share a name; raw `read_row` access keeps
    /// working in that case.
    pub fn read_record(&mut self) -> Result<Option<Record>, ReadError> {
        let lookup = self.header_lookup()?;
        Ok(self.read_row()?.map(|fields| Record { fields, lookup: lookup.clone() }))
    }

    /// The cached header-name lookup, built on first record access.
    pub(crate) fn header_lookup(&mut self) -> Result<Arc<HashMap<String, usize>>, ReadError> {
        match &self.lookup {
            LookupState::Built(map) => Ok(map.clone()),
            LookupState::Failed(err) => Err(err.clone()),
            LookupState::Unbuilt => {
                let mut map = HashMap::with_capacity(self.headers.len());
                for (index, name) in self.headers.iter().enumerate() {
                    if map.insert(name.clone(), index).is_some() {
                        let err = ReadError::Parse {
                            kind: ParseKind::DuplicateHeader(name.clone()),
                            row: self.header_row,
                            field: index,
                        };
                        self.lookup = LookupState::Failed(err.clone());
                        return Err(err);
                    }
                }
                let map = Arc::new(map);
                self.lookup = LookupState::Built(map.clone());
                Ok(map)
            }
        }
    }

    /// The parsed header row; empty when no header was configured.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn status(&self) -> &ReaderStatus {
        &self.status
    }

    pub fn counts(&self) -> Counts {
        Counts {
            rows: self.parser.rows_parsed(),
            fields: self.parser.fields_per_row().unwrap_or(0),
        }
    }

    /// Data rows read so far, header and skipped rows excluded.
    pub fn row_index(&self) -> usize {
        self.data_rows
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Input size in bytes; only known when presampling.
    pub fn input_size(&self) -> Option<usize> {
        self.input_size
    }
}

/// Yields rows until the input ends. Panics on a malformed input or stream
/// failure; `read_row` is the fallible path.
impl Iterator for Reader {
    type Item = Vec<String>;

    fn next(&mut self) -> Option<Vec<String>> {
        match self.read_row() {
            Ok(row) => row,
            Err(err) => panic!("CSV read failed: {err}"),
        }
    }
}
