// Writer facade: field-at-a-time and row-at-a-time CSV emission.
//
// The sink is opened during construction and terminated by an explicit
// `end`, which drains the pending row and flushes. After any failure the
// writer is poisoned: every operation except `end` fails.

use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use log::debug;

use crate::core::encoder::ScalarEncoder;
use crate::core::sink::ByteSink;
use crate::encoding::Encoding;
use crate::error::{ConfigError, WriteError};

/// When to emit a BOM before any other bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BomStrategy {
    Never,
    Always,
    /// Emit a BOM only for the ambiguous-endianness Unicode encodings
    /// (the UTF-16 and UTF-32 families without an explicit byte order).
    #[default]
    Convention,
}

/// Where the written header row comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HeaderWriteStrategy {
    #[default]
    None,
    /// Write these headers as the first row and fix the column order.
    Static(Vec<String>),
    /// Derive headers from the keys of the first serialized record.
    ParseFromValue,
}

/// Immutable writer configuration.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub encoding: Option<Encoding>,
    pub field_delimiter: Vec<char>,
    pub row_delimiter: Vec<char>,
    pub escape: Option<char>,
    pub header: HeaderWriteStrategy,
    pub bom: BomStrategy,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            encoding: None,
            field_delimiter: vec![','],
            row_delimiter: vec!['\n'],
            escape: Some('"'),
            header: HeaderWriteStrategy::None,
            bom: BomStrategy::Convention,
        }
    }
}

impl WriterConfig {
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

    pub fn header(mut self, strategy: HeaderWriteStrategy) -> Self {
        self.header = strategy;
        self
    }

    pub fn bom(mut self, strategy: BomStrategy) -> Self {
        self.bom = strategy;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.field_delimiter.is_empty() || self.row_delimiter.is_empty() {
            return Err(ConfigError::EmptyDelimiter);
        }
        if self.field_delimiter == self.row_delimiter {
            return Err(ConfigError::DelimiterClash);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Active,
    Ended,
    Failed,
}

pub struct Writer {
    sink: ByteSink,
    encoder: ScalarEncoder,
    field_delimiter: Vec<char>,
    row_delimiter: Vec<char>,
    escape: Option<char>,
    /// Fixed by the first closed row (or static headers).
    expected_fields: Option<usize>,
    fields_in_row: usize,
    row_open: bool,
    sole_field_empty: bool,
    state: WriterState,
    scratch: Vec<u8>,
    /// Column order for keyed serialization; filled by static headers or
    /// by the first serialized record under ParseFromValue.
    pub(crate) columns: Option<Vec<String>>,
    pub(crate) header: HeaderWriteStrategy,
}

impl Writer {
    /// Write into an in-memory buffer; retrieve it with `into_bytes` or
    /// `into_string`.
    pub fn to_buffer(config: WriterConfig) -> Result<Self, WriteError> {
        Self::build(ByteSink::buffer(), config, false)
    }

    /// Create or overwrite a file.
    pub fn to_path(path: impl AsRef<Path>, config: WriterConfig) -> Result<Self, WriteError> {
        let file = File::create(path).map_err(WriteError::Stream)?;
        Self::build(ByteSink::from_writer(Box::new(file)), config, false)
    }

    /// Append to an existing file. The BOM and the header row are skipped
    /// regardless of configuration; the file already carries its own.
    pub fn append_path(path: impl AsRef<Path>, config: WriterConfig) -> Result<Self, WriteError> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .map_err(WriteError::Stream)?;
        Self::build(ByteSink::from_writer(Box::new(file)), config, true)
    }

    /// Write into an arbitrary byte stream.
    pub fn to_writer(output: impl Write + 'static, config: WriterConfig) -> Result<Self, WriteError> {
        Self::build(ByteSink::from_writer(Box::new(output)), config, false)
    }

    fn build(sink: ByteSink, config: WriterConfig, append: bool) -> Result<Self, WriteError> {
        config.validate()?;
        let encoding = config.encoding.unwrap_or(Encoding::Utf8);
        debug!(
            "writer: encoding {encoding}, field delimiter {:?}, row delimiter {:?}, append {append}",
            config.field_delimiter, config.row_delimiter
        );

        let mut writer = Writer {
            sink,
            encoder: ScalarEncoder::new(encoding),
            field_delimiter: config.field_delimiter,
            row_delimiter: config.row_delimiter,
            escape: config.escape,
            expected_fields: None,
            fields_in_row: 0,
            row_open: false,
            sole_field_empty: false,
            state: WriterState::Active,
            scratch: Vec::with_capacity(256),
            columns: None,
            header: config.header.clone(),
        };

        let emit_bom = !append
            && match config.bom {
                BomStrategy::Never => false,
                BomStrategy::Always => true,
                BomStrategy::Convention => encoding.is_endian_ambiguous(),
            };
        if emit_bom {
            writer.sink.write_all(encoding.bom())?;
        }

        if let HeaderWriteStrategy::Static(headers) = &config.header {
            writer.columns = Some(headers.clone());
            if append {
                writer.expected_fields = Some(headers.len());
            } else {
                let headers = headers.clone();
                writer.write_row(&headers)?;
            }
        }

        Ok(writer)
    }

    fn check_active(&self) -> Result<(), WriteError> {
        match self.state {
            WriterState::Active => Ok(()),
            WriterState::Ended => Err(WriteError::Ended),
            WriterState::Failed => Err(WriteError::Poisoned),
        }
    }

    /// Append one field to the current row, opening a new row if none is
    /// open. The field is escaped if it contains the escape scalar or any
    /// scalar of either delimiter.
    pub fn write_field(&mut self, field: &str) -> Result<(), WriteError> {
        self.check_active()?;
        let result = self.write_field_inner(field);
        if result.is_err() {
            self.state = WriterState::Failed;
        }
        result
    }

    fn write_field_inner(&mut self, field: &str) -> Result<(), WriteError> {
        if !self.row_open {
            self.row_open = true;
            self.fields_in_row = 0;
        }
        if let Some(expected) = self.expected_fields {
            if self.fields_in_row >= expected {
                return Err(WriteError::RowLength {
                    expected,
                    found: self.fields_in_row + 1,
                });
            }
        }
        if self.fields_in_row > 0 {
            self.emit_delimiter(false)?;
        }
        let rendered = render_field(
            field,
            self.escape,
            &self.field_delimiter,
            &self.row_delimiter,
        );
        self.emit_str(&rendered)?;
        self.sole_field_empty = self.fields_in_row == 0 && rendered.is_empty();
        self.fields_in_row += 1;
        Ok(())
    }

    /// Close the current row, padding empty fields up to the expected count.
    /// The first closed row fixes that count. A row consisting of a single
    /// empty field is emitted in its bracketed form so the line is never
    /// zero-length.
    pub fn finish_row(&mut self) -> Result<(), WriteError> {
        self.check_active()?;
        let result = self.finish_row_inner();
        if result.is_err() {
            self.state = WriterState::Failed;
        }
        result
    }

    fn finish_row_inner(&mut self) -> Result<(), WriteError> {
        if !self.row_open {
            return self.write_empty_row_inner();
        }
        if let Some(expected) = self.expected_fields {
            while self.fields_in_row < expected {
                self.write_field_inner("")?;
            }
        } else {
            self.expected_fields = Some(self.fields_in_row);
        }
        if self.fields_in_row == 1 && self.sole_field_empty {
            if let Some(escape) = self.escape {
                self.emit_char(escape)?;
                self.emit_char(escape)?;
            }
        }
        self.emit_delimiter(true)?;
        self.row_open = false;
        self.sole_field_empty = false;
        Ok(())
    }

    /// Write a complete row. The previous row must be closed; the field
    /// count must match the one fixed by the first row.
    pub fn write_row<I, S>(&mut self, row: I) -> Result<(), WriteError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.check_active()?;
        let result = self.write_row_inner(row);
        if result.is_err() {
            self.state = WriterState::Failed;
        }
        result
    }

    fn write_row_inner<I, S>(&mut self, row: I) -> Result<(), WriteError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.row_open {
            return Err(WriteError::OpenRow);
        }
        let mut written = 0;
        for field in row {
            self.write_field_inner(field.as_ref())?;
            written += 1;
        }
        if written == 0 {
            return self.write_empty_row_inner();
        }
        if let Some(expected) = self.expected_fields {
            if written < expected {
                return Err(WriteError::RowLength {
                    expected,
                    found: written,
                });
            }
        }
        self.finish_row_inner()
    }

    /// Write a row of empty fields. Requires the field count to already be
    /// known.
    pub fn write_empty_row(&mut self) -> Result<(), WriteError> {
        self.check_active()?;
        let result = if self.row_open {
            Err(WriteError::OpenRow)
        } else {
            self.write_empty_row_inner()
        };
        if result.is_err() {
            self.state = WriterState::Failed;
        }
        result
    }

    fn write_empty_row_inner(&mut self) -> Result<(), WriteError> {
        let expected = self.expected_fields.ok_or(WriteError::UnknownRowLength)?;
        self.row_open = true;
        self.fields_in_row = 0;
        for _ in 0..expected {
            self.write_field_inner("")?;
        }
        self.finish_row_inner()
    }

    /// Close any pending row and flush the sink. Callable from any state;
    /// idempotent once ended.
    pub fn end(&mut self) -> Result<(), WriteError> {
        if self.state == WriterState::Ended {
            return Ok(());
        }
        let mut result = Ok(());
        if self.state == WriterState::Active && self.row_open {
            result = self.finish_row_inner();
        }
        let flushed = self.sink.flush();
        self.state = WriterState::Ended;
        result.and(flushed)
    }

    /// End the writer and take the accumulated bytes of a buffer sink.
    pub fn into_bytes(mut self) -> Result<Vec<u8>, WriteError> {
        self.end()?;
        self.sink.into_bytes().ok_or(WriteError::NotBuffered)
    }

    /// End the writer and take the output as a UTF-8 string.
    pub fn into_string(self) -> Result<String, WriteError> {
        let bytes = self.into_bytes()?;
        String::from_utf8(bytes).map_err(|_| WriteError::NotUtf8)
    }

    /// The field count fixed by the first row, if any yet.
    pub fn expected_fields(&self) -> Option<usize> {
        self.expected_fields
    }

    pub(crate) fn row_is_open(&self) -> bool {
        self.row_open
    }

    fn emit_str(&mut self, text: &str) -> Result<(), WriteError> {
        self.scratch.clear();
        let encoder = self.encoder;
        encoder.encode_str(text, &mut self.scratch)?;
        self.sink.write_all(&self.scratch)
    }

    fn emit_char(&mut self, scalar: char) -> Result<(), WriteError> {
        self.scratch.clear();
        let encoder = self.encoder;
        encoder.encode_char(scalar, &mut self.scratch)?;
        self.sink.write_all(&self.scratch)
    }

    fn emit_delimiter(&mut self, row: bool) -> Result<(), WriteError> {
        self.scratch.clear();
        let encoder = self.encoder;
        let delimiter = if row {
            &self.row_delimiter
        } else {
            &self.field_delimiter
        };
        for &scalar in delimiter {
            encoder.encode_char(scalar, &mut self.scratch)?;
        }
        self.sink.write_all(&self.scratch)
    }
}

fn needs_escaping(field: &str, escape: char, field_delim: &[char], row_delim: &[char]) -> bool {
    field
        .chars()
        .any(|c| c == escape || field_delim.contains(&c) || row_delim.contains(&c))
}

/// Escape a field if required: surround with the escape scalar and double
/// internal occurrences. Without an escape scalar fields pass through
/// verbatim.
fn render_field<'f>(
    field: &'f str,
    escape: Option<char>,
    field_delim: &[char],
    row_delim: &[char],
) -> Cow<'f, str> {
    let Some(escape) = escape else {
        return Cow::Borrowed(field);
    };
    if !needs_escaping(field, escape, field_delim, row_delim) {
        return Cow::Borrowed(field);
    }
    let mut out = String::with_capacity(field.len() + 2);
    out.push(escape);
    for scalar in field.chars() {
        out.push(scalar);
        if scalar == escape {
            out.push(escape);
        }
    }
    out.push(escape);
    Cow::Owned(out)
}
