// Error taxonomy, one enum per subsystem.
//
// Reader errors are Clone: the reader latches the first failure and returns
// it again on every subsequent call, so the stored error and the returned
// error are the same value. io::Error is not Clone, which is why stream
// failures are wrapped in a shared StreamFailure.

use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::encoding::Encoding;

/// Configuration conflicts detected at reader/writer construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("field and row delimiters must differ")]
    DelimiterClash,
    #[error("delimiter sequences must be non-empty")]
    EmptyDelimiter,
    #[error("the escape scalar {0:?} may not appear in the trim set")]
    EscapeInTrimSet(char),
    #[error("encoding hint {hint} conflicts with BOM-inferred {inferred}")]
    EncodingMismatch { hint: Encoding, inferred: Encoding },
    #[error("unknown encoding name {0:?}")]
    UnknownEncoding(String),
}

/// A snapshot of an io::Error that can live in the reader's latched status
/// and still be handed out on every subsequent call.
#[derive(Debug, Clone)]
pub struct StreamFailure(Arc<io::Error>);

impl StreamFailure {
    pub(crate) fn new(err: io::Error) -> Self {
        StreamFailure(Arc::new(err))
    }

    /// The io::ErrorKind of the underlying failure.
    pub fn kind(&self) -> io::ErrorKind {
        self.0.kind()
    }
}

impl fmt::Display for StreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for StreamFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

/// What the row parser found wrong with the input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseKind {
    #[error("escape scalar inside an unescaped field")]
    UnescapedEscape,
    #[error("input ended inside an escaped field")]
    UnclosedEscape,
    #[error("data between a closed escaped field and the next delimiter")]
    DanglingEscape,
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("header row is missing or empty")]
    EmptyHeader,
    #[error("duplicate header name {0:?}")]
    DuplicateHeader(String),
}

/// Errors surfaced by the read pipeline and the row parser.
#[derive(Debug, Clone, Error)]
pub enum ReadError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigError),
    #[error("malformed {encoding} byte sequence")]
    Decode { encoding: Encoding },
    #[error("{kind} (row {row}, field {field})")]
    Parse {
        kind: ParseKind,
        /// Zero-based row the parser was producing, header included.
        row: usize,
        /// Zero-based field index within that row.
        field: usize,
    },
    #[error("byte source failed: {0}")]
    Stream(#[source] StreamFailure),
}

impl ReadError {
    pub(crate) fn stream(err: io::Error) -> Self {
        ReadError::Stream(StreamFailure::new(err))
    }
}

/// Errors surfaced by the write pipeline. The writer marks itself unusable
/// after the first failure; only `end` remains callable.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigError),
    #[error("writer has already been ended")]
    Ended,
    #[error("writer previously failed")]
    Poisoned,
    #[error("previous row is still open")]
    OpenRow,
    #[error("row has {found} fields but the first row fixed {expected}")]
    RowLength { expected: usize, found: usize },
    #[error("cannot write an empty row before a field count is known")]
    UnknownRowLength,
    #[error("scalar {scalar:?} is not representable in {encoding}")]
    Unrepresentable { scalar: char, encoding: Encoding },
    #[error("writer output is not an in-memory buffer")]
    NotBuffered,
    #[error("output bytes are not UTF-8 text")]
    NotUtf8,
    #[error("byte sink failed")]
    Stream(#[source] io::Error),
}

/// Errors produced by the serialization adapter. Low-level reader/writer
/// failures are preserved as chained causes.
#[derive(Debug, Error)]
pub enum CodingError {
    #[error("coding key does not map to a row or column: {0}")]
    InvalidPath(String),
    #[error("container nesting deeper than file/row/field")]
    InvalidContainer,
    #[error("no header named {0:?}")]
    InvalidKey(String),
    #[error("{0}")]
    Data(String),
    #[error("read failed")]
    Read(#[from] ReadError),
    #[error("write failed")]
    Write(#[from] WriteError),
}

impl serde::de::Error for CodingError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        CodingError::Data(msg.to_string())
    }
}

impl serde::ser::Error for CodingError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        CodingError::Data(msg.to_string())
    }
}
