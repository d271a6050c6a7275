// csvcodec - CSV reading and writing over configurable encodings
//
// Library safety: no unwrap/expect in production code. Fallible paths use
// Result + early return.
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//
// Layers, leaves first:
//   core:    byte sources/sinks, BOM sniffing, scalar codecs, pushback
//            buffer, delimiter matching
//   reader:  the row state machine and the pull facade over it
//   writer:  field/row emission with escaping and BOM strategies
//   de/ser:  the serde adapter (record-per-row bridge plus random-access
//            file/row/field coders with row buffering)

pub mod core;
pub mod de;
pub mod encoding;
pub mod error;
pub mod reader;
pub mod ser;
pub mod writer;

pub use de::{BoolStrategy, BufferingStrategy, DecodeOptions, FieldDecoder, FileDecoder, RowDecoder};
pub use encoding::Encoding;
pub use error::{CodingError, ConfigError, ParseKind, ReadError, WriteError};
pub use reader::{Counts, HeaderStrategy, Reader, ReaderConfig, ReaderStatus, Record};
pub use ser::{
    EncodeBuffering, EncodeOptions, FileEncoder, NonFiniteFloatStrategy, RowEncoder,
};
pub use writer::{BomStrategy, HeaderWriteStrategy, Writer, WriterConfig};
