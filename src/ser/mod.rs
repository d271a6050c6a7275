// Encode side of the serialization adapter.
//
// A record-per-row serde bridge (`Writer::serialize`) plus a random-access
// file/row/field encoder that buffers out-of-order rows until the gap to
// the sink closes.

mod value;

pub use value::{EncodeOptions, FieldSerializer, NonFiniteFloatStrategy};

use std::collections::BTreeMap;

use log::trace;
use serde::ser::{
    Serialize, SerializeMap, SerializeSeq, SerializeStruct, SerializeTuple,
    SerializeTupleStruct, Serializer,
};

use crate::error::{CodingError, WriteError};
use crate::writer::{HeaderWriteStrategy, Writer};

use value::{Key, KeySerializer};

impl Writer {
    /// Serialize one record as one row: structs and maps by column name
    /// (headers synthesized from the first record under ParseFromValue),
    /// tuples and sequences by position, scalars as a single-field row.
    pub fn serialize<T: Serialize>(&mut self, record: &T) -> Result<(), CodingError> {
        self.serialize_with(record, EncodeOptions::default())
    }

    pub fn serialize_with<T: Serialize>(
        &mut self,
        record: &T,
        options: EncodeOptions,
    ) -> Result<(), CodingError> {
        record.serialize(RowSerializer {
            writer: self,
            options,
        })
    }
}

/// Serializes one record into one row of the underlying writer.
struct RowSerializer<'w> {
    writer: &'w mut Writer,
    options: EncodeOptions,
}

impl<'w> RowSerializer<'w> {
    fn write_single(self, text: String) -> Result<(), CodingError> {
        self.writer.write_row([text.as_str()])?;
        Ok(())
    }

    fn require_closed_row(&self) -> Result<(), CodingError> {
        if self.writer.row_is_open() {
            Err(CodingError::Write(WriteError::OpenRow))
        } else {
            Ok(())
        }
    }
}

macro_rules! serialize_single_field {
    ($($method:ident: $ty:ty,)*) => {
        $(
            fn $method(self, value: $ty) -> Result<(), CodingError> {
                let text = FieldSerializer::render(&value, self.options)?;
                self.write_single(text)
            }
        )*
    };
}

impl<'w> Serializer for RowSerializer<'w> {
    type Ok = ();
    type Error = CodingError;
    type SerializeSeq = SeqRowSerializer<'w>;
    type SerializeTuple = SeqRowSerializer<'w>;
    type SerializeTupleStruct = SeqRowSerializer<'w>;
    type SerializeTupleVariant = serde::ser::Impossible<(), CodingError>;
    type SerializeMap = KeyedRowSerializer<'w>;
    type SerializeStruct = KeyedRowSerializer<'w>;
    type SerializeStructVariant = serde::ser::Impossible<(), CodingError>;

    serialize_single_field! {
        serialize_bool: bool,
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_i64: i64,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64,
        serialize_i128: i128,
        serialize_u128: u128,
        serialize_f32: f32,
        serialize_f64: f64,
        serialize_char: char,
    }

    fn serialize_str(self, value: &str) -> Result<(), CodingError> {
        self.write_single(value.to_string())
    }

    fn serialize_bytes(self, value: &[u8]) -> Result<(), CodingError> {
        let text = FieldSerializer::new(self.options).serialize_bytes(value)?;
        self.write_single(text)
    }

    fn serialize_none(self) -> Result<(), CodingError> {
        self.write_single(String::new())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<(), CodingError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), CodingError> {
        self.write_single(String::new())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<(), CodingError> {
        self.write_single(String::new())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<(), CodingError> {
        self.write_single(variant.to_string())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<(), CodingError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<(), CodingError> {
        Err(CodingError::InvalidContainer)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, CodingError> {
        self.require_closed_row()?;
        Ok(SeqRowSerializer {
            writer: self.writer,
            options: self.options,
            count: 0,
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple, CodingError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct, CodingError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, CodingError> {
        Err(CodingError::InvalidContainer)
    }

    fn serialize_map(self, len: Option<usize>) -> Result<Self::SerializeMap, CodingError> {
        self.require_closed_row()?;
        Ok(KeyedRowSerializer {
            writer: self.writer,
            options: self.options,
            pairs: Vec::with_capacity(len.unwrap_or(8)),
            key: None,
            deferred: None,
        })
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeStruct, CodingError> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, CodingError> {
        Err(CodingError::InvalidContainer)
    }
}

/// Positional record: each element becomes the next field.
struct SeqRowSerializer<'w> {
    writer: &'w mut Writer,
    options: EncodeOptions,
    count: usize,
}

impl SeqRowSerializer<'_> {
    fn element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CodingError> {
        let text = FieldSerializer::render(value, self.options)?;
        self.writer.write_field(&text)?;
        self.count += 1;
        Ok(())
    }

    fn finish(self) -> Result<(), CodingError> {
        if let Some(expected) = self.writer.expected_fields() {
            if self.count < expected {
                return Err(CodingError::Write(WriteError::RowLength {
                    expected,
                    found: self.count,
                }));
            }
        }
        self.writer.finish_row()?;
        Ok(())
    }
}

impl SerializeSeq for SeqRowSerializer<'_> {
    type Ok = ();
    type Error = CodingError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CodingError> {
        self.element(value)
    }

    fn end(self) -> Result<(), CodingError> {
        self.finish()
    }
}

impl SerializeTuple for SeqRowSerializer<'_> {
    type Ok = ();
    type Error = CodingError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CodingError> {
        self.element(value)
    }

    fn end(self) -> Result<(), CodingError> {
        self.finish()
    }
}

impl SerializeTupleStruct for SeqRowSerializer<'_> {
    type Ok = ();
    type Error = CodingError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CodingError> {
        self.element(value)
    }

    fn end(self) -> Result<(), CodingError> {
        self.finish()
    }
}

/// Keyed record: fields are gathered, ordered by column, then written.
struct KeyedRowSerializer<'w> {
    writer: &'w mut Writer,
    options: EncodeOptions,
    pairs: Vec<(Key, String)>,
    key: Option<Key>,
    /// A bad key does not fail at serialize_key time; the protocol defers
    /// the failure to the first subsequent use.
    deferred: Option<CodingError>,
}

impl KeyedRowSerializer<'_> {
    fn finish(self) -> Result<(), CodingError> {
        if let Some(err) = self.deferred {
            return Err(err);
        }

        let all_names = self
            .pairs
            .iter()
            .all(|(key, _)| matches!(key, Key::Name(_)));

        // First keyed record under ParseFromValue: its keys become the
        // headers and fix the column order.
        if self.writer.columns.is_none()
            && self.writer.header == HeaderWriteStrategy::ParseFromValue
            && all_names
        {
            let names: Vec<String> = self
                .pairs
                .iter()
                .map(|(key, _)| match key {
                    Key::Name(name) => name.clone(),
                    Key::Index(_) => unreachable!("all_names checked"),
                })
                .collect();
            trace!("synthesizing header row from record keys: {names:?}");
            self.writer.write_row(&names)?;
            self.writer.columns = Some(names);
        }

        match self.writer.columns.clone() {
            Some(columns) => {
                let mut row = vec![String::new(); columns.len()];
                for (key, text) in self.pairs {
                    let column = match key {
                        Key::Name(name) => columns
                            .iter()
                            .position(|c| *c == name)
                            .ok_or(CodingError::InvalidKey(name))?,
                        Key::Index(index) if index < columns.len() => index,
                        Key::Index(index) => {
                            return Err(CodingError::InvalidPath(format!(
                                "column {index} is out of range for {} columns",
                                columns.len()
                            )))
                        }
                    };
                    row[column] = text;
                }
                self.writer.write_row(&row)?;
            }
            None if all_names => {
                // No header context: emit in key order.
                let row: Vec<String> = self.pairs.into_iter().map(|(_, text)| text).collect();
                self.writer.write_row(&row)?;
            }
            None => {
                // Integer keys position fields directly.
                let width = self.pairs.iter().fold(0, |width, (key, _)| match key {
                    Key::Index(index) => width.max(index + 1),
                    Key::Name(_) => width,
                });
                let width = self.writer.expected_fields().unwrap_or(width).max(width);
                let mut row = vec![String::new(); width];
                for (key, text) in self.pairs {
                    match key {
                        Key::Index(index) => row[index] = text,
                        Key::Name(name) => return Err(CodingError::InvalidKey(name)),
                    }
                }
                self.writer.write_row(&row)?;
            }
        }
        Ok(())
    }
}

impl SerializeMap for KeyedRowSerializer<'_> {
    type Ok = ();
    type Error = CodingError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), CodingError> {
        match key.serialize(KeySerializer) {
            Ok(key) => self.key = Some(key),
            Err(err) => {
                if self.deferred.is_none() {
                    self.deferred = Some(err);
                }
            }
        }
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CodingError> {
        if let Some(err) = self.deferred.take() {
            return Err(err);
        }
        let key = self
            .key
            .take()
            .ok_or_else(|| CodingError::Data("value serialized before its key".to_string()))?;
        let text = FieldSerializer::render(value, self.options)?;
        self.pairs.push((key, text));
        Ok(())
    }

    fn end(self) -> Result<(), CodingError> {
        self.finish()
    }
}

impl SerializeStruct for KeyedRowSerializer<'_> {
    type Ok = ();
    type Error = CodingError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        name: &'static str,
        value: &T,
    ) -> Result<(), CodingError> {
        let text = FieldSerializer::render(value, self.options)?;
        self.pairs.push((Key::Name(name.to_string()), text));
        Ok(())
    }

    fn end(self) -> Result<(), CodingError> {
        self.finish()
    }
}

/// How the random-access encoder releases buffered rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodeBuffering {
    /// A row is released once it is finished and every earlier row has
    /// been written.
    #[default]
    Sequential,
    /// A row is additionally held back until all of its declared fields
    /// are filled, then released with fields in column order.
    Assembled,
}

#[derive(Default)]
struct PendingRow {
    fields: BTreeMap<usize, String>,
    complete: bool,
}

/// The depth-0 encode container: rows addressed by index, buffered in
/// memory until the gap to the last written row closes.
pub struct FileEncoder {
    writer: Writer,
    options: EncodeOptions,
    buffering: EncodeBuffering,
    pending: BTreeMap<usize, PendingRow>,
    /// Index of the next row to hand to the writer.
    next_flush: usize,
}

impl FileEncoder {
    pub fn new(writer: Writer, buffering: EncodeBuffering) -> Self {
        FileEncoder {
            writer,
            options: EncodeOptions::default(),
            buffering,
            pending: BTreeMap::new(),
            next_flush: 0,
        }
    }

    pub fn with_options(mut self, options: EncodeOptions) -> Self {
        self.options = options;
        self
    }

    /// Focus the row at `index`. Rows already written to the sink cannot be
    /// revisited.
    pub fn row(&mut self, index: usize) -> Result<RowEncoder<'_>, CodingError> {
        if index < self.next_flush {
            return Err(CodingError::InvalidPath(format!(
                "row {index} has already been written"
            )));
        }
        self.pending.entry(index).or_default();
        Ok(RowEncoder {
            encoder: self,
            index,
        })
    }

    /// Focus the next unwritten row.
    pub fn next_row(&mut self) -> Result<RowEncoder<'_>, CodingError> {
        let index = self
            .pending
            .keys()
            .next_back()
            .map(|&last| last + 1)
            .unwrap_or(self.next_flush);
        self.row(index)
    }

    /// Flush every buffered row and end the writer. Buffered rows must be
    /// gapless from the last written row.
    pub fn end(mut self) -> Result<Writer, CodingError> {
        let indices: Vec<usize> = self.pending.keys().copied().collect();
        for index in indices {
            if index != self.next_flush {
                return Err(CodingError::InvalidPath(format!(
                    "row {} was never encoded",
                    self.next_flush
                )));
            }
            let row = self
                .pending
                .remove(&index)
                .unwrap_or_default();
            self.emit(row)?;
        }
        self.writer.end().map_err(CodingError::Write)?;
        Ok(self.writer)
    }

    fn mark_complete(&mut self, index: usize) -> Result<(), CodingError> {
        if let Some(row) = self.pending.get_mut(&index) {
            row.complete = true;
        }
        self.flush_ready()
    }

    fn field_filled(&mut self, index: usize) -> Result<(), CodingError> {
        if self.buffering == EncodeBuffering::Assembled {
            if let (Some(expected), Some(row)) =
                (self.writer.expected_fields(), self.pending.get_mut(&index))
            {
                if row.fields.len() == expected {
                    row.complete = true;
                    return self.flush_ready();
                }
            }
        }
        Ok(())
    }

    fn flush_ready(&mut self) -> Result<(), CodingError> {
        while self
            .pending
            .get(&self.next_flush)
            .is_some_and(|row| row.complete)
        {
            let row = self
                .pending
                .remove(&self.next_flush)
                .unwrap_or_default();
            self.emit(row)?;
        }
        Ok(())
    }

    fn emit(&mut self, row: PendingRow) -> Result<(), CodingError> {
        let filled = row
            .fields
            .keys()
            .next_back()
            .map(|&column| column + 1)
            .unwrap_or(0);
        let width = self.writer.expected_fields().unwrap_or(filled).max(filled);
        let mut fields = vec![String::new(); width];
        for (column, text) in row.fields {
            fields[column] = text;
        }
        self.writer.write_row(&fields)?;
        self.next_flush += 1;
        Ok(())
    }
}

/// The depth-1 encode container: one row, fields addressed by column index
/// or header name.
pub struct RowEncoder<'e> {
    encoder: &'e mut FileEncoder,
    index: usize,
}

impl RowEncoder<'_> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Encode one field at a column index.
    pub fn field<T: Serialize + ?Sized>(
        &mut self,
        column: usize,
        value: &T,
    ) -> Result<(), CodingError> {
        let text = FieldSerializer::render(value, self.encoder.options)?;
        if let Some(row) = self.encoder.pending.get_mut(&self.index) {
            row.fields.insert(column, text);
        }
        self.encoder.field_filled(self.index)
    }

    /// Encode one field under a header name, resolved through the writer's
    /// column order.
    pub fn field_by_name<T: Serialize + ?Sized>(
        &mut self,
        name: &str,
        value: &T,
    ) -> Result<(), CodingError> {
        let column = self
            .encoder
            .writer
            .columns
            .as_ref()
            .and_then(|columns| columns.iter().position(|c| c == name))
            .ok_or_else(|| CodingError::InvalidKey(name.to_string()))?;
        self.field(column, value)
    }

    /// Mark the row finished so it can be released to the sink.
    pub fn finish(self) -> Result<(), CodingError> {
        self.encoder.mark_complete(self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::WriterConfig;

    fn writer() -> Writer {
        Writer::to_buffer(WriterConfig::default()).unwrap()
    }

    #[test]
    fn test_serialize_tuples() {
        let mut w = writer();
        w.serialize(&("a", 1)).unwrap();
        w.serialize(&("b", 2)).unwrap();
        assert_eq!(w.into_string().unwrap(), "a,1\nb,2\n");
    }

    #[test]
    fn test_serialize_struct_without_headers() {
        #[derive(serde::Serialize)]
        struct Row {
            name: &'static str,
            age: u32,
        }

        let mut w = writer();
        w.serialize(&Row { name: "ida", age: 36 }).unwrap();
        assert_eq!(w.into_string().unwrap(), "ida,36\n");
    }

    #[test]
    fn test_serialize_struct_parse_from_value_headers() {
        #[derive(serde::Serialize)]
        struct Row {
            name: &'static str,
            age: u32,
        }

        let config = WriterConfig::default().header(HeaderWriteStrategy::ParseFromValue);
        let mut w = Writer::to_buffer(config).unwrap();
        w.serialize(&Row { name: "ida", age: 36 }).unwrap();
        w.serialize(&Row { name: "joel", age: 29 }).unwrap();
        assert_eq!(w.into_string().unwrap(), "name,age\nida,36\njoel,29\n");
    }

    #[test]
    fn test_serialize_map_against_static_headers() {
        use std::collections::BTreeMap;

        let config = WriterConfig::default().header(HeaderWriteStrategy::Static(vec![
            "a".to_string(),
            "b".to_string(),
        ]));
        let mut w = Writer::to_buffer(config).unwrap();

        // Missing keys produce empty fields in their column.
        let mut record = BTreeMap::new();
        record.insert("b".to_string(), 2);
        w.serialize(&record).unwrap();
        assert_eq!(w.into_string().unwrap(), "a,b\n,2\n");
    }

    #[test]
    fn test_serialize_unknown_key_fails() {
        use std::collections::BTreeMap;

        let config = WriterConfig::default()
            .header(HeaderWriteStrategy::Static(vec!["a".to_string()]));
        let mut w = Writer::to_buffer(config).unwrap();
        let mut record = BTreeMap::new();
        record.insert("zzz".to_string(), 1);
        assert!(matches!(
            w.serialize(&record),
            Err(CodingError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_serialize_integer_keys_are_columns() {
        use std::collections::BTreeMap;

        let mut w = writer();
        let mut record = BTreeMap::new();
        record.insert(2u32, "c");
        record.insert(0u32, "a");
        w.serialize(&record).unwrap();
        assert_eq!(w.into_string().unwrap(), "a,,c\n");
    }

    #[test]
    fn test_serialize_scalar_single_column() {
        let mut w = writer();
        w.serialize(&5i32).unwrap();
        w.serialize(&7i32).unwrap();
        assert_eq!(w.into_string().unwrap(), "5\n7\n");
    }

    #[test]
    fn test_serialize_none_is_bracketed_empty() {
        let mut w = writer();
        w.serialize(&Option::<i32>::None).unwrap();
        assert_eq!(w.into_string().unwrap(), "\"\"\n");
    }

    #[test]
    fn test_serialize_nested_seq_fails() {
        let mut w = writer();
        assert!(matches!(
            w.serialize(&vec![vec![1, 2]]),
            Err(CodingError::InvalidContainer)
        ));
    }

    #[test]
    fn test_serialize_bad_key_is_deferred_not_immediate() {
        use serde::ser::SerializeMap;

        let mut w = writer();
        let mut map = RowSerializer {
            writer: &mut w,
            options: EncodeOptions::default(),
        }
        .serialize_map(None)
        .unwrap();
        // The bad key itself is accepted...
        map.serialize_key(&true).unwrap();
        // ...and the failure surfaces on the next use.
        assert!(matches!(
            map.serialize_value(&1),
            Err(CodingError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_serialize_short_row_fails() {
        let mut w = writer();
        w.serialize(&(1, 2, 3)).unwrap();
        assert!(matches!(
            w.serialize(&(1, 2)),
            Err(CodingError::Write(WriteError::RowLength { .. }))
        ));
    }

    #[test]
    fn test_file_encoder_out_of_order_rows() {
        let mut encoder = FileEncoder::new(writer(), EncodeBuffering::Sequential);

        let mut row = encoder.row(1).unwrap();
        row.field(0, "b0").unwrap();
        row.field(1, "b1").unwrap();
        row.finish().unwrap();

        let mut row = encoder.row(0).unwrap();
        row.field(0, "a0").unwrap();
        row.field(1, "a1").unwrap();
        row.finish().unwrap();

        let w = encoder.end().unwrap();
        assert_eq!(w.into_string().unwrap(), "a0,a1\nb0,b1\n");
    }

    #[test]
    fn test_file_encoder_gap_fails_at_end() {
        let mut encoder = FileEncoder::new(writer(), EncodeBuffering::Sequential);
        let mut row = encoder.row(1).unwrap();
        row.field(0, "x").unwrap();
        row.finish().unwrap();
        assert!(matches!(
            encoder.end(),
            Err(CodingError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_file_encoder_assembled_reorders_fields() {
        let config = WriterConfig::default().header(HeaderWriteStrategy::Static(vec![
            "a".to_string(),
            "b".to_string(),
        ]));
        let w = Writer::to_buffer(config).unwrap();
        let mut encoder = FileEncoder::new(w, EncodeBuffering::Assembled);

        // Fields arrive out of column order; the row releases itself once
        // both declared fields are present.
        let mut row = encoder.row(0).unwrap();
        row.field_by_name("b", &2).unwrap();
        row.field_by_name("a", &1).unwrap();

        let w = encoder.end().unwrap();
        assert_eq!(w.into_string().unwrap(), "a,b\n1,2\n");
    }

    #[test]
    fn test_file_encoder_revisiting_written_row_fails() {
        let mut encoder = FileEncoder::new(writer(), EncodeBuffering::Sequential);
        let mut row = encoder.row(0).unwrap();
        row.field(0, "x").unwrap();
        row.finish().unwrap();
        assert!(matches!(
            encoder.row(0),
            Err(CodingError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_file_encoder_next_row() {
        let mut encoder = FileEncoder::new(writer(), EncodeBuffering::Sequential);
        let mut row = encoder.next_row().unwrap();
        assert_eq!(row.index(), 0);
        row.field(0, "x").unwrap();
        row.finish().unwrap();
        let mut row = encoder.next_row().unwrap();
        assert_eq!(row.index(), 1);
        row.field(0, "y").unwrap();
        row.finish().unwrap();
        let w = encoder.end().unwrap();
        assert_eq!(w.into_string().unwrap(), "x\ny\n");
    }
}
