// Decode side of the serialization adapter.
//
// Two surfaces over the same reader: a record-per-row serde bridge
// (`Reader::deserialize`), and a random-access file/row/field decoder with
// a configurable row-buffering policy for out-of-order access.

mod value;

pub use value::{BoolStrategy, DecodeOptions, FieldDecoder};

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use log::trace;
use serde::de::DeserializeOwned;

use crate::error::{CodingError, ReadError};
use crate::reader::Reader;

use value::RowDeserializer;

/// How much of the file the decoder retains to support out-of-order row
/// access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferingStrategy {
    /// Every decoded row is retained; going back always works.
    #[default]
    KeepAll,
    /// Only the most recently requested row is retained. Requesting a row
    /// before the high-water mark fails.
    Sequential,
    /// Retain only rows that were skipped over and not yet consumed;
    /// consumed rows are freed.
    Unrequested,
}

impl Reader {
    /// Deserialize each remaining row into `T`: structs by header name,
    /// tuples and sequences by column index, scalars from one-column rows.
    pub fn deserialize<T: DeserializeOwned>(&mut self) -> DeserializeIter<'_, T> {
        self.deserialize_with(DecodeOptions::default())
    }

    pub fn deserialize_with<T: DeserializeOwned>(
        &mut self,
        options: DecodeOptions,
    ) -> DeserializeIter<'_, T> {
        DeserializeIter {
            reader: self,
            options,
            _marker: PhantomData,
        }
    }
}

pub struct DeserializeIter<'r, T> {
    reader: &'r mut Reader,
    options: DecodeOptions,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> Iterator for DeserializeIter<'_, T> {
    type Item = Result<T, CodingError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_row() {
            Ok(Some(fields)) => {
                let row = RowDeserializer {
                    fields: &fields,
                    headers: self.reader.headers(),
                    options: self.options,
                };
                Some(T::deserialize(row))
            }
            Ok(None) => None,
            Err(err) => Some(Err(CodingError::Read(err))),
        }
    }
}

/// The depth-0 container: the whole file, addressed by row index.
///
/// Row indices are data-row indices; the header row is not addressable.
/// String keys have no meaning at file depth, which the API encodes by not
/// offering them.
pub struct FileDecoder {
    reader: Reader,
    buffering: BufferingStrategy,
    options: DecodeOptions,
    headers: Arc<Vec<String>>,
    lookup: Result<Arc<HashMap<String, usize>>, ReadError>,
    /// KeepAll: every parsed row. Unrequested: skipped, unconsumed rows.
    kept: BTreeMap<usize, Vec<String>>,
    /// Sequential: the most recently requested row.
    last: Option<(usize, Vec<String>)>,
    /// Index of the next row to parse; doubles as the high-water mark.
    parse_pos: usize,
    /// Position of `next_row`.
    cursor: usize,
}

impl FileDecoder {
    pub fn new(mut reader: Reader, buffering: BufferingStrategy) -> Self {
        let headers = Arc::new(reader.headers().to_vec());
        let lookup = if headers.is_empty() {
            Ok(Arc::new(HashMap::new()))
        } else {
            reader.header_lookup()
        };
        FileDecoder {
            reader,
            buffering,
            options: DecodeOptions::default(),
            headers,
            lookup,
            kept: BTreeMap::new(),
            last: None,
            parse_pos: 0,
            cursor: 0,
        }
    }

    pub fn with_options(mut self, options: DecodeOptions) -> Self {
        self.options = options;
        self
    }

    /// Decode the row at `index`. Whether going backwards works depends on
    /// the buffering strategy.
    pub fn row(&mut self, index: usize) -> Result<RowDecoder, CodingError> {
        self.try_row(index)?.ok_or_else(|| {
            CodingError::InvalidPath(format!("row {index} is beyond the end of the file"))
        })
    }

    /// Decode the next row in order, None at the end of the file.
    pub fn next_row(&mut self) -> Result<Option<RowDecoder>, CodingError> {
        let index = self.cursor;
        match self.try_row(index)? {
            Some(decoder) => {
                self.cursor = index + 1;
                Ok(Some(decoder))
            }
            None => Ok(None),
        }
    }

    /// Data rows parsed so far.
    pub fn rows_parsed(&self) -> usize {
        self.parse_pos
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn try_row(&mut self, index: usize) -> Result<Option<RowDecoder>, CodingError> {
        match self.buffering {
            BufferingStrategy::KeepAll => self.row_keep_all(index),
            BufferingStrategy::Sequential => self.row_sequential(index),
            BufferingStrategy::Unrequested => self.row_unrequested(index),
        }
    }

    fn row_keep_all(&mut self, index: usize) -> Result<Option<RowDecoder>, CodingError> {
        while self.parse_pos <= index {
            match self.reader.read_row()? {
                Some(row) => {
                    self.kept.insert(self.parse_pos, row);
                    self.parse_pos += 1;
                }
                None => break,
            }
        }
        Ok(self.kept.get(&index).cloned().map(|fields| self.decoder(index, fields)))
    }

    fn row_sequential(&mut self, index: usize) -> Result<Option<RowDecoder>, CodingError> {
        if let Some((last_index, fields)) = &self.last {
            if *last_index == index {
                let fields = fields.clone();
                return Ok(Some(self.decoder(index, fields)));
            }
        }
        if index < self.parse_pos {
            return Err(CodingError::InvalidPath(format!(
                "row {index} was already passed (sequential buffering reached row {})",
                self.parse_pos
            )));
        }
        while self.parse_pos <= index {
            let Some(row) = self.reader.read_row()? else {
                return Ok(None);
            };
            let at = self.parse_pos;
            self.parse_pos += 1;
            if at == index {
                self.last = Some((at, row.clone()));
                return Ok(Some(self.decoder(at, row)));
            }
            trace!("sequential buffering: discarding skipped row {at}");
        }
        unreachable!("loop returns at the requested index")
    }

    fn row_unrequested(&mut self, index: usize) -> Result<Option<RowDecoder>, CodingError> {
        if index < self.parse_pos {
            return match self.kept.remove(&index) {
                Some(fields) => Ok(Some(self.decoder(index, fields))),
                None => Err(CodingError::InvalidPath(format!(
                    "row {index} was already consumed"
                ))),
            };
        }
        while self.parse_pos < index {
            let Some(row) = self.reader.read_row()? else {
                return Ok(None);
            };
            self.kept.insert(self.parse_pos, row);
            self.parse_pos += 1;
        }
        match self.reader.read_row()? {
            Some(row) => {
                self.parse_pos += 1;
                Ok(Some(self.decoder(index, row)))
            }
            None => Ok(None),
        }
    }

    fn decoder(&self, index: usize, fields: Vec<String>) -> RowDecoder {
        RowDecoder {
            index,
            fields,
            headers: self.headers.clone(),
            lookup: self.lookup.clone(),
            options: self.options,
        }
    }
}

/// The depth-1 container: one row, addressed by column index or header
/// name.
pub struct RowDecoder {
    index: usize,
    fields: Vec<String>,
    headers: Arc<Vec<String>>,
    lookup: Result<Arc<HashMap<String, usize>>, ReadError>,
    options: DecodeOptions,
}

impl RowDecoder {
    /// The data-row index this decoder is focused on.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// The depth-2 field container at a column index.
    pub fn field(&self, column: usize) -> Result<FieldDecoder<'_>, CodingError> {
        match self.fields.get(column) {
            Some(value) => Ok(FieldDecoder::new(value, self.options)),
            None => Err(CodingError::InvalidPath(format!(
                "column {column} is out of range for a {}-field row",
                self.fields.len()
            ))),
        }
    }

    /// The field under a header name, resolved through the header lookup.
    pub fn field_by_name(&self, name: &str) -> Result<FieldDecoder<'_>, CodingError> {
        let lookup = match &self.lookup {
            Ok(map) => map,
            Err(err) => return Err(CodingError::Read(err.clone())),
        };
        match lookup.get(name) {
            Some(&column) => self.field(column),
            None => Err(CodingError::InvalidKey(name.to_string())),
        }
    }

    /// Decode the whole row into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CodingError> {
        T::deserialize(RowDeserializer {
            fields: &self.fields,
            headers: &self.headers,
            options: self.options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{HeaderStrategy, ReaderConfig};

    fn reader(input: &str) -> Reader {
        Reader::from_string(input, ReaderConfig::default()).unwrap()
    }

    fn numbered(rows: usize) -> String {
        (0..rows).map(|i| format!("r{i},{i}\n")).collect()
    }

    #[test]
    fn test_keep_all_supports_going_back() {
        let mut decoder = FileDecoder::new(reader(&numbered(8)), BufferingStrategy::KeepAll);
        assert_eq!(decoder.row(5).unwrap().fields()[0], "r5");
        assert_eq!(decoder.row(2).unwrap().fields()[0], "r2");
        assert_eq!(decoder.row(5).unwrap().fields()[0], "r5");
    }

    #[test]
    fn test_sequential_forward_only() {
        let mut decoder = FileDecoder::new(reader(&numbered(8)), BufferingStrategy::Sequential);
        assert_eq!(decoder.row(5).unwrap().fields()[0], "r5");
        // Going back fails...
        assert!(matches!(
            decoder.row(2),
            Err(CodingError::InvalidPath(_))
        ));
        // ...but the focused row stays available, and forward works.
        assert_eq!(decoder.row(5).unwrap().fields()[0], "r5");
        assert_eq!(decoder.row(6).unwrap().fields()[0], "r6");
    }

    #[test]
    fn test_unrequested_retains_skipped_rows() {
        let mut decoder = FileDecoder::new(reader(&numbered(8)), BufferingStrategy::Unrequested);
        assert_eq!(decoder.row(5).unwrap().fields()[0], "r5");
        // Rows 0..5 were skipped over and are still available once each.
        assert_eq!(decoder.row(2).unwrap().fields()[0], "r2");
        assert!(matches!(
            decoder.row(2),
            Err(CodingError::InvalidPath(_))
        ));
        // The requested row 5 was consumed, not retained.
        assert!(matches!(
            decoder.row(5),
            Err(CodingError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_row_beyond_eof() {
        let mut decoder = FileDecoder::new(reader(&numbered(3)), BufferingStrategy::KeepAll);
        assert!(matches!(
            decoder.row(9),
            Err(CodingError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_next_row_walks_the_file() {
        let mut decoder = FileDecoder::new(reader(&numbered(3)), BufferingStrategy::Sequential);
        let mut seen = Vec::new();
        while let Some(row) = decoder.next_row().unwrap() {
            seen.push(row.fields()[0].clone());
        }
        assert_eq!(seen, vec!["r0", "r1", "r2"]);
    }

    #[test]
    fn test_field_access_by_index_and_name() {
        let config = ReaderConfig::default().header(HeaderStrategy::FirstLine);
        let reader = Reader::from_string("name,age\nida,36\n", config).unwrap();
        let mut decoder = FileDecoder::new(reader, BufferingStrategy::KeepAll);
        let row = decoder.row(0).unwrap();
        assert_eq!(row.field(0).unwrap().value(), "ida");
        assert_eq!(row.field_by_name("age").unwrap().decode::<u32>().unwrap(), 36);
        assert!(matches!(
            row.field_by_name("salary"),
            Err(CodingError::InvalidKey(_))
        ));
        assert!(matches!(
            row.field(7),
            Err(CodingError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_deserialize_structs() {
        #[derive(Debug, PartialEq, serde::Deserialize)]
        struct Person {
            name: String,
            age: u32,
        }

        let config = ReaderConfig::default().header(HeaderStrategy::FirstLine);
        let mut reader =
            Reader::from_string("name,age\nida,36\njoel,29\n", config).unwrap();
        let people: Vec<Person> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(
            people,
            vec![
                Person { name: "ida".into(), age: 36 },
                Person { name: "joel".into(), age: 29 },
            ]
        );
    }

    #[test]
    fn test_deserialize_tuples_without_headers() {
        let mut reader = reader("1,one\n2,two\n");
        let rows: Vec<(i32, String)> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows, vec![(1, "one".to_string()), (2, "two".to_string())]);
    }

    #[test]
    fn test_deserialize_options_and_errors() {
        let mut reader = reader("1,\nx,2\n");
        let mut iter = reader.deserialize::<(Option<i32>, Option<i32>)>();
        assert_eq!(iter.next().unwrap().unwrap(), (Some(1), None));
        assert!(iter.next().unwrap().is_err());
    }

    #[test]
    fn test_deserialize_propagates_read_errors() {
        let mut reader = reader("a,b\nc\n");
        let mut iter = reader.deserialize::<(String, String)>();
        iter.next().unwrap().unwrap();
        assert!(matches!(
            iter.next().unwrap(),
            Err(CodingError::Read(_))
        ));
    }

    #[test]
    fn test_row_decode_whole_struct() {
        let config = ReaderConfig::default().header(HeaderStrategy::FirstLine);
        let reader = Reader::from_string("a,b\n1,2\n", config).unwrap();
        let mut decoder = FileDecoder::new(reader, BufferingStrategy::KeepAll);

        #[derive(serde::Deserialize)]
        struct Pair {
            a: i32,
            b: i32,
        }

        let pair: Pair = decoder.row(0).unwrap().decode().unwrap();
        assert_eq!((pair.a, pair.b), (1, 2));
    }

    #[test]
    fn test_duplicate_headers_surface_on_name_access() {
        let config = ReaderConfig::default().header(HeaderStrategy::FirstLine);
        let reader = Reader::from_string("a,a\n1,2\n", config).unwrap();
        let mut decoder = FileDecoder::new(reader, BufferingStrategy::KeepAll);
        let row = decoder.row(0).unwrap();
        // Positional access still works.
        assert_eq!(row.field(1).unwrap().value(), "2");
        assert!(matches!(
            row.field_by_name("a"),
            Err(CodingError::Read(_))
        ));
    }
}
