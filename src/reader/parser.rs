// The CSV row state machine.
//
// One call to parse_row either produces a row, produces nothing (EOF with
// no data consumed), or fails. Field parsing walks FieldStart → InUnescaped
// or InEscaped → (AfterEscapedClose) → delimiter, pulling scalars from the
// shared stream; the delimiter matchers push back whatever they read
// speculatively, so the outer loop never sees a scalar twice.

use log::trace;

use crate::core::delimiter::Delimiter;
use crate::core::stream::ScalarStream;
use crate::error::{ParseKind, ReadError};

/// What terminated a field.
enum FieldEnd {
    /// Field delimiter: the row continues.
    Field,
    /// Row delimiter: the row is complete.
    Row,
    /// End of input: the row is complete and the next call returns None.
    File,
}

pub(crate) struct RowParser {
    input: ScalarStream,
    field_delimiter: Delimiter,
    row_delimiter: Delimiter,
    escape: Option<char>,
    trim: Vec<char>,
    /// Fixed by the first parsed row; every later row must match.
    fields_per_row: Option<usize>,
    /// Per-field scratch, reused across fields.
    scratch: String,
    /// Rows parsed so far, for error coordinates.
    rows: usize,
    /// Field index currently being parsed, for error coordinates.
    field: usize,
    /// False once the current row consumed any payload scalar. A blank
    /// line never leaves FieldStart; an escaped empty field ("") does,
    /// which is what keeps the two apart for the skip rule.
    row_blank: bool,
    done: bool,
}

impl RowParser {
    pub(crate) fn new(
        input: ScalarStream,
        field_delimiter: Delimiter,
        row_delimiter: Delimiter,
        escape: Option<char>,
        trim: Vec<char>,
    ) -> Self {
        RowParser {
            input,
            field_delimiter,
            row_delimiter,
            escape,
            trim,
            fields_per_row: None,
            scratch: String::new(),
            rows: 0,
            field: 0,
            row_blank: true,
            done: false,
        }
    }

    pub(crate) fn fields_per_row(&self) -> Option<usize> {
        self.fields_per_row
    }

    pub(crate) fn rows_parsed(&self) -> usize {
        self.rows
    }

    /// Parse the next row, skipping blank rows in one-column files.
    pub(crate) fn parse_row(&mut self) -> Result<Option<Vec<String>>, ReadError> {
        loop {
            let Some(row) = self.parse_row_once()? else {
                return Ok(None);
            };
            debug_assert!(self.input.pushback_is_empty());
            match self.fields_per_row {
                None => {
                    self.fields_per_row = Some(row.len());
                    self.rows += 1;
                    return Ok(Some(row));
                }
                Some(expected) => {
                    // The field-count invariant is enforced before the
                    // blank-row skip, so a blank line inside a multi-column
                    // file is an error rather than silently tolerated.
                    if row.len() != expected {
                        self.field = 0;
                        return Err(self.fail(ParseKind::FieldCount {
                            expected,
                            found: row.len(),
                        }));
                    }
                    self.rows += 1;
                    if expected == 1 && row[0].is_empty() && self.row_blank {
                        trace!("skipping blank row {}", self.rows - 1);
                        continue;
                    }
                    return Ok(Some(row));
                }
            }
        }
    }

    fn parse_row_once(&mut self) -> Result<Option<Vec<String>>, ReadError> {
        if self.done {
            return Ok(None);
        }
        self.row_blank = true;
        let mut fields: Vec<String> = Vec::new();
        loop {
            self.field = fields.len();
            match self.parse_field(fields.is_empty())? {
                None => return Ok(None),
                Some((text, FieldEnd::Field)) => fields.push(text),
                Some((text, FieldEnd::Row)) => {
                    fields.push(text);
                    return Ok(Some(fields));
                }
                Some((text, FieldEnd::File)) => {
                    fields.push(text);
                    self.done = true;
                    return Ok(Some(fields));
                }
            }
        }
    }

    /// FieldStart: skip leading trim scalars, then dispatch on the first
    /// meaningful scalar. Returns None only at EOF before any field of the
    /// row was started.
    fn parse_field(&mut self, row_empty: bool) -> Result<Option<(String, FieldEnd)>, ReadError> {
        loop {
            let Some(scalar) = self.input.next()? else {
                return if row_empty {
                    Ok(None)
                } else {
                    // A field delimiter was just consumed; the row ends
                    // with one more empty field.
                    Ok(Some((String::new(), FieldEnd::File)))
                };
            };
            if self.is_trim(scalar) {
                continue;
            }
            if self.escape == Some(scalar) {
                self.row_blank = false;
                return self.parse_escaped(scalar).map(Some);
            }
            if self.field_delimiter.matches(scalar, &mut self.input)? {
                return Ok(Some((String::new(), FieldEnd::Field)));
            }
            if self.row_delimiter.matches(scalar, &mut self.input)? {
                return Ok(Some((String::new(), FieldEnd::Row)));
            }
            self.row_blank = false;
            return self.parse_unescaped(scalar).map(Some);
        }
    }

    /// InUnescaped: accumulate raw scalars until a delimiter or EOF. The
    /// escape scalar may not appear here at all.
    fn parse_unescaped(&mut self, seed: char) -> Result<(String, FieldEnd), ReadError> {
        self.scratch.clear();
        self.scratch.push(seed);
        loop {
            let Some(scalar) = self.input.next()? else {
                return Ok((self.take_trimmed(), FieldEnd::File));
            };
            if self.escape == Some(scalar) {
                return Err(self.fail(ParseKind::UnescapedEscape));
            }
            if self.field_delimiter.matches(scalar, &mut self.input)? {
                return Ok((self.take_trimmed(), FieldEnd::Field));
            }
            if self.row_delimiter.matches(scalar, &mut self.input)? {
                return Ok((self.take_trimmed(), FieldEnd::Row));
            }
            self.scratch.push(scalar);
        }
    }

    /// InEscaped: accumulate raw scalars; a doubled escape collapses to one
    /// literal escape, a single escape closes the field.
    fn parse_escaped(&mut self, escape: char) -> Result<(String, FieldEnd), ReadError> {
        self.scratch.clear();
        loop {
            let Some(scalar) = self.input.next()? else {
                return Err(self.fail(ParseKind::UnclosedEscape));
            };
            if scalar == escape {
                match self.input.next()? {
                    None => return Ok((std::mem::take(&mut self.scratch), FieldEnd::File)),
                    Some(next) if next == escape => self.scratch.push(escape),
                    Some(next) => return self.after_escaped_close(next),
                }
            } else {
                self.scratch.push(scalar);
            }
        }
    }

    /// AfterEscapedClose: only trim scalars may sit between the closing
    /// escape and the next delimiter.
    fn after_escaped_close(&mut self, first: char) -> Result<(String, FieldEnd), ReadError> {
        let mut scalar = first;
        while self.is_trim(scalar) {
            match self.input.next()? {
                None => return Ok((std::mem::take(&mut self.scratch), FieldEnd::File)),
                Some(next) => scalar = next,
            }
        }
        if self.field_delimiter.matches(scalar, &mut self.input)? {
            return Ok((std::mem::take(&mut self.scratch), FieldEnd::Field));
        }
        if self.row_delimiter.matches(scalar, &mut self.input)? {
            return Ok((std::mem::take(&mut self.scratch), FieldEnd::Row));
        }
        Err(self.fail(ParseKind::DanglingEscape))
    }

    #[inline]
    fn is_trim(&self, scalar: char) -> bool {
        self.trim.contains(&scalar)
    }

    /// Finalize an unescaped field: trailing trim scalars are not part of
    /// the payload. Leading ones never entered the scratch.
    fn take_trimmed(&mut self) -> String {
        if !self.trim.is_empty() {
            while self
                .scratch
                .chars()
                .last()
                .is_some_and(|last| self.trim.contains(&last))
            {
                self.scratch.pop();
            }
        }
        std::mem::take(&mut self.scratch)
    }

    fn fail(&self, kind: ParseKind) -> ReadError {
        ReadError::Parse {
            kind,
            row: self.rows,
            field: self.field,
        }
    }
}
