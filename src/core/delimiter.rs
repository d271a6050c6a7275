// Delimiter matching with rollback.
//
// A matcher is handed the scalar the parser already holds and pulls further
// scalars from the shared stream only as needed. Three compiled forms, the
// way single-byte separators get their own fast path in byte-level parsers:
// length 1 is a plain comparison, length 2 needs at most one speculative
// pull, and longer sequences match greedily and push the whole speculative
// run back on a mismatch.

use crate::core::stream::ScalarStream;
use crate::error::{ConfigError, ReadError};

/// A field or row delimiter: a non-empty scalar sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiter {
    scalars: Vec<char>,
}

impl Delimiter {
    pub fn new(scalars: Vec<char>) -> Result<Self, ConfigError> {
        if scalars.is_empty() {
            return Err(ConfigError::EmptyDelimiter);
        }
        Ok(Delimiter { scalars })
    }

    pub fn scalars(&self) -> &[char] {
        &self.scalars
    }

    pub fn len(&self) -> usize {
        self.scalars.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether this delimiter starts at `first`, consuming the rest of the
    /// sequence from `input` on a full match. On a failed match every
    /// speculatively read scalar is pushed back, so the caller re-scans
    /// them as ordinary data.
    pub fn matches(&self, first: char, input: &mut ScalarStream) -> Result<bool, ReadError> {
        match self.scalars.len() {
            1 => Ok(first == self.scalars[0]),
            2 => {
                if first != self.scalars[0] {
                    return Ok(false);
                }
                match input.next()? {
                    // EOF: no match and nothing to push back.
                    None => Ok(false),
                    Some(second) if second == self.scalars[1] => Ok(true),
                    Some(second) => {
                        input.push_back(second);
                        Ok(false)
                    }
                }
            }
            _ => self.matches_greedy(first, input),
        }
    }

    fn matches_greedy(&self, first: char, input: &mut ScalarStream) -> Result<bool, ReadError> {
        if first != self.scalars[0] {
            return Ok(false);
        }
        let mut speculative: Vec<char> = Vec::with_capacity(self.scalars.len() - 1);
        for &expected in &self.scalars[1..] {
            match input.next()? {
                Some(scalar) => {
                    speculative.push(scalar);
                    if scalar != expected {
                        input.push_back_all(&speculative);
                        return Ok(false);
                    }
                }
                None => {
                    input.push_back_all(&speculative);
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}
