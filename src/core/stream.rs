// The pushback buffer layered over the scalar decoder: the single pull
// point for the row parser and the delimiter matchers.

use crate::core::buffer::ScalarBuffer;
use crate::core::decoder::ScalarDecoder;
use crate::error::ReadError;

pub struct ScalarStream {
    buffer: ScalarBuffer,
    decoder: ScalarDecoder,
}

impl ScalarStream {
    pub fn new(decoder: ScalarDecoder) -> Self {
        ScalarStream {
            buffer: ScalarBuffer::new(),
            decoder,
        }
    }

    /// Pull the next scalar, draining pushback before decoding new input.
    #[inline]
    pub fn next(&mut self) -> Result<Option<char>, ReadError> {
        if let Some(scalar) = self.buffer.next() {
            return Ok(Some(scalar));
        }
        self.decoder.next_scalar()
    }

    /// Return one scalar so the next pull yields it again.
    #[inline]
    pub fn push_back(&mut self, scalar: char) {
        self.buffer.prepend(scalar);
    }

    /// Return a speculatively read run so the next pulls replay it in
    /// original order.
    pub fn push_back_all(&mut self, scalars: &[char]) {
        self.buffer.prepend_all(scalars);
    }

    /// True when no pushback is pending. Holds between logical row
    /// boundaries under normal operation.
    pub fn pushback_is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::source::ByteSource;
    use crate::encoding::Encoding;

    fn stream(text: &str) -> ScalarStream {
        let decoder = ScalarDecoder::new(
            ByteSource::from_bytes(text.as_bytes().to_vec()),
            Encoding::Utf8,
        );
        ScalarStream::new(decoder)
    }

    #[test]
    fn test_pushback_replays_in_order() {
        let mut s = stream("cd");
        s.push_back_all(&['a', 'b']);
        assert_eq!(s.next().unwrap(), Some('a'));
        assert_eq!(s.next().unwrap(), Some('b'));
        assert_eq!(s.next().unwrap(), Some('c'));
        assert_eq!(s.next().unwrap(), Some('d'));
        assert_eq!(s.next().unwrap(), None);
    }

    #[test]
    fn test_single_pushback() {
        let mut s = stream("b");
        let first = s.next().unwrap().unwrap();
        s.push_back(first);
        assert_eq!(s.next().unwrap(), Some('b'));
        assert_eq!(s.next().unwrap(), None);
    }
}
