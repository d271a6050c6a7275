// Byte-to-scalar decoders.
//
// Pure-Rust decoding for every supported encoding. No external crate
// dependencies. Each pull distinguishes three outcomes: a scalar, clean end
// of input, or malformed bytes. On an empty pull the decoder asks the byte
// source whether the emptiness is EOF or a pending stream failure, and
// rethrows the latter.

use crate::core::source::ByteSource;
use crate::encoding::Encoding;
use crate::error::ReadError;

pub struct ScalarDecoder {
    source: ByteSource,
    encoding: Encoding,
}

impl ScalarDecoder {
    /// `encoding` may be an endianness-agnostic family; it is resolved to a
    /// concrete byte order here.
    pub fn new(source: ByteSource, encoding: Encoding) -> Self {
        ScalarDecoder {
            source,
            encoding: encoding.resolved(),
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Pull the next Unicode scalar.
    pub fn next_scalar(&mut self) -> Result<Option<char>, ReadError> {
        match self.encoding {
            Encoding::Ascii => self.next_ascii(),
            Encoding::Utf8 => self.next_utf8(),
            Encoding::Utf16Be => self.next_utf16(true),
            Encoding::Utf16Le => self.next_utf16(false),
            Encoding::Utf32Be => self.next_utf32(true),
            Encoding::Utf32Le => self.next_utf32(false),
            // Families are resolved in new().
            Encoding::Utf16 | Encoding::Utf32 => unreachable!("unresolved encoding family"),
        }
    }

    fn malformed(&self) -> ReadError {
        ReadError::Decode {
            encoding: self.encoding,
        }
    }

    /// Pull one byte, promoting a parked stream failure to an error.
    #[inline]
    fn next_byte_checked(&mut self) -> Result<Option<u8>, ReadError> {
        match self.source.next_byte() {
            Some(byte) => Ok(Some(byte)),
            None if self.source.is_errored() => {
                Err(ReadError::stream(self.source.take_error()))
            }
            None => Ok(None),
        }
    }

    /// Pull one byte where EOF would land mid-sequence.
    #[inline]
    fn must_byte(&mut self) -> Result<u8, ReadError> {
        match self.next_byte_checked()? {
            Some(byte) => Ok(byte),
            None => Err(self.malformed()),
        }
    }

    fn next_ascii(&mut self) -> Result<Option<char>, ReadError> {
        match self.next_byte_checked()? {
            None => Ok(None),
            Some(byte) if byte < 0x80 => Ok(Some(byte as char)),
            Some(_) => Err(self.malformed()),
        }
    }

    fn next_utf8(&mut self) -> Result<Option<char>, ReadError> {
        let Some(first) = self.next_byte_checked()? else {
            return Ok(None);
        };
        // Overlong 2-byte lead bytes (C0/C1) and anything past F4 are
        // rejected up front; remaining overlongs fall out of the minimum
        // check below, surrogates out of char::from_u32.
        let (len, seed, min) = match first {
            0x00..=0x7F => return Ok(Some(first as char)),
            0xC2..=0xDF => (2usize, (first & 0x1F) as u32, 0x80u32),
            0xE0..=0xEF => (3, (first & 0x0F) as u32, 0x800),
            0xF0..=0xF4 => (4, (first & 0x07) as u32, 0x1_0000),
            _ => return Err(self.malformed()),
        };
        let mut code_point = seed;
        for _ in 1..len {
            let byte = self.must_byte()?;
            if byte & 0xC0 != 0x80 {
                return Err(self.malformed());
            }
            code_point = (code_point << 6) | (byte & 0x3F) as u32;
        }
        if code_point < min {
            return Err(self.malformed());
        }
        char::from_u32(code_point).map(Some).ok_or_else(|| self.malformed())
    }

    fn next_utf16(&mut self, big_endian: bool) -> Result<Option<char>, ReadError> {
        let Some(high) = self.next_unit16(big_endian)? else {
            return Ok(None);
        };
        match high {
            0xD800..=0xDBFF => {
                // Input ending between paired surrogates is malformed.
                let low = match self.next_unit16(big_endian)? {
                    Some(unit) => unit,
                    None => return Err(self.malformed()),
                };
                if !(0xDC00..=0xDFFF).contains(&low) {
                    return Err(self.malformed());
                }
                let code_point =
                    0x1_0000 + (((high - 0xD800) as u32) << 10) + (low - 0xDC00) as u32;
                char::from_u32(code_point).map(Some).ok_or_else(|| self.malformed())
            }
            // Lone low surrogate.
            0xDC00..=0xDFFF => Err(self.malformed()),
            unit => char::from_u32(unit as u32).map(Some).ok_or_else(|| self.malformed()),
        }
    }

    /// One 16-bit code unit, or None at a clean unit boundary.
    fn next_unit16(&mut self, big_endian: bool) -> Result<Option<u16>, ReadError> {
        let Some(b0) = self.next_byte_checked()? else {
            return Ok(None);
        };
        let b1 = self.must_byte()?;
        let unit = if big_endian {
            u16::from_be_bytes([b0, b1])
        } else {
            u16::from_le_bytes([b0, b1])
        };
        Ok(Some(unit))
    }

    fn next_utf32(&mut self, big_endian: bool) -> Result<Option<char>, ReadError> {
        let Some(b0) = self.next_byte_checked()? else {
            return Ok(None);
        };
        let b1 = self.must_byte()?;
        let b2 = self.must_byte()?;
        let b3 = self.must_byte()?;
        let code_point = if big_endian {
            u32::from_be_bytes([b0, b1, b2, b3])
        } else {
            u32::from_le_bytes([b0, b1, b2, b3])
        };
        char::from_u32(code_point).map(Some).ok_or_else(|| self.malformed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: Vec<u8>, encoding: Encoding) -> Result<String, ReadError> {
        let mut decoder = ScalarDecoder::new(ByteSource::from_bytes(bytes), encoding);
        let mut out = String::new();
        while let Some(scalar) = decoder.next_scalar()? {
            out.push(scalar);
        }
        Ok(out)
    }

    #[test]
    fn test_ascii_round_trip() {
        assert_eq!(decode_all(b"hello,world".to_vec(), Encoding::Ascii).unwrap(), "hello,world");
    }

    #[test]
    fn test_ascii_rejects_high_bit() {
        assert!(matches!(
            decode_all(vec![b'a', 0x80], Encoding::Ascii),
            Err(ReadError::Decode { encoding: Encoding::Ascii })
        ));
    }

    #[test]
    fn test_utf8_multibyte() {
        let text = "caf\u{e9} \u{2603} \u{1F600}";
        assert_eq!(decode_all(text.as_bytes().to_vec(), Encoding::Utf8).unwrap(), text);
    }

    #[test]
    fn test_utf8_rejects_overlong() {
        // 0xC0 0xAF is an overlong encoding of '/'.
        assert!(decode_all(vec![0xC0, 0xAF], Encoding::Utf8).is_err());
        // 0xE0 0x80 0xAF is an overlong 3-byte form.
        assert!(decode_all(vec![0xE0, 0x80, 0xAF], Encoding::Utf8).is_err());
    }

    #[test]
    fn test_utf8_rejects_surrogate() {
        // 0xED 0xA0 0x80 encodes U+D800.
        assert!(decode_all(vec![0xED, 0xA0, 0x80], Encoding::Utf8).is_err());
    }

    #[test]
    fn test_utf8_rejects_truncated_sequence() {
        assert!(decode_all(vec![0xE2, 0x98], Encoding::Utf8).is_err());
    }

    #[test]
    fn test_utf16_both_orders() {
        let text = "a\u{e9}\u{1F600}";
        let be: Vec<u8> = text.encode_utf16().flat_map(|u| u.to_be_bytes()).collect();
        let le: Vec<u8> = text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        assert_eq!(decode_all(be, Encoding::Utf16Be).unwrap(), text);
        assert_eq!(decode_all(le, Encoding::Utf16Le).unwrap(), text);
    }

    #[test]
    fn test_utf16_rejects_lone_surrogates() {
        // High surrogate at EOF.
        assert!(decode_all(vec![0xD8, 0x3D], Encoding::Utf16Be).is_err());
        // High surrogate followed by a non-surrogate unit.
        assert!(decode_all(vec![0xD8, 0x3D, 0x00, 0x61], Encoding::Utf16Be).is_err());
        // Lone low surrogate.
        assert!(decode_all(vec![0xDE, 0x00], Encoding::Utf16Be).is_err());
    }

    #[test]
    fn test_utf16_rejects_odd_length() {
        assert!(decode_all(vec![0x00, 0x61, 0x00], Encoding::Utf16Be).is_err());
    }

    #[test]
    fn test_utf32_both_orders() {
        let text = "A\u{1F600}";
        let be: Vec<u8> = text.chars().flat_map(|c| (c as u32).to_be_bytes()).collect();
        let le: Vec<u8> = text.chars().flat_map(|c| (c as u32).to_le_bytes()).collect();
        assert_eq!(decode_all(be, Encoding::Utf32Be).unwrap(), text);
        assert_eq!(decode_all(le, Encoding::Utf32Le).unwrap(), text);
    }

    #[test]
    fn test_utf32_rejects_out_of_range() {
        assert!(decode_all(vec![0x00, 0x11, 0x00, 0x00], Encoding::Utf32Be).is_err());
    }

    #[test]
    fn test_utf32_rejects_mid_unit_eof() {
        assert!(decode_all(vec![0x00, 0x00, 0x61], Encoding::Utf32Be).is_err());
    }

    #[test]
    fn test_family_resolves_to_big_endian() {
        let decoder = ScalarDecoder::new(ByteSource::from_bytes(Vec::new()), Encoding::Utf16);
        assert_eq!(decoder.encoding(), Encoding::Utf16Be);
    }

    struct FailingReader;

    impl std::io::Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"))
        }
    }

    #[test]
    fn test_stream_error_promoted() {
        let source = ByteSource::from_reader(Box::new(FailingReader));
        let mut decoder = ScalarDecoder::new(source, Encoding::Utf8);
        assert!(matches!(decoder.next_scalar(), Err(ReadError::Stream(_))));
    }
}
