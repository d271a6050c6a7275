// Scalar-to-byte encoders, the write-side mirror of the decoders.
//
// Encoding appends into an existing buffer so a row can be assembled with
// a single allocation. ASCII is the only lossy target and fails instead of
// substituting.

use crate::encoding::Encoding;
use crate::error::WriteError;

#[derive(Debug, Clone, Copy)]
pub struct ScalarEncoder {
    encoding: Encoding,
}

impl ScalarEncoder {
    /// `encoding` may be an endianness-agnostic family; it is resolved to a
    /// concrete byte order here.
    pub fn new(encoding: Encoding) -> Self {
        ScalarEncoder {
            encoding: encoding.resolved(),
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Append one scalar's encoded bytes.
    pub fn encode_char(&self, scalar: char, out: &mut Vec<u8>) -> Result<(), WriteError> {
        match self.encoding {
            Encoding::Ascii => {
                if scalar.is_ascii() {
                    out.push(scalar as u8);
                    Ok(())
                } else {
                    Err(WriteError::Unrepresentable {
                        scalar,
                        encoding: self.encoding,
                    })
                }
            }
            Encoding::Utf8 => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(scalar.encode_utf8(&mut buf).as_bytes());
                Ok(())
            }
            Encoding::Utf16Be | Encoding::Utf16Le => {
                let mut units = [0u16; 2];
                for unit in scalar.encode_utf16(&mut units) {
                    let bytes = if self.encoding == Encoding::Utf16Be {
                        unit.to_be_bytes()
                    } else {
                        unit.to_le_bytes()
                    };
                    out.extend_from_slice(&bytes);
                }
                Ok(())
            }
            Encoding::Utf32Be => {
                out.extend_from_slice(&(scalar as u32).to_be_bytes());
                Ok(())
            }
            Encoding::Utf32Le => {
                out.extend_from_slice(&(scalar as u32).to_le_bytes());
                Ok(())
            }
            Encoding::Utf16 | Encoding::Utf32 => unreachable!("unresolved encoding family"),
        }
    }

    /// Append a string's encoded bytes. UTF-8 output is a straight copy.
    pub fn encode_str(&self, text: &str, out: &mut Vec<u8>) -> Result<(), WriteError> {
        match self.encoding {
            Encoding::Utf8 => {
                out.extend_from_slice(text.as_bytes());
                Ok(())
            }
            Encoding::Ascii => {
                if text.is_ascii() {
                    out.extend_from_slice(text.as_bytes());
                    Ok(())
                } else {
                    let scalar = text
                        .chars()
                        .find(|c| !c.is_ascii())
                        .unwrap_or('\u{FFFD}');
                    Err(WriteError::Unrepresentable {
                        scalar,
                        encoding: self.encoding,
                    })
                }
            }
            _ => {
                out.reserve(text.len() * 2);
                for scalar in text.chars() {
                    self.encode_char(scalar, out)?;
                }
                Ok(())
            }
        }
    }
}
