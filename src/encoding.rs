// Supported text encodings and the hint/BOM selection rules.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// A text encoding the pipeline can decode from and encode to.
///
/// `Utf16` and `Utf32` are the endianness-agnostic families: they accept a
/// BOM of either endianness on read and resolve to big-endian (the Unicode
/// default) when nothing disambiguates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Ascii,
    Utf8,
    Utf16,
    Utf16Be,
    Utf16Le,
    Utf32,
    Utf32Be,
    Utf32Le,
}

impl Encoding {
    /// Combine the user-provided hint with the BOM-inferred encoding.
    ///
    /// Both absent defaults to UTF-8. When both are present and differ, the
    /// combination is only valid if the hint is an endianness-agnostic family
    /// and the inferred one is a variant of that family.
    pub fn select(
        hint: Option<Encoding>,
        inferred: Option<Encoding>,
    ) -> Result<Encoding, ConfigError> {
        match (hint, inferred) {
            (None, None) => Ok(Encoding::Utf8),
            (None, Some(found)) => Ok(found),
            (Some(wanted), None) => Ok(wanted),
            (Some(wanted), Some(found)) if wanted == found => Ok(wanted),
            (Some(wanted), Some(found)) => {
                if wanted.family_includes(found) {
                    Ok(found)
                } else {
                    Err(ConfigError::EncodingMismatch {
                        hint: wanted,
                        inferred: found,
                    })
                }
            }
        }
    }

    /// True when `variant` is an endianness-specific member of this family.
    fn family_includes(self, variant: Encoding) -> bool {
        matches!(
            (self, variant),
            (Encoding::Utf16, Encoding::Utf16Be)
                | (Encoding::Utf16, Encoding::Utf16Le)
                | (Encoding::Utf32, Encoding::Utf32Be)
                | (Encoding::Utf32, Encoding::Utf32Le)
        )
    }

    /// Resolve an endianness-agnostic family to a concrete byte order.
    /// Big-endian is the Unicode default in the absence of a BOM.
    pub(crate) fn resolved(self) -> Encoding {
        match self {
            Encoding::Utf16 => Encoding::Utf16Be,
            Encoding::Utf32 => Encoding::Utf32Be,
            other => other,
        }
    }

    /// True for the families whose serialized byte order is ambiguous
    /// without a BOM. Drives the writer's `Convention` BOM strategy.
    pub fn is_endian_ambiguous(self) -> bool {
        matches!(self, Encoding::Utf16 | Encoding::Utf32)
    }

    /// The BOM bytes this encoding writes, MSB first for BE variants.
    /// Agnostic families emit the BOM of their resolved byte order.
    pub fn bom(self) -> &'static [u8] {
        match self.resolved() {
            Encoding::Ascii => &[],
            Encoding::Utf8 => &[0xEF, 0xBB, 0xBF],
            Encoding::Utf16Be => &[0xFE, 0xFF],
            Encoding::Utf16Le => &[0xFF, 0xFE],
            Encoding::Utf32Be => &[0x00, 0x00, 0xFE, 0xFF],
            Encoding::Utf32Le => &[0xFF, 0xFE, 0x00, 0x00],
            Encoding::Utf16 | Encoding::Utf32 => unreachable!("resolved above"),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Encoding::Ascii => "ascii",
            Encoding::Utf8 => "utf-8",
            Encoding::Utf16 => "utf-16",
            Encoding::Utf16Be => "utf-16-be",
            Encoding::Utf16Le => "utf-16-le",
            Encoding::Utf32 => "utf-32",
            Encoding::Utf32Be => "utf-32-be",
            Encoding::Utf32Le => "utf-32-le",
        };
        f.write_str(name)
    }
}

impl FromStr for Encoding {
    type Err = ConfigError;

    /// Parse a configuration-surface encoding name. `unicode` is accepted
    /// as an alias for the UTF-16 family.
    fn from_str(name: &str) -> Result<Self, ConfigError> {
        match name.to_ascii_lowercase().as_str() {
            "ascii" => Ok(Encoding::Ascii),
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "utf-16" | "utf16" | "unicode" => Ok(Encoding::Utf16),
            "utf-16-be" | "utf16be" => Ok(Encoding::Utf16Be),
            "utf-16-le" | "utf16le" => Ok(Encoding::Utf16Le),
            "utf-32" | "utf32" => Ok(Encoding::Utf32),
            "utf-32-be" | "utf32be" => Ok(Encoding::Utf32Be),
            "utf-32-le" | "utf32le" => Ok(Encoding::Utf32Le),
            other => Err(ConfigError::UnknownEncoding(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_defaults_to_utf8() {
        assert_eq!(Encoding::select(None, None).unwrap(), Encoding::Utf8);
    }

    #[test]
    fn test_select_single_side() {
        assert_eq!(
            Encoding::select(Some(Encoding::Ascii), None).unwrap(),
            Encoding::Ascii
        );
        assert_eq!(
            Encoding::select(None, Some(Encoding::Utf16Le)).unwrap(),
            Encoding::Utf16Le
        );
    }

    #[test]
    fn test_select_family_accepts_variant() {
        assert_eq!(
            Encoding::select(Some(Encoding::Utf16), Some(Encoding::Utf16Le)).unwrap(),
            Encoding::Utf16Le
        );
        assert_eq!(
            Encoding::select(Some(Encoding::Utf32), Some(Encoding::Utf32Be)).unwrap(),
            Encoding::Utf32Be
        );
    }

    #[test]
    fn test_select_mismatch_fails() {
        let err = Encoding::select(Some(Encoding::Utf8), Some(Encoding::Utf16Be));
        assert!(matches!(
            err,
            Err(ConfigError::EncodingMismatch { .. })
        ));

        // A family hint does not cover the other family's variants.
        let err = Encoding::select(Some(Encoding::Utf16), Some(Encoding::Utf32Le));
        assert!(matches!(err, Err(ConfigError::EncodingMismatch { .. })));
    }

    #[test]
    fn test_bom_matching_user_hint_round_trips() {
        // BOM-sniff followed by select with a matching hint returns the
        // same encoding for every table entry.
        for enc in [
            Encoding::Utf8,
            Encoding::Utf16Be,
            Encoding::Utf16Le,
            Encoding::Utf32Be,
            Encoding::Utf32Le,
        ] {
            assert_eq!(Encoding::select(Some(enc), Some(enc)).unwrap(), enc);
        }
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("utf-16-le".parse::<Encoding>().unwrap(), Encoding::Utf16Le);
        assert_eq!("unicode".parse::<Encoding>().unwrap(), Encoding::Utf16);
        assert_eq!("ASCII".parse::<Encoding>().unwrap(), Encoding::Ascii);
        assert!("latin-1".parse::<Encoding>().is_err());
    }

    #[test]
    fn test_resolved_defaults_to_big_endian() {
        assert_eq!(Encoding::Utf16.resolved(), Encoding::Utf16Be);
        assert_eq!(Encoding::Utf32.resolved(), Encoding::Utf32Be);
        assert_eq!(Encoding::Utf8.resolved(), Encoding::Utf8);
    }
}
