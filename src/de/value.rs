// Field- and row-level deserializers.
//
// A field is the terminal coding depth: it only ever produces a single
// value, and requesting a nested container from it fails. A row hands out
// fields by position (seq/tuple), by header name (struct/map), or as a
// single value when the file has exactly one column.

use std::fmt;

use serde::de::value::StrDeserializer;
use serde::de::{DeserializeSeed, Deserializer, IntoDeserializer, MapAccess, SeqAccess, Visitor};

use crate::error::CodingError;

macro_rules! forward_row_to_single {
    ($($method:ident)*) => {
        $(
            fn $method<V>(self, visitor: V) -> Result<V::Value, CodingError>
            where
                V: Visitor<'de>,
            {
                self.single()?.$method(visitor)
            }
        )*
    };
}

/// How decoded booleans are parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoolStrategy {
    /// Exactly "true" or "false".
    #[default]
    Strict,
    /// Also accepts 0/1 and any capitalization of true/false.
    Lenient,
}

/// Value-level strategy knobs for the decode adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    pub bool_strategy: BoolStrategy,
}

fn parse_bool(value: &str, strategy: BoolStrategy) -> Result<bool, CodingError> {
    match strategy {
        BoolStrategy::Strict => match value {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(CodingError::Data(format!("{value:?} is not a boolean"))),
        },
        BoolStrategy::Lenient => match value.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(CodingError::Data(format!("{value:?} is not a boolean"))),
        },
    }
}

/// A single field, the depth-2 single-value container.
#[derive(Debug, Clone, Copy)]
pub struct FieldDecoder<'a> {
    value: &'a str,
    options: DecodeOptions,
}

impl<'a> FieldDecoder<'a> {
    pub fn new(value: &'a str, options: DecodeOptions) -> Self {
        FieldDecoder { value, options }
    }

    pub fn value(&self) -> &'a str {
        self.value
    }

    /// Decode the field into any scalar-shaped type.
    pub fn decode<T: serde::de::DeserializeOwned>(self) -> Result<T, CodingError> {
        T::deserialize(self)
    }

    fn parse_error(&self, what: &str, err: impl fmt::Display) -> CodingError {
        CodingError::Data(format!("field {:?} is not {what}: {err}", self.value))
    }
}

macro_rules! deserialize_parsed {
    ($method:ident, $visit:ident, $ty:ty, $what:literal) => {
        fn $method<V>(self, visitor: V) -> Result<V::Value, CodingError>
        where
            V: Visitor<'de>,
        {
            let parsed: $ty = self
                .value
                .parse()
                .map_err(|e| self.parse_error($what, e))?;
            visitor.$visit(parsed)
        }
    };
}

impl<'de> Deserializer<'de> for FieldDecoder<'_> {
    type Error = CodingError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        visitor.visit_str(self.value)
    }

    fn deserialize_bool<V>(self, visitor: V) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        visitor.visit_bool(parse_bool(self.value, self.options.bool_strategy)?)
    }

    deserialize_parsed!(deserialize_i8, visit_i8, i8, "an integer");
    deserialize_parsed!(deserialize_i16, visit_i16, i16, "an integer");
    deserialize_parsed!(deserialize_i32, visit_i32, i32, "an integer");
    deserialize_parsed!(deserialize_i64, visit_i64, i64, "an integer");
    deserialize_parsed!(deserialize_i128, visit_i128, i128, "an integer");
    deserialize_parsed!(deserialize_u8, visit_u8, u8, "an unsigned integer");
    deserialize_parsed!(deserialize_u16, visit_u16, u16, "an unsigned integer");
    deserialize_parsed!(deserialize_u32, visit_u32, u32, "an unsigned integer");
    deserialize_parsed!(deserialize_u64, visit_u64, u64, "an unsigned integer");
    deserialize_parsed!(deserialize_u128, visit_u128, u128, "an unsigned integer");
    deserialize_parsed!(deserialize_f32, visit_f32, f32, "a float");
    deserialize_parsed!(deserialize_f64, visit_f64, f64, "a float");

    fn deserialize_char<V>(self, visitor: V) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        let mut chars = self.value.chars();
        match (chars.next(), chars.next()) {
            (Some(scalar), None) => visitor.visit_char(scalar),
            _ => Err(CodingError::Data(format!(
                "field {:?} is not a single scalar",
                self.value
            ))),
        }
    }

    fn deserialize_str<V>(self, visitor: V) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        visitor.visit_str(self.value)
    }

    fn deserialize_string<V>(self, visitor: V) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        visitor.visit_string(self.value.to_owned())
    }

    fn deserialize_bytes<V>(self, visitor: V) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        visitor.visit_bytes(self.value.as_bytes())
    }

    fn deserialize_byte_buf<V>(self, visitor: V) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        visitor.visit_byte_buf(self.value.as_bytes().to_vec())
    }

    /// The empty field is nil.
    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        if self.value.is_empty() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_unit<V>(self, visitor: V) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        if self.value.is_empty() {
            visitor.visit_unit()
        } else {
            Err(CodingError::Data(format!(
                "field {:?} is not empty",
                self.value
            )))
        }
    }

    fn deserialize_unit_struct<V>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    // A field is terminal: no child containers.

    fn deserialize_seq<V>(self, _visitor: V) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        Err(CodingError::InvalidContainer)
    }

    fn deserialize_tuple<V>(self, _len: usize, _visitor: V) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        Err(CodingError::InvalidContainer)
    }

    fn deserialize_tuple_struct<V>(
        self,
        _name: &'static str,
        _len: usize,
        _visitor: V,
    ) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        Err(CodingError::InvalidContainer)
    }

    fn deserialize_map<V>(self, _visitor: V) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        Err(CodingError::InvalidContainer)
    }

    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        Err(CodingError::InvalidContainer)
    }

    fn deserialize_enum<V>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        let inner: StrDeserializer<'_, CodingError> = self.value.into_deserializer();
        inner.deserialize_enum(name, variants, visitor)
    }

    fn deserialize_identifier<V>(self, visitor: V) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        visitor.visit_str(self.value)
    }

    fn deserialize_ignored_any<V>(self, visitor: V) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        visitor.visit_str(self.value)
    }
}

/// One row, the depth-1 container.
pub(crate) struct RowDeserializer<'a> {
    pub(crate) fields: &'a [String],
    pub(crate) headers: &'a [String],
    pub(crate) options: DecodeOptions,
}

impl<'a> RowDeserializer<'a> {
    /// A row with exactly one column doubles as a single value.
    fn single(&self) -> Result<FieldDecoder<'a>, CodingError> {
        if self.fields.len() == 1 {
            Ok(FieldDecoder::new(&self.fields[0], self.options))
        } else {
            Err(CodingError::InvalidContainer)
        }
    }
}

impl<'de> Deserializer<'de> for RowDeserializer<'_> {
    type Error = CodingError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        visitor.visit_seq(RowSeqAccess {
            fields: self.fields.iter(),
            options: self.options,
        })
    }

    fn deserialize_tuple<V>(self, _len: usize, visitor: V) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V>(self, visitor: V) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        if self.headers.is_empty() {
            return Err(CodingError::InvalidPath(
                "keyed row access requires a header row".to_string(),
            ));
        }
        visitor.visit_map(RowMapAccess {
            pairs: self.headers.iter().zip(self.fields.iter()),
            value: None,
            options: self.options,
        })
    }

    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        if self.headers.is_empty() {
            self.deserialize_seq(visitor)
        } else {
            self.deserialize_map(visitor)
        }
    }

    fn deserialize_newtype_struct<V>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        self.single()?.deserialize_option(visitor)
    }

    fn deserialize_enum<V>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        self.single()?.deserialize_enum(name, variants, visitor)
    }

    fn deserialize_unit_struct<V>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, CodingError>
    where
        V: Visitor<'de>,
    {
        self.single()?.deserialize_unit_struct(name, visitor)
    }

    // Scalar targets treat a one-column row as its single field.
    forward_row_to_single! {
        deserialize_bool deserialize_i8 deserialize_i16 deserialize_i32
        deserialize_i64 deserialize_i128 deserialize_u8 deserialize_u16
        deserialize_u32 deserialize_u64 deserialize_u128 deserialize_f32
        deserialize_f64 deserialize_char deserialize_str deserialize_string
        deserialize_bytes deserialize_byte_buf deserialize_unit
        deserialize_identifier deserialize_ignored_any
    }
}

struct RowSeqAccess<'a> {
    fields: std::slice::Iter<'a, String>,
    options: DecodeOptions,
}

impl<'de> SeqAccess<'de> for RowSeqAccess<'_> {
    type Error = CodingError;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>, CodingError>
    where
        T: DeserializeSeed<'de>,
    {
        match self.fields.next() {
            Some(field) => seed
                .deserialize(FieldDecoder::new(field, self.options))
                .map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.fields.len())
    }
}

struct RowMapAccess<'a> {
    pairs: std::iter::Zip<std::slice::Iter<'a, String>, std::slice::Iter<'a, String>>,
    value: Option<&'a String>,
    options: DecodeOptions,
}

impl<'de> MapAccess<'de> for RowMapAccess<'_> {
    type Error = CodingError;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>, CodingError>
    where
        K: DeserializeSeed<'de>,
    {
        match self.pairs.next() {
            Some((header, field)) => {
                self.value = Some(field);
                let key: StrDeserializer<'_, CodingError> = header.as_str().into_deserializer();
                seed.deserialize(key).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value, CodingError>
    where
        V: DeserializeSeed<'de>,
    {
        let field = self
            .value
            .take()
            .ok_or_else(|| CodingError::Data("value requested before key".to_string()))?;
        seed.deserialize(FieldDecoder::new(field, self.options))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.pairs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(value: &str) -> FieldDecoder<'_> {
        FieldDecoder::new(value, DecodeOptions::default())
    }

    #[test]
    fn test_field_scalars() {
        assert_eq!(field("42").decode::<i32>().unwrap(), 42);
        assert_eq!(field("-7").decode::<i64>().unwrap(), -7);
        assert_eq!(field("2.5").decode::<f64>().unwrap(), 2.5);
        assert_eq!(field("x").decode::<char>().unwrap(), 'x');
        assert_eq!(field("text").decode::<String>().unwrap(), "text");
        assert!(field("true").decode::<bool>().unwrap());
    }

    #[test]
    fn test_field_bad_number() {
        assert!(field("4x").decode::<i32>().is_err());
    }

    #[test]
    fn test_strict_bool_rejects_numeric() {
        assert!(field("1").decode::<bool>().is_err());
        assert!(field("TRUE").decode::<bool>().is_err());
    }

    #[test]
    fn test_lenient_bool() {
        let options = DecodeOptions {
            bool_strategy: BoolStrategy::Lenient,
        };
        let lenient = |v: &str| parse_bool(v, options.bool_strategy);
        assert!(lenient("1").unwrap());
        assert!(!lenient("0").unwrap());
        assert!(lenient("TRUE").unwrap());
        assert!(lenient("False").map(|b| !b).unwrap());
        assert!(lenient("2").is_err());
    }

    #[test]
    fn test_empty_field_is_none() {
        assert_eq!(field("").decode::<Option<i32>>().unwrap(), None);
        assert_eq!(field("3").decode::<Option<i32>>().unwrap(), Some(3));
    }

    #[test]
    fn test_non_finite_floats_parse() {
        assert!(field("inf").decode::<f64>().unwrap().is_infinite());
        assert!(field("-inf").decode::<f64>().unwrap().is_sign_negative());
        assert!(field("NaN").decode::<f64>().unwrap().is_nan());
    }

    #[test]
    fn test_field_rejects_nested_containers() {
        assert!(matches!(
            field("a").decode::<Vec<String>>(),
            Err(CodingError::InvalidContainer)
        ));
    }

    #[test]
    fn test_row_as_seq() {
        let fields = vec!["1".to_string(), "2".into(), "3".into()];
        let row = RowDeserializer {
            fields: &fields,
            headers: &[],
            options: DecodeOptions::default(),
        };
        let decoded: Vec<i32> = serde::Deserialize::deserialize(row).unwrap();
        assert_eq!(decoded, vec![1, 2, 3]);
    }

    #[test]
    fn test_row_as_tuple() {
        let fields = vec!["a".to_string(), "7".into()];
        let row = RowDeserializer {
            fields: &fields,
            headers: &[],
            options: DecodeOptions::default(),
        };
        let decoded: (String, u8) = serde::Deserialize::deserialize(row).unwrap();
        assert_eq!(decoded, ("a".to_string(), 7));
    }

    #[test]
    fn test_single_column_row_as_value() {
        let fields = vec!["5".to_string()];
        let row = RowDeserializer {
            fields: &fields,
            headers: &[],
            options: DecodeOptions::default(),
        };
        let decoded: i32 = serde::Deserialize::deserialize(row).unwrap();
        assert_eq!(decoded, 5);
    }

    #[test]
    fn test_multi_column_row_as_value_fails() {
        let fields = vec!["5".to_string(), "6".into()];
        let row = RowDeserializer {
            fields: &fields,
            headers: &[],
            options: DecodeOptions::default(),
        };
        let result: Result<i32, _> = serde::Deserialize::deserialize(row);
        assert!(matches!(result, Err(CodingError::InvalidContainer)));
    }
}
