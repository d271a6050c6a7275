// Field- and key-level serializers.
//
// A field serializer turns exactly one scalar value into the field's text;
// nested containers fail, the field being the terminal coding depth.
// Numbers format through itoa/ryu. A key serializer classifies a coding
// key as a header name or a column index.

use serde::ser::{Impossible, Serialize, Serializer};

use crate::error::CodingError;

/// How non-finite floats are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NonFiniteFloatStrategy {
    /// Writing NaN or an infinity is an error.
    #[default]
    Fail,
    /// Spell them out as "NaN", "inf" and "-inf", which the decoder's
    /// float parsing accepts back.
    Spell,
}

/// Value-level strategy knobs for the encode adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeOptions {
    pub non_finite: NonFiniteFloatStrategy,
}

/// Serializes one value into field text.
pub struct FieldSerializer {
    pub(crate) options: EncodeOptions,
}

impl FieldSerializer {
    pub fn new(options: EncodeOptions) -> Self {
        FieldSerializer { options }
    }

    /// Render any scalar-shaped value to its field text.
    pub fn render<T: Serialize + ?Sized>(
        value: &T,
        options: EncodeOptions,
    ) -> Result<String, CodingError> {
        value.serialize(FieldSerializer::new(options))
    }

    fn float(&self, finite: bool, spelled: String) -> Result<String, CodingError> {
        if finite {
            return Ok(spelled);
        }
        match self.options.non_finite {
            NonFiniteFloatStrategy::Fail => Err(CodingError::Data(
                "non-finite float cannot be written (NonFiniteFloatStrategy::Fail)".to_string(),
            )),
            NonFiniteFloatStrategy::Spell => Ok(spelled),
        }
    }
}

macro_rules! serialize_integer {
    ($($method:ident: $ty:ty,)*) => {
        $(
            fn $method(self, value: $ty) -> Result<String, CodingError> {
                Ok(itoa::Buffer::new().format(value).to_string())
            }
        )*
    };
}

impl Serializer for FieldSerializer {
    type Ok = String;
    type Error = CodingError;
    type SerializeSeq = Impossible<String, CodingError>;
    type SerializeTuple = Impossible<String, CodingError>;
    type SerializeTupleStruct = Impossible<String, CodingError>;
    type SerializeTupleVariant = Impossible<String, CodingError>;
    type SerializeMap = Impossible<String, CodingError>;
    type SerializeStruct = Impossible<String, CodingError>;
    type SerializeStructVariant = Impossible<String, CodingError>;

    fn serialize_bool(self, value: bool) -> Result<String, CodingError> {
        Ok(if value { "true" } else { "false" }.to_string())
    }

    serialize_integer! {
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_i64: i64,
        serialize_i128: i128,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64,
        serialize_u128: u128,
    }

    fn serialize_f32(self, value: f32) -> Result<String, CodingError> {
        self.float(value.is_finite(), ryu::Buffer::new().format(value).to_string())
    }

    fn serialize_f64(self, value: f64) -> Result<String, CodingError> {
        self.float(value.is_finite(), ryu::Buffer::new().format(value).to_string())
    }

    fn serialize_char(self, value: char) -> Result<String, CodingError> {
        Ok(value.to_string())
    }

    fn serialize_str(self, value: &str) -> Result<String, CodingError> {
        Ok(value.to_string())
    }

    fn serialize_bytes(self, _value: &[u8]) -> Result<String, CodingError> {
        Err(CodingError::Data(
            "binary fields are not supported".to_string(),
        ))
    }

    /// Nil is the empty field.
    fn serialize_none(self) -> Result<String, CodingError> {
        Ok(String::new())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<String, CodingError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<String, CodingError> {
        Ok(String::new())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String, CodingError> {
        Ok(String::new())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<String, CodingError> {
        Ok(variant.to_string())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<String, CodingError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String, CodingError> {
        Err(CodingError::InvalidContainer)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, CodingError> {
        Err(CodingError::InvalidContainer)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, CodingError> {
        Err(CodingError::InvalidContainer)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, CodingError> {
        Err(CodingError::InvalidContainer)
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

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, CodingError> {
        Err(CodingError::InvalidContainer)
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, CodingError> {
        Err(CodingError::InvalidContainer)
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

/// A coding key at row depth: a header name or a column index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Key {
    Name(String),
    Index(usize),
}

/// Classifies serialized map keys. Anything that is not a string, a char
/// or a non-negative integer is not addressable in a CSV row.
pub(crate) struct KeySerializer;

fn bad_key() -> CodingError {
    CodingError::InvalidPath("coding key must be a string or an integer".to_string())
}

macro_rules! serialize_index_key {
    ($($method:ident: $ty:ty,)*) => {
        $(
            fn $method(self, value: $ty) -> Result<Key, CodingError> {
                usize::try_from(value)
                    .map(Key::Index)
                    .map_err(|_| bad_key())
            }
        )*
    };
}

impl Serializer for KeySerializer {
    type Ok = Key;
    type Error = CodingError;
    type SerializeSeq = Impossible<Key, CodingError>;
    type SerializeTuple = Impossible<Key, CodingError>;
    type SerializeTupleStruct = Impossible<Key, CodingError>;
    type SerializeTupleVariant = Impossible<Key, CodingError>;
    type SerializeMap = Impossible<Key, CodingError>;
    type SerializeStruct = Impossible<Key, CodingError>;
    type SerializeStructVariant = Impossible<Key, CodingError>;

    fn serialize_str(self, value: &str) -> Result<Key, CodingError> {
        Ok(Key::Name(value.to_string()))
    }

    fn serialize_char(self, value: char) -> Result<Key, CodingError> {
        Ok(Key::Name(value.to_string()))
    }

    serialize_index_key! {
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_i64: i64,
        serialize_i128: i128,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64,
        serialize_u128: u128,
    }

    fn serialize_bool(self, _value: bool) -> Result<Key, CodingError> {
        Err(bad_key())
    }

    fn serialize_f32(self, _value: f32) -> Result<Key, CodingError> {
        Err(bad_key())
    }

    fn serialize_f64(self, _value: f64) -> Result<Key, CodingError> {
        Err(bad_key())
    }

    fn serialize_bytes(self, _value: &[u8]) -> Result<Key, CodingError> {
        Err(bad_key())
    }

    fn serialize_none(self) -> Result<Key, CodingError> {
        Err(bad_key())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Key, CodingError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Key, CodingError> {
        Err(bad_key())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Key, CodingError> {
        Err(bad_key())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Key, CodingError> {
        Ok(Key::Name(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Key, CodingError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Key, CodingError> {
        Err(bad_key())
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, CodingError> {
        Err(bad_key())
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, CodingError> {
        Err(bad_key())
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, CodingError> {
        Err(bad_key())
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, CodingError> {
        Err(bad_key())
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, CodingError> {
        Err(bad_key())
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, CodingError> {
        Err(bad_key())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, CodingError> {
        Err(bad_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render<T: Serialize>(value: T) -> Result<String, CodingError> {
        FieldSerializer::render(&value, EncodeOptions::default())
    }

    #[test]
    fn test_scalars() {
        assert_eq!(render(42i32).unwrap(), "42");
        assert_eq!(render(-7i64).unwrap(), "-7");
        assert_eq!(render(250u8).unwrap(), "250");
        assert_eq!(render(true).unwrap(), "true");
        assert_eq!(render('x').unwrap(), "x");
        assert_eq!(render("text").unwrap(), "text");
        assert_eq!(render(2.5f64).unwrap(), "2.5");
    }

    #[test]
    fn test_none_and_unit_are_empty() {
        assert_eq!(render(Option::<i32>::None).unwrap(), "");
        assert_eq!(render(()).unwrap(), "");
        assert_eq!(render(Some(3)).unwrap(), "3");
    }

    #[test]
    fn test_non_finite_fails_by_default() {
        assert!(render(f64::NAN).is_err());
        assert!(render(f64::INFINITY).is_err());
    }

    #[test]
    fn test_non_finite_spelled() {
        let options = EncodeOptions {
            non_finite: NonFiniteFloatStrategy::Spell,
        };
        assert_eq!(
            FieldSerializer::render(&f64::INFINITY, options).unwrap(),
            "inf"
        );
        assert_eq!(FieldSerializer::render(&f64::NAN, options).unwrap(), "NaN");
    }

    #[test]
    fn test_nested_container_in_field_fails() {
        assert!(matches!(
            render(vec![1, 2]),
            Err(CodingError::InvalidContainer)
        ));
    }

    #[test]
    fn test_keys() {
        assert_eq!(
            "name".serialize(KeySerializer).unwrap(),
            Key::Name("name".to_string())
        );
        assert_eq!(3u32.serialize(KeySerializer).unwrap(), Key::Index(3));
        assert!( (-1i32).serialize(KeySerializer).is_err());
        assert!(true.serialize(KeySerializer).is_err());
    }
}
