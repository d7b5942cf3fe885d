//! Spreading of user data into an argument list.
//!
//! `emit("event", &(1, "a"))` sends two arguments, `emit("event", &())` sends none and any other
//! value is sent as a single argument. A serde serializer only answers the question
//! "is the top level value a tuple or a unit?". Each tuple element is then handed to the
//! strategy to become its own opaque fragment.
use serde::{
    Serialize,
    ser::{self, Impossible},
};

use crate::{
    Value,
    parser::{Parse, ParserError},
};

/// Turn `data` into a list of argument fragments with the given strategy.
///
/// Tuples and fixed size arrays are spread, `()` gives an empty list, everything else is one argument.
pub fn to_args<P: Parse, T: ?Sized + Serialize>(
    parser: &P,
    data: &T,
) -> Result<Vec<Value>, ParserError> {
    match data.serialize(ArgsSerializer { parser }) {
        Ok(values) => Ok(values),
        Err(ArgsError::NotSpread) => Ok(vec![parser.encode_value(data)?]),
        Err(ArgsError::Parser(e)) => Err(e),
        Err(ArgsError::Custom(msg)) => Err(ParserError::new(ArgsError::Custom(msg))),
    }
}

#[derive(Debug, thiserror::Error)]
enum ArgsError {
    #[error("value is not spreadable")]
    NotSpread,
    #[error("{0}")]
    Parser(ParserError),
    #[error("{0}")]
    Custom(String),
}

impl ser::Error for ArgsError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        ArgsError::Custom(msg.to_string())
    }
}

struct ArgsSerializer<'a, P> {
    parser: &'a P,
}

struct TupleCollector<'a, P> {
    parser: &'a P,
    values: Vec<Value>,
}

impl<P: Parse> ser::SerializeTuple for TupleCollector<'_, P> {
    type Ok = Vec<Value>;
    type Error = ArgsError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        let value = self.parser.encode_value(value).map_err(ArgsError::Parser)?;
        self.values.push(value);
        Ok(())
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        Ok(self.values)
    }
}

macro_rules! not_spread {
    ($($fn:ident: $ty:ty),* $(,)?) => {
        $(
            fn $fn(self, _: $ty) -> Result<Self::Ok, Self::Error> {
                Err(ArgsError::NotSpread)
            }
        )*
    };
}

impl<'a, P: Parse> ser::Serializer for ArgsSerializer<'a, P> {
    type Ok = Vec<Value>;
    type Error = ArgsError;
    type SerializeSeq = Impossible<Vec<Value>, ArgsError>;
    type SerializeTuple = TupleCollector<'a, P>;
    type SerializeTupleStruct = Impossible<Vec<Value>, ArgsError>;
    type SerializeTupleVariant = Impossible<Vec<Value>, ArgsError>;
    type SerializeMap = Impossible<Vec<Value>, ArgsError>;
    type SerializeStruct = Impossible<Vec<Value>, ArgsError>;
    type SerializeStructVariant = Impossible<Vec<Value>, ArgsError>;

    not_spread!(
        serialize_bool: bool,
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_i64: i64,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64,
        serialize_f32: f32,
        serialize_f64: f64,
        serialize_char: char,
        serialize_str: &str,
        serialize_bytes: &[u8],
        serialize_unit_struct: &'static str,
    );

    fn serialize_unit(self) -> Result<Self::Ok, Self::Error> {
        Ok(Vec::new())
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        Ok(TupleCollector {
            parser: self.parser,
            values: Vec::with_capacity(len),
        })
    }

    fn serialize_none(self) -> Result<Self::Ok, Self::Error> {
        Err(ArgsError::NotSpread)
    }
    fn serialize_some<T: ?Sized + Serialize>(self, _: &T) -> Result<Self::Ok, Self::Error> {
        Err(ArgsError::NotSpread)
    }
    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
    ) -> Result<Self::Ok, Self::Error> {
        Err(ArgsError::NotSpread)
    }
    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: &T,
    ) -> Result<Self::Ok, Self::Error> {
        Err(ArgsError::NotSpread)
    }
    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: &T,
    ) -> Result<Self::Ok, Self::Error> {
        Err(ArgsError::NotSpread)
    }
    fn serialize_seq(self, _: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Err(ArgsError::NotSpread)
    }
    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        Err(ArgsError::NotSpread)
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        Err(ArgsError::NotSpread)
    }
    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Err(ArgsError::NotSpread)
    }
    fn serialize_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        Err(ArgsError::NotSpread)
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        Err(ArgsError::NotSpread)
    }
}
