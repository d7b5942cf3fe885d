//! Opaque argument fragments.
use bytes::Bytes;

use crate::Str;

/// One serialized argument carried by an event or ack packet.
///
/// The codec never interprets a fragment. It is only turned into a concrete type once a handler
/// (or an ack caller) asks for one, through [`Parse::decode_value`](crate::parser::Parse::decode_value).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// A raw JSON text fragment, e.g. `{"id":1}` or `"hello"`
    Str(Str),
    /// A raw msgpack encoded fragment
    Bytes(Bytes),
}

impl Value {
    /// The fragment as json text, if it is one
    pub fn as_str(&self) -> Option<&Str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Bytes(_) => None,
        }
    }

    /// The fragment as msgpack bytes, if it is one
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Str(_) => None,
            Value::Bytes(b) => Some(b),
        }
    }

    /// Size of the raw fragment in bytes
    pub fn len(&self) -> usize {
        match self {
            Value::Str(s) => s.len(),
            Value::Bytes(b) => b.len(),
        }
    }

    /// Whether the raw fragment is empty. A well formed fragment never is.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
