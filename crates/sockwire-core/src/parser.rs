//! The codec strategy contract.
//!
//! One implementation exists per (protocol version, encoding) pair. The channel picks one at handshake
//! time and uses it for every frame and every argument value of its lifetime.
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    Value,
    frame::{Frame, FrameHeader},
    packet::Packet,
};

/// All codec strategies implement this trait.
pub trait Parse: Default + Copy + Send + Sync + 'static {
    /// Convert a packet into the frame to be sent
    fn encode(&self, packet: Packet) -> Frame;

    /// Decode a whole frame. On failure nothing of the frame is returned.
    fn decode(&self, frame: Frame) -> Result<Packet, ParseError>;

    /// Read the engine class and message sub-type from the leading bytes of a frame
    fn peek(&self, frame: &Frame) -> Result<FrameHeader, ParseError>;

    /// Serialize one argument into an opaque fragment
    fn encode_value<T: ?Sized + Serialize>(&self, data: &T) -> Result<Value, ParserError>;

    /// Deserialize one opaque fragment
    fn decode_value<T: DeserializeOwned>(&self, value: &Value) -> Result<T, ParserError>;

    /// Deserialize a sequence of fragments as if they were a single array,
    /// e.g. into a tuple or a `Vec`
    fn decode_seq<T: DeserializeOwned>(&self, values: &[Value]) -> Result<T, ParserError>;
}

/// A frame could not be decoded. The peer is considered to have violated the protocol.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Unknown engine class or message sub-type
    #[error("invalid packet type: {0:?}")]
    InvalidPacketType(Option<u8>),

    /// A declared ack id is not a non-negative integer
    #[error("invalid ack id")]
    InvalidAckId,

    /// The first element of an event payload is not a string
    #[error("invalid event name")]
    InvalidEventName,

    /// The payload structure is invalid, e.g. an unbalanced JSON array
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The open packet does not carry a valid handshake header
    #[error("invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Received a binary frame on a text channel
    #[error(
        "received unexpected binary data. Make sure you are using the same encoding on both ends."
    )]
    UnexpectedBinaryPacket,

    /// Received a text message frame on a binary channel
    #[error(
        "received unexpected string data. Make sure you are using the same encoding on both ends."
    )]
    UnexpectedStringPacket,
}

/// A value could not be serialized or deserialized.
#[derive(thiserror::Error, Debug)]
#[error("parser error: {inner}")]
pub struct ParserError {
    inner: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl ParserError {
    /// Wrap a serde backend error
    pub fn new<E: std::error::Error + Send + Sync + 'static>(inner: E) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }
}
