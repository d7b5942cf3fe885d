#![warn(
    clippy::all,
    clippy::todo,
    clippy::empty_enum,
    clippy::mem_forget,
    clippy::unused_self,
    clippy::filter_map_next,
    clippy::needless_continue,
    clippy::needless_borrow,
    clippy::match_wildcard_for_single_variants,
    clippy::if_let_mutex,
    clippy::await_holding_lock,
    clippy::imprecise_flops,
    clippy::suboptimal_flops,
    clippy::lossy_float_literal,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::fn_params_excessive_bools,
    clippy::exit,
    clippy::inefficient_to_string,
    clippy::linkedlist,
    clippy::macro_use_imports,
    clippy::option_option,
    clippy::verbose_file_reads,
    clippy::unnested_or_patterns,
    rust_2018_idioms,
    rust_2024_compatibility,
    future_incompatible,
    nonstandard_style,
    missing_docs
)]

//! msgpack codec strategy.
//!
//! Message packets are encoded as a msgpack map and sent in binary frames:
//! ```text
//! { "type": 2, "nsp": "/", "data": ["event", ...], "id": 1 }
//! ```
//! Revision 3 prefixes the map with the engine message class byte `0x04`,
//! revision 4 sends the bare map. Engine control frames (open, ping, pong...) stay in text.
//!
//! Arguments are kept as raw msgpack fragments sliced out of the received frame.
use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use sockwire_core::{
    Frame, ProtocolVersion, Str, Value,
    frame::{self, EngineFrame, FrameClass, FrameHeader},
    packet::{DEFAULT_NSP, Packet},
    parser::{Parse, ParseError, ParserError},
};

mod de;
mod ser;

/// Engine message class carried as a raw byte by revision 3 binary frames
const MESSAGE_PREFIX: u8 = 0x04;

/// msgpack strategy for one protocol revision.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MsgPackParser {
    version: ProtocolVersion,
}

impl MsgPackParser {
    /// Create a msgpack strategy for the given protocol revision.
    pub fn new(version: ProtocolVersion) -> Self {
        Self { version }
    }

    /// The protocol revision of this strategy
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    fn prefix(&self) -> Option<u8> {
        match self.version {
            ProtocolVersion::V3 => Some(MESSAGE_PREFIX),
            ProtocolVersion::V4 => None,
        }
    }

    /// Remove the engine prefix of a binary frame, if this revision has one
    fn strip_prefix(&self, data: Bytes) -> Result<Bytes, ParseError> {
        match (self.prefix(), data.first()) {
            (None, _) => Ok(data),
            (Some(prefix), Some(b)) if *b == prefix => Ok(data.slice(1..)),
            (Some(_), b) => Err(ParseError::InvalidPacketType(b.copied())),
        }
    }
}

impl Parse for MsgPackParser {
    fn encode(&self, packet: Packet) -> Frame {
        match frame::encode_control(&packet.inner) {
            Some(data) => Frame::Text(data),
            None => Frame::Binary(ser::serialize_packet(packet, self.prefix())),
        }
    }

    fn decode(&self, frame: Frame) -> Result<Packet, ParseError> {
        match frame {
            Frame::Binary(data) => de::deserialize_packet(self.strip_prefix(data)?),
            Frame::Text(data) => match frame::decode_engine(data)? {
                EngineFrame::Control(inner) => Ok(Packet {
                    inner,
                    ns: Str::from(DEFAULT_NSP),
                }),
                EngineFrame::Message(_) => Err(ParseError::UnexpectedStringPacket),
            },
        }
    }

    fn peek(&self, frame: &Frame) -> Result<FrameHeader, ParseError> {
        let data = match frame {
            Frame::Text(data) => return FrameHeader::from_text(data),
            Frame::Binary(data) => data,
        };
        let data = match self.prefix() {
            Some(prefix) => match data.split_first() {
                Some((b, rest)) if *b == prefix => rest,
                b => return Err(ParseError::InvalidPacketType(b.map(|(b, _)| *b))),
            },
            None => &data[..],
        };
        // Every encoder puts the `type` key first, any other layout needs a full decode
        let sub_type = match data {
            [0x80..=0x8f, 0xa4, b't', b'y', b'p', b'e', ty @ 0..=6, ..] => Some(*ty),
            _ => None,
        };
        Ok(FrameHeader {
            class: FrameClass::Message,
            sub_type,
        })
    }

    fn encode_value<T: ?Sized + Serialize>(&self, data: &T) -> Result<Value, ParserError> {
        let data = rmp_serde::to_vec_named(data).map_err(ParserError::new)?;
        Ok(Value::Bytes(data.into()))
    }

    fn decode_value<T: DeserializeOwned>(&self, value: &Value) -> Result<T, ParserError> {
        match value {
            Value::Bytes(data) => rmp_serde::from_slice(data).map_err(ParserError::new),
            Value::Str(_) => Err(ParserError::new(ParseError::UnexpectedStringPacket)),
        }
    }

    fn decode_seq<T: DeserializeOwned>(&self, values: &[Value]) -> Result<T, ParserError> {
        let mut buff = Vec::with_capacity(values.iter().map(Value::len).sum::<usize>() + 5);
        rmp::encode::write_array_len(&mut buff, values.len() as u32).map_err(ParserError::new)?;
        for value in values {
            match value {
                Value::Bytes(data) => buff.extend_from_slice(data),
                Value::Str(_) => return Err(ParserError::new(ParseError::UnexpectedStringPacket)),
            }
        }
        rmp_serde::from_slice(&buff).map_err(ParserError::new)
    }
}
