//! The codec strategies available to a channel.
//!
//! One strategy exists per (protocol version, encoding) pair. It is picked once when the channel
//! is created and reused for every frame and every argument value of its lifetime.
use serde::{Serialize, de::DeserializeOwned};
use sockwire_core::{
    Encoding, Frame, ProtocolVersion, Value,
    frame::FrameHeader,
    packet::Packet,
    parser::{Parse, ParseError, ParserError},
};
use sockwire_parser_common::{TextV3Parser, TextV4Parser};
use sockwire_parser_msgpack::MsgPackParser;

/// All the strategies.
/// It implements the [`Parse`] trait by delegating to the selected variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parser {
    /// Revision 3 text frames
    TextV3(TextV3Parser),
    /// Revision 4 text frames
    TextV4(TextV4Parser),
    /// msgpack binary frames, for either revision
    MsgPack(MsgPackParser),
}

impl Parser {
    /// Select the strategy for a protocol revision and a wire encoding
    pub fn new(protocol: ProtocolVersion, encoding: Encoding) -> Self {
        match (encoding, protocol) {
            (Encoding::Text, ProtocolVersion::V3) => Parser::TextV3(TextV3Parser),
            (Encoding::Text, ProtocolVersion::V4) => Parser::TextV4(TextV4Parser),
            (Encoding::MsgPack, protocol) => Parser::MsgPack(MsgPackParser::new(protocol)),
        }
    }

    /// The wire encoding of this strategy
    pub fn encoding(&self) -> Encoding {
        match self {
            Parser::TextV3(_) | Parser::TextV4(_) => Encoding::Text,
            Parser::MsgPack(_) => Encoding::MsgPack,
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Parser::TextV4(TextV4Parser)
    }
}

impl Parse for Parser {
    fn encode(&self, packet: Packet) -> Frame {
        match self {
            Parser::TextV3(p) => p.encode(packet),
            Parser::TextV4(p) => p.encode(packet),
            Parser::MsgPack(p) => p.encode(packet),
        }
    }

    fn decode(&self, frame: Frame) -> Result<Packet, ParseError> {
        let packet = match self {
            Parser::TextV3(p) => p.decode(frame),
            Parser::TextV4(p) => p.decode(frame),
            Parser::MsgPack(p) => p.decode(frame),
        };
        #[cfg(feature = "tracing")]
        tracing::trace!(?packet, "frame decoded");
        packet
    }

    fn peek(&self, frame: &Frame) -> Result<FrameHeader, ParseError> {
        match self {
            Parser::TextV3(p) => p.peek(frame),
            Parser::TextV4(p) => p.peek(frame),
            Parser::MsgPack(p) => p.peek(frame),
        }
    }

    fn encode_value<T: ?Sized + Serialize>(&self, data: &T) -> Result<Value, ParserError> {
        match self {
            Parser::TextV3(p) => p.encode_value(data),
            Parser::TextV4(p) => p.encode_value(data),
            Parser::MsgPack(p) => p.encode_value(data),
        }
    }

    fn decode_value<T: DeserializeOwned>(&self, value: &Value) -> Result<T, ParserError> {
        match self {
            Parser::TextV3(p) => p.decode_value(value),
            Parser::TextV4(p) => p.decode_value(value),
            Parser::MsgPack(p) => p.decode_value(value),
        }
    }

    fn decode_seq<T: DeserializeOwned>(&self, values: &[Value]) -> Result<T, ParserError> {
        match self {
            Parser::TextV3(p) => p.decode_seq(values),
            Parser::TextV4(p) => p.decode_seq(values),
            Parser::MsgPack(p) => p.decode_seq(values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_selection() {
        let p = Parser::new(ProtocolVersion::V3, Encoding::Text);
        assert_eq!(p, Parser::TextV3(TextV3Parser));
        let p = Parser::new(ProtocolVersion::V4, Encoding::MsgPack);
        assert_eq!(p, Parser::MsgPack(MsgPackParser::new(ProtocolVersion::V4)));
        assert_eq!(p.encoding(), Encoding::MsgPack);
        assert_eq!(Parser::default().encoding(), Encoding::Text);
    }

    #[test]
    fn event_round_trip_through_each_strategy() {
        for (protocol, encoding) in [
            (ProtocolVersion::V3, Encoding::Text),
            (ProtocolVersion::V4, Encoding::Text),
            (ProtocolVersion::V3, Encoding::MsgPack),
            (ProtocolVersion::V4, Encoding::MsgPack),
        ] {
            let parser = Parser::new(protocol, encoding);
            let args = vec![parser.encode_value(&1).unwrap(), parser.encode_value("x").unwrap()];
            let mut packet = Packet::event("message", args);
            packet.inner.set_ack_id(0);
            let decoded = parser.decode(parser.encode(packet.clone())).unwrap();
            assert_eq!(decoded, packet);
        }
    }
}
