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

//! Text codec strategies.
//!
//! Revision 3 carries event payloads as a bare JSON array:
//! ```text
//! 4<sub-type>[<namespace>,][<ack id>]["<event>",<arg>...]
//! ```
//! Revision 4 wraps them in a JSON object:
//! ```text
//! 4<sub-type>{"type":<n>,"data":["<event>",<arg>...],"nsp":"/","id":<n>}
//! ```
//! Arguments are kept as raw JSON fragments sliced out of the received frame.
use serde::{Serialize, de::DeserializeOwned};
use sockwire_core::{
    Frame, Str, Value,
    frame::{self, EngineFrame, FrameHeader},
    packet::Packet,
    parser::{Parse, ParseError, ParserError},
};

mod de;
mod ser;

/// Revision 3 text strategy (array grammar).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextV3Parser;

/// Revision 4 text strategy (object grammar).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextV4Parser;

fn decode_text(
    frame: Frame,
    message: fn(Str) -> Result<Packet, ParseError>,
) -> Result<Packet, ParseError> {
    let data = match frame {
        Frame::Text(data) => data,
        Frame::Binary(_) => return Err(ParseError::UnexpectedBinaryPacket),
    };
    match frame::decode_engine(data)? {
        EngineFrame::Control(inner) => Ok(Packet {
            inner,
            ns: Str::from(sockwire_core::packet::DEFAULT_NSP),
        }),
        EngineFrame::Message(data) => message(data),
    }
}

fn encode_text(packet: Packet, message: fn(Packet) -> Str) -> Frame {
    match frame::encode_control(&packet.inner) {
        Some(data) => Frame::Text(data),
        None => Frame::Text(message(packet)),
    }
}

fn peek_text(frame: &Frame) -> Result<FrameHeader, ParseError> {
    match frame {
        Frame::Text(data) => FrameHeader::from_text(data),
        Frame::Binary(_) => Err(ParseError::UnexpectedBinaryPacket),
    }
}

fn encode_value<T: ?Sized + Serialize>(data: &T) -> Result<Value, ParserError> {
    let data = serde_json::to_string(data).map_err(ParserError::new)?;
    Ok(Value::Str(Str::from(data)))
}

fn decode_value<T: DeserializeOwned>(value: &Value) -> Result<T, ParserError> {
    match value {
        Value::Str(data) => serde_json::from_str(data).map_err(ParserError::new),
        Value::Bytes(_) => Err(ParserError::new(ParseError::UnexpectedBinaryPacket)),
    }
}

fn decode_seq<T: DeserializeOwned>(values: &[Value]) -> Result<T, ParserError> {
    let mut buffer = String::with_capacity(values.iter().map(|v| v.len() + 1).sum::<usize>() + 2);
    buffer.push('[');
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            buffer.push(',');
        }
        match value {
            Value::Str(data) => buffer.push_str(data),
            Value::Bytes(_) => return Err(ParserError::new(ParseError::UnexpectedBinaryPacket)),
        }
    }
    buffer.push(']');
    serde_json::from_str(&buffer).map_err(ParserError::new)
}

impl Parse for TextV3Parser {
    fn encode(&self, packet: Packet) -> Frame {
        encode_text(packet, ser::serialize_array)
    }

    fn decode(&self, frame: Frame) -> Result<Packet, ParseError> {
        decode_text(frame, de::deserialize_array)
    }

    fn peek(&self, frame: &Frame) -> Result<FrameHeader, ParseError> {
        peek_text(frame)
    }

    fn encode_value<T: ?Sized + Serialize>(&self, data: &T) -> Result<Value, ParserError> {
        encode_value(data)
    }

    fn decode_value<T: DeserializeOwned>(&self, value: &Value) -> Result<T, ParserError> {
        decode_value(value)
    }

    fn decode_seq<T: DeserializeOwned>(&self, values: &[Value]) -> Result<T, ParserError> {
        decode_seq(values)
    }
}

impl Parse for TextV4Parser {
    fn encode(&self, packet: Packet) -> Frame {
        encode_text(packet, ser::serialize_object)
    }

    fn decode(&self, frame: Frame) -> Result<Packet, ParseError> {
        decode_text(frame, de::deserialize_object)
    }

    fn peek(&self, frame: &Frame) -> Result<FrameHeader, ParseError> {
        peek_text(frame)
    }

    fn encode_value<T: ?Sized + Serialize>(&self, data: &T) -> Result<Value, ParserError> {
        encode_value(data)
    }

    fn decode_value<T: DeserializeOwned>(&self, value: &Value) -> Result<T, ParserError> {
        decode_value(value)
    }

    fn decode_seq<T: DeserializeOwned>(&self, values: &[Value]) -> Result<T, ParserError> {
        decode_seq(values)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use sockwire_core::{
        Sid,
        args::to_args,
        frame::FrameClass,
        packet::{Header, PacketData},
    };

    use super::*;

    fn text(s: &'static str) -> Frame {
        Frame::Text(Str::from(s))
    }
    fn json(s: &'static str) -> Value {
        Value::Str(Str::from(s))
    }
    fn encode_v3(packet: Packet) -> String {
        match TextV3Parser.encode(packet) {
            Frame::Text(s) => s.into(),
            Frame::Binary(_) => panic!("text strategy produced a binary frame"),
        }
    }
    fn encode_v4(packet: Packet) -> String {
        match TextV4Parser.encode(packet) {
            Frame::Text(s) => s.into(),
            Frame::Binary(_) => panic!("text strategy produced a binary frame"),
        }
    }

    fn all_packets() -> Vec<Packet> {
        let header = Header {
            sid: Sid::from("AAAAAAAAAAAAAAAA"),
            upgrades: vec![],
            ping_interval: 30000,
            ping_timeout: 60000,
        };
        let args = || vec![json("1"), json("{\"id\":1,\"channel\":\"x\"}"), json("\"é\"")];
        vec![
            Packet::open(header),
            Packet::close(),
            Packet::ping(),
            Packet::pong(),
            Packet {
                inner: PacketData::Upgrade,
                ns: Str::from("/"),
            },
            Packet::connect(None),
            Packet::connect(Some(json("{\"sid\":\"abc\"}"))),
            Packet::disconnect(),
            Packet::event("message", args()),
            Packet::event("message", vec![]),
            Packet {
                inner: PacketData::Event(Str::from("ping"), args(), Some(0)),
                ns: Str::from("/"),
            },
            Packet {
                inner: PacketData::Event(Str::from("with \"quotes\""), args(), Some(42)),
                ns: Str::from("/"),
            },
            Packet::ack(args(), 0),
            Packet::ack(vec![], 7),
            Packet::connect_error("not authorized"),
            Packet {
                inner: PacketData::BinaryEvent(Str::from("bin"), args(), None),
                ns: Str::from("/"),
            },
            Packet {
                inner: PacketData::BinaryAck(args(), 3),
                ns: Str::from("/"),
            },
            Packet::event("message", args()).with_ns("/admin"),
        ]
    }

    #[test]
    fn round_trip_every_kind() {
        for packet in all_packets() {
            let frame = TextV3Parser.encode(packet.clone());
            assert_eq!(TextV3Parser.decode(frame).unwrap(), packet);
            let frame = TextV4Parser.encode(packet.clone());
            assert_eq!(TextV4Parser.decode(frame).unwrap(), packet);
        }
    }

    #[test]
    fn v3_wire_format() {
        assert_eq!(encode_v3(Packet::connect(None)), "40");
        assert_eq!(encode_v3(Packet::disconnect()), "41");
        assert_eq!(
            encode_v3(Packet::event("message", vec![json("1"), json("\"x\"")])),
            "42[\"message\",1,\"x\"]"
        );
        let mut packet = Packet::event("ping", vec![]);
        packet.inner.set_ack_id(12);
        assert_eq!(encode_v3(packet), "4212[\"ping\"]");
        assert_eq!(
            encode_v3(Packet::ack(vec![json("1"), json("\"pong\"")], 12)),
            "4312[1,\"pong\"]"
        );
        assert_eq!(
            encode_v3(Packet::event("a", vec![]).with_ns("/admin")),
            "42/admin,[\"a\"]"
        );
        assert_eq!(
            encode_v3(Packet::connect_error("nope")),
            "44{\"message\":\"nope\"}"
        );
    }

    #[test]
    fn v4_wire_format() {
        assert_eq!(encode_v4(Packet::connect(None)), "40{\"type\":0,\"nsp\":\"/\"}");
        assert_eq!(
            encode_v4(Packet::event("message", vec![json("1")])),
            "42{\"type\":2,\"data\":[\"message\",1],\"nsp\":\"/\"}"
        );
        let mut packet = Packet::event("ping", vec![]);
        packet.inner.set_ack_id(0);
        assert_eq!(
            encode_v4(packet),
            "42{\"type\":2,\"data\":[\"ping\"],\"nsp\":\"/\",\"id\":0}"
        );
        assert_eq!(
            encode_v4(Packet::ack(vec![json("1"), json("\"pong\"")], 5)),
            "43{\"type\":3,\"data\":[1,\"pong\"],\"nsp\":\"/\",\"id\":5}"
        );
    }

    #[test]
    fn v4_accepts_array_grammar_and_bare_connect_payload() {
        let packet = TextV4Parser.decode(text("421[\"ping\",true]")).unwrap();
        assert_eq!(
            packet.inner,
            PacketData::Event(Str::from("ping"), vec![json("true")], Some(1))
        );
        let packet = TextV4Parser.decode(text("40{\"sid\":\"abc\"}")).unwrap();
        assert_eq!(packet.inner, PacketData::Connect(Some(json("{\"sid\":\"abc\"}"))));
        let packet = TextV4Parser.decode(text("40")).unwrap();
        assert_eq!(packet.inner, PacketData::Connect(None));
    }

    #[test]
    fn whitespace_around_arguments_is_trimmed() {
        let packet = TextV3Parser.decode(text("42[ \"ev\" , 1 , {\"a\": 2} ]")).unwrap();
        assert_eq!(
            packet.inner,
            PacketData::Event(Str::from("ev"), vec![json("1"), json("{\"a\": 2}")], None)
        );
    }

    #[test]
    fn binary_attachment_count_is_skipped() {
        let packet = TextV3Parser
            .decode(text("451-[\"bin\",{\"_placeholder\":true,\"num\":0}]"))
            .unwrap();
        assert_eq!(packet.kind(), sockwire_core::packet::PacketKind::BinaryEvent);
    }

    #[test]
    fn unbalanced_payload_is_malformed() {
        for parser_result in [
            TextV3Parser.decode(text("42[\"foo\"")),
            TextV4Parser.decode(text("42[\"foo\"")),
            TextV4Parser.decode(text("42{\"type\":2,\"data\":[\"foo\"")),
            TextV3Parser.decode(text("43[1,2")),
        ] {
            assert!(matches!(parser_result, Err(ParseError::InvalidPayload(_))));
        }
    }

    #[test]
    fn invalid_prefix_is_malformed() {
        assert!(matches!(
            TextV3Parser.decode(text("9")),
            Err(ParseError::InvalidPacketType(Some(b'9')))
        ));
        assert!(matches!(
            TextV3Parser.decode(text("48[\"a\"]")),
            Err(ParseError::InvalidPacketType(Some(b'8')))
        ));
        assert!(matches!(
            TextV3Parser.decode(text("")),
            Err(ParseError::InvalidPacketType(None))
        ));
        assert!(matches!(
            TextV4Parser.decode(text("42{\"type\":3,\"data\":[\"a\"],\"nsp\":\"/\"}")),
            Err(ParseError::InvalidPacketType(Some(b'2')))
        ));
        assert!(matches!(
            TextV3Parser.decode(Frame::Binary(bytes::Bytes::from_static(b"\x04"))),
            Err(ParseError::UnexpectedBinaryPacket)
        ));
    }

    #[test]
    fn invalid_ack_id_is_malformed() {
        assert!(matches!(
            TextV3Parser.decode(text("421x[\"a\"]")),
            Err(ParseError::InvalidAckId)
        ));
        assert!(matches!(
            TextV3Parser.decode(text("4299999999999999999999[\"a\"]")),
            Err(ParseError::InvalidAckId)
        ));
        assert!(matches!(
            TextV3Parser.decode(text("43[1]")),
            Err(ParseError::InvalidAckId)
        ));
        assert!(matches!(
            TextV4Parser.decode(text("42{\"type\":2,\"data\":[\"a\"],\"nsp\":\"/\",\"id\":-1}")),
            Err(ParseError::InvalidAckId)
        ));
        assert!(matches!(
            TextV4Parser.decode(text("42{\"type\":2,\"data\":[\"a\"],\"nsp\":\"/\",\"id\":1.5}")),
            Err(ParseError::InvalidAckId)
        ));
    }

    #[test]
    fn event_name_must_be_a_string() {
        assert!(matches!(
            TextV3Parser.decode(text("42[1,2]")),
            Err(ParseError::InvalidEventName)
        ));
        assert!(matches!(
            TextV3Parser.decode(text("42[]")),
            Err(ParseError::InvalidEventName)
        ));
    }

    #[test]
    fn peek_reads_leading_bytes_only() {
        // The payload is broken but the class is still readable
        let header = TextV3Parser.peek(&text("42[\"foo\"")).unwrap();
        assert_eq!(header.class, FrameClass::Message);
        assert_eq!(header.sub_type, Some(2));
        let header = TextV4Parser.peek(&text("3")).unwrap();
        assert_eq!(header.class, FrameClass::Pong);
    }

    #[derive(Debug, Default, PartialEq, Deserialize, Serialize)]
    struct Message {
        id: u32,
        channel: String,
    }

    #[test]
    fn values_and_sequences() {
        let msg = Message {
            id: 1,
            channel: "x".into(),
        };
        let value = TextV4Parser.encode_value(&msg).unwrap();
        assert_eq!(value, json("{\"id\":1,\"channel\":\"x\"}"));
        assert_eq!(TextV4Parser.decode_value::<Message>(&value).unwrap(), msg);

        let values = vec![json("1"), json("\"pong\"")];
        let (n, s): (i32, String) = TextV3Parser.decode_seq(&values).unwrap();
        assert_eq!((n, s.as_str()), (1, "pong"));
        assert!(TextV3Parser.decode_value::<i32>(&json("\"nan\"")).is_err());
    }

    #[test]
    fn args_spreading() {
        let p = TextV3Parser;
        assert_eq!(to_args(&p, &()).unwrap(), vec![]);
        assert_eq!(to_args(&p, &(1, "a")).unwrap(), vec![json("1"), json("\"a\"")]);
        assert_eq!(to_args(&p, &"a").unwrap(), vec![json("\"a\"")]);
        assert_eq!(to_args(&p, &vec![1, 2]).unwrap(), vec![json("[1,2]")]);
        assert_eq!(
            to_args(
                &p,
                &Message {
                    id: 1,
                    channel: "x".into()
                }
            )
            .unwrap(),
            vec![json("{\"id\":1,\"channel\":\"x\"}")]
        );
        assert_eq!(to_args(&p, &None::<i32>).unwrap(), vec![json("null")]);
    }
}
