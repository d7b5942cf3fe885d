//! Wire frames and the engine level framing shared by every codec strategy.
//!
//! Every frame starts with an engine class. Control frames (open, close, ping, pong, upgrade)
//! are always utf-8 text whatever the negotiated encoding:
//! ```text
//! 0{"sid":"...","upgrades":[],"pingInterval":25000,"pingTimeout":20000}
//! 1
//! 2
//! 3
//! 4<message sub-type>...
//! 5
//! ```
use bytes::Bytes;

use crate::{
    Str,
    packet::{Header, PacketData},
    parser::ParseError,
};

/// One unit read from or written to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// utf-8 text frame
    Text(Str),
    /// binary frame
    Binary(Bytes),
}

impl Frame {
    /// Size of the frame payload in bytes
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(s) => s.len(),
            Frame::Binary(b) => b.len(),
        }
    }
    /// Whether the frame payload is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&'static str> for Frame {
    fn from(value: &'static str) -> Self {
        Frame::Text(Str::from(value))
    }
}

/// Engine level class carried by the first byte of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameClass {
    /// `0`
    Open,
    /// `1`
    Close,
    /// `2`
    Ping,
    /// `3`
    Pong,
    /// `4`
    Message,
    /// `5`
    Upgrade,
}

impl FrameClass {
    /// Class from its ascii digit
    pub fn from_ascii(byte: u8) -> Option<Self> {
        match byte {
            b'0' => Some(FrameClass::Open),
            b'1' => Some(FrameClass::Close),
            b'2' => Some(FrameClass::Ping),
            b'3' => Some(FrameClass::Pong),
            b'4' => Some(FrameClass::Message),
            b'5' => Some(FrameClass::Upgrade),
            _ => None,
        }
    }

    /// Ascii digit of the class
    pub fn as_ascii(self) -> u8 {
        match self {
            FrameClass::Open => b'0',
            FrameClass::Close => b'1',
            FrameClass::Ping => b'2',
            FrameClass::Pong => b'3',
            FrameClass::Message => b'4',
            FrameClass::Upgrade => b'5',
        }
    }
}

/// The class (and message sub-type) of a frame, read from its leading bytes only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Engine class
    pub class: FrameClass,
    /// Message sub-type (`0..=6`) for message frames when it can be read without decoding
    pub sub_type: Option<u8>,
}

impl FrameHeader {
    /// Classify a text frame from its first two bytes.
    pub fn from_text(data: &str) -> Result<Self, ParseError> {
        let bytes = data.as_bytes();
        let class = bytes
            .first()
            .copied()
            .and_then(FrameClass::from_ascii)
            .ok_or(ParseError::InvalidPacketType(bytes.first().copied()))?;
        let sub_type = match class {
            FrameClass::Message => match bytes.get(1) {
                Some(b @ b'0'..=b'6') => Some(b - b'0'),
                b => return Err(ParseError::InvalidPacketType(b.copied())),
            },
            _ => None,
        };
        Ok(FrameHeader { class, sub_type })
    }
}

/// Result of the engine level decoding of a text frame.
#[derive(Debug)]
pub enum EngineFrame {
    /// A fully decoded control packet
    Control(PacketData),
    /// A message frame, with the remaining data after the `4` class digit
    Message(Str),
}

/// Encode an engine control packet into its text form.
///
/// Returns `None` for message packets that must go through a codec strategy.
pub fn encode_control(packet: &PacketData) -> Option<Str> {
    let s = match packet {
        PacketData::Open(header) => {
            // Serializing a struct of strings and integers cannot fail.
            let json = serde_json::to_string(header).unwrap_or_default();
            let mut s = String::with_capacity(json.len() + 1);
            s.push('0');
            s.push_str(&json);
            return Some(Str::from(s));
        }
        PacketData::Close => "1",
        PacketData::Ping => "2",
        PacketData::Pong => "3",
        PacketData::Upgrade => "5",
        _ => return None,
    };
    Some(Str::from(s))
}

/// Decode the engine level of a text frame.
///
/// A ping may carry a payload (`2probe`), it is ignored.
pub fn decode_engine(data: Str) -> Result<EngineFrame, ParseError> {
    let class = data
        .as_bytes()
        .first()
        .copied()
        .and_then(FrameClass::from_ascii)
        .ok_or(ParseError::InvalidPacketType(data.as_bytes().first().copied()))?;
    let packet = match class {
        FrameClass::Open => {
            let header: Header = serde_json::from_str(&data[1..])
                .map_err(|e| ParseError::InvalidHandshake(e.to_string()))?;
            PacketData::Open(header)
        }
        FrameClass::Close => PacketData::Close,
        FrameClass::Ping => PacketData::Ping,
        FrameClass::Pong => PacketData::Pong,
        FrameClass::Upgrade => PacketData::Upgrade,
        FrameClass::Message => return Ok(EngineFrame::Message(data.slice(1..))),
    };
    Ok(EngineFrame::Control(packet))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Sid;

    #[test]
    fn peek_text_classes() {
        let header = FrameHeader::from_text("2").unwrap();
        assert_eq!(header.class, FrameClass::Ping);
        assert_eq!(header.sub_type, None);

        let header = FrameHeader::from_text("421[\"ev\"]").unwrap();
        assert_eq!(header.class, FrameClass::Message);
        assert_eq!(header.sub_type, Some(2));

        assert!(matches!(
            FrameHeader::from_text("9"),
            Err(ParseError::InvalidPacketType(Some(b'9')))
        ));
        assert!(matches!(
            FrameHeader::from_text("47"),
            Err(ParseError::InvalidPacketType(Some(b'7')))
        ));
        assert!(matches!(
            FrameHeader::from_text(""),
            Err(ParseError::InvalidPacketType(None))
        ));
    }

    #[test]
    fn control_round_trip() {
        let header = Header {
            sid: Sid::from("AAAAAAAAAAAAAAAA"),
            upgrades: vec![],
            ping_interval: 30000,
            ping_timeout: 60000,
        };
        for packet in [
            PacketData::Open(header),
            PacketData::Close,
            PacketData::Ping,
            PacketData::Pong,
            PacketData::Upgrade,
        ] {
            let encoded = encode_control(&packet).unwrap();
            match decode_engine(encoded).unwrap() {
                EngineFrame::Control(decoded) => assert_eq!(decoded, packet),
                EngineFrame::Message(_) => panic!("control packet decoded as message"),
            }
        }
    }

    #[test]
    fn ping_probe_payload_is_ignored() {
        assert!(matches!(
            decode_engine(Str::from("2probe")).unwrap(),
            EngineFrame::Control(PacketData::Ping)
        ));
    }

    #[test]
    fn bad_handshake() {
        assert!(matches!(
            decode_engine(Str::from("0{\"sid\":")),
            Err(ParseError::InvalidHandshake(_))
        ));
    }

    #[test]
    fn message_keeps_remaining_data() {
        match decode_engine(Str::from("42[\"a\"]")).unwrap() {
            EngineFrame::Message(rest) => assert_eq!(rest, "2[\"a\"]"),
            EngineFrame::Control(p) => panic!("unexpected control packet {p:?}"),
        }
    }
}
