//! The logical protocol unit.
//!
//! A [`Packet`] is what every codec strategy encodes to and decodes from a [`Frame`](crate::Frame).
//! Engine level packets (open, close, ping, pong, upgrade) and message packets (connect, event, ack...)
//! share the same enum so the channel can match on a single type.
use serde::{Deserialize, Serialize};

use crate::{Sid, Str, Value};

/// A packet and the namespace it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// The packet data
    pub inner: PacketData,
    /// The namespace the packet belongs to. Engine level packets always use `/`.
    pub ns: Str,
}

/// The default namespace
pub const DEFAULT_NSP: &str = "/";

impl Packet {
    fn new(inner: PacketData) -> Self {
        Self {
            inner,
            ns: Str::from(DEFAULT_NSP),
        }
    }

    /// Handshake packet carrying the session [`Header`]
    pub fn open(header: Header) -> Self {
        Self::new(PacketData::Open(header))
    }
    /// Engine close packet
    pub fn close() -> Self {
        Self::new(PacketData::Close)
    }
    /// Heartbeat request
    pub fn ping() -> Self {
        Self::new(PacketData::Ping)
    }
    /// Heartbeat response
    pub fn pong() -> Self {
        Self::new(PacketData::Pong)
    }

    /// Connect packet on the default namespace with an optional payload
    pub fn connect(value: Option<Value>) -> Self {
        Self::new(PacketData::Connect(value))
    }
    /// Disconnect packet for the default namespace
    pub fn disconnect() -> Self {
        Self::new(PacketData::Disconnect)
    }
    /// Connect error packet with a message
    pub fn connect_error(message: impl Into<String>) -> Self {
        Self::new(PacketData::ConnectError(message.into()))
    }

    /// Event packet without ack id
    pub fn event(event: impl Into<Str>, args: Vec<Value>) -> Self {
        Self::new(PacketData::Event(event.into(), args, None))
    }
    /// Ack response packet for the given ack id
    pub fn ack(args: Vec<Value>, ack: u64) -> Self {
        Self::new(PacketData::EventAck(args, ack))
    }

    /// Move the packet to another namespace
    pub fn with_ns(mut self, ns: impl Into<Str>) -> Self {
        self.ns = ns.into();
        self
    }

    /// The [`PacketKind`] of this packet
    pub fn kind(&self) -> PacketKind {
        self.inner.kind()
    }
}

/// Engine.io handshake payload, sent once in the open packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    /// The session id
    pub sid: Sid,
    /// Transports the session may upgrade to
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Ping interval in milliseconds
    pub ping_interval: u64,
    /// Ping timeout in milliseconds
    pub ping_timeout: u64,
}

/// Payload of the connect packet sent by a server after the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectPacket {
    /// The session id
    pub sid: Sid,
}

/// | Variant       | Class | Sub-type |
/// |---------------|-------|----------|
/// | Open          | 0     |          |
/// | Close         | 1     |          |
/// | Ping          | 2     |          |
/// | Pong          | 3     |          |
/// | Connect       | 4     | 0        |
/// | Disconnect    | 4     | 1        |
/// | Event         | 4     | 2        |
/// | EventAck      | 4     | 3        |
/// | ConnectError  | 4     | 4        |
/// | BinaryEvent   | 4     | 5        |
/// | BinaryAck     | 4     | 6        |
/// | Upgrade       | 5     |          |
#[derive(Debug, Clone, PartialEq)]
pub enum PacketData {
    /// Handshake header
    Open(Header),
    /// Engine close
    Close,
    /// Heartbeat request
    Ping,
    /// Heartbeat response
    Pong,
    /// Transport upgrade
    Upgrade,
    /// Connect packet with optional payload
    Connect(Option<Value>),
    /// Disconnect from the namespace
    Disconnect,
    /// Event name, arguments and an optional ack id requesting a response
    Event(Str, Vec<Value>, Option<u64>),
    /// Response values to the ack request with the given id
    EventAck(Vec<Value>, u64),
    /// Connect error with a message
    ConnectError(String),
    /// Binary event. The arguments are carried like a regular event.
    BinaryEvent(Str, Vec<Value>, Option<u64>),
    /// Binary ack. The values are carried like a regular ack.
    BinaryAck(Vec<Value>, u64),
}

impl PacketData {
    /// Message sub-type index, `None` for engine level packets
    pub fn index(&self) -> Option<u8> {
        match self {
            PacketData::Connect(_) => Some(0),
            PacketData::Disconnect => Some(1),
            PacketData::Event(..) => Some(2),
            PacketData::EventAck(..) => Some(3),
            PacketData::ConnectError(_) => Some(4),
            PacketData::BinaryEvent(..) => Some(5),
            PacketData::BinaryAck(..) => Some(6),
            PacketData::Open(_)
            | PacketData::Close
            | PacketData::Ping
            | PacketData::Pong
            | PacketData::Upgrade => None,
        }
    }

    /// The ack id if this packet takes part in request/response correlation
    pub fn ack_id(&self) -> Option<u64> {
        match self {
            PacketData::Event(_, _, ack) | PacketData::BinaryEvent(_, _, ack) => *ack,
            PacketData::EventAck(_, ack) | PacketData::BinaryAck(_, ack) => Some(*ack),
            _ => None,
        }
    }

    /// Set the ack id for the packet
    /// It will only set the ack id for the packets that support it
    pub fn set_ack_id(&mut self, ack_id: u64) {
        match self {
            PacketData::Event(_, _, ack) | PacketData::BinaryEvent(_, _, ack) => {
                *ack = Some(ack_id)
            }
            PacketData::EventAck(_, ack) | PacketData::BinaryAck(_, ack) => *ack = ack_id,
            _ => {}
        };
    }

    /// Check if the packet is a binary packet (either binary event or binary ack)
    pub fn is_binary(&self) -> bool {
        matches!(self, PacketData::BinaryEvent(..) | PacketData::BinaryAck(..))
    }

    /// The logical kind of the packet
    pub fn kind(&self) -> PacketKind {
        match self {
            PacketData::Open(_) => PacketKind::Open,
            PacketData::Close => PacketKind::Close,
            PacketData::Ping => PacketKind::Ping,
            PacketData::Pong => PacketKind::Pong,
            PacketData::Upgrade => PacketKind::Upgrade,
            PacketData::Connect(_) => PacketKind::Connect,
            PacketData::Disconnect => PacketKind::Disconnect,
            PacketData::Event(_, _, None) => PacketKind::Event,
            PacketData::Event(_, _, Some(_)) => PacketKind::AckRequest,
            PacketData::EventAck(..) => PacketKind::AckResponse,
            PacketData::ConnectError(_) => PacketKind::ConnectError,
            PacketData::BinaryEvent(..) => PacketKind::BinaryEvent,
            PacketData::BinaryAck(..) => PacketKind::BinaryAck,
        }
    }
}

/// Flat classification of a packet, as used in logs and frame peeking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Handshake
    Open,
    /// Engine close
    Close,
    /// Heartbeat request
    Ping,
    /// Heartbeat response
    Pong,
    /// Transport upgrade
    Upgrade,
    /// Namespace connect
    Connect,
    /// Namespace disconnect
    Disconnect,
    /// Event without ack id
    Event,
    /// Event with an ack id
    AckRequest,
    /// Response to an ack request
    AckResponse,
    /// Namespace connect failure
    ConnectError,
    /// Binary event
    BinaryEvent,
    /// Binary ack
    BinaryAck,
}
