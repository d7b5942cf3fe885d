//! Negotiated protocol version and wire encoding.
use std::{fmt, str::FromStr};

/// Protocol revision spoken on a channel.
///
/// It is chosen by the dialing side (the `EIO` query parameter) and fixed for the lifetime
/// of the channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ProtocolVersion {
    /// Revision 3: the client originates heartbeats, event payloads are bare JSON arrays.
    V3 = 3,
    /// Revision 4: the server originates heartbeats, event payloads are JSON objects.
    #[default]
    V4 = 4,
}

impl ProtocolVersion {
    /// Whether the server side sends the pings for this revision.
    pub fn server_pings(self) -> bool {
        self == ProtocolVersion::V4
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// Error when the `EIO` value is neither `3` nor `4`.
#[derive(Debug, thiserror::Error)]
#[error("unsupported protocol version: {0}")]
pub struct UnknownProtocolVersion(String);

impl FromStr for ProtocolVersion {
    type Err = UnknownProtocolVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "3" => Ok(ProtocolVersion::V3),
            "4" => Ok(ProtocolVersion::V4),
            s => Err(UnknownProtocolVersion(s.to_owned())),
        }
    }
}

/// Wire encoding of message frames.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    /// utf-8 JSON text frames
    #[default]
    Text,
    /// msgpack binary frames. Engine control frames stay textual.
    MsgPack,
}
