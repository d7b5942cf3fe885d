use std::fmt;

use base64::Engine;
use rand::Rng;

use crate::Str;

/// A session id.
///
/// Ids generated locally are 16 url-safe base64 chars built from 96 random bits.
/// Ids learned from a remote handshake are kept as sent by the peer.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Sid(Str);

impl Sid {
    /// Generate a new random session id (base64 16 chars)
    pub fn new() -> Self {
        let mut random = [0u8; 12];
        rand::rng().fill(&mut random);
        let id = base64::prelude::BASE64_URL_SAFE_NO_PAD.encode(random);
        Sid(Str::from(id))
    }

    /// Get the session id as a str
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// An empty id is used by a client channel until the handshake completes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Str> for Sid {
    fn from(value: Str) -> Self {
        Sid(value)
    }
}
impl From<String> for Sid {
    fn from(value: String) -> Self {
        Sid(Str::from(value))
    }
}
impl From<&'static str> for Sid {
    fn from(value: &'static str) -> Self {
        Sid(Str::from(value))
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
impl fmt::Debug for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for Sid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
impl<'de> serde::Deserialize<'de> for Sid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Str::deserialize(deserializer).map(Sid)
    }
}
