//! Channel, server and client configuration.
//!
//! ```rust
//! # use std::time::Duration;
//! # use sockwire::{Config, Encoding};
//! let config = Config::builder()
//!     .ping_interval(Duration::from_secs(10))
//!     .ping_timeout(Duration::from_secs(5))
//!     .encoding(Encoding::MsgPack)
//!     .build();
//! assert_eq!(config.max_buffer_size, 10_000);
//! ```
use std::{borrow::Cow, time::Duration};

use sockwire_core::{Encoding, ProtocolVersion};

/// Smallest outbound queue capacity of a channel.
///
/// The open and connect frames of the handshake are queued at once when a channel
/// is accepted, the remaining slots absorb the first messages.
pub const MIN_BUFFER_SIZE: usize = 4;

/// Configuration shared by every channel of a [`Server`](crate::Server) or [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct Config {
    /// The interval at which the pinging side sends a ping packet.
    ///
    /// Defaults to 30 seconds.
    pub ping_interval: Duration,

    /// The amount of time the pinging side waits for a pong before closing the channel.
    ///
    /// Defaults to 60 seconds.
    pub ping_timeout: Duration,

    /// Deadline of a single transport read. A silent peer is disconnected after this delay.
    ///
    /// Defaults to 60 seconds.
    pub receive_timeout: Duration,

    /// Deadline of a single transport write.
    ///
    /// Defaults to 60 seconds.
    pub send_timeout: Duration,

    /// The maximum number of frames waiting to be written per channel.
    ///
    /// Reaching it closes the channel with an overflow reason.
    /// Values below [`MIN_BUFFER_SIZE`] are raised to it.
    ///
    /// Defaults to 10 000 frames.
    pub max_buffer_size: usize,

    /// Queue depth from which a channel is reported as degraded.
    ///
    /// Defaults to 8 000 frames.
    pub high_watermark: usize,

    /// Wire encoding of message frames.
    ///
    /// Defaults to [`Encoding::Text`].
    pub encoding: Encoding,

    /// Protocol revision requested by a client. A server follows the revision chosen by each peer.
    ///
    /// Defaults to [`ProtocolVersion::V4`].
    pub protocol: ProtocolVersion,

    /// Default ack timeout of [`Channel::emit_with_ack`](crate::Channel::emit_with_ack).
    ///
    /// Defaults to 5 seconds.
    pub ack_timeout: Duration,

    /// The amount of time a client waits for the handshake of the server.
    ///
    /// Defaults to 10 seconds.
    pub connect_timeout: Duration,

    /// The path of the websocket endpoint.
    ///
    /// Defaults to "/socket.io/".
    pub req_path: Cow<'static, str>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(60),
            receive_timeout: Duration::from_secs(60),
            send_timeout: Duration::from_secs(60),
            max_buffer_size: 10_000,
            high_watermark: 8_000,
            encoding: Encoding::Text,
            protocol: ProtocolVersion::V4,
            ack_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            req_path: Cow::Borrowed("/socket.io/"),
        }
    }
}

impl Config {
    /// Create a [`ConfigBuilder`] starting from the default values
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Fluent builder of a [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a builder with the default config
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// The interval at which the pinging side sends a ping packet.
    ///
    /// Defaults to 30 seconds.
    pub fn ping_interval(mut self, ping_interval: Duration) -> Self {
        self.config.ping_interval = ping_interval;
        self
    }

    /// The amount of time the pinging side waits for a pong before closing the channel.
    ///
    /// Defaults to 60 seconds.
    pub fn ping_timeout(mut self, ping_timeout: Duration) -> Self {
        self.config.ping_timeout = ping_timeout;
        self
    }

    /// Deadline of a single transport read.
    pub fn receive_timeout(mut self, receive_timeout: Duration) -> Self {
        self.config.receive_timeout = receive_timeout;
        self
    }

    /// Deadline of a single transport write.
    pub fn send_timeout(mut self, send_timeout: Duration) -> Self {
        self.config.send_timeout = send_timeout;
        self
    }

    /// The maximum number of frames waiting to be written per channel.
    ///
    /// It cannot go below [`MIN_BUFFER_SIZE`], so the handshake frames of a new
    /// channel always fit with room left for the first messages.
    ///
    /// Defaults to 10 000 frames.
    pub fn max_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.config.max_buffer_size = max_buffer_size;
        self
    }

    /// Queue depth from which a channel is reported as degraded.
    pub fn high_watermark(mut self, high_watermark: usize) -> Self {
        self.config.high_watermark = high_watermark;
        self
    }

    /// Wire encoding of message frames.
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.config.encoding = encoding;
        self
    }

    /// Protocol revision requested by a client.
    pub fn protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.config.protocol = protocol;
        self
    }

    /// Default ack timeout.
    ///
    /// Defaults to 5 seconds.
    pub fn ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.config.ack_timeout = ack_timeout;
        self
    }

    /// The amount of time a client waits for the handshake of the server.
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.config.connect_timeout = connect_timeout;
        self
    }

    /// The path of the websocket endpoint.
    pub fn req_path(mut self, req_path: impl Into<Cow<'static, str>>) -> Self {
        self.config.req_path = req_path.into();
        self
    }

    /// Build the config.
    ///
    /// The queue holds at least [`MIN_BUFFER_SIZE`] frames and the high watermark never exceeds the queue capacity.
    pub fn build(mut self) -> Config {
        self.config.max_buffer_size = self.config.max_buffer_size.max(MIN_BUFFER_SIZE);
        self.config.high_watermark = self.config.high_watermark.min(self.config.max_buffer_size);
        self.config
    }
}
