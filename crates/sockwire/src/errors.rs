use sockwire_core::Sid;
use tokio::time::error::Elapsed;
use tokio_tungstenite::tungstenite;

use crate::channel::CloseReason;

pub use sockwire_core::parser::{ParseError, ParserError};

/// Error of the underlying transport. It is always fatal to the channel.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// The peer closed the connection
    #[error("transport closed")]
    Closed,

    /// A read or write did not complete before its deadline
    #[error("transport deadline elapsed")]
    Timeout,

    /// Websocket protocol or handshake failure
    #[error("ws transport error: {0}")]
    Ws(#[from] Box<tungstenite::Error>),

    /// Socket level failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tungstenite::Error> for TransportError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                TransportError::Closed
            }
            err => TransportError::Ws(Box::new(err)),
        }
    }
}

impl From<Elapsed> for TransportError {
    fn from(_: Elapsed) -> Self {
        Self::Timeout
    }
}

/// Error type for sending operations.
#[derive(thiserror::Error, Debug)]
pub enum SendError {
    /// The outbound queue is full. The channel has been closed because of it.
    #[error("outbound queue overflow")]
    QueueOverflow,

    /// The channel is closed
    #[error("channel closed")]
    Closed,

    /// An error occurred while serializing the arguments.
    #[error("error serializing packet: {0}")]
    Serialize(#[from] ParserError),
}

/// Error type for ack operations.
#[derive(thiserror::Error, Debug)]
pub enum AckError {
    /// No response arrived before the deadline
    #[error("ack timeout error")]
    Timeout,

    /// The channel closed while waiting for the response
    #[error("channel closed before the ack response")]
    Closed,

    /// The request could not be sent
    #[error("error sending ack request: {0}")]
    Send(#[from] SendError),

    /// The ack response cannot be deserialized
    #[error("cannot deserialize ack response: {0}")]
    Decode(#[from] ParserError),
}

impl From<Elapsed> for AckError {
    fn from(_: Elapsed) -> Self {
        Self::Timeout
    }
}

/// Error returned when registering a handler.
///
/// A failed registration leaves the registry untouched.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Handlers must be bound to a non empty name
    #[error("event name cannot be empty")]
    EmptyEventName,

    /// The handler declares more arguments than the protocol allows
    #[error("handler takes {got} arguments, at most {max} are allowed")]
    TooManyArguments {
        /// The allowed maximum
        max: usize,
        /// The declared count
        got: usize,
    },

    /// The handler declares more return values than the protocol allows
    #[error("handler returns {got} values, at most {max} are allowed")]
    TooManyReturnValues {
        /// The allowed maximum
        max: usize,
        /// The declared count
        got: usize,
    },
}

/// A handler invocation failed before or after running the user code.
#[derive(thiserror::Error, Debug)]
pub enum HandlerError {
    /// An argument could not be coerced into the declared parameter type
    #[error("cannot decode argument {index}: {source}")]
    Decode {
        /// Position of the argument, the channel excluded
        index: usize,
        /// The deserialization error
        source: ParserError,
    },

    /// A return value could not be serialized
    #[error("cannot encode return values: {0}")]
    Encode(#[from] ParserError),
}

/// Error of room operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    /// Rooms only exist on a server, a client channel has none
    #[error("channel is not owned by a server")]
    NoServer,
}

/// Error of broadcast operations.
#[derive(thiserror::Error, Debug)]
pub enum BroadcastError {
    /// The arguments could not be serialized
    #[error("error serializing broadcast arguments: {0}")]
    Serialize(#[from] ParserError),

    /// Sending to some members failed. The other members received the frame.
    #[error("{} channel(s) could not receive the broadcast", .0.len())]
    Send(Vec<(Sid, SendError)>),

    /// The broadcast was issued from a channel without server
    #[error(transparent)]
    Room(#[from] RoomError),
}

/// Error of [`Client::connect`](crate::Client::connect).
#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
    /// The transport could not be opened
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server did not send its handshake in time
    #[error("handshake timeout")]
    HandshakeTimeout,

    /// The channel closed during the handshake
    #[error("channel closed during handshake: {0}")]
    Closed(CloseReason),
}
