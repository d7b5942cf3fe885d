//! The boundary between a [`Channel`](crate::Channel) and the duplex stream it runs on.
//!
//! A transport only has to move whole frames: the channel owns the deadlines, the framing and the
//! lifecycle. Two implementations are provided:
//! * [`ws`]: websocket over tokio-tungstenite, used by [`Server::serve`](crate::Server::serve)
//!   and [`Client::connect`](crate::Client::connect).
//! * [`mem`]: an in-process pair, handy to drive a server and a client without sockets.
use std::future::Future;

use sockwire_core::Frame;

use crate::errors::TransportError;

pub mod mem;
pub mod ws;

/// An open duplex connection that can be split into its two halves.
///
/// The sink half is owned by the outbound loop and the stream half by the inbound loop.
pub trait Connection: Send + 'static {
    /// The writing half
    type Sink: FrameSink;
    /// The reading half
    type Stream: FrameStream;

    /// Split the connection into its writing and reading halves
    fn split(self) -> (Self::Sink, Self::Stream);
}

/// The writing half of a [`Connection`].
pub trait FrameSink: Send + 'static {
    /// Write one frame. Text frames must stay text frames on the wire.
    fn write_frame(
        &mut self,
        frame: Frame,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Close the connection. Closing an already closed connection may fail, the error is ignored by the channel.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// The reading half of a [`Connection`].
pub trait FrameStream: Send + 'static {
    /// Read the next frame. A connection closed by the peer yields [`TransportError::Closed`].
    fn read_frame(&mut self) -> impl Future<Output = Result<Frame, TransportError>> + Send;
}

/// Build the websocket url of a server endpoint, without the protocol revision parameter.
///
/// ```
/// assert_eq!(
///     sockwire::transport::url("localhost", 3000, false),
///     "ws://localhost:3000/socket.io/?transport=websocket"
/// );
/// ```
pub fn url(host: &str, port: u16, secure: bool) -> String {
    url_with_path(host, port, secure, "/socket.io/")
}

/// Same as [`url`] on a custom request path, see [`Config::req_path`](crate::Config::req_path).
pub fn url_with_path(host: &str, port: u16, secure: bool, path: &str) -> String {
    let scheme = if secure { "wss" } else { "ws" };
    format!("{scheme}://{host}:{port}{path}?transport=websocket")
}
