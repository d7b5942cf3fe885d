//! Websocket transport built on tokio-tungstenite.
//!
//! Text frames are sent as websocket text messages and binary frames as binary messages.
//! Websocket level ping and pong messages are answered by tungstenite itself and never reach the channel.
use bytes::Bytes;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use sockwire_core::{Frame, ProtocolVersion, Str};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream,
    tungstenite::{
        Message, Utf8Bytes,
        handshake::server::{ErrorResponse, Request, Response},
    },
};

use super::{Connection, FrameSink, FrameStream};
use crate::errors::TransportError;

/// A websocket connection, either accepted or dialed.
pub struct WsConnection<S> {
    inner: WebSocketStream<S>,
}

impl<S> WsConnection<S> {
    /// Wrap an already upgraded websocket stream
    pub fn new(inner: WebSocketStream<S>) -> Self {
        Self { inner }
    }
}

impl<S> Connection for WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Sink = WsSink<S>;
    type Stream = WsStream<S>;

    fn split(self) -> (WsSink<S>, WsStream<S>) {
        let (tx, rx) = self.inner.split();
        (WsSink(tx), WsStream(rx))
    }
}

/// Writing half of a [`WsConnection`]
pub struct WsSink<S>(SplitSink<WebSocketStream<S>, Message>);

/// Reading half of a [`WsConnection`]
pub struct WsStream<S>(SplitStream<WebSocketStream<S>>);

impl<S> FrameSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn write_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        let msg = match frame {
            Frame::Text(data) => Message::Text(Utf8Bytes::from(String::from(data))),
            Frame::Binary(data) => Message::Binary(data),
        };
        self.0.send(msg).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0.close().await?;
        Ok(())
    }
}

impl<S> FrameStream for WsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read_frame(&mut self) -> Result<Frame, TransportError> {
        loop {
            match self.0.next().await.ok_or(TransportError::Closed)?? {
                Message::Text(data) => {
                    let data = Str::try_from(Bytes::from(data)).map_err(|e| {
                        TransportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
                    })?;
                    return Ok(Frame::Text(data));
                }
                Message::Binary(data) => return Ok(Frame::Binary(data)),
                Message::Close(_) => return Err(TransportError::Closed),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }
}

/// Dial a websocket endpoint.
///
/// The url should carry the `EIO` query parameter, see [`Client::connect`](crate::Client::connect).
pub async fn connect(url: &str) -> Result<WsConnection<MaybeTlsStream<TcpStream>>, TransportError> {
    let (ws, _res) = tokio_tungstenite::connect_async(url).await?;
    #[cfg(feature = "tracing")]
    tracing::debug!(url, "websocket connected");
    Ok(WsConnection::new(ws))
}

/// Upgrade an incoming tcp stream to a websocket.
///
/// The protocol revision is read from the `EIO` query parameter of the upgrade request:
/// `3` selects revision 3, anything else (or nothing) revision 4.
pub async fn accept(
    stream: TcpStream,
) -> Result<(WsConnection<TcpStream>, ProtocolVersion), TransportError> {
    let mut protocol = ProtocolVersion::V4;
    let callback = |req: &Request, res: Response| -> Result<Response, ErrorResponse> {
        protocol = protocol_from_query(req.uri().query());
        Ok(res)
    };
    let ws = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
    Ok((WsConnection::new(ws), protocol))
}

fn protocol_from_query(query: Option<&str>) -> ProtocolVersion {
    query
        .into_iter()
        .flat_map(|q| q.split('&'))
        .find_map(|pair| pair.strip_prefix("EIO="))
        .and_then(|v| v.parse().ok())
        .unwrap_or(ProtocolVersion::V4)
}
