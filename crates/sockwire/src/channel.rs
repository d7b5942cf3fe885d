//! A [`Channel`] is one logical duplex session, on the server or on the client side.
//!
//! Once spawned on a [`Connection`], a channel runs two tasks:
//! * the inbound loop reads frames, answers heartbeats inline and hands events to the handler registry
//!   and ack responses to the [`AckProcessor`].
//! * the outbound loop drains the bounded outbound queue and writes each frame to the transport.
//!
//! A third task, the ping scheduler, runs on the side that originates heartbeats for the
//! negotiated protocol revision.
//!
//! Every fatal condition closes the channel exactly once with a [`CloseReason`] that is
//! delivered to the [`ON_DISCONNECTION`] handler.
use std::{
    fmt,
    sync::{
        Arc, Mutex, OnceLock, PoisonError, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};
use sockwire_core::{
    Frame, ProtocolVersion, Sid, Str,
    args::to_args,
    frame::FrameClass,
    packet::{Header, Packet, PacketData},
    parser::{Parse, ParseError},
};
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    watch,
};

use crate::{
    ack::{AckProcessor, AckResponse},
    config::{Config, MIN_BUFFER_SIZE},
    errors::{AckError, BroadcastError, RoomError, SendError, TransportError},
    handler::{ON_CONNECTION, ON_DISCONNECTION, Registry},
    parser::Parser,
    server::ServerInner,
    transport::{Connection, FrameSink, FrameStream},
};

/// All the possible reasons for a [`Channel`] to be closed.
///
/// Each reason has a stable numeric code, see [`DisconnectReason::code`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DisconnectReason {
    /// [`Channel::close`] or [`Channel::disconnect`] was called
    ClosedLocally,
    /// The peer closed the transport or sent a close packet
    TransportClose,
    /// The peer sent a frame that could not be decoded
    PacketParsingError,
    /// The handshake failed or timed out
    HandshakeError,
    /// The outbound queue reached its capacity
    QueueOverflow,
    /// A frame could not be written in time
    WriteError,
    /// The transport failed or no frame was read in time
    TransportError,
    /// The peer did not answer a ping in time
    HeartbeatTimeout,
    /// The server is being closed
    ClosingServer,
    /// The peer disconnected from the namespace
    NamespaceDisconnect,
}

impl DisconnectReason {
    /// The stable numeric code of this reason
    pub fn code(self) -> u16 {
        use DisconnectReason::*;
        match self {
            ClosedLocally => 100,
            TransportClose => 101,
            PacketParsingError => 102,
            HandshakeError => 103,
            QueueOverflow => 104,
            WriteError => 105,
            TransportError => 107,
            HeartbeatTimeout => 108,
            ClosingServer => 109,
            NamespaceDisconnect => 110,
        }
    }

    /// Build a [`CloseReason`] whose text carries an additional diagnostic
    pub fn with_text(self, detail: impl fmt::Display) -> CloseReason {
        CloseReason {
            code: self.code(),
            text: format!("{self}: {detail}"),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use DisconnectReason::*;
        let str: &'static str = match self {
            ClosedLocally => "closed by local call",
            TransportClose => "transport close",
            PacketParsingError => "packet parsing error",
            HandshakeError => "handshake error",
            QueueOverflow => "outbound queue overflow",
            WriteError => "transport write error",
            TransportError => "transport error",
            HeartbeatTimeout => "heartbeat timeout",
            ClosingServer => "server is closing",
            NamespaceDisconnect => "peer disconnected namespace",
        };
        f.write_str(str)
    }
}

/// The structured reason delivered once a channel is closed.
///
/// It can be taken as an argument by the [`ON_DISCONNECTION`] handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseReason {
    /// Numeric code, see [`DisconnectReason::code`]
    pub code: u16,
    /// Human readable text, possibly followed by a diagnostic
    pub text: String,
}

impl CloseReason {
    /// Whether this reason was built from `reason`
    pub fn is(&self, reason: DisconnectReason) -> bool {
        self.code == reason.code()
    }
}

impl Default for CloseReason {
    fn default() -> Self {
        DisconnectReason::TransportClose.into()
    }
}

impl From<DisconnectReason> for CloseReason {
    fn from(reason: DisconnectReason) -> Self {
        CloseReason {
            code: reason.code(),
            text: reason.to_string(),
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.text, self.code)
    }
}

/// The lifecycle state of a [`Channel`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChannelState {
    /// Waiting for the handshake of the server
    Handshaking,
    /// Handshake done, the channel is running
    Open,
    /// The channel is closed. It never leaves this state.
    Closed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Role {
    Server,
    Client,
}

/// An item of the outbound queue
#[derive(Debug)]
pub(crate) enum Outbound {
    Frame(Frame),
    /// Stop the outbound loop without writing anything
    Stop,
}

/// A logical session over one transport connection.
///
/// It is cheap to clone, every clone refers to the same session.
#[derive(Clone)]
pub struct Channel(Arc<ChannelInner>);

struct ChannelInner {
    header: OnceLock<Header>,
    role: Role,
    protocol: ProtocolVersion,
    parser: Parser,
    config: Config,

    alive: AtomicBool,
    degraded: AtomicBool,
    close_reason: OnceLock<CloseReason>,
    state: watch::Sender<ChannelState>,

    tx: mpsc::Sender<Outbound>,
    heartbeat_tx: mpsc::Sender<()>,
    heartbeat_rx: Mutex<Option<mpsc::Receiver<()>>>,

    ack: AckProcessor,
    registry: Arc<Registry>,
    server: Option<Weak<ServerInner>>,
}

impl Channel {
    pub(crate) fn new(
        role: Role,
        protocol: ProtocolVersion,
        parser: Parser,
        config: &Config,
        registry: Arc<Registry>,
        server: Option<Weak<ServerInner>>,
    ) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(config.max_buffer_size.max(MIN_BUFFER_SIZE));
        let (heartbeat_tx, heartbeat_rx) = mpsc::channel(1);
        let (state, _) = watch::channel(ChannelState::Handshaking);
        let inner = ChannelInner {
            header: OnceLock::new(),
            role,
            protocol,
            parser,
            config: config.clone(),
            alive: AtomicBool::new(true),
            degraded: AtomicBool::new(false),
            close_reason: OnceLock::new(),
            state,
            tx,
            heartbeat_tx,
            heartbeat_rx: Mutex::new(Some(heartbeat_rx)),
            ack: AckProcessor::new(),
            registry,
            server,
        };
        (Channel(Arc::new(inner)), rx)
    }

    /// The session id. It is empty on a client channel until the handshake is received.
    pub fn id(&self) -> Sid {
        self.0
            .header
            .get()
            .map(|h| h.sid.clone())
            .unwrap_or_default()
    }

    /// The handshake header, once known
    pub fn header(&self) -> Option<&Header> {
        self.0.header.get()
    }

    /// The negotiated protocol revision
    pub fn protocol(&self) -> ProtocolVersion {
        self.0.protocol
    }

    /// The codec strategy of this channel
    pub fn parser(&self) -> Parser {
        self.0.parser
    }

    /// The current lifecycle state
    pub fn state(&self) -> ChannelState {
        *self.0.state.borrow()
    }

    /// Whether the channel is still alive. Sends on a closed channel fail with [`SendError::Closed`].
    pub fn is_alive(&self) -> bool {
        self.0.alive.load(Ordering::Acquire)
    }

    /// Whether the outbound queue is above its high watermark.
    /// Callers may use it to shed load before the queue overflows and the channel is closed.
    pub fn is_degraded(&self) -> bool {
        self.0.degraded.load(Ordering::Relaxed)
    }

    /// Number of frames waiting in the outbound queue
    pub fn queue_len(&self) -> usize {
        self.0.tx.max_capacity() - self.0.tx.capacity()
    }

    /// The reason the channel was closed with, `None` while it is alive
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.0.close_reason.get().cloned()
    }

    /// Wait until the channel is closed
    pub async fn closed(&self) {
        let mut state = self.0.state.subscribe();
        let _ = state.wait_for(|s| *s == ChannelState::Closed).await;
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.0.state.subscribe()
    }

    /// Emit an event to the peer without waiting for a response.
    ///
    /// A tuple (or an array) is spread into separate arguments, `()` sends none
    /// and any other value is sent as a single argument.
    ///
    /// # Errors
    /// * [`SendError::QueueOverflow`] if the outbound queue is full. The channel is closed.
    /// * [`SendError::Closed`] if the channel is closed.
    /// * [`SendError::Serialize`] if the data cannot be serialized.
    pub fn emit<T: ?Sized + Serialize>(&self, event: &str, data: &T) -> Result<(), SendError> {
        let args = to_args(&self.0.parser, data)?;
        self.send_packet(Packet::event(Str::from(event.to_owned()), args))
    }

    /// Emit an event and wait for the response of the peer, for at most the configured ack timeout.
    ///
    /// See [`send_ack`](Self::send_ack).
    pub async fn emit_with_ack<T: ?Sized + Serialize>(
        &self,
        event: &str,
        data: &T,
    ) -> Result<AckResponse, AckError> {
        self.send_ack(event, self.0.config.ack_timeout, data).await
    }

    /// Emit an event with a fresh ack id and wait for the response of the peer.
    ///
    /// The wait point is registered before the request is queued. On timeout the id is
    /// discarded and a late response is ignored. A timeout does not close the channel.
    ///
    /// # Errors
    /// * [`AckError::Timeout`] if no response arrived in time.
    /// * [`AckError::Send`] if the request could not be queued.
    /// * [`AckError::Closed`] if the channel closed while waiting.
    pub async fn send_ack<T: ?Sized + Serialize>(
        &self,
        event: &str,
        timeout: Duration,
        data: &T,
    ) -> Result<AckResponse, AckError> {
        let args = to_args(&self.0.parser, data).map_err(SendError::from)?;
        let id = self.0.ack.next_id();
        let waiter = self.0.ack.register(id);
        let mut packet = Packet::event(Str::from(event.to_owned()), args);
        packet.inner.set_ack_id(id);
        if let Err(e) = self.send_packet(packet) {
            self.0.ack.remove(id);
            return Err(e.into());
        }
        let values = self.0.ack.wait(waiter, timeout).await?;
        Ok(AckResponse::new(values, self.0.parser))
    }

    /// Close the channel now. Frames still queued are discarded.
    ///
    /// Closing an already closed channel does nothing.
    pub fn close(&self) {
        self.close_with(DisconnectReason::ClosedLocally.into());
    }

    /// Send a disconnect packet then close the channel once every frame queued before it is written.
    pub fn disconnect(&self) -> Result<(), SendError> {
        self.send_packet(Packet::disconnect())?;
        self.enqueue(Outbound::Stop)
    }

    /// Join a room. Joining a room twice does nothing.
    ///
    /// # Errors
    /// [`RoomError::NoServer`] on a client channel.
    pub fn join(&self, room: impl Into<String>) -> Result<(), RoomError> {
        self.server()?.join(self, room.into());
        Ok(())
    }

    /// Leave a room. Leaving a room not joined does nothing.
    ///
    /// # Errors
    /// [`RoomError::NoServer`] on a client channel.
    pub fn leave(&self, room: &str) -> Result<(), RoomError> {
        self.server()?.leave(&self.id(), room);
        Ok(())
    }

    /// The rooms this channel belongs to
    ///
    /// # Errors
    /// [`RoomError::NoServer`] on a client channel.
    pub fn rooms(&self) -> Result<Vec<String>, RoomError> {
        Ok(self.server()?.rooms_of(&self.id()))
    }

    /// Broadcast an event to every other live member of a room.
    /// Returns the number of channels the event was queued for.
    pub fn broadcast_to<T: ?Sized + Serialize>(
        &self,
        room: &str,
        event: &str,
        data: &T,
    ) -> Result<usize, BroadcastError> {
        let server = self.server()?;
        server.broadcast_to_room_except(room, event, data, &self.id())
    }

    fn server(&self) -> Result<Arc<ServerInner>, RoomError> {
        self.0
            .server
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(RoomError::NoServer)
    }

    pub(crate) fn set_header(&self, header: Header) -> bool {
        self.0.header.set(header).is_ok()
    }

    pub(crate) fn set_state(&self, state: ChannelState) {
        if self.is_alive() {
            self.0.state.send_replace(state);
        }
    }

    pub(crate) fn send_packet(&self, packet: Packet) -> Result<(), SendError> {
        let frame = self.0.parser.encode(packet);
        self.send_frame(frame)
    }

    /// Queue an already encoded frame, e.g. one shared by every member of a broadcast.
    pub(crate) fn send_frame(&self, frame: Frame) -> Result<(), SendError> {
        self.enqueue(Outbound::Frame(frame))
    }

    fn enqueue(&self, item: Outbound) -> Result<(), SendError> {
        if !self.is_alive() {
            return Err(SendError::Closed);
        }
        match self.0.tx.try_send(item) {
            Ok(()) => {
                self.update_watermark();
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.close_with(DisconnectReason::QueueOverflow.into());
                Err(SendError::QueueOverflow)
            }
            Err(TrySendError::Closed(_)) => Err(SendError::Closed),
        }
    }

    fn update_watermark(&self) {
        let depth = self.queue_len();
        if depth >= self.0.config.high_watermark {
            if !self.0.degraded.swap(true, Ordering::Relaxed) {
                #[cfg(feature = "tracing")]
                tracing::warn!(sid = %self.id(), depth, "outbound queue above high watermark");
            }
        } else if self.0.degraded.swap(false, Ordering::Relaxed) {
            #[cfg(feature = "tracing")]
            tracing::debug!(sid = %self.id(), depth, "outbound queue back under high watermark");
        }
    }

    /// Close the channel with the given reason. Only the first call has an effect.
    ///
    /// The first call runs synchronously: it marks the channel dead, fails the pending acks, fires the
    /// [`ON_DISCONNECTION`] handler and removes the session and its rooms from the server. Once it
    /// returns, no join or broadcast can reach this channel anymore.
    /// The transport is closed afterwards by the outbound loop, which drops the frames still queued,
    /// so the disconnection handler may run before the peer sees the close.
    pub(crate) fn close_with(&self, reason: CloseReason) {
        if self
            .0
            .alive
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(sid = %self.id(), %reason, "channel closed");

        let _ = self.0.close_reason.set(reason.clone());
        // Wakes both loops: the outbound loop drains the queue and closes the transport
        self.0.state.send_replace(ChannelState::Closed);
        self.0.ack.clear();

        match self.0.parser.encode_value(&reason) {
            Ok(arg) => self
                .0
                .registry
                .dispatch_lifecycle(self, ON_DISCONNECTION, vec![arg]),
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(sid = %self.id(), "cannot encode close reason: {_e}");
            }
        }
        if let Some(server) = self.0.server.as_ref().and_then(Weak::upgrade) {
            server.remove_channel(&self.id());
        }
    }

    /// Start the inbound and outbound loops on a connection
    pub(crate) fn spawn<C: Connection>(&self, conn: C, rx: mpsc::Receiver<Outbound>) {
        let (sink, stream) = conn.split();
        tokio::spawn(self.clone().outbound_loop(sink, rx));
        tokio::spawn(self.clone().inbound_loop(stream));
    }

    async fn outbound_loop<S: FrameSink>(self, mut sink: S, mut rx: mpsc::Receiver<Outbound>) {
        let send_timeout = self.0.config.send_timeout;
        loop {
            if self.queue_len() >= self.0.tx.max_capacity() {
                self.close_with(DisconnectReason::QueueOverflow.into());
                break;
            }
            let item = tokio::select! {
                biased;
                _ = self.closed() => break,
                item = rx.recv() => item,
            };
            let frame = match item {
                Some(Outbound::Frame(frame)) => frame,
                Some(Outbound::Stop) => {
                    self.close_with(DisconnectReason::ClosedLocally.into());
                    break;
                }
                None => break,
            };
            self.update_watermark();

            let res = tokio::select! {
                biased;
                _ = self.closed() => break,
                res = tokio::time::timeout(send_timeout, sink.write_frame(frame)) => res,
            };
            match res {
                Ok(Ok(())) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(sid = %self.id(), "frame written");
                }
                Ok(Err(e)) => {
                    self.close_with(DisconnectReason::WriteError.with_text(e));
                    break;
                }
                Err(_) => {
                    self.close_with(DisconnectReason::WriteError.with_text("write deadline elapsed"));
                    break;
                }
            }
        }

        rx.close();
        while rx.try_recv().is_ok() {}
        let _ = tokio::time::timeout(send_timeout, sink.close()).await;
    }

    async fn inbound_loop<S: FrameStream>(self, mut stream: S) {
        let receive_timeout = self.0.config.receive_timeout;
        loop {
            let res = tokio::select! {
                biased;
                _ = self.closed() => break,
                res = tokio::time::timeout(receive_timeout, stream.read_frame()) => res,
            };
            let reason = match res {
                Ok(Ok(frame)) => match self.on_frame(frame) {
                    Ok(()) => continue,
                    Err(reason) => reason,
                },
                Ok(Err(TransportError::Closed)) => DisconnectReason::TransportClose.into(),
                Ok(Err(e)) => DisconnectReason::TransportError.with_text(e),
                Err(_) => DisconnectReason::TransportError.with_text("read deadline elapsed"),
            };
            self.close_with(reason);
            break;
        }
    }

    /// Handle one frame. Control frames are answered from their leading bytes only.
    fn on_frame(&self, frame: Frame) -> Result<(), CloseReason> {
        let parser = self.0.parser;
        let header = parser.peek(&frame).map_err(parse_error)?;
        match header.class {
            FrameClass::Ping => {
                #[cfg(feature = "tracing")]
                tracing::trace!(sid = %self.id(), "ping received");
                if self.answers_pings() {
                    let _ = self.send_packet(Packet::pong());
                }
                return Ok(());
            }
            FrameClass::Pong => {
                #[cfg(feature = "tracing")]
                tracing::trace!(sid = %self.id(), "pong received");
                let _ = self.0.heartbeat_tx.try_send(());
                return Ok(());
            }
            FrameClass::Close => return Err(DisconnectReason::TransportClose.into()),
            FrameClass::Upgrade => return Ok(()),
            FrameClass::Open | FrameClass::Message => (),
        }
        let packet = parser.decode(frame).map_err(parse_error)?;
        self.on_packet(packet)
    }

    fn on_packet(&self, packet: Packet) -> Result<(), CloseReason> {
        match packet.inner {
            PacketData::Open(header) if self.0.role == Role::Client => self.on_open(header),
            PacketData::Open(_) => {
                Err(DisconnectReason::HandshakeError.with_text("unexpected open packet"))
            }
            PacketData::Connect(_) => {
                if self.0.role == Role::Client {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(sid = %self.id(), "channel connected");
                    self.0
                        .registry
                        .dispatch_lifecycle(self, ON_CONNECTION, vec![]);
                }
                Ok(())
            }
            PacketData::Disconnect => Err(DisconnectReason::NamespaceDisconnect.into()),
            PacketData::ConnectError(message) => {
                Err(DisconnectReason::HandshakeError.with_text(message))
            }
            PacketData::Event(event, args, ack) | PacketData::BinaryEvent(event, args, ack) => {
                self.0.registry.dispatch(self, &event, args, ack);
                Ok(())
            }
            PacketData::EventAck(values, id) | PacketData::BinaryAck(values, id) => {
                if !self.0.ack.resolve(id, values) {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(sid = %self.id(), id, "no ack waiter for response");
                }
                Ok(())
            }
            PacketData::Close => Err(DisconnectReason::TransportClose.into()),
            PacketData::Ping | PacketData::Pong | PacketData::Upgrade => Ok(()),
        }
    }

    fn on_open(&self, header: Header) -> Result<(), CloseReason> {
        let interval = Duration::from_millis(header.ping_interval);
        let timeout = Duration::from_millis(header.ping_timeout);
        if !self.set_header(header) {
            return Err(DisconnectReason::HandshakeError.with_text("duplicate open packet"));
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(sid = %self.id(), protocol = %self.0.protocol, "handshake received");
        self.set_state(ChannelState::Open);

        if self.0.protocol.server_pings() {
            self.send_packet(Packet::connect(None))
                .map_err(|e| DisconnectReason::HandshakeError.with_text(e))?;
        } else {
            self.spawn_pinger(interval, timeout);
        }
        Ok(())
    }

    fn answers_pings(&self) -> bool {
        match self.0.role {
            Role::Server => !self.0.protocol.server_pings(),
            Role::Client => self.0.protocol.server_pings(),
        }
    }

    /// Start the ping scheduler. Only the first call has an effect.
    ///
    /// Each tick sends a ping then waits `timeout` for the pong. A missing pong closes the channel.
    pub(crate) fn spawn_pinger(&self, interval: Duration, timeout: Duration) {
        let heartbeat_rx = self
            .0
            .heartbeat_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut heartbeat_rx) = heartbeat_rx else {
            return;
        };
        let channel = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = channel.closed() => return,
                    _ = ticker.tick() => (),
                }
                if !channel.is_alive() {
                    return;
                }
                // Drop the pongs answering a previous ping
                while heartbeat_rx.try_recv().is_ok() {}
                if channel.send_packet(Packet::ping()).is_err() {
                    return;
                }
                #[cfg(feature = "tracing")]
                tracing::trace!(sid = %channel.id(), "ping sent");

                let res = tokio::select! {
                    biased;
                    _ = channel.closed() => return,
                    res = tokio::time::timeout(timeout, heartbeat_rx.recv()) => res,
                };
                match res {
                    Ok(Some(())) => (),
                    Ok(None) => return,
                    Err(_) => {
                        channel.close_with(DisconnectReason::HeartbeatTimeout.into());
                        return;
                    }
                }
            }
        });
    }
}

fn parse_error(err: ParseError) -> CloseReason {
    match err {
        ParseError::InvalidHandshake(_) => DisconnectReason::HandshakeError.with_text(err),
        err => DisconnectReason::PacketParsingError.with_text(err),
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id())
            .field("role", &self.0.role)
            .field("protocol", &self.0.protocol)
            .field("parser", &self.0.parser)
            .field("state", &self.state())
            .field("queue_len", &self.queue_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use sockwire_core::Value;

    use super::*;
    use crate::transport::mem;

    fn channel(role: Role, config: &Config) -> (Channel, mpsc::Receiver<Outbound>) {
        Channel::new(
            role,
            ProtocolVersion::V4,
            Parser::default(),
            config,
            Arc::new(Registry::default()),
            None,
        )
    }

    #[test]
    fn close_reason_codes() {
        let reason: CloseReason = DisconnectReason::QueueOverflow.into();
        assert_eq!(reason.code, 104);
        assert_eq!(reason.text, "outbound queue overflow");
        assert!(reason.is(DisconnectReason::QueueOverflow));
        assert_eq!(CloseReason::default().code, 101);

        let reason = DisconnectReason::PacketParsingError.with_text("invalid ack id");
        assert_eq!(reason.text, "packet parsing error: invalid ack id");
        assert_eq!(reason.to_string(), "packet parsing error: invalid ack id (102)");
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (channel, _rx) = channel(Role::Server, &Config::default());
        let waiter = channel.0.ack.register(channel.0.ack.next_id());
        channel.close_with(DisconnectReason::HeartbeatTimeout.into());
        channel.close_with(DisconnectReason::TransportClose.into());
        channel.close();
        assert!(!channel.is_alive());
        assert_eq!(channel.state(), ChannelState::Closed);
        assert_eq!(channel.close_reason().unwrap().code, 108);
        // pending acks fail as soon as the channel closes
        let res = channel.0.ack.wait(waiter, Duration::from_secs(1)).await;
        assert!(matches!(res, Err(AckError::Closed)));
        assert!(matches!(channel.emit("a", &()), Err(SendError::Closed)));
    }

    #[tokio::test]
    async fn full_queue_closes_with_overflow() {
        let config = Config::builder().max_buffer_size(MIN_BUFFER_SIZE).build();
        let (channel, _rx) = channel(Role::Server, &config);
        for i in 0..MIN_BUFFER_SIZE {
            channel.emit("a", &i).unwrap();
        }
        assert!(matches!(channel.emit("a", &"x"), Err(SendError::QueueOverflow)));
        assert!(!channel.is_alive());
        assert!(channel.close_reason().unwrap().is(DisconnectReason::QueueOverflow));
    }

    #[tokio::test]
    async fn high_watermark_marks_degraded() {
        let config = Config::builder()
            .max_buffer_size(4)
            .high_watermark(2)
            .build();
        let (channel, mut rx) = channel(Role::Server, &config);
        channel.emit("a", &()).unwrap();
        assert!(!channel.is_degraded());
        channel.emit("a", &()).unwrap();
        assert!(channel.is_degraded());
        rx.recv().await.unwrap();
        channel.update_watermark();
        assert!(!channel.is_degraded());
        assert!(channel.is_alive());
    }

    #[tokio::test]
    async fn ack_without_response_times_out_and_stays_open() {
        let (channel, _rx) = channel(Role::Client, &Config::default());
        let res = channel
            .send_ack("ping", Duration::from_millis(20), &())
            .await;
        assert!(matches!(res, Err(AckError::Timeout)));
        assert!(channel.is_alive());
        assert_eq!(channel.0.ack.pending(), 0);
    }

    #[tokio::test]
    async fn ack_response_resolves_waiter() {
        let (channel, mut rx) = channel(Role::Client, &Config::default());
        let responder = channel.clone();
        tokio::spawn(async move {
            let Some(Outbound::Frame(frame)) = rx.recv().await else {
                panic!("expected a frame");
            };
            let packet = responder.parser().decode(frame).unwrap();
            let id = packet.inner.ack_id().unwrap();
            let values = vec![Value::Str(Str::from("1")), Value::Str(Str::from("\"pong\""))];
            responder.on_packet(Packet::ack(values, id)).unwrap();
        });
        let res = channel
            .send_ack("ping", Duration::from_secs(1), &())
            .await
            .unwrap();
        let (n, s): (i32, String) = res.decode().unwrap();
        assert_eq!((n, s.as_str()), (1, "pong"));
    }

    #[tokio::test]
    async fn malformed_frame_closes_with_parsing_error() {
        let (channel, _rx) = channel(Role::Server, &Config::default());
        let reason = channel.on_frame(Frame::from("42[\"foo\"")).unwrap_err();
        assert!(reason.is(DisconnectReason::PacketParsingError));
        let reason = channel.on_frame(Frame::from("0{")).unwrap_err();
        assert!(reason.is(DisconnectReason::HandshakeError));
        let reason = channel.on_frame(Frame::from("9")).unwrap_err();
        assert!(reason.is(DisconnectReason::PacketParsingError));
    }

    #[tokio::test]
    async fn transport_close_is_reported() {
        let config = Config::default();
        let (channel, rx) = channel(Role::Server, &config);
        let (a, b) = mem::pair(4);
        channel.spawn(a, rx);
        drop(b);
        tokio::time::timeout(Duration::from_secs(1), channel.closed())
            .await
            .unwrap();
        let reason = channel.close_reason().unwrap();
        assert!(
            reason.is(DisconnectReason::TransportClose) || reason.is(DisconnectReason::WriteError)
        );
    }
}
