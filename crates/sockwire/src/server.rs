//! The [`Server`] accepts connections and owns the session registry, the room registry and
//! the handlers shared by every accepted [`Channel`].
//!
//! ## Example
//! ```no_run
//! # use sockwire::{Channel, Config, Server};
//! # async fn doc() -> std::io::Result<()> {
//! let server = Server::new(Config::default());
//! server.on("join", |channel: Channel, room: String| {
//!     channel.join(room).ok();
//! }).unwrap();
//! server.on("chat", |channel: Channel, room: String, text: String| {
//!     channel.broadcast_to(&room, "chat", &(room.as_str(), text)).ok();
//! }).unwrap();
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! server.serve(listener).await
//! # }
//! ```
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::Duration,
};

use serde::Serialize;
use sockwire_core::{
    Frame, ProtocolVersion, Sid, Str,
    args::to_args,
    packet::{ConnectPacket, Header, Packet},
    parser::Parse,
};
use tokio::net::TcpListener;

use crate::{
    channel::{Channel, ChannelState, DisconnectReason, Role},
    config::Config,
    errors::{BroadcastError, RegistrationError},
    handler::{Handler, HandlerDescriptor, ON_CONNECTION, Registry},
    parser::Parser,
    transport::{Connection, ws},
};

/// Accepts connections and dispatches their events to the registered handlers.
///
/// It is cheap to clone, every clone refers to the same server.
#[derive(Debug, Clone)]
pub struct Server(Arc<ServerInner>);

#[derive(Debug)]
pub(crate) struct ServerInner {
    config: Config,
    registry: Arc<Registry>,
    sessions: RwLock<HashMap<Sid, Channel>>,
    rooms: Mutex<Rooms>,
}

/// The two sides of the room registry, always mutated together under one lock.
#[derive(Debug, Default)]
struct Rooms {
    rooms: HashMap<String, HashMap<Sid, Channel>>,
    memberships: HashMap<Sid, HashSet<String>>,
}

impl Server {
    /// Create a server with the given config
    pub fn new(config: Config) -> Self {
        Server(Arc::new(ServerInner {
            config,
            registry: Arc::new(Registry::default()),
            sessions: RwLock::new(HashMap::new()),
            rooms: Mutex::new(Rooms::default()),
        }))
    }

    /// The config of this server
    pub fn config(&self) -> &Config {
        &self.0.config
    }

    /// Register a handler for an event, or for a lifecycle name such as
    /// [`ON_CONNECTION`] and [`ON_DISCONNECTION`](crate::ON_DISCONNECTION).
    ///
    /// Handlers should be registered before accepting connections.
    /// A failed registration leaves the previous handler in place.
    pub fn on<H, T>(&self, event: impl Into<String>, handler: H) -> Result<(), RegistrationError>
    where
        H: Handler<T>,
        T: 'static,
    {
        self.0.registry.insert(event.into(), handler)
    }

    /// The argument and return types of the handler bound to `event`, if any.
    ///
    /// ```
    /// # use sockwire::{Channel, Config, Server};
    /// let server = Server::new(Config::default());
    /// server.on("ping", |_: Channel, n: i32| (n + 1,)).unwrap();
    /// let descriptor = server.handler_descriptor("ping").unwrap();
    /// assert_eq!(descriptor.arity(), 1);
    /// assert_eq!(descriptor.return_count(), 1);
    /// assert!(server.handler_descriptor("pong").is_none());
    /// ```
    pub fn handler_descriptor(&self, event: &str) -> Option<HandlerDescriptor> {
        self.0.registry.descriptor(event)
    }

    /// Accept an established connection speaking the given protocol revision.
    ///
    /// The session is registered, the handshake is queued, the [`ON_CONNECTION`] handler is fired and,
    /// for revision 4, the ping scheduler is started.
    ///
    /// If the handshake cannot be queued the channel is closed and deregistered at once.
    /// Its transport is still driven so the peer sees the close, but no handler is fired.
    pub fn accept<C: Connection>(&self, conn: C, protocol: ProtocolVersion) -> Channel {
        let config = &self.0.config;
        let parser = Parser::new(protocol, config.encoding);
        let (channel, rx) = Channel::new(
            Role::Server,
            protocol,
            parser,
            config,
            self.0.registry.clone(),
            Some(Arc::downgrade(&self.0)),
        );
        let sid = Sid::new();
        let header = Header {
            sid: sid.clone(),
            upgrades: Vec::new(),
            ping_interval: millis(config.ping_interval),
            ping_timeout: millis(config.ping_timeout),
        };
        channel.set_header(header.clone());
        channel.set_state(ChannelState::Open);

        // Registered first so a failed send below deregisters it
        self.0.sessions().insert(sid.clone(), channel.clone());
        let connect = parser.encode_value(&ConnectPacket { sid }).ok();
        let handshake = channel
            .send_packet(Packet::open(header))
            .and_then(|_| channel.send_packet(Packet::connect(connect)));
        channel.spawn(conn, rx);

        if let Err(_e) = handshake {
            #[cfg(feature = "tracing")]
            tracing::warn!(sid = %channel.id(), "cannot queue handshake: {_e}");
            return channel;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(sid = %channel.id(), %protocol, "channel accepted");

        self.0
            .registry
            .dispatch_lifecycle(&channel, ON_CONNECTION, Vec::new());
        if protocol.server_pings() {
            channel.spawn_pinger(config.ping_interval, config.ping_timeout);
        }
        channel
    }

    /// Accept websocket connections from a listener until it fails.
    ///
    /// Each connection is upgraded on its own task.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (stream, _addr) = listener.accept().await?;
            #[cfg(feature = "tracing")]
            tracing::trace!(addr = %_addr, "tcp connection accepted");
            let server = self.clone();
            tokio::spawn(async move {
                match ws::accept(stream).await {
                    Ok((conn, protocol)) => {
                        server.accept(conn, protocol);
                    }
                    Err(_e) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("websocket upgrade failed: {_e}");
                    }
                }
            });
        }
    }

    /// The channel registered with this session id
    pub fn channel(&self, sid: &Sid) -> Option<Channel> {
        self.0.sessions_read().get(sid).cloned()
    }

    /// Every registered channel
    pub fn channels(&self) -> Vec<Channel> {
        self.0.sessions_read().values().cloned().collect()
    }

    /// Number of registered sessions
    pub fn session_count(&self) -> usize {
        self.0.sessions_read().len()
    }

    /// Number of non empty rooms
    pub fn room_count(&self) -> usize {
        self.0.rooms().rooms.len()
    }

    /// Number of members of a room
    pub fn room_size(&self, room: &str) -> usize {
        self.0.rooms().rooms.get(room).map_or(0, HashMap::len)
    }

    /// The session ids of the members of a room
    pub fn room_members(&self, room: &str) -> Vec<Sid> {
        self.0
            .rooms()
            .rooms
            .get(room)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// The rooms a session belongs to
    pub fn rooms_of(&self, sid: &Sid) -> Vec<String> {
        self.0.rooms_of(sid)
    }

    /// Add a channel to a room. Joining twice, or joining with a closed channel, does nothing.
    pub fn join(&self, channel: &Channel, room: impl Into<String>) {
        self.0.join(channel, room.into());
    }

    /// Remove a session from a room. Leaving a room not joined does nothing.
    pub fn leave(&self, sid: &Sid, room: &str) {
        self.0.leave(sid, room);
    }

    /// Emit an event to every live member of a room.
    /// Returns the number of channels the event was queued for.
    ///
    /// # Errors
    /// * [`BroadcastError::Serialize`] if the data cannot be serialized. Nothing was sent.
    /// * [`BroadcastError::Send`] with the members whose queue rejected the event. The others received it.
    pub fn broadcast_to_room<T: ?Sized + Serialize>(
        &self,
        room: &str,
        event: &str,
        data: &T,
    ) -> Result<usize, BroadcastError> {
        let targets = self.0.room_targets(room, None);
        broadcast(targets, event, data)
    }

    /// Same as [`broadcast_to_room`](Self::broadcast_to_room) but skips one session,
    /// usually the sender.
    pub fn broadcast_to_room_except<T: ?Sized + Serialize>(
        &self,
        room: &str,
        event: &str,
        data: &T,
        except: &Sid,
    ) -> Result<usize, BroadcastError> {
        self.0.broadcast_to_room_except(room, event, data, except)
    }

    /// Emit an event to every live registered session.
    pub fn broadcast_to_all<T: ?Sized + Serialize>(
        &self,
        event: &str,
        data: &T,
    ) -> Result<usize, BroadcastError> {
        broadcast(self.channels(), event, data)
    }

    /// Close every channel with [`DisconnectReason::ClosingServer`]
    pub fn close(&self) {
        #[cfg(feature = "tracing")]
        tracing::debug!(sessions = self.session_count(), "closing server");
        for channel in self.channels() {
            channel.close_with(DisconnectReason::ClosingServer.into());
        }
    }
}

impl ServerInner {
    pub(crate) fn join(&self, channel: &Channel, room: String) {
        let mut rooms = self.rooms();
        // Checked under the lock: a closing channel flips its flag before removing itself
        if !channel.is_alive() {
            return;
        }
        let sid = channel.id();
        rooms
            .rooms
            .entry(room.clone())
            .or_default()
            .insert(sid.clone(), channel.clone());
        rooms.memberships.entry(sid).or_default().insert(room);
    }

    pub(crate) fn leave(&self, sid: &Sid, room: &str) {
        let mut rooms = self.rooms();
        let Some(memberships) = rooms.memberships.get_mut(sid) else {
            return;
        };
        if !memberships.remove(room) {
            return;
        }
        if memberships.is_empty() {
            rooms.memberships.remove(sid);
        }
        rooms.remove_member(room, sid);
    }

    pub(crate) fn rooms_of(&self, sid: &Sid) -> Vec<String> {
        self.rooms()
            .memberships
            .get(sid)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn broadcast_to_room_except<T: ?Sized + Serialize>(
        &self,
        room: &str,
        event: &str,
        data: &T,
        except: &Sid,
    ) -> Result<usize, BroadcastError> {
        let targets = self.room_targets(room, Some(except));
        broadcast(targets, event, data)
    }

    /// Remove a closed channel from the session registry and from every room it joined
    pub(crate) fn remove_channel(&self, sid: &Sid) {
        self.sessions().remove(sid);
        let mut rooms = self.rooms();
        if let Some(joined) = rooms.memberships.remove(sid) {
            for room in joined {
                rooms.remove_member(&room, sid);
            }
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(%sid, "session removed");
    }

    /// Snapshot the members of a room so no lock is held while sending
    fn room_targets(&self, room: &str, except: Option<&Sid>) -> Vec<Channel> {
        self.rooms()
            .rooms
            .get(room)
            .map(|members| {
                members
                    .iter()
                    .filter(|(sid, _)| Some(*sid) != except)
                    .map(|(_, channel)| channel.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn sessions(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Sid, Channel>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn sessions_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Sid, Channel>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn rooms(&self) -> std::sync::MutexGuard<'_, Rooms> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Rooms {
    fn remove_member(&mut self, room: &str, sid: &Sid) {
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(sid);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
    }
}

/// Queue an event for every live target. The frame is encoded once per codec strategy.
fn broadcast<T: ?Sized + Serialize>(
    targets: Vec<Channel>,
    event: &str,
    data: &T,
) -> Result<usize, BroadcastError> {
    let event = Str::from(event.to_owned());
    let mut frames: HashMap<Parser, Frame> = HashMap::new();
    let mut sent = 0;
    let mut errors = Vec::new();
    for channel in targets {
        if !channel.is_alive() {
            continue;
        }
        let parser = channel.parser();
        let frame = match frames.get(&parser) {
            Some(frame) => frame.clone(),
            None => {
                let args = to_args(&parser, data)?;
                let frame = parser.encode(Packet::event(event.clone(), args));
                frames.insert(parser, frame.clone());
                frame
            }
        };
        match channel.send_frame(frame) {
            Ok(()) => sent += 1,
            Err(e) => errors.push((channel.id(), e)),
        }
    }
    if errors.is_empty() {
        Ok(sent)
    } else {
        Err(BroadcastError::Send(errors))
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
