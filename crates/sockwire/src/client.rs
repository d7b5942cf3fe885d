//! The [`Client`] dials a server and runs a single [`Channel`] with its own handlers.
//!
//! ## Example
//! ```no_run
//! # use std::time::Duration;
//! # use sockwire::{Channel, Client, Config, transport};
//! # async fn doc() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(Config::default());
//! client.on("chat", |_: Channel, text: String| println!("{text}"))?;
//!
//! let channel = client.connect(&transport::url("localhost", 3000, false)).await?;
//! channel.emit("chat", "hello")?;
//! let res = channel.send_ack("ping", Duration::from_secs(1), &()).await?;
//! let (n, pong): (i32, String) = res.decode()?;
//! # Ok(())
//! # }
//! ```
use std::sync::{Arc, Mutex, PoisonError};

use crate::{
    channel::{Channel, ChannelState, DisconnectReason, Role},
    config::Config,
    errors::{ConnectError, RegistrationError},
    handler::{Handler, HandlerDescriptor, Registry},
    parser::Parser,
    transport::{self, Connection, ws},
};

/// Dials a server. A client holds at most one live channel, connecting again replaces it.
#[derive(Debug)]
pub struct Client {
    config: Config,
    registry: Arc<Registry>,
    channel: Mutex<Option<Channel>>,
}

impl Client {
    /// Create a client with the given config
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: Arc::new(Registry::default()),
            channel: Mutex::new(None),
        }
    }

    /// Register a handler for an event or a lifecycle name.
    ///
    /// See [`Server::on`](crate::Server::on).
    pub fn on<H, T>(&self, event: impl Into<String>, handler: H) -> Result<(), RegistrationError>
    where
        H: Handler<T>,
        T: 'static,
    {
        self.registry.insert(event.into(), handler)
    }

    /// The argument and return types of the handler bound to `event`, if any.
    pub fn handler_descriptor(&self, event: &str) -> Option<HandlerDescriptor> {
        self.registry.descriptor(event)
    }

    /// Dial a websocket endpoint and wait for the handshake.
    ///
    /// The `EIO` parameter of the configured protocol revision is appended to the url.
    pub async fn connect(&self, url: &str) -> Result<Channel, ConnectError> {
        let sep = if url.contains('?') { '&' } else { '?' };
        let url = format!("{url}{sep}EIO={}", self.config.protocol);
        let conn = ws::connect(&url).await?;
        self.connect_with(conn).await
    }

    /// The websocket url of a server, on the configured request path
    pub fn endpoint(&self, host: &str, port: u16, secure: bool) -> String {
        transport::url_with_path(host, port, secure, &self.config.req_path)
    }

    /// Run a channel on an established connection and wait for the handshake of the server,
    /// for at most the configured connect timeout.
    ///
    /// # Errors
    /// * [`ConnectError::HandshakeTimeout`] if no handshake arrived in time. The channel is closed.
    /// * [`ConnectError::Closed`] if the channel closed before the handshake.
    pub async fn connect_with<C: Connection>(&self, conn: C) -> Result<Channel, ConnectError> {
        let protocol = self.config.protocol;
        let parser = Parser::new(protocol, self.config.encoding);
        let (channel, rx) = Channel::new(
            Role::Client,
            protocol,
            parser,
            &self.config,
            self.registry.clone(),
            None,
        );
        let mut state = channel.watch_state();
        channel.spawn(conn, rx);
        let previous = self.slot().replace(channel.clone());
        if let Some(previous) = previous {
            previous.close();
        }

        let res = tokio::time::timeout(
            self.config.connect_timeout,
            state.wait_for(|s| *s != ChannelState::Handshaking),
        )
        .await
        .map(|res| res.map(|state| *state));
        match res {
            Ok(Ok(ChannelState::Open)) => Ok(channel),
            Ok(_) => Err(ConnectError::Closed(
                channel.close_reason().unwrap_or_default(),
            )),
            Err(_) => {
                channel.close_with(DisconnectReason::HandshakeError.with_text("handshake timeout"));
                Err(ConnectError::HandshakeTimeout)
            }
        }
    }

    /// The current channel, if connected once
    pub fn channel(&self) -> Option<Channel> {
        self.slot().clone()
    }

    /// Close the current channel
    pub fn close(&self) {
        let channel = self.slot().take();
        if let Some(channel) = channel {
            channel.close();
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Channel>> {
        self.channel.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
