#![warn(
    clippy::all,
    clippy::todo,
    clippy::empty_enum,
    clippy::mem_forget,
    clippy::unused_self,
    clippy::filter_map_next,
    clippy::needless_continue,
    clippy::needless_borrow,
    clippy::match_wildcard_for_single_variants,
    clippy::if_let_mutex,
    clippy::await_holding_lock,
    clippy::imprecise_flops,
    clippy::suboptimal_flops,
    clippy::lossy_float_literal,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::fn_params_excessive_bools,
    clippy::exit,
    clippy::inefficient_to_string,
    clippy::linkedlist,
    clippy::macro_use_imports,
    clippy::option_option,
    clippy::verbose_file_reads,
    clippy::unnested_or_patterns,
    rust_2018_idioms,
    rust_2024_compatibility,
    future_incompatible,
    nonstandard_style,
    missing_docs
)]

//! Engine.IO / Socket.IO compatible messaging engine.
//!
//! sockwire layers named events, acknowledgements and rooms over a persistent duplex connection.
//! It speaks protocol revisions 3 and 4, in text (JSON) or binary (msgpack) encoding, on both
//! the server and the client side.
//!
//! * A [`Server`] accepts connections, keeps a [`Channel`] per session and groups them in rooms.
//! * A [`Client`] dials a server and runs a single [`Channel`].
//! * Handlers are registered by event name with [`Server::on`] / [`Client::on`]. They receive the
//!   invoking channel and their typed arguments, see the [`handler`] module.
//! * [`Channel::send_ack`] sends an event and waits for the values returned by the peer's handler.
//!
//! ## Example
//! ```no_run
//! # use std::time::Duration;
//! # use sockwire::{Channel, Client, Config, Server, ON_CONNECTION, transport::mem};
//! # async fn doc() -> Result<(), Box<dyn std::error::Error>> {
//! #[derive(Debug, Default, serde::Deserialize)]
//! struct Message {
//!     id: u32,
//!     channel: String,
//! }
//!
//! let server = Server::new(Config::default());
//! server.on(ON_CONNECTION, |channel: Channel| println!("{} connected", channel.id()))?;
//! server.on("message", |_: Channel, msg: Message| println!("{msg:?}"))?;
//! server.on("ping", |_: Channel| async { (1, "pong") })?;
//!
//! // Any transport works, here an in-process pair
//! let (a, b) = mem::pair(64);
//! server.accept(a, Default::default());
//!
//! let client = Client::new(Config::default());
//! let channel = client.connect_with(b).await?;
//! channel.emit("message", &serde_json::json!({ "id": 1, "channel": "x" }))?;
//! let res = channel.send_ack("ping", Duration::from_secs(1), &()).await?;
//! let (n, pong): (i32, String) = res.decode()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//! * `tracing` (default): emit [`tracing`](https://docs.rs/tracing) events for the channel lifecycle,
//!   heartbeats and handler failures.
pub mod ack;
pub mod handler;
pub mod transport;

mod channel;
mod client;
mod config;
mod errors;
mod parser;
mod server;

pub use ack::{AckProcessor, AckResponse};
pub use channel::{Channel, ChannelState, CloseReason, DisconnectReason};
pub use client::Client;
pub use config::{Config, ConfigBuilder, MIN_BUFFER_SIZE};
pub use errors::{
    AckError, BroadcastError, ConnectError, HandlerError, ParseError, ParserError,
    RegistrationError, RoomError, SendError, TransportError,
};
pub use handler::{
    AckArgs, Handler, HandlerDescriptor, MAX_ARGS, MAX_RETURNS, ON_CONNECTION, ON_DISCONNECTION,
    RawHandler,
};
pub use parser::Parser;
pub use server::Server;
pub use sockwire_core::{Encoding, Frame, ProtocolVersion, Sid, Str, Value, packet, parser::Parse};
