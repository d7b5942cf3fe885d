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

//! Core types shared by the sockwire codec strategies and runtime.
//!
//! This crate holds the wire-neutral model: [`Packet`](packet::Packet), [`Frame`], [`Value`],
//! the handshake [`Header`](packet::Header) and the [`Parse`](parser::Parse) trait implemented by each
//! (protocol version, encoding) strategy.

pub mod args;
pub mod frame;
pub mod packet;
pub mod parser;
pub mod protocol;
mod sid;
mod str;
mod value;

pub use frame::Frame;
pub use protocol::{Encoding, ProtocolVersion};
pub use sid::Sid;
pub use self::str::Str;
pub use value::Value;
