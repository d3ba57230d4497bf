//! Client library for a framed, XOR-obfuscated game-server RCON protocol.
//!
//! [`session`] and [`codec`] implement the wire protocol engine (handshake,
//! authentication, request/response framing and correlation). This crate
//! layers the pieces a caller actually reaches for on top of that engine:
//! configuration ([`config`]), a lazily-connecting facade around one session
//! ([`connection`]), a bounded pool that fans work across several sessions
//! ([`pool`]), and a thin command surface ([`commands`]).

pub mod commands;
pub mod config;
pub mod connection;
pub mod pool;

pub use codec::{ProtocolVersion, Response, ResponseStatus};
pub use commands::RconCommands;
pub use config::RconConfig;
pub use connection::Connection;
pub use pool::Pool;
pub use session::Error;
