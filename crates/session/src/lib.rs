//! The protocol engine: owns one TCP connection, drives the handshake and
//! `Login` authentication, and multiplexes concurrent `execute` calls by
//! request id (or FIFO order, for the header-less v1 variant).

pub mod error;
pub mod session;
pub mod state;

pub use codec::ProtocolVersion;
pub use error::Error;
pub use session::{ConnectionLostHook, Session, SessionOptions};
pub use state::SessionState;
