//! Frame codec and XOR cipher for the RCON wire protocol: the pure,
//! transport-agnostic half of the engine. `session` owns the socket and
//! drives these functions from its read loop and `execute` path.

pub mod cipher;
pub mod error;
pub mod frame;

pub use cipher::xor;
pub use error::CodecError;
pub use frame::{ProtocolVersion, Request, Response, ResponseStatus, decode_header, header_len};
