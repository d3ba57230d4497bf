use codec::ResponseStatus;
use thiserror::Error;

/// The complete failure taxonomy a caller of this crate can observe.
#[derive(Debug, Error, Clone)]
pub enum Error {
    #[error("could not resolve {host}:{port}")]
    Resolution { host: String, port: u16 },

    #[error("connection to {host}:{port} was refused")]
    ConnectionRefused { host: String, port: u16 },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("command {name:?} failed with status {status}: {message}")]
    Command {
        name: String,
        status: ResponseStatus,
        message: String,
    },

    #[error("malformed response: {0}")]
    Message(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("request was cancelled")]
    Cancelled,
}

impl From<codec::CodecError> for Error {
    fn from(e: codec::CodecError) -> Self {
        Error::Message(e.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::Message(format!("invalid base64 XOR key: {e}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::ConnectionLost(e.to_string())
    }
}
