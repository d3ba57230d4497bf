use thiserror::Error;

/// Failure modes of framing and XOR-decoding a single message. Distinct from
/// `session::Error`, which layers transport and protocol-level failures on
/// top of these.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame body is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("malformed JSON envelope: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("XOR operation changed message length ({input} -> {output})")]
    LengthMismatch { input: usize, output: usize },

    #[error("content_body is not a JSON object")]
    ContentBodyNotObject,
}
