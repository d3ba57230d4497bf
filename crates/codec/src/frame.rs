use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cipher::xor;
use crate::error::CodecError;

const HEADER_LEN: usize = 8;

/// Protocol version selected by the caller for a given `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProtocolVersion {
    V1 = 1,
    V2 = 2,
}

impl ProtocolVersion {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Status code carried inline in a v2 response body (v1 synthesises OK/
/// INTERNAL_ERROR from whether the reply was non-empty).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ResponseStatus {
    Ok = 200,
    BadRequest = 400,
    Unauthorized = 401,
    InternalError = 500,
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl ResponseStatus {
    fn from_code(code: u16) -> Option<Self> {
        match code {
            200 => Some(Self::Ok),
            400 => Some(Self::BadRequest),
            401 => Some(Self::Unauthorized),
            500 => Some(Self::InternalError),
            _ => None,
        }
    }

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// A request awaiting transmission. `content_body` is always flattened to a
/// string before packing: a mapping caller body must be pre-serialised to
/// compact JSON by the command surface.
#[derive(Debug, Clone)]
pub struct Request {
    pub request_id: u32,
    pub name: String,
    pub version: ProtocolVersion,
    pub auth_token: Option<String>,
    pub content_body: String,
}

#[derive(Serialize)]
struct RequestEnvelopeV2<'a> {
    #[serde(rename = "AuthToken")]
    auth_token: &'a str,
    #[serde(rename = "Version")]
    version: u32,
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "ContentBody")]
    content_body: &'a str,
}

impl Request {
    /// Packs this request into wire bytes for the given version, ciphering
    /// with `xor_key` (pass an empty slice before the handshake installs a
    /// key; `xor` is a no-op on an empty key).
    ///
    /// For v2 this is the 8-byte header, verbatim, followed by the JSON
    /// envelope ciphered on its own — the header itself is never XORed, only
    /// the body that follows it. For v1 there is no header, so the whole
    /// bare `"<name>[ <body>]"` line is the ciphered unit.
    pub fn pack(&self, xor_key: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self.version {
            ProtocolVersion::V2 => {
                let envelope = RequestEnvelopeV2 {
                    auth_token: self.auth_token.as_deref().unwrap_or(" "),
                    version: self.version.as_u32(),
                    name: &self.name,
                    content_body: &self.content_body,
                };
                let body =
                    serde_json::to_vec(&envelope).expect("request envelope is always valid JSON");
                let ciphered_body = xor(xor_key, &body, 0)?;
                let mut out = Vec::with_capacity(HEADER_LEN + ciphered_body.len());
                out.extend_from_slice(&self.request_id.to_le_bytes());
                out.extend_from_slice(&(ciphered_body.len() as u32).to_le_bytes());
                out.extend_from_slice(&ciphered_body);
                Ok(out)
            }
            ProtocolVersion::V1 => {
                let line = if self.content_body.is_empty() {
                    self.name.clone().into_bytes()
                } else {
                    format!("{} {}", self.name, self.content_body).into_bytes()
                };
                xor(xor_key, &line, 0)
            }
        }
    }
}

/// A decoded response. `content_body` is left opaque; callers parse it
/// themselves via the command surface.
#[derive(Debug, Clone)]
pub struct Response {
    pub request_id: u32,
    pub name: String,
    pub version: u32,
    pub status_code: ResponseStatus,
    pub status_message: String,
    pub content_body: String,
}

#[derive(Deserialize)]
struct ResponseEnvelopeV2 {
    name: String,
    version: u32,
    #[serde(rename = "statusCode")]
    status_code: u16,
    #[serde(rename = "statusMessage")]
    status_message: String,
    #[serde(rename = "contentBody")]
    content_body: String,
}

impl Response {
    /// Unpacks a v2 response body (the JSON payload, already stripped of its
    /// header and XOR-decoded).
    pub fn unpack_v2(request_id: u32, body: &[u8]) -> Result<Self, CodecError> {
        let envelope: ResponseEnvelopeV2 = serde_json::from_slice(body)?;
        let status_code = ResponseStatus::from_code(envelope.status_code)
            .unwrap_or(ResponseStatus::InternalError);
        Ok(Self {
            request_id,
            name: envelope.name,
            version: envelope.version,
            status_code,
            status_message: envelope.status_message,
            content_body: envelope.content_body,
        })
    }

    /// Synthesises a v1 response from a raw text reply: non-empty is `OK`,
    /// empty is `INTERNAL_ERROR`. v1 carries no name/version/message.
    pub fn from_v1_text(request_id: u32, text: String) -> Self {
        let status_code = if text.is_empty() {
            ResponseStatus::InternalError
        } else {
            ResponseStatus::Ok
        };
        let status_message = if status_code.is_ok() { "OK" } else { "Error" }.to_string();
        Self {
            request_id,
            name: String::new(),
            version: 1,
            status_code,
            status_message,
            content_body: text,
        }
    }

    /// Parses `content_body` as a JSON object. Returns an error if it is not
    /// valid JSON or not an object, matching the reference's `content_dict`.
    pub fn content_dict(&self) -> Result<serde_json::Map<String, Value>, CodecError> {
        let value: Value = serde_json::from_str(&self.content_body)?;
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(CodecError::ContentBodyNotObject),
        }
    }
}

/// Parses the 8-byte v2 header into `(request_id, body_length)`.
pub fn decode_header(header: &[u8; HEADER_LEN]) -> (u32, u32) {
    let request_id = u32::from_le_bytes(header[0..4].try_into().unwrap());
    let body_length = u32::from_le_bytes(header[4..8].try_into().unwrap());
    (request_id, body_length)
}

pub const fn header_len() -> usize {
    HEADER_LEN
}
