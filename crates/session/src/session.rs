use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use ahash::AHashMap;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use codec::{ProtocolVersion, Request, Response, decode_header, header_len, xor};
use parking_lot::Mutex as PLMutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::time::timeout;

use crate::error::Error;
use crate::state::SessionState;

type ResponseSlot = oneshot::Sender<Result<Response, Error>>;

/// v2 correlates by `request_id`; v1 has no id in its wire format, so waiters
/// are served FIFO instead (the queue exists only to accommodate this
/// header-less variant).
enum PendingTable {
    Keyed(AHashMap<u32, ResponseSlot>),
    Queue(VecDeque<(u32, ResponseSlot)>),
}

impl PendingTable {
    fn for_version(version: ProtocolVersion) -> Self {
        match version {
            ProtocolVersion::V2 => Self::Keyed(AHashMap::default()),
            ProtocolVersion::V1 => Self::Queue(VecDeque::new()),
        }
    }

    fn register(&mut self, request_id: u32, tx: ResponseSlot) {
        match self {
            Self::Keyed(map) => {
                map.insert(request_id, tx);
            }
            Self::Queue(queue) => queue.push_back((request_id, tx)),
        }
    }

    fn deregister(&mut self, request_id: u32) {
        match self {
            Self::Keyed(map) => {
                map.remove(&request_id);
            }
            Self::Queue(queue) => queue.retain(|(id, _)| *id != request_id),
        }
    }

    fn dispatch(&mut self, request_id: u32) -> Option<ResponseSlot> {
        match self {
            Self::Keyed(map) => map.remove(&request_id),
            Self::Queue(queue) => queue.pop_front().map(|(_, tx)| tx),
        }
    }

    fn drain(&mut self) -> Vec<ResponseSlot> {
        match self {
            Self::Keyed(map) => map.drain().map(|(_, tx)| tx).collect(),
            Self::Queue(queue) => queue.drain(..).map(|(_, tx)| tx).collect(),
        }
    }
}

/// Invoked exactly once when a session leaves the `Connected` state, whether
/// by caller-initiated `disconnect()` (argument `None`) or by connection loss
/// (argument `Some(error)`). Mirrors the reference's `on_connection_lost`
/// hook, used by the connection facade to invalidate its cached session.
pub type ConnectionLostHook = Arc<dyn Fn(Option<&Error>) + Send + Sync>;

pub struct SessionOptions {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub version: ProtocolVersion,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub allow_concurrent_requests: bool,
    pub on_connection_lost: Option<ConnectionLostHook>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 0,
            password: String::new(),
            version: ProtocolVersion::V2,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            allow_concurrent_requests: false,
            on_connection_lost: None,
        }
    }
}

struct Inner {
    write_half: AsyncMutex<OwnedWriteHalf>,
    pending: PLMutex<PendingTable>,
    next_request_id: AtomicU32,
    xor_key: PLMutex<Option<Vec<u8>>>,
    auth_token: PLMutex<Option<String>>,
    state: PLMutex<SessionState>,
    version: ProtocolVersion,
    request_timeout: Duration,
    serial_gate: Option<AsyncMutex<()>>,
    on_connection_lost: Option<ConnectionLostHook>,
    finished: AtomicBool,
}

/// Owns one TCP connection and is the sole component permitted to read or
/// write bytes on it. A `Session` is single-use: once it reaches `Closed` or
/// `Lost` it cannot be reconnected, matching the reference implementation's
/// decision not to recycle sessions across reconnects.
#[derive(Clone)]
pub struct Session(Arc<Inner>);

impl Session {
    /// Opens a TCP connection, performs the `ServerConnect`/`Login`
    /// handshake, and returns a session in the `Connected` state. The read
    /// loop is spawned as a background task before the handshake request is
    /// sent, since the handshake response arrives through the same path as
    /// every other response.
    pub async fn connect(options: SessionOptions) -> Result<Self, Error> {
        let addr = format!("{}:{}", options.host, options.port);
        let stream = match timeout(options.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                return Err(Error::ConnectionRefused {
                    host: options.host,
                    port: options.port,
                });
            }
            Ok(Err(_)) | Err(_) => {
                return Err(Error::Resolution {
                    host: options.host,
                    port: options.port,
                });
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            log::warn!("failed to set TCP_NODELAY on rcon session: {e}");
        }

        let (read_half, write_half) = stream.into_split();
        let serial_gate = (!options.allow_concurrent_requests).then(AsyncMutex::default);

        let inner = Arc::new(Inner {
            write_half: AsyncMutex::new(write_half),
            pending: PLMutex::new(PendingTable::for_version(options.version)),
            next_request_id: AtomicU32::new(1),
            xor_key: PLMutex::new(None),
            auth_token: PLMutex::new(None),
            state: PLMutex::new(SessionState::Handshaking),
            version: options.version,
            request_timeout: options.request_timeout,
            serial_gate,
            on_connection_lost: options.on_connection_lost,
            finished: AtomicBool::new(false),
        });

        tokio::spawn(read_loop(inner.clone(), read_half, options.version));

        let session = Session(inner);
        session.handshake(options.version, options.password).await?;
        Ok(session)
    }

    async fn handshake(&self, version: ProtocolVersion, password: String) -> Result<(), Error> {
        let connect_reply = self.execute_raw(version, "ServerConnect", String::new()).await;
        let connect_reply = match connect_reply {
            Ok(r) if r.status_code.is_ok() => r,
            Ok(r) => {
                self.disconnect().await;
                return Err(Error::Auth(format!(
                    "ServerConnect failed: {}",
                    r.status_message
                )));
            }
            Err(e) => {
                self.disconnect().await;
                return Err(e);
            }
        };

        let key = BASE64.decode(connect_reply.content_body.as_bytes())?;
        *self.0.xor_key.lock() = Some(key);
        *self.0.state.lock() = SessionState::Authenticating;

        let login_reply = self.execute_raw(version, "Login", password).await;
        let login_reply = match login_reply {
            Ok(r) if r.status_code.is_ok() => r,
            Ok(r) => {
                self.disconnect().await;
                return Err(Error::Auth(r.status_message));
            }
            Err(e) => {
                self.disconnect().await;
                return Err(e);
            }
        };

        *self.0.auth_token.lock() = Some(login_reply.content_body);
        *self.0.state.lock() = SessionState::Connected;
        Ok(())
    }

    /// Issues one request and awaits its matching response, bounded by the
    /// session's request timeout. Does not raise on a non-200 status; the
    /// command surface decides whether a status is an error.
    pub async fn execute(
        &self,
        name: &str,
        version: ProtocolVersion,
        body: String,
    ) -> Result<Response, Error> {
        if self.0.state.lock().is_terminal() {
            return Err(Error::ConnectionLost("session is not connected".to_string()));
        }
        self.execute_raw(version, name, body).await
    }

    async fn execute_raw(
        &self,
        version: ProtocolVersion,
        name: &str,
        body: String,
    ) -> Result<Response, Error> {
        let _serial_permit = match &self.0.serial_gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };

        let request_id = self.0.next_request_id.fetch_add(1, Ordering::Relaxed);
        let auth_token = self.0.auth_token.lock().clone();
        let request = Request {
            request_id,
            name: name.to_string(),
            version,
            auth_token,
            content_body: body,
        };
        let key = self.0.xor_key.lock().clone().unwrap_or_default();
        let packed = request.pack(&key)?;

        let (tx, rx) = oneshot::channel();
        self.0.pending.lock().register(request_id, tx);

        {
            let mut write_half = self.0.write_half.lock().await;
            if let Err(e) = write_half.write_all(&packed).await {
                self.0.pending.lock().deregister(request_id);
                return Err(Error::from(e));
            }
        }

        match timeout(self.0.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Cancelled),
            Err(_) => {
                self.0.pending.lock().deregister(request_id);
                Err(Error::Timeout(self.0.request_timeout))
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.0.state.lock() == SessionState::Connected
    }

    pub fn state(&self) -> SessionState {
        *self.0.state.lock()
    }

    /// Closes the socket and resolves every pending request with
    /// `Error::Cancelled`. Idempotent: a second call on an already-closed or
    /// already-lost session is a no-op.
    pub async fn disconnect(&self) {
        if finish(&self.0, None, SessionState::Closed) {
            let mut write_half = self.0.write_half.lock().await;
            let _ = write_half.shutdown().await;
        }
    }
}

/// Resolves the pending table and flips the session to a terminal state.
/// Returns `true` the first time it runs for this session; subsequent calls
/// are no-ops, which is what makes both `disconnect()` and the read loop's
/// own EOF/error handling safe to call unconditionally.
///
/// Which message pending waiters receive is decided by `terminal_state`, not
/// by whether `error` is set: a clean EOF on the socket (`error: None`) still
/// means the connection was lost out from under in-flight requests, whereas
/// `Cancelled` is reserved for a caller-initiated `disconnect()`.
fn finish(inner: &Inner, error: Option<Error>, terminal_state: SessionState) -> bool {
    if inner.finished.swap(true, Ordering::SeqCst) {
        return false;
    }

    *inner.state.lock() = terminal_state;
    let waiters = inner.pending.lock().drain();

    match terminal_state {
        SessionState::Lost => {
            let reason = error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "connection closed by peer".to_string());
            log::warn!("rcon session lost: {reason}");
            for tx in waiters {
                let _ = tx.send(Err(Error::ConnectionLost(reason.clone())));
            }
        }
        _ => {
            log::info!("rcon session closed");
            for tx in waiters {
                let _ = tx.send(Err(Error::Cancelled));
            }
        }
    }

    if let Some(hook) = &inner.on_connection_lost {
        hook(error.as_ref());
    }

    true
}

async fn read_loop(inner: Arc<Inner>, read_half: OwnedReadHalf, version: ProtocolVersion) {
    match version {
        ProtocolVersion::V2 => read_loop_v2(inner, read_half).await,
        ProtocolVersion::V1 => read_loop_v1(inner, read_half).await,
    }
}

/// The header is never ciphered (only `content`/the body is, mirroring the
/// reference's `_receive_response` which reads the 8 header bytes with a
/// bare `readexactly` and only passes the body through `_xor`), and the
/// keystream is reset to `offset = 0` once per logical frame, not once per
/// `read()` syscall: raw ciphertext accumulates in `buffer` until a whole
/// frame (`header_len() + body_len`) is available, and only then is that
/// frame's body deciphered in one call. A message split across multiple
/// reads, or bigger than one `chunk`, is unaffected by this.
async fn read_loop_v2(inner: Arc<Inner>, mut read_half: OwnedReadHalf) {
    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = match read_half.read(&mut chunk).await {
            Ok(0) => {
                finish(&inner, None, SessionState::Lost);
                return;
            }
            Ok(n) => n,
            Err(e) => {
                finish(&inner, Some(Error::from(e)), SessionState::Lost);
                return;
            }
        };

        buffer.extend_from_slice(&chunk[..n]);

        while buffer.len() >= header_len() {
            let header: [u8; 8] = buffer[..header_len()].try_into().unwrap();
            let (request_id, body_len) = decode_header(&header);
            let total = header_len() + body_len as usize;
            if buffer.len() < total {
                break;
            }

            let ciphered_body = buffer[header_len()..total].to_vec();
            buffer = buffer.split_off(total);

            let key = inner.xor_key.lock().clone().unwrap_or_default();
            let body = match xor(&key, &ciphered_body, 0) {
                Ok(body) => body,
                Err(e) => {
                    finish(&inner, Some(e.into()), SessionState::Lost);
                    return;
                }
            };

            match Response::unpack_v2(request_id, &body) {
                Ok(response) => match inner.pending.lock().dispatch(request_id) {
                    Some(tx) => {
                        let _ = tx.send(Ok(response));
                    }
                    None => log::warn!("no waiter for rcon response id {request_id}"),
                },
                Err(e) => log::warn!("malformed rcon response frame for id {request_id}: {e}"),
            }
        }
    }
}

/// v1 carries no length prefix, so a complete response is whatever arrived
/// before the peer paused writes: reads are bounded by a short quiescence
/// window, and the accumulated buffer is handed to the oldest waiter once
/// that window elapses with no further bytes.
async fn read_loop_v1(inner: Arc<Inner>, mut read_half: OwnedReadHalf) {
    const QUIESCENCE: Duration = Duration::from_millis(50);

    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut seed_buf: Vec<u8> = Vec::new();
    let mut stripped_seed = false;

    loop {
        let read_result = if buffer.is_empty() {
            read_half.read(&mut chunk).await
        } else {
            match timeout(QUIESCENCE, read_half.read(&mut chunk)).await {
                Ok(result) => result,
                Err(_) => {
                    deliver_v1_response(&inner, std::mem::take(&mut buffer));
                    continue;
                }
            }
        };

        let n = match read_result {
            Ok(0) => {
                finish(&inner, None, SessionState::Lost);
                return;
            }
            Ok(n) => n,
            Err(e) => {
                finish(&inner, Some(Error::from(e)), SessionState::Lost);
                return;
            }
        };

        if !stripped_seed {
            // The 4-byte seed can itself arrive split across more than one
            // read under ordinary TCP fragmentation; accumulate separately
            // until the full seed is in hand before treating any byte as
            // part of a real response.
            seed_buf.extend_from_slice(&chunk[..n]);
            if seed_buf.len() < 4 {
                continue;
            }
            log::info!("discarding v1 XOR-key seed: {:02x?}", &seed_buf[..4]);
            buffer.extend_from_slice(&seed_buf[4..]);
            stripped_seed = true;
            continue;
        }

        buffer.extend_from_slice(&chunk[..n]);
    }
}

fn deliver_v1_response(inner: &Inner, ciphered: Vec<u8>) {
    let key = inner.xor_key.lock().clone().unwrap_or_default();
    let decoded = match xor(&key, &ciphered, 0) {
        Ok(d) => d,
        Err(e) => {
            log::warn!("v1 response XOR failed: {e}");
            return;
        }
    };
    let text = match String::from_utf8(decoded) {
        Ok(t) => t,
        Err(e) => {
            log::warn!("v1 response is not valid UTF-8: {e}");
            return;
        }
    };
    match inner.pending.lock().dispatch(0) {
        Some(tx) => {
            let _ = tx.send(Ok(Response::from_v1_text(0, text)));
        }
        None => log::warn!("no waiter for v1 response"),
    }
}
