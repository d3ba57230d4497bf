use std::sync::Arc;
use std::time::Duration;

use codec::{ProtocolVersion, Response};
use session::{Error, Session, SessionOptions};
use tokio::sync::Mutex;

use crate::config::RconConfig;

pub type DisconnectHook = Arc<dyn Fn() + Send + Sync>;

/// Lifecycle wrapper around one `Session`: lazily connects on first use,
/// discards a lost session so the next call reconnects, and never retries
/// implicitly.
///
/// The single `tokio::sync::Mutex` below doubles as the "memoised connect
/// future" from the reference implementation: the first caller to observe a
/// missing or dead session performs the handshake while holding the lock,
/// and every concurrent caller simply waits on the same lock rather than
/// racing to open its own socket.
pub struct Connection {
    host: String,
    port: u16,
    password: String,
    version: ProtocolVersion,
    connect_timeout: Duration,
    request_timeout: Duration,
    allow_concurrent_requests: bool,
    on_disconnect: Option<DisconnectHook>,
    session: Mutex<Option<Session>>,
}

impl Connection {
    pub fn new(host: String, port: u16, password: String, version: ProtocolVersion) -> Self {
        Self {
            host,
            port,
            password,
            version,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            allow_concurrent_requests: false,
            on_disconnect: None,
            session: Mutex::new(None),
        }
    }

    pub fn from_config(config: &RconConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            password: config.password.clone(),
            version: config.version.into(),
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
            allow_concurrent_requests: config.allow_concurrent_requests,
            on_disconnect: None,
            session: Mutex::new(None),
        }
    }

    pub fn with_on_disconnect(mut self, hook: DisconnectHook) -> Self {
        self.on_disconnect = Some(hook);
        self
    }

    /// Returns the current session, connecting if there isn't one or the
    /// previous one was lost. A failed connect propagates to every awaiter
    /// holding the lock; there is no implicit retry.
    async fn get_connection(&self) -> Result<Session, Error> {
        let mut slot = self.session.lock().await;

        if let Some(session) = slot.as_ref() {
            if session.is_connected() {
                return Ok(session.clone());
            }
        }
        *slot = None;

        let on_disconnect = self.on_disconnect.clone();
        let session = Session::connect(SessionOptions {
            host: self.host.clone(),
            port: self.port,
            password: self.password.clone(),
            version: self.version,
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            allow_concurrent_requests: self.allow_concurrent_requests,
            on_connection_lost: on_disconnect.map(|hook| {
                Arc::new(move |_: Option<&Error>| hook()) as session::ConnectionLostHook
            }),
        })
        .await?;

        *slot = Some(session.clone());
        Ok(session)
    }

    pub async fn execute(
        &self,
        name: &str,
        version: ProtocolVersion,
        body: String,
    ) -> Result<Response, Error> {
        let session = self.get_connection().await?;
        session.execute(name, version, body).await
    }

    pub async fn is_connected(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .map(Session::is_connected)
            .unwrap_or(false)
    }

    /// Idempotent: closing an already-disconnected (or never-connected)
    /// facade does nothing.
    pub async fn disconnect(&self) {
        if let Some(session) = self.session.lock().await.take() {
            session.disconnect().await;
        }
    }

    pub async fn wait_until_connected(&self) -> Result<(), Error> {
        self.get_connection().await.map(|_| ())
    }
}
