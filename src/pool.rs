use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use codec::ProtocolVersion;
use parking_lot::Mutex as PLMutex;
use session::{ConnectionLostHook, Error, Session, SessionOptions};
use tokio::sync::Notify;

use crate::config::RconConfig;

struct Worker {
    id: usize,
    session: Session,
    busy: AtomicBool,
}

struct PoolInner {
    host: String,
    port: u16,
    password: String,
    version: ProtocolVersion,
    connect_timeout: Duration,
    request_timeout: Duration,
    allow_concurrent_requests: bool,
    max_workers: usize,
    next_worker_id: AtomicUsize,
    workers: PLMutex<Vec<Arc<Worker>>>,
    idle: Notify,
}

/// Maintains up to `max_workers` concurrent `Session`s against the same
/// `(host, port, password)`, routing each caller operation to an idle
/// worker and growing lazily up to capacity. Workers share no state with
/// each other: each owns its own XOR key and auth token.
#[derive(Clone)]
pub struct Pool(Arc<PoolInner>);

/// A checked-out worker. Releasing it (on drop) clears its `busy` bit and
/// wakes one waiter, if any.
pub struct PoolGuard {
    pool: Arc<PoolInner>,
    worker: Arc<Worker>,
}

impl Deref for PoolGuard {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.worker.session
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        self.worker.busy.store(false, Ordering::SeqCst);
        self.pool.idle.notify_one();
    }
}

impl Pool {
    pub fn new(
        host: String,
        port: u16,
        password: String,
        version: ProtocolVersion,
        max_workers: usize,
    ) -> Self {
        Self(Arc::new(PoolInner {
            host,
            port,
            password,
            version,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            allow_concurrent_requests: false,
            max_workers,
            next_worker_id: AtomicUsize::new(0),
            workers: PLMutex::new(Vec::new()),
            idle: Notify::new(),
        }))
    }

    pub fn from_config(config: &RconConfig) -> Self {
        Self(Arc::new(PoolInner {
            host: config.host.clone(),
            port: config.port,
            password: config.password.clone(),
            version: config.version.into(),
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
            allow_concurrent_requests: config.allow_concurrent_requests,
            max_workers: config.max_workers,
            next_worker_id: AtomicUsize::new(0),
            workers: PLMutex::new(Vec::new()),
            idle: Notify::new(),
        }))
    }

    pub fn worker_count(&self) -> usize {
        self.0.workers.lock().len()
    }

    /// Acquires an idle worker, growing the pool if under capacity, or
    /// blocks until one is released. FIFO fairness is attempted (waiters
    /// re-check in notification order) but not guaranteed under contention.
    pub async fn acquire(&self) -> Result<PoolGuard, Error> {
        loop {
            // Registered before the checks below so a release that races
            // with this acquire can't be missed between the check and the
            // wait (the classic tokio::sync::Notify pitfall).
            let became_idle = self.0.idle.notified();

            if let Some(worker) = self.try_claim_idle() {
                return Ok(PoolGuard {
                    pool: self.0.clone(),
                    worker,
                });
            }

            if self.0.workers.lock().len() < self.0.max_workers {
                let worker = self.spawn_worker().await?;
                return Ok(PoolGuard {
                    pool: self.0.clone(),
                    worker,
                });
            }

            became_idle.await;
        }
    }

    fn try_claim_idle(&self) -> Option<Arc<Worker>> {
        let workers = self.0.workers.lock();
        workers.iter().find_map(|worker| {
            if worker.session.is_connected()
                && worker
                    .busy
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                Some(worker.clone())
            } else {
                None
            }
        })
    }

    async fn spawn_worker(&self) -> Result<Arc<Worker>, Error> {
        let id = self.0.next_worker_id.fetch_add(1, Ordering::SeqCst);
        let pool_weak = Arc::downgrade(&self.0);
        let on_connection_lost: ConnectionLostHook = Arc::new(move |_| {
            if let Some(pool) = pool_weak.upgrade() {
                pool.workers.lock().retain(|w| w.id != id);
                pool.idle.notify_waiters();
            }
        });

        let session = Session::connect(SessionOptions {
            host: self.0.host.clone(),
            port: self.0.port,
            password: self.0.password.clone(),
            version: self.0.version,
            connect_timeout: self.0.connect_timeout,
            request_timeout: self.0.request_timeout,
            allow_concurrent_requests: self.0.allow_concurrent_requests,
            on_connection_lost: Some(on_connection_lost),
        })
        .await?;

        let worker = Arc::new(Worker {
            id,
            session,
            busy: AtomicBool::new(true),
        });
        self.0.workers.lock().push(worker.clone());
        Ok(worker)
    }

    pub async fn execute(
        &self,
        name: &str,
        version: ProtocolVersion,
        body: String,
    ) -> Result<codec::Response, Error> {
        let worker = self.acquire().await?;
        worker.execute(name, version, body).await
    }
}
