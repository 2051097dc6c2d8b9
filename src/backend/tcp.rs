//! TCP reference backend
//!
//! Opens a plain TCP socket to the host and port named by the cache URI
//! and keeps it alive with the reconnect policy handed over by the
//! manager. It knows nothing about the cache wire protocol: command
//! issuers lock the stream and talk to it directly, and call
//! [`TcpHandle::report_failure`] when the socket turns out to be dead.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, Weak};
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio::time::timeout;
use url::Url;

use crate::connection::{
    redact_uri, AddressFamily, CacheBackend, ConnectOptions, ConnectionEvent, EventSink,
};
use crate::types::{CacheError, Result};

/// Port used when the URI does not name one
pub const DEFAULT_PORT: u16 = 6379;

/// Backend producing [`TcpHandle`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpBackend;

#[async_trait]
impl CacheBackend for TcpBackend {
    type Handle = TcpHandle;

    fn create(&self, options: ConnectOptions, events: EventSink) -> TcpHandle {
        TcpHandle::new(options, events)
    }

    async fn connect(&self, handle: &TcpHandle) -> Result<()> {
        handle.establish().await
    }

    fn retire(&self, handle: &TcpHandle) {
        handle.close();
    }
}

enum Interrupt {
    Broken(String),
    Close,
}

/// Shared handle to one TCP connection and its reconnect loop
#[derive(Clone)]
pub struct TcpHandle {
    inner: Arc<TcpShared>,
}

struct TcpShared {
    options: ConnectOptions,
    events: EventSink,
    stream: Mutex<Option<TcpStream>>,
    open: AtomicBool,
    closed: AtomicBool,
    interrupts: mpsc::UnboundedSender<Interrupt>,
    /// Taken by the supervisor once the first connect succeeds
    pending: std::sync::Mutex<Option<mpsc::UnboundedReceiver<Interrupt>>>,
}

impl std::fmt::Debug for TcpHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpHandle")
            .field("uri", &redact_uri(self.uri()))
            .field("open", &self.is_open())
            .finish()
    }
}

impl TcpHandle {
    fn new(options: ConnectOptions, events: EventSink) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            inner: Arc::new(TcpShared {
                options,
                events,
                stream: Mutex::new(None),
                open: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                interrupts: tx,
                pending: std::sync::Mutex::new(Some(rx)),
            }),
        }
    }

    pub fn uri(&self) -> Option<&str> {
        self.inner.options.uri.as_deref()
    }

    pub fn family(&self) -> AddressFamily {
        self.inner.options.family
    }

    /// Whether a socket is currently established
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Whether both handles refer to the same connection
    pub fn same_as(&self, other: &TcpHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Exclusive access to the socket, `None` while disconnected
    pub async fn lock_stream(&self) -> MutexGuard<'_, Option<TcpStream>> {
        self.inner.stream.lock().await
    }

    /// Tell the reconnect loop the socket is dead
    ///
    /// Ignored unless the connection is currently open, so concurrent
    /// reports of the same failure trigger one reconnect.
    pub fn report_failure(&self, reason: impl Into<String>) {
        if self.inner.open.swap(false, Ordering::SeqCst) {
            let _ = self.inner.interrupts.send(Interrupt::Broken(reason.into()));
        }
    }

    /// Drop the socket for good and stop reconnecting
    ///
    /// If the stream is locked (a caller mid-command, or a connect
    /// installing its socket) the socket is dropped once the lock frees
    /// up, and `Ended` is only emitted then.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.open.store(false, Ordering::SeqCst);
        let _ = self.inner.interrupts.send(Interrupt::Close);

        if let Ok(mut slot) = self.inner.stream.try_lock() {
            self.inner.release(&mut slot);
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let shared = Arc::clone(&self.inner);
                runtime.spawn(async move {
                    let mut slot = shared.stream.lock().await;
                    shared.release(&mut slot);
                });
            }
            // Nothing can be holding the lock across an await without a runtime
            Err(_) => self.inner.events.emit(ConnectionEvent::Ended),
        }
    }

    /// Initial connect; starts the reconnect loop on success
    async fn establish(&self) -> Result<()> {
        let shared = &self.inner;
        if self.is_closed() {
            return Err(CacheError::Closed);
        }

        shared.events.emit(ConnectionEvent::Connecting);

        let stream = match open_stream(&shared.options).await {
            Ok(stream) => stream,
            Err(e) => {
                shared.events.emit(ConnectionEvent::Error(e.to_string()));
                return Err(e);
            }
        };

        if !shared.install(stream).await {
            return Err(CacheError::Closed);
        }

        let interrupts = shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(interrupts) = interrupts {
            tokio::spawn(supervise(Arc::downgrade(&self.inner), interrupts));
        }

        Ok(())
    }
}

impl TcpShared {
    /// Store a fresh socket and announce readiness; false if closed meanwhile
    ///
    /// `Ready` goes out under the stream lock, so a concurrent `close`
    /// always reports `Ended` after it.
    async fn install(&self, stream: TcpStream) -> bool {
        let mut slot = self.stream.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }

        *slot = Some(stream);
        self.open.store(true, Ordering::SeqCst);
        self.events.emit(ConnectionEvent::Ready);
        true
    }

    /// Final teardown once the stream lock is held
    fn release(&self, slot: &mut Option<TcpStream>) {
        slot.take();
        self.open.store(false, Ordering::SeqCst);
        self.events.emit(ConnectionEvent::Ended);
    }
}

/// Reconnect loop, alive while any handle clone exists
async fn supervise(shared: Weak<TcpShared>, mut interrupts: mpsc::UnboundedReceiver<Interrupt>) {
    while let Some(interrupt) = interrupts.recv().await {
        let reason = match interrupt {
            Interrupt::Broken(reason) => reason,
            Interrupt::Close => break,
        };

        let Some(strong) = shared.upgrade() else {
            break;
        };
        strong.stream.lock().await.take();
        strong.events.emit(ConnectionEvent::Error(reason));
        drop(strong);

        if !reconnect(&shared, &mut interrupts).await {
            break;
        }
    }

    if let Some(strong) = shared.upgrade() {
        strong.stream.lock().await.take();
    }
}

/// Retry until connected (true) or closed (false)
async fn reconnect(
    shared: &Weak<TcpShared>,
    interrupts: &mut mpsc::UnboundedReceiver<Interrupt>,
) -> bool {
    let mut attempt: u32 = 1;

    loop {
        let Some(strong) = shared.upgrade() else {
            return false;
        };
        let delay = strong.options.reconnect.next_delay(attempt);
        drop(strong);

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                interrupt = interrupts.recv() => match interrupt {
                    None | Some(Interrupt::Close) => return false,
                    Some(Interrupt::Broken(_)) => {}
                },
            }
        }

        let Some(strong) = shared.upgrade() else {
            return false;
        };
        if strong.closed.load(Ordering::SeqCst) {
            return false;
        }

        strong.events.emit(ConnectionEvent::Connecting);
        match open_stream(&strong.options).await {
            Ok(stream) => return strong.install(stream).await,
            Err(e) => strong.events.emit(ConnectionEvent::Error(e.to_string())),
        }

        attempt = attempt.saturating_add(1);
    }
}

/// Host and port named by the URI
fn endpoint(uri: Option<&str>) -> Result<(String, u16)> {
    let uri = uri.ok_or_else(|| CacheError::Config("cache URI is not set".into()))?;
    let url = Url::parse(uri)?;

    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| CacheError::Config(format!("cache URI has no host: {}", redact_uri(Some(uri)))))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();

    Ok((host, url.port().unwrap_or(DEFAULT_PORT)))
}

fn select_addrs(addrs: impl IntoIterator<Item = SocketAddr>, family: AddressFamily) -> Vec<SocketAddr> {
    addrs.into_iter().filter(|addr| family.admits(addr)).collect()
}

async fn open_stream(options: &ConnectOptions) -> Result<TcpStream> {
    let (host, port) = endpoint(options.uri.as_deref())?;

    let resolved = lookup_host((host.as_str(), port))
        .await
        .map_err(|e| CacheError::Connect(format!("Failed to resolve {}: {}", host, e)))?;

    let candidates = select_addrs(resolved, options.family);
    if candidates.is_empty() {
        return Err(CacheError::Connect(format!(
            "No {:?} address found for {}",
            options.family, host
        )));
    }

    let mut last_error = String::new();
    for addr in candidates {
        match timeout(options.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Ok(Err(e)) => last_error = format!("{}: {}", addr, e),
            Err(_) => last_error = format!("{}: timed out", addr),
        }
    }

    Err(CacheError::Connect(last_error))
}
