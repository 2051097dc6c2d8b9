//! Backend seam driven by the connection manager

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

use super::{AddressFamily, ConnectionEvent, ReconnectPolicy};
use crate::config::CacheArgs;
use crate::types::Result;

/// Everything a backend needs to build and connect a handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Cache URI, `None` when unconfigured
    pub uri: Option<String>,
    /// Socket family preference
    pub family: AddressFamily,
    /// Delay policy for backend-internal reconnects
    pub reconnect: ReconnectPolicy,
    /// Socket connect timeout
    pub connect_timeout: Duration,
}

impl ConnectOptions {
    pub fn from_args(args: &CacheArgs) -> Self {
        Self {
            uri: args.uri().map(str::to_owned),
            family: args.address_family(),
            reconnect: args.reconnect_policy(),
            connect_timeout: args.connect_timeout(),
        }
    }
}

/// Sending side of a handle's event stream
///
/// Emitting after the manager stopped listening is a no-op.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ConnectionEvent>,
}

/// Receiving side of a handle's event stream
pub type EventStream = mpsc::UnboundedReceiver<ConnectionEvent>;

impl EventSink {
    /// Create a connected sink/stream pair
    pub fn channel() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: ConnectionEvent) {
        let _ = self.tx.send(event);
    }
}

/// A client library able to produce connection handles
///
/// `create` must not block or suspend: the manager calls it while
/// holding its state lock. All I/O belongs in `connect`.
#[async_trait]
pub trait CacheBackend: Send + Sync + 'static {
    /// Shared handle given to callers that issue cache commands
    type Handle: Clone + Send + Sync + 'static;

    /// Build a handle that reports its lifecycle through `events`
    fn create(&self, options: ConnectOptions, events: EventSink) -> Self::Handle;

    /// Run the initial connect of a freshly created handle
    async fn connect(&self, handle: &Self::Handle) -> Result<()>;

    /// Stop a handle that the manager has replaced
    fn retire(&self, _handle: &Self::Handle) {}
}
