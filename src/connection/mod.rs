//! Connection lifecycle for a single cache backend
//!
//! - [`ConnectionManager`] hands out the shared handle and starts connect sequences
//! - [`CacheBackend`] is the seam to whatever client library owns the socket
//! - [`ConnectionFlags`] holds the pure readiness state machine
//! - [`ReconnectPolicy`] computes backend reconnect delays

mod backend;
mod backoff;
mod endpoint;
mod manager;
mod state;

pub use backend::{CacheBackend, ConnectOptions, EventSink, EventStream};
pub use backoff::{ReconnectPolicy, DEFAULT_RECONNECT_MAX, DEFAULT_RECONNECT_STEP};
pub use endpoint::{redact_uri, uri_host, AddressFamily, URI_NOT_SET};
pub use manager::{ConnectionManager, ConnectionStatus};
pub use state::{ConnectionEvent, ConnectionFlags, ConnectionState, Notice};
