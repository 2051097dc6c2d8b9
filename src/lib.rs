//! cache-link - lazy connection lifecycle for a single cache backend
//!
//! A [`ConnectionManager`] owns one handle to the cache server. The first
//! [`ConnectionManager::acquire`] creates it and starts connecting in the
//! background; later calls hand out the same handle whether or not it is
//! ready yet. Readiness is tracked from backend-reported events, and
//! reconnects after a drop are left to the backend, paced by a linear
//! [`ReconnectPolicy`].
//!
//! ## Modules
//!
//! - **connection**: manager, state machine, backoff, URI helpers, backend seam
//! - **backend**: protocol-agnostic TCP backend
//! - **config**: CLI/environment configuration

pub mod backend;
pub mod config;
pub mod connection;
pub mod types;

pub use backend::{TcpBackend, TcpHandle};
pub use config::{Args, CacheArgs};
pub use connection::{
    CacheBackend, ConnectOptions, ConnectionManager, ConnectionState, ConnectionStatus,
    ReconnectPolicy,
};
pub use types::{CacheError, Result};
