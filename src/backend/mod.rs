//! Concrete backends for the connection manager

mod tcp;

pub use tcp::{TcpBackend, TcpHandle, DEFAULT_PORT};
