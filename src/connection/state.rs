//! Connection state machine
//!
//! Backend signals arrive as [`ConnectionEvent`]s and are applied to
//! [`ConnectionFlags`] by pure transition functions. Each transition
//! returns a [`Notice`] describing what the manager should log, so the
//! whole machine can be exercised without a network.

use serde::Serialize;

/// Observable lifecycle state of the managed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No handle has been created yet
    Uninitialized,
    /// A connect sequence is in flight
    Connecting,
    /// The backend reported operational readiness
    Ready,
    /// A handle exists but is not usable; the backend may be reconnecting
    Disconnected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Lifecycle signal reported by a backend for one handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Socket-level connect started (initial or reconnect)
    Connecting,
    /// Backend can serve commands
    Ready,
    /// Connection failed or dropped
    Error(String),
    /// Connection closed gracefully
    Ended,
}

/// What a transition asks the manager to log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Connecting,
    Ready,
    /// An error took down a connection that was ready
    Disconnected(String),
    Ended,
    ConnectedSuccessfully,
    ConnectFailed(String),
    /// Nothing worth logging
    Quiet,
}

/// The readiness flags guarded by the manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionFlags {
    pub ready: bool,
    pub connecting: bool,
    /// The current handle has been ready at least once; its backend owns reconnects
    pub established: bool,
}

impl ConnectionFlags {
    /// Mark a new connect sequence as started
    ///
    /// Must run before the sequence first suspends.
    pub fn begin_attempt(&mut self) {
        self.connecting = true;
        self.ready = false;
        self.established = false;
    }

    /// Whether `acquire` has to build a new handle
    ///
    /// A handle that was ready once stays in place while disconnected, so
    /// callers holding it see the backend reconnect it.
    pub fn needs_attempt(&self, has_handle: bool) -> bool {
        !self.connecting && !self.ready && !(has_handle && self.established)
    }

    /// React to a backend-reported event
    pub fn apply(&mut self, event: &ConnectionEvent) -> Notice {
        match event {
            ConnectionEvent::Connecting => Notice::Connecting,
            ConnectionEvent::Ready => {
                self.ready = true;
                self.established = true;
                Notice::Ready
            }
            ConnectionEvent::Error(reason) => {
                let was_ready = self.ready;
                self.ready = false;
                if was_ready {
                    Notice::Disconnected(reason.clone())
                } else {
                    Notice::Quiet
                }
            }
            ConnectionEvent::Ended => {
                self.ready = false;
                Notice::Ended
            }
        }
    }

    /// Settle the connect sequence with its outcome
    ///
    /// Success duplicates the effect of a `Ready` event; applying both is
    /// harmless.
    pub fn settle<E: std::fmt::Display>(&mut self, outcome: Result<(), E>) -> Notice {
        let notice = match outcome {
            Ok(()) => {
                self.ready = true;
                self.established = true;
                Notice::ConnectedSuccessfully
            }
            Err(e) => {
                self.ready = false;
                Notice::ConnectFailed(e.to_string())
            }
        };
        self.connecting = false;
        notice
    }

    /// Derive the lifecycle state
    pub fn state(&self, has_handle: bool) -> ConnectionState {
        if !has_handle {
            ConnectionState::Uninitialized
        } else if self.ready {
            ConnectionState::Ready
        } else if self.connecting {
            ConnectionState::Connecting
        } else {
            ConnectionState::Disconnected
        }
    }
}
