//! Connection manager
//!
//! Owns a single lazily created handle to the cache backend and its
//! readiness flags. `acquire` never suspends and never fails: it hands
//! back whatever handle exists (ready or not) and starts a connect
//! sequence in the background when no usable handle exists and nothing
//! is in flight. Reconnecting a handle that dropped after being ready is
//! left to the backend.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, error, trace};

use super::backend::{CacheBackend, ConnectOptions, EventSink, EventStream};
use super::state::{ConnectionEvent, ConnectionFlags, ConnectionState, Notice};
use crate::config::CacheArgs;
use crate::types::{CacheError, Result};

/// Point-in-time view of the manager, for health output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub ready: bool,
    pub connecting: bool,
    /// Configured URI with credentials masked
    pub uri: String,
    /// Number of handles created so far
    pub generation: u64,
}

/// Lazily connecting owner of the cache backend handle
pub struct ConnectionManager<B: CacheBackend> {
    shared: Arc<Shared<B>>,
}

impl<B: CacheBackend> Clone for ConnectionManager<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<B: CacheBackend> {
    config: CacheArgs,
    backend: B,
    slot: Mutex<Slot<B::Handle>>,
}

/// Handle and flags, checked and updated under one lock
struct Slot<H> {
    handle: Option<H>,
    /// Bumped for every created handle; stale events carry an older value
    generation: u64,
    flags: ConnectionFlags,
}

impl<B: CacheBackend> ConnectionManager<B> {
    /// Create a manager; no connection is made until the first `acquire`
    pub fn new(config: CacheArgs, backend: B) -> Self {
        debug!("cache URI: {}", config.redacted_uri());

        Self {
            shared: Arc::new(Shared {
                config,
                backend,
                slot: Mutex::new(Slot {
                    handle: None,
                    generation: 0,
                    flags: ConnectionFlags::default(),
                }),
            }),
        }
    }

    /// Get the current handle, starting a connect sequence if needed
    ///
    /// The returned handle may not be ready yet; callers detect that when
    /// their commands fail. A handle that has been ready once is never
    /// replaced: while it is down the backend reconnects it in place.
    /// Only a handle whose initial connect failed gets replaced. Returns
    /// `None` only when no handle has ever been created and no tokio
    /// runtime is available to drive one.
    pub fn acquire(&self) -> Option<B::Handle> {
        let mut slot = self.shared.lock_slot();

        if slot.flags.ready {
            if let Some(ref handle) = slot.handle {
                return Some(handle.clone());
            }
        }

        if !slot.flags.needs_attempt(slot.handle.is_some()) {
            return slot.handle.clone();
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                let current = slot.handle.clone();
                drop(slot);
                error!("connect failed: {}", e);
                return current;
            }
        };

        slot.flags.begin_attempt();
        slot.generation += 1;
        let generation = slot.generation;

        let (events, stream) = EventSink::channel();
        let options = ConnectOptions::from_args(&self.shared.config);
        let handle = self.shared.backend.create(options, events);
        let previous = slot.handle.replace(handle.clone());
        drop(slot);

        if let Some(previous) = previous {
            self.shared.backend.retire(&previous);
        }

        runtime.spawn(pump_events(Arc::downgrade(&self.shared), generation, stream));

        let shared = Arc::clone(&self.shared);
        let attempt = handle.clone();
        let connect = runtime.spawn(async move { shared.backend.connect(&attempt).await });

        // Settling from a second task keeps `connecting` from sticking if connect panics
        let shared = Arc::clone(&self.shared);
        runtime.spawn(async move {
            let outcome = match connect.await {
                Ok(outcome) => outcome,
                Err(e) => Err(CacheError::Connect(format!("connect task failed: {}", e))),
            };
            shared.settle(generation, outcome);
        });

        Some(handle)
    }

    /// Current handle without side effects
    pub fn current(&self) -> Option<B::Handle> {
        self.shared.lock_slot().handle.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.shared.lock_slot().flags.ready
    }

    pub fn is_connecting(&self) -> bool {
        self.shared.lock_slot().flags.connecting
    }

    pub fn state(&self) -> ConnectionState {
        let slot = self.shared.lock_slot();
        slot.flags.state(slot.handle.is_some())
    }

    /// Number of handles created so far
    pub fn attempts(&self) -> u64 {
        self.shared.lock_slot().generation
    }

    pub fn status(&self) -> ConnectionStatus {
        let slot = self.shared.lock_slot();
        ConnectionStatus {
            state: slot.flags.state(slot.handle.is_some()),
            ready: slot.flags.ready,
            connecting: slot.flags.connecting,
            uri: self.shared.config.redacted_uri(),
            generation: slot.generation,
        }
    }

    pub fn config(&self) -> &CacheArgs {
        &self.shared.config
    }

    pub fn backend(&self) -> &B {
        &self.shared.backend
    }
}

impl<B: CacheBackend> Shared<B> {
    fn lock_slot(&self) -> MutexGuard<'_, Slot<B::Handle>> {
        // Flags stay consistent even if a holder panicked; no await happens under the lock
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply an event; false once `generation` has been superseded
    fn apply_event(&self, generation: u64, event: &ConnectionEvent) -> bool {
        let notice = {
            let mut slot = self.lock_slot();
            if slot.generation != generation {
                return false;
            }
            slot.flags.apply(event)
        };

        log_notice(generation, notice);
        true
    }

    /// Record the outcome of a connect sequence and clear `connecting`
    fn settle(&self, generation: u64, outcome: Result<()>) {
        let notice = {
            let mut slot = self.lock_slot();
            if slot.generation != generation {
                return;
            }
            slot.flags.settle(outcome)
        };

        log_notice(generation, notice);
    }
}

async fn pump_events<B: CacheBackend>(
    shared: Weak<Shared<B>>,
    generation: u64,
    mut events: EventStream,
) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };

        if !shared.apply_event(generation, &event) {
            trace!(generation, "ignoring events from superseded handle");
            break;
        }
    }
}

fn log_notice(generation: u64, notice: Notice) {
    match notice {
        Notice::Connecting => debug!(generation, "connecting"),
        Notice::Ready => debug!(generation, "ready"),
        Notice::Disconnected(reason) => error!(generation, "disconnected: {}", reason),
        Notice::Ended => debug!(generation, "connection ended"),
        Notice::ConnectedSuccessfully => debug!(generation, "connected successfully"),
        Notice::ConnectFailed(reason) => error!(generation, "connect failed: {}", reason),
        Notice::Quiet => {}
    }
}
