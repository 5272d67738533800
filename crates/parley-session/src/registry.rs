//! The live-session registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use parley_transport::ConnectionId;

use crate::Session;

/// The set of all currently connected sessions.
///
/// One internal lock guards the map, and nothing async happens while
/// it is held — network I/O always works on a [`snapshot`](Self::snapshot)
/// taken first. Constructed once at server startup and shared by
/// handle; entries are added on accept and removed only by each
/// session's own handler on exit.
///
/// Hard global invariant: no method of this type calls into the user
/// store, and the store never calls in here. The two locks are never
/// nested, in either order.
pub struct Registry {
    sessions: Mutex<HashMap<ConnectionId, Arc<Session>>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Adds a freshly accepted session and returns the shared handle.
    pub fn register(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        self.sessions
            .lock()
            .expect("registry lock poisoned")
            .insert(session.id(), Arc::clone(&session));
        tracing::debug!(id = %session.id(), "session registered");
        session
    }

    /// Removes a session. Called by the session's own handler after
    /// its receive loop ends; returns whether the entry existed.
    pub fn deregister(&self, id: ConnectionId) -> bool {
        let removed = self
            .sessions
            .lock()
            .expect("registry lock poisoned")
            .remove(&id)
            .is_some();
        if removed {
            tracing::debug!(%id, "session deregistered");
        }
        removed
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().expect("registry lock poisoned").len()
    }

    /// Whether no session is connected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` over every live session, under the registry lock.
    ///
    /// `f` must not register or deregister sessions (reentrant
    /// locking) and must not block; for anything involving network
    /// I/O, use [`snapshot`](Self::snapshot) instead.
    pub fn for_each(&self, mut f: impl FnMut(&Session)) {
        for session in self
            .sessions
            .lock()
            .expect("registry lock poisoned")
            .values()
        {
            f(session);
        }
    }

    /// Clones out the current set of sessions.
    ///
    /// The lock is released before the caller touches any of them, so
    /// sends to slow peers never stall registration.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions
            .lock()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Kicks every session matching `pred` and returns how many
    /// matched.
    ///
    /// The matched sessions' own handlers observe the forced shutdown
    /// and deregister themselves; this method removes nothing.
    pub fn kickout_matching(&self, pred: impl Fn(&Session) -> bool, reason: &str) -> usize {
        let mut count = 0;
        self.for_each(|session| {
            if pred(session) {
                session.kickout(reason);
                count += 1;
            }
        });
        count
    }

    /// Sends `payload` to every live session except `except`.
    ///
    /// Best-effort per recipient: a failed send is logged and skipped,
    /// it neither aborts delivery to the rest nor fails the caller.
    /// With no other session registered, this is a no-op.
    pub async fn broadcast(&self, payload: &[u8], except: Option<ConnectionId>) {
        for session in self.snapshot() {
            if Some(session.id()) == except {
                continue;
            }
            if let Err(e) = session.send(payload).await {
                tracing::warn!(
                    id = %session.id(),
                    name = %session.display_name(),
                    error = %e,
                    "broadcast delivery failed"
                );
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
