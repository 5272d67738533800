//! One live client connection and its state.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use parley_store::{StoreError, User, UserRepository, UserStore};
use parley_transport::{ConnectionId, FrameConnection, TransportError};

/// Disconnect reason stamped when the inactivity timeout fires.
pub const INACTIVITY_REASON: &str = "Disconnected due to inactivity";

/// One connected client.
///
/// Created when a connection is accepted, before any login. The state
/// machine is implicit: unauthenticated while `user` is `None`,
/// authenticated once login attaches one, closed when the owning
/// handler's receive loop exits.
///
/// # Ownership and mutation
///
/// The session is shared (`Arc<Session>`) between its owning handler
/// task and anyone broadcasting or administrating, but mutation is
/// one-sided: only the owner attaches the user and drives `recv`.
/// The single cross-task mutation is [`kickout`](Self::kickout), which
/// writes the write-once reason slot and fires the transport shutdown
/// signal — it never touches fields the owner is concurrently writing.
///
/// The session wraps its transport rather than subclassing it: each
/// receive outcome is inspected here (composition), which is how the
/// timeout gets translated into a disconnect reason.
pub struct Session {
    conn: FrameConnection,
    connected_at: Instant,
    idle_timeout: Duration,
    user: RwLock<Option<Arc<User>>>,
    // Write-once. Never cleared, never overwritten: the first reason
    // (kickout vs timeout race) is the one reported.
    disconnect_reason: Mutex<String>,
}

impl Session {
    /// Wraps an accepted connection into a fresh, unauthenticated
    /// session.
    pub fn new(conn: FrameConnection, idle_timeout: Duration) -> Self {
        Self {
            conn,
            connected_at: Instant::now(),
            idle_timeout,
            user: RwLock::new(None),
            disconnect_reason: Mutex::new(String::new()),
        }
    }

    /// The underlying connection's identifier.
    pub fn id(&self) -> ConnectionId {
        self.conn.id()
    }

    /// The remote peer's address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.conn.peer_addr()
    }

    /// Resolves (or first-creates) the named user and attaches it.
    ///
    /// Only the owning handler calls this. Fails only on a store
    /// fault; logging in again under a different name simply swaps the
    /// attached user.
    pub async fn login<R: UserRepository>(
        &self,
        store: &UserStore<R>,
        name: &str,
    ) -> Result<Arc<User>, StoreError> {
        let user = store.find_or_create(name).await?;
        *self.user.write().expect("session user lock poisoned") = Some(Arc::clone(&user));
        tracing::info!(id = %self.id(), name = user.name(), "session logged in");
        Ok(user)
    }

    /// The attached user, if any.
    pub fn current_user(&self) -> Option<Arc<User>> {
        self.user
            .read()
            .expect("session user lock poisoned")
            .clone()
    }

    /// The user's name, or the synthetic `Socket<N>` fallback while
    /// unauthenticated.
    pub fn display_name(&self) -> String {
        match self.current_user() {
            Some(user) => user.name().to_string(),
            None => format!("Socket{}", self.id().into_inner()),
        }
    }

    /// Whether the attached user is an admin. `false` without a user.
    pub fn is_admin(&self) -> bool {
        self.current_user().is_some_and(|u| u.is_admin())
    }

    /// Receives the next payload, applying the inactivity timeout.
    ///
    /// On timeout the session stamps [`INACTIVITY_REASON`] before
    /// returning the error, so the caller can deliver it as the final
    /// notice. Owner task only.
    pub async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let result = self.conn.recv(Some(self.idle_timeout)).await;
        if matches!(result, Err(TransportError::Timeout)) {
            self.set_disconnect_reason(INACTIVITY_REASON);
        }
        result
    }

    /// Sends one payload to this session's peer. Any task may call
    /// this; frames from concurrent senders never interleave.
    pub async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.conn.send(payload).await
    }

    /// Forcibly terminates this session's connection.
    ///
    /// Callable from any task (admin kickout, server shutdown). Stamps
    /// the reason if one was given, then forces the transport shut so
    /// the owner's blocked `recv` unblocks. The owner observes the
    /// shutdown, reports the reason, and removes the session itself —
    /// no other task destroys a session.
    pub fn kickout(&self, reason: &str) {
        if !reason.is_empty() {
            self.set_disconnect_reason(reason);
        }
        tracing::info!(id = %self.id(), name = %self.display_name(), reason, "session kicked");
        self.conn.force_shutdown();
    }

    /// Stamps the disconnect reason if none is set yet. Returns
    /// whether this call won the slot.
    pub fn set_disconnect_reason(&self, reason: &str) -> bool {
        let mut slot = self
            .disconnect_reason
            .lock()
            .expect("session reason lock poisoned");
        if slot.is_empty() {
            slot.push_str(reason);
            true
        } else {
            false
        }
    }

    /// The disconnect reason, if one was set.
    pub fn disconnect_reason(&self) -> Option<String> {
        let slot = self
            .disconnect_reason
            .lock()
            .expect("session reason lock poisoned");
        if slot.is_empty() { None } else { Some(slot.clone()) }
    }

    /// How long this session has been connected.
    pub fn connected_duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// One human-readable line for the `list` command: display name,
    /// admin flag, peer address, connected duration.
    pub fn info_line(&self) -> String {
        format!(
            "{}{}, IP: {}, time online {}s",
            self.display_name(),
            if self.is_admin() { " [admin]" } else { "" },
            self.peer_addr(),
            self.connected_duration().as_secs(),
        )
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("name", &self.display_name())
            .field("peer", &self.peer_addr())
            .finish()
    }
}
