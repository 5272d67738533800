//! `ParleyServer` builder and accept loop.
//!
//! This is the entry point for running a Parley chat server. It ties
//! together all the layers: transport → protocol → session → dispatch.

use std::sync::Arc;
use std::time::Duration;

use parley_protocol::JsonCodec;
use parley_session::{Registry, Session};
use parley_store::{UserRepository, UserStore};
use parley_transport::FrameListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::ParleyError;
use crate::handler::handle_session;

/// Disconnect reason used when the server shuts down.
pub const SERVER_QUITTING_REASON: &str = "server quitting";

/// Process-wide shutdown flag.
///
/// Cloneable handle around a watch channel: the `quit` command (or any
/// embedding code) calls [`trigger`](Self::trigger), and the accept
/// loop races [`wait`](Self::wait) against `accept` — so shutdown
/// interrupts a blocked accept instead of waiting for one more
/// connection to arrive.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Flips the flag. Idempotent.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Completes once shutdown is requested (immediately if it
    /// already was).
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Shared server state passed to each connection handler task.
///
/// Constructed exactly once in [`ParleyServerBuilder::build`] and
/// handed around by `Arc` — there are no ambient globals. The registry
/// and the user store each own exactly one internal lock; no code path
/// in this crate holds one while acquiring the other.
pub(crate) struct ServerState<R: UserRepository> {
    pub(crate) registry: Registry,
    pub(crate) users: UserStore<R>,
    pub(crate) codec: JsonCodec,
    pub(crate) shutdown: Shutdown,
    pub(crate) idle_timeout: Duration,
}

/// Builder for configuring and starting a Parley server.
pub struct ParleyServerBuilder {
    bind_addr: String,
    idle_timeout: Duration,
}

impl ParleyServerBuilder {
    /// Creates a new builder with default settings: loopback port 8080
    /// and a 10-minute inactivity timeout.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            idle_timeout: Duration::from_secs(10 * 60),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the per-session inactivity timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Binds the listener and builds the server over the given user
    /// repository.
    pub async fn build<R: UserRepository>(
        self,
        repo: R,
    ) -> Result<ParleyServer<R>, ParleyError> {
        let listener = FrameListener::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            registry: Registry::new(),
            users: UserStore::new(repo),
            codec: JsonCodec,
            shutdown: Shutdown::new(),
            idle_timeout: self.idle_timeout,
        });

        Ok(ParleyServer { listener, state })
    }
}

impl Default for ParleyServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Parley chat server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ParleyServer<R: UserRepository> {
    listener: FrameListener,
    state: Arc<ServerState<R>>,
}

impl<R: UserRepository> ParleyServer<R> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Returns a handle that can shut this server down from outside
    /// (the admin `quit` command uses the same flag internally).
    pub fn shutdown_handle(&self) -> Shutdown {
        self.state.shutdown.clone()
    }

    /// Runs the accept loop until shutdown.
    ///
    /// Each accepted connection becomes a registered session with its
    /// own handler task, supervised through a [`JoinSet`]. On shutdown
    /// every remaining session is kicked and the JoinSet is drained,
    /// so returning from `run` positively confirms that all handlers
    /// have exited.
    pub async fn run(self) -> Result<(), ParleyError> {
        tracing::info!("Parley server running");
        let mut handlers = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.state.shutdown.wait() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => {
                        let session = self
                            .state
                            .registry
                            .register(Session::new(conn, self.state.idle_timeout));
                        let state = Arc::clone(&self.state);
                        handlers.spawn(async move {
                            if let Err(e) = handle_session(session, state).await {
                                tracing::debug!(error = %e, "session ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        // The quit command already kicked everyone, but shutdown can
        // also come from an external handle; kicking twice is a no-op
        // thanks to the write-once reason slot.
        let kicked = self
            .state
            .registry
            .kickout_matching(|_| true, SERVER_QUITTING_REASON);
        if kicked > 0 {
            tracing::info!(kicked, "kicked remaining sessions for shutdown");
        }

        while let Some(res) = handlers.join_next().await {
            if let Err(e) = res {
                tracing::error!(error = %e, "session handler panicked");
            }
        }

        tracing::info!("Parley server stopped, all handlers exited");
        Ok(())
    }
}
