//! Per-connection handler: the receive-dispatch-reply cycle.
//!
//! Each accepted connection gets its own Tokio task running
//! [`handle_session`]. The flow is:
//!   1. Receive one envelope from the session's framed transport
//!   2. Route it: Login → user store, Chat → store + broadcast,
//!      Command → dispatcher → reply to sender only
//!   3. On any receive or protocol fault: final notice, disconnect
//!      broadcast, deregister, exit
//!
//! Per-connection FIFO falls out of the structure: one task, one
//! blocking `recv`, no concurrent processing of two envelopes from
//! the same session.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parley_protocol::{Codec, Envelope};
use parley_session::Session;
use parley_store::UserRepository;
use parley_transport::TransportError;

use crate::ParleyError;
use crate::dispatch::dispatch;
use crate::server::ServerState;

/// Current wall-clock time in Unix milliseconds.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A chat-style notice from the server itself (login failures,
/// disconnect reasons).
pub(crate) fn server_notice(text: String) -> Envelope {
    Envelope::Chat {
        from_user: "server".to_string(),
        text,
        sent_at: now_millis(),
    }
}

/// Drives one session from registration to deregistration.
///
/// Always cleans up — every exit path runs the final-notice /
/// disconnect-broadcast / deregister sequence, and only this task
/// ever removes the session from the registry.
pub(crate) async fn handle_session<R: UserRepository>(
    session: Arc<Session>,
    state: Arc<ServerState<R>>,
) -> Result<(), ParleyError> {
    let conn_id = session.id();
    tracing::info!(%conn_id, peer = %session.peer_addr(), "client connected");

    loop {
        let payload = match session.recv().await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                tracing::info!(%conn_id, name = %session.display_name(), "peer closed cleanly");
                break;
            }
            Err(TransportError::Timeout) => {
                // recv already stamped the inactivity reason.
                tracing::info!(%conn_id, name = %session.display_name(), "inactivity timeout");
                break;
            }
            Err(TransportError::Shutdown) => {
                // Kicked by an admin or by server shutdown.
                tracing::info!(%conn_id, name = %session.display_name(), "force-shut");
                break;
            }
            Err(e) => {
                tracing::warn!(%conn_id, name = %session.display_name(), error = %e, "recv failed");
                break;
            }
        };

        // A frame we can't decode means the peer is broken or hostile:
        // treated like a transport fault, the session closes.
        let envelope: Envelope = match state.codec.decode(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "undecodable frame, closing session");
                break;
            }
        };

        let outcome = match envelope {
            Envelope::Login { user_name } => handle_login(&session, &state, &user_name).await,
            Envelope::Chat { text, .. } => handle_chat(&session, &state, &text).await,
            Envelope::Command { command, parameter } => {
                let reply = dispatch(&state, &session, &command, &parameter).await;
                send_to(&session, &state, &reply).await
            }
            Envelope::CommandResult { .. } => {
                // Server-to-client only; a client sending one is
                // protocol misuse, but harmless enough to ignore.
                tracing::warn!(%conn_id, "ignoring CommandResult from client");
                Ok(())
            }
        };

        if let Err(e) = outcome {
            tracing::debug!(%conn_id, error = %e, "handler step failed, closing session");
            break;
        }
    }

    finish_session(&session, &state).await;
    Ok(())
}

/// Login: resolve or create the user. A store fault is surfaced to
/// this client as a "can't login" notice; the session stays open and
/// unauthenticated.
async fn handle_login<R: UserRepository>(
    session: &Arc<Session>,
    state: &Arc<ServerState<R>>,
    user_name: &str,
) -> Result<(), ParleyError> {
    match session.login(&state.users, user_name).await {
        Ok(_user) => Ok(()),
        Err(e) => {
            tracing::warn!(id = %session.id(), %user_name, error = %e, "login failed");
            let notice = server_notice(format!("can't login as {user_name}: {e}"));
            send_to(session, state, &notice).await
        }
    }
}

/// Chat: best-effort persistence, then broadcast to everyone else.
///
/// The broadcast carries the session's own display name and the
/// server clock — whatever attribution the client claimed is ignored.
/// A storage failure is logged and the message is still broadcast;
/// that is a deliberate best-effort choice, not an oversight.
async fn handle_chat<R: UserRepository>(
    session: &Arc<Session>,
    state: &Arc<ServerState<R>>,
    text: &str,
) -> Result<(), ParleyError> {
    let sent_at = now_millis();

    if let Some(user) = session.current_user() {
        if let Err(e) = state.users.store_chat(&user, sent_at, text).await {
            tracing::warn!(name = user.name(), error = %e, "chat storage failed");
        }
    }

    let envelope = Envelope::Chat {
        from_user: session.display_name(),
        text: text.to_string(),
        sent_at,
    };
    let bytes = state.codec.encode(&envelope)?;
    state.registry.broadcast(&bytes, Some(session.id())).await;
    Ok(())
}

/// Encodes and sends one envelope to this session's own peer.
async fn send_to<R: UserRepository>(
    session: &Arc<Session>,
    state: &Arc<ServerState<R>>,
    envelope: &Envelope,
) -> Result<(), ParleyError> {
    let bytes = state.codec.encode(envelope)?;
    session.send(&bytes).await.map_err(ParleyError::Transport)
}

/// Teardown, run exactly once per session by its own handler:
/// best-effort final notice if a disconnect reason was set, disconnect
/// broadcast to the others, deregistration.
async fn finish_session<R: UserRepository>(session: &Arc<Session>, state: &Arc<ServerState<R>>) {
    if let Some(reason) = session.disconnect_reason() {
        // The receive side may be force-shut, but the send side is
        // still open; the peer gets one explanatory line if it is
        // still listening.
        if let Ok(bytes) = state.codec.encode(&server_notice(reason)) {
            let _ = session.send(&bytes).await;
        }
    }

    state.registry.deregister(session.id());

    let notice = Envelope::Chat {
        from_user: session.display_name(),
        text: "disconnected".to_string(),
        sent_at: now_millis(),
    };
    if let Ok(bytes) = state.codec.encode(&notice) {
        state.registry.broadcast(&bytes, Some(session.id())).await;
    }

    tracing::info!(
        id = %session.id(),
        name = %session.display_name(),
        reason = session.disconnect_reason().as_deref().unwrap_or("peer closed"),
        "session closed"
    );
}
