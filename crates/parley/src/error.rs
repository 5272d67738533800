//! Unified error type for the Parley server.

use parley_protocol::ProtocolError;
use parley_store::StoreError;
use parley_transport::TransportError;

/// Top-level error that wraps all layer-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From`
/// impls, so the `?` operator converts layer errors automatically.
/// None of these ever crash the process: a transport or protocol
/// fault closes one session, a store fault is surfaced to the one
/// client it concerns.
#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    /// A transport-level error (accept, send, recv, framing).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A user-store error (lookup, persistence).
    #[error(transparent)]
    Store(#[from] StoreError),
}
