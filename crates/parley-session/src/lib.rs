//! Client session management for Parley.
//!
//! This crate covers the server-side view of one connected client and
//! the set of all of them:
//!
//! 1. **Session** — one live connection: its framed transport, its
//!    (possibly absent) user, its inactivity timeout, and the
//!    write-once disconnect reason.
//! 2. **Registry** — the thread-safe collection of live sessions, the
//!    single serialization point for "who is online", used for
//!    broadcast, listing, and kickout.
//!
//! # How it fits in the stack
//!
//! ```text
//! Handler / dispatcher (above)   ← drives sessions, queries the registry
//!     ↕
//! Session layer (this crate)     ← connection + identity + lifecycle
//!     ↕
//! Transport / store (below)      ← frames and durable users
//! ```
//!
//! Sessions carry no error type of their own: their operations surface
//! `TransportError` from the connection they wrap and `StoreError`
//! from login's store call.

mod registry;
mod session;

pub use registry::Registry;
pub use session::{INACTIVITY_REASON, Session};
