//! User identity and chat persistence for Parley.
//!
//! This crate owns the answer to "who is this user" and "what did they
//! say":
//!
//! 1. **Identity** — the shared [`User`] value (name, admin flag).
//!    At most one live `User` exists per name; every session logged in
//!    under that name references the same one.
//! 2. **Persistence seam** — the [`UserRepository`] trait. The durable
//!    row-store behind it is an external collaborator; this crate
//!    ships [`MemoryRepository`] for demos and tests.
//! 3. **Caching** — [`UserStore`], the cache-plus-persistence front
//!    door with the locking discipline that keeps concurrent first
//!    logins from minting duplicate users.
//!
//! # How it fits in the stack
//!
//! ```text
//! Command dispatch / handler (above)  ← resolves users, stores chat
//!     ↕
//! User store (this crate)             ← cache + repository calls
//!     ↕
//! Repository implementation (below)   ← durable rows, external
//! ```

#![allow(async_fn_in_trait)]

mod error;
mod repo;
mod store;
mod user;

pub use error::StoreError;
pub use repo::{ChatRow, MemoryRepository, UserRecord, UserRepository};
pub use store::UserStore;
pub use user::User;
