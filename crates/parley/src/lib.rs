//! # Parley
//!
//! A multi-user chat server. Clients connect over TCP, authenticate
//! with a user name, exchange chat and administrative commands, and
//! receive broadcasts from the other connected users.
//!
//! This meta crate ties the layers together: transport → protocol →
//! session → command dispatch. It owns the accept loop, the
//! per-connection handler, and the admin command table.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use parley::{MemoryRepository, ParleyServerBuilder};
//!
//! # async fn run() -> Result<(), parley::ParleyError> {
//! let server = ParleyServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .build(MemoryRepository::with_admins(["root"]))
//!     .await?;
//! server.run().await
//! # }
//! ```

mod dispatch;
mod error;
mod handler;
mod server;

pub use error::ParleyError;
pub use server::{ParleyServer, ParleyServerBuilder, SERVER_QUITTING_REASON, Shutdown};

// Re-export the layer types callers interact with.
pub use parley_protocol::{Codec, Envelope, JsonCodec, ProtocolError};
pub use parley_session::{INACTIVITY_REASON, Registry, Session};
pub use parley_store::{
    MemoryRepository, StoreError, User, UserRepository, UserStore,
};
pub use parley_transport::{
    ConnectionId, FrameConnection, FrameListener, TransportError,
};
