//! A runnable chat room.
//!
//! Listens on port 8080 with an in-memory user store and "root"
//! preseeded as admin. Point any client that speaks the length-prefixed
//! JSON protocol at it:
//!
//! ```text
//! RUST_LOG=info cargo run -p chatroom
//! ```

use parley::{MemoryRepository, ParleyServerBuilder};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let addr = std::env::args().nth(1).unwrap_or_else(|| "0.0.0.0:8080".to_string());

    let server = ParleyServerBuilder::new()
        .bind(&addr)
        .build(MemoryRepository::with_admins(["root"]))
        .await?;

    tracing::info!(%addr, "chat room listening");
    server.run().await?;
    Ok(())
}
