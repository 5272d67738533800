//! Core protocol types for Parley's wire format.
//!
//! Every application-level message is one [`Envelope`]. The transport
//! layer wraps the encoded envelope in a length-prefixed frame; this
//! module only cares about the envelope itself.

use serde::{Deserialize, Serialize};

/// The top-level wire message. Exactly one variant per message.
///
/// Being a Rust enum, an envelope structurally cannot carry zero or
/// two populated variants — bytes that don't match exactly one variant
/// are a decode error, never a half-populated value.
///
/// `#[serde(tag = "type")]` produces internally tagged JSON:
/// `{ "type": "Login", "user_name": "carol" }`. This keeps the wire
/// format self-describing and easy to inspect in logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    /// Client → Server: "This is who I am."
    ///
    /// Expected as the first message on a fresh connection, though the
    /// server tolerates chat/commands arriving first (they are simply
    /// attributed to a synthetic per-socket name).
    Login { user_name: String },

    /// Either direction: one chat line.
    ///
    /// Server → Client carries broadcasts from other users; the server
    /// also uses chat envelopes for its own notices (disconnect
    /// reasons, login failures). `sent_at` is Unix milliseconds.
    Chat {
        from_user: String,
        text: String,
        sent_at: u64,
    },

    /// Client → Server: an administrative command invocation.
    ///
    /// `parameter` is empty for commands that take none.
    Command { command: String, parameter: String },

    /// Server → Client: the outcome of a command invocation.
    ///
    /// `command` echoes the invoked name; `lines` are human-readable
    /// output rows; `success` is false for unauthorized, unknown, or
    /// failed commands.
    CommandResult {
        command: String,
        lines: Vec<String>,
        success: bool,
    },
}
