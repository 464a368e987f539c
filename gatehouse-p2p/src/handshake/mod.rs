//! Mutual authentication handshake.
//!
//! The initiator opens a secure channel pinned to the key it expects, then
//! sends its verifying key, its reachable address and the domain it wants to
//! join. A responder whose validator accepts the claim records the initiator
//! and answers with its own verifying key; otherwise it hangs up without a
//! word. The initiator checks that the answer really belongs to the key it
//! pinned, validates it too, and records the responder the same way.

mod client;
mod server;

pub use client::{AuthOutcome, HandshakeClient};
pub use server::{Exchange, HandshakeServer};
