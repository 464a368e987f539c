//! Authenticated encryption between nodes.
//!
//! Channels run Noise XX over X25519 static keys derived from each node's
//! identity. An initiator always pins the responder's expected key. A
//! responder either keeps any authenticated peer or checks the live trust
//! view for the domain the initiator asked for.

mod context;
mod secure;

pub use context::{AuthMode, SecureContext};
pub use secure::{SecureChannel, MAX_PLAINTEXT};
