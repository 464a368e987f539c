//! Wire protocol.
//!
//! - Length-prefixed framing shared by every secure channel
//! - The three-frame identity claim and its one-frame reply

pub mod framing;
pub mod messages;

pub use framing::FrameCodec;
pub use messages::{HandshakeReply, HandshakeRequest, REPLY_FRAMES, REQUEST_FRAMES};
