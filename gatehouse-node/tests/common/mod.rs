//! Shared test helpers for gatehouse-node integration tests.

#![allow(dead_code)]

use std::path::Path;

use gatehouse_core::Identity;
use gatehouse_node::config::{IdentitySource, NodeConfig};
use gatehouse_p2p::SeedPeer;

/// A fixed identity derived from one repeated byte.
pub fn identity(byte: u8) -> Identity {
    Identity::derive(&[byte; 32])
}

/// Node configuration rooted at `dir`, listening on an OS-assigned port.
pub fn node_config(dir: &Path, name: &str, byte: u8) -> NodeConfig {
    NodeConfig {
        data_dir: dir.to_path_buf(),
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        node_name: name.to_string(),
        identity: IdentitySource::Seed(hex::encode([byte; 32])),
        ..Default::default()
    }
}

/// A seed entry pointing at `identity` on `addr`.
pub fn seed(identity: &Identity, addr: std::net::SocketAddr) -> SeedPeer {
    SeedPeer::new(identity.verifying_key_hex(), addr).unwrap()
}
