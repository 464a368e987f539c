//! Seams between the overlay and the services it drives.

use std::collections::HashMap;
use std::net::SocketAddr;

use async_trait::async_trait;

use crate::error::P2pResult;
use crate::handshake::HandshakeClient;

/// Finds addresses to bootstrap from.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Handshake addresses of the peers to join through.
    async fn discover_seed_addresses(&self) -> P2pResult<Vec<SocketAddr>>;

    /// Background work, such as answering discovery probes. Runs for the
    /// lifetime of the overlay; the default has nothing to do.
    async fn listen(&self) -> P2pResult<()> {
        std::future::pending().await
    }
}

/// Peer routing and membership.
#[async_trait]
pub trait Network: Send + Sync {
    /// Enter the network through `seeds`, authenticating with `client`.
    async fn join(&self, seeds: Vec<SocketAddr>, client: &HandshakeClient) -> P2pResult<()>;

    /// Handshake address of the node with `verifying_key`, if known.
    async fn lookup(&self, verifying_key: &str) -> Option<SocketAddr>;

    /// Known neighbours, keyed by verifying key.
    fn neighbors(&self) -> HashMap<String, SocketAddr>;

    /// Background work for the lifetime of the overlay; the default has
    /// nothing to do.
    async fn listen(&self) -> P2pResult<()> {
        std::future::pending().await
    }

    /// Authenticate nodes that have become known since the last call.
    async fn track_new_nodes(&self, client: &HandshakeClient) -> P2pResult<()>;
}
