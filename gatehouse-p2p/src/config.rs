//! P2P configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::discovery::SeedPeer;

/// Magic bytes opening every frame on a Gatehouse secure channel.
pub const FRAME_MAGIC: [u8; 4] = *b"GHSE";

/// Largest frame payload. Matches the Noise message ceiling.
pub const MAX_FRAME_SIZE: usize = 65535;

/// Default handshake listener port.
pub const DEFAULT_HANDSHAKE_PORT: u16 = 4523;

/// How long a client waits for a handshake reply before reporting no reply.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(1);

/// How long one inbound exchange may hold the serialized server.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between connect attempts while the target refuses connections.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(100);

/// Default node label.
pub const DEFAULT_NODE_NAME: &str = "gatehouse";

/// Configuration for the handshake server, client and overlay.
#[derive(Debug, Clone)]
pub struct P2pConfig {
    /// Address the handshake listener binds to.
    pub bind_addr: SocketAddr,

    /// Address announced to peers in handshake requests. Falls back to the
    /// listener's bound address.
    pub advertise_addr: Option<SocketAddr>,

    /// Label naming this node's certificate directory.
    pub node_name: String,

    /// Client-side bound on a whole handshake exchange.
    pub auth_timeout: Duration,

    /// Server-side bound on a single inbound exchange.
    pub exchange_timeout: Duration,

    /// Retry interval while a handshake target refuses connections.
    pub reconnect_interval: Duration,

    /// Seed peers contacted during bootstrap.
    pub seed_peers: Vec<SeedPeer>,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_HANDSHAKE_PORT)),
            advertise_addr: None,
            node_name: DEFAULT_NODE_NAME.to_string(),
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            seed_peers: Vec::new(),
        }
    }
}

impl P2pConfig {
    /// Create a new configuration with the specified bind address.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Set the advertised address.
    pub fn with_advertise_addr(mut self, addr: SocketAddr) -> Self {
        self.advertise_addr = Some(addr);
        self
    }

    /// Set the node name.
    pub fn with_node_name(mut self, name: impl Into<String>) -> Self {
        self.node_name = name.into();
        self
    }

    /// Set the client reply timeout.
    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    /// Set the per-exchange server timeout.
    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    /// Set the connect retry interval.
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Set the seed peers used for bootstrap.
    pub fn with_seed_peers(mut self, peers: Vec<SeedPeer>) -> Self {
        self.seed_peers = peers;
        self
    }

    /// The address peers should be told to reach us at, given the listener's
    /// actual bound address.
    pub fn announced_addr(&self, bound: SocketAddr) -> SocketAddr {
        self.advertise_addr.unwrap_or(bound)
    }
}

/// Trust store settings.
#[derive(Debug, Clone, Default)]
pub struct TrustConfig {
    /// Remove every stored certificate before writing the self-certificate.
    pub wipe_certs: bool,
}

impl TrustConfig {
    /// Set the wipe flag.
    pub fn with_wipe_certs(mut self, wipe: bool) -> Self {
        self.wipe_certs = wipe;
        self
    }
}
