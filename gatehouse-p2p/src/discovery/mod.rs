//! Seed-based bootstrap.
//!
//! [`StaticDiscovery`] hands out the configured seed addresses and
//! [`SeedNetwork`] authenticates the seeds behind them, answering lookups
//! from the peers the trust context has learned about.

pub mod seeds;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::P2pResult;
use crate::handshake::{AuthOutcome, HandshakeClient};
use crate::overlay::{Discovery, Network};
use crate::trust::{Domain, TrustContext};

pub use seeds::{parse_seed_list, SeedPeer};

/// Discovery from a fixed seed list.
#[derive(Clone, Debug, Default)]
pub struct StaticDiscovery {
    seeds: Vec<SocketAddr>,
}

impl StaticDiscovery {
    /// Discovery that always returns `seeds`.
    pub fn new(seeds: Vec<SocketAddr>) -> Self {
        Self { seeds }
    }

    /// Discovery over the addresses of configured seed peers.
    pub fn from_peers(peers: &[SeedPeer]) -> Self {
        Self::new(peers.iter().map(|p| p.addr).collect())
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn discover_seed_addresses(&self) -> P2pResult<Vec<SocketAddr>> {
        Ok(self.seeds.clone())
    }
}

/// Network made of the configured seeds and whoever has authenticated
/// with us.
pub struct SeedNetwork {
    trust: Arc<TrustContext>,
    seeds: Vec<SeedPeer>,
}

impl SeedNetwork {
    /// Network over `seeds`, recording peers in `trust`.
    pub fn new(trust: Arc<TrustContext>, seeds: Vec<SeedPeer>) -> Self {
        Self { trust, seeds }
    }

    async fn authenticate_seed(&self, seed: &SeedPeer, client: &HandshakeClient) -> P2pResult<AuthOutcome> {
        let target = match seed.public_key() {
            Ok(pk) => pk,
            Err(e) => {
                warn!(seed = %seed, error = %e, "Skipping malformed seed");
                return Ok(AuthOutcome::Invalid);
            }
        };
        let outcome = client
            .authenticate(&target.to_hex(), seed.addr, Domain::global().as_str())
            .await?;
        debug!(seed = %seed.addr, outcome = %outcome, "Seed authentication finished");
        Ok(outcome)
    }
}

#[async_trait]
impl Network for SeedNetwork {
    async fn join(&self, addrs: Vec<SocketAddr>, client: &HandshakeClient) -> P2pResult<()> {
        let mut authorized = 0usize;
        for seed in self.seeds.iter().filter(|s| addrs.contains(&s.addr)) {
            if self.authenticate_seed(seed, client).await?.is_authorized() {
                authorized += 1;
            }
        }
        info!(seeds = addrs.len(), authorized, "Joined network");
        Ok(())
    }

    async fn lookup(&self, verifying_key: &str) -> Option<SocketAddr> {
        let vk = verifying_key.to_ascii_lowercase();
        self.neighbors().get(&vk).copied().or_else(|| {
            self.seeds
                .iter()
                .find(|s| s.verifying_key == vk)
                .map(|s| s.addr)
        })
    }

    fn neighbors(&self) -> HashMap<String, SocketAddr> {
        self.trust
            .authorized_peers()
            .into_iter()
            .filter_map(|(vk, addr)| match addr.parse() {
                Ok(addr) => Some((vk, addr)),
                Err(_) => {
                    debug!(verifying_key = %vk, address = %addr, "Ignoring unroutable peer address");
                    None
                }
            })
            .collect()
    }

    async fn track_new_nodes(&self, client: &HandshakeClient) -> P2pResult<()> {
        for seed in &self.seeds {
            if self.trust.authorized_address(&seed.verifying_key).is_some() {
                continue;
            }
            self.authenticate_seed(seed, client).await?;
        }
        Ok(())
    }
}
