//! Trusted peer identity for Gatehouse nodes.
//!
//! This crate lets a node prove who it is to other nodes and decide whom to
//! trust:
//!
//! - Certificate store: persisted trust in peer keys, per domain
//! - Secure channels: Noise XX over TCP, pinned to the expected peer key
//! - Handshake protocol: mutual identity claims validated by the application
//! - Overlay bootstrap: discovery, network join and readiness
//!
//! # Architecture
//!
//! ```text
//! Overlay
//! ├── HandshakeServer ──┐
//! ├── HandshakeClient ──┼── SecureContext (Noise XX, static key from Identity)
//! │                     └── TrustContext
//! │                          ├── CertificateStore (KvBackend)
//! │                          ├── Authorizer (per-domain key sets)
//! │                          └── Validator (application callback)
//! ├── Discovery
//! └── Network
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use gatehouse_core::Identity;
//! use gatehouse_p2p::{
//!     allow_all, Overlay, P2pConfig, SeedNetwork, StaticDiscovery, TrustContext,
//! };
//!
//! let trust = Arc::new(TrustContext::in_memory(Identity::generate(), allow_all())?);
//! let config = P2pConfig::new("0.0.0.0:4523".parse()?);
//! let discovery = Arc::new(StaticDiscovery::from_peers(&config.seed_peers));
//! let network = Arc::new(SeedNetwork::new(trust.clone(), config.seed_peers.clone()));
//!
//! let overlay = Overlay::new(config, trust, discovery, network).await?;
//! overlay.start()?;
//! overlay.ready().await;
//! ```

pub mod config;
pub mod error;

pub mod protocol;
pub mod trust;
pub mod channel;
pub mod handshake;
pub mod overlay;
pub mod discovery;

// Re-export main types
pub use channel::{AuthMode, SecureChannel, SecureContext};
pub use config::{P2pConfig, TrustConfig, FRAME_MAGIC, MAX_FRAME_SIZE};
pub use discovery::{parse_seed_list, SeedNetwork, SeedPeer, StaticDiscovery};
pub use error::{P2pError, P2pResult};
pub use handshake::{AuthOutcome, HandshakeClient, HandshakeServer};
pub use overlay::{Discovery, Network, Overlay};
pub use trust::{
    allow_all, deny_all, Authorizer, CertificateStore, Domain, TrustContext, Validator,
    ValidatorRegistry,
};
