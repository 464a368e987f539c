//! Overlay bootstrap.
//!
//! The [`Overlay`] owns the handshake server and client and drives the
//! discovery and network collaborators:
//!
//! ```text
//! Overlay::start()
//! ├── Discovery listener
//! ├── Handshake server
//! ├── Network listener
//! └── Bootup: discover seeds -> join -> ready
//! ```
//!
//! Readiness fires once, after bootup. Any task failing ends
//! [`Overlay::join`], which is where a supervisor decides to restart.

mod collaborators;

pub use collaborators::{Discovery, Network};

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use gatehouse_core::public_key_of;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, error, info};

use crate::config::P2pConfig;
use crate::error::{P2pError, P2pResult};
use crate::handshake::{AuthOutcome, HandshakeClient, HandshakeServer};
use crate::trust::TrustContext;

/// Bootstraps a node into the peer network.
pub struct Overlay {
    trust: Arc<TrustContext>,
    client: Arc<HandshakeClient>,
    discovery: Arc<dyn Discovery>,
    network: Arc<dyn Network>,
    handshake_addr: SocketAddr,
    server: Mutex<Option<HandshakeServer>>,
    tasks: Mutex<Option<JoinSet<P2pResult<()>>>>,
    handles: Mutex<Vec<AbortHandle>>,
    ready: Arc<watch::Sender<bool>>,
    started: Arc<AtomicBool>,
}

impl Overlay {
    /// Bind the handshake listener and prepare the overlay. Nothing runs
    /// until [`Overlay::start`].
    pub async fn new(
        config: P2pConfig,
        trust: Arc<TrustContext>,
        discovery: Arc<dyn Discovery>,
        network: Arc<dyn Network>,
    ) -> P2pResult<Self> {
        let server = HandshakeServer::bind(trust.clone(), &config).await?;
        let handshake_addr = server.local_addr()?;
        let announced = config.announced_addr(handshake_addr);
        let client = Arc::new(HandshakeClient::new(trust.clone(), &config, announced));
        let (ready, _) = watch::channel(false);

        info!(
            node = %config.node_name,
            listen = %handshake_addr,
            announced = %announced,
            verifying_key = %trust.identity().verifying_key_hex(),
            "Overlay created"
        );

        Ok(Self {
            trust,
            client,
            discovery,
            network,
            handshake_addr,
            server: Mutex::new(Some(server)),
            tasks: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
            ready: Arc::new(ready),
            started: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Address the handshake listener is bound to.
    pub fn handshake_addr(&self) -> SocketAddr {
        self.handshake_addr
    }

    /// Shared trust state.
    pub fn trust(&self) -> &Arc<TrustContext> {
        &self.trust
    }

    /// Client used for outbound claims.
    pub fn client(&self) -> &Arc<HandshakeClient> {
        &self.client
    }

    /// Spawn the overlay's tasks. Must be called from within a tokio
    /// runtime. An overlay starts at most once.
    pub fn start(&self) -> P2pResult<()> {
        let server = self
            .server
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(P2pError::AlreadyStarted)?;

        let mut set = JoinSet::new();
        let mut handles = Vec::with_capacity(4);

        let discovery = self.discovery.clone();
        handles.push(set.spawn(async move { discovery.listen().await }));

        handles.push(set.spawn(server.serve()));

        let network = self.network.clone();
        handles.push(set.spawn(async move { network.listen().await }));

        handles.push(set.spawn(bootup(
            self.discovery.clone(),
            self.network.clone(),
            self.client.clone(),
            self.ready.clone(),
            self.started.clone(),
        )));

        *self.tasks.lock().unwrap_or_else(PoisonError::into_inner) = Some(set);
        *self.handles.lock().unwrap_or_else(PoisonError::into_inner) = handles;
        debug!(addr = %self.handshake_addr, "Overlay tasks spawned");
        Ok(())
    }

    /// Resolves once bootup has finished. The returned future does not
    /// borrow the overlay. If the overlay goes away before bootup succeeds
    /// it never resolves.
    pub fn ready(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.ready.subscribe();
        async move {
            if rx.wait_for(|ready| *ready).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Raw readiness channel; the value turns `true` once and stays there.
    pub fn ready_receiver(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    /// Whether readiness has fired.
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Whether bootup has completed and the overlay has not been torn down.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Handshake address of the node with `verifying_key`, if the network
    /// knows it.
    pub async fn lookup(&self, verifying_key: &str) -> Option<SocketAddr> {
        self.network.lookup(verifying_key).await
    }

    /// Authenticate the node at `address` holding `verifying_key` into
    /// `domain`.
    pub async fn authenticate(
        &self,
        address: SocketAddr,
        verifying_key: &str,
        domain: &str,
    ) -> P2pResult<AuthOutcome> {
        let target = match public_key_of(verifying_key) {
            Ok(pk) => pk,
            Err(e) => {
                debug!(verifying_key = %verifying_key, error = %e, "Cannot authenticate malformed key");
                return Ok(AuthOutcome::Invalid);
            }
        };
        self.client.authenticate(&target.to_hex(), address, domain).await
    }

    /// Authenticate nodes the network learned about since the last call.
    pub async fn track_new_nodes(&self) -> P2pResult<()> {
        self.network.track_new_nodes(&self.client).await
    }

    /// Known neighbours, keyed by verifying key.
    pub fn neighbors(&self) -> HashMap<String, SocketAddr> {
        self.network.neighbors()
    }

    /// Authenticated peers: fingerprint to announced address.
    pub fn authorized_nodes(&self) -> HashMap<String, String> {
        self.trust.authorized_nodes()
    }

    /// Wait for the overlay's tasks. Returns the first failure; remaining
    /// tasks are aborted when it does.
    pub async fn join(&self) -> P2pResult<()> {
        let mut set = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(P2pError::NotStarted)?;

        while let Some(result) = set.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "Overlay task failed");
                    return Err(e);
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    error!(error = %e, "Overlay task panicked");
                    return Err(P2pError::TaskFailed(e.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Abort every task. The handshake listener is released; the overlay
    /// cannot be started again.
    pub fn teardown(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in &handles {
            handle.abort();
        }
        // Dropping an unjoined set aborts whatever is left in it.
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.server.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.started.store(false, Ordering::SeqCst);
        info!(addr = %self.handshake_addr, aborted = handles.len(), "Overlay torn down");
    }
}

impl Drop for Overlay {
    fn drop(&mut self) {
        for handle in self.handles.lock().unwrap_or_else(PoisonError::into_inner).iter() {
            handle.abort();
        }
    }
}

async fn bootup(
    discovery: Arc<dyn Discovery>,
    network: Arc<dyn Network>,
    client: Arc<HandshakeClient>,
    ready: Arc<watch::Sender<bool>>,
    started: Arc<AtomicBool>,
) -> P2pResult<()> {
    let seeds = discovery.discover_seed_addresses().await?;
    if seeds.is_empty() {
        info!("No seeds discovered, starting alone");
    } else {
        info!(seeds = seeds.len(), "Joining network");
        network.join(seeds, &client).await?;
    }

    let fired = ready.send_if_modified(|r| !std::mem::replace(r, true));
    started.store(true, Ordering::SeqCst);
    if fired {
        info!("Overlay ready");
    }
    Ok(())
}
