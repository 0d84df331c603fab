//! In-process transport
//!
//! A `MemoryNetwork` is a registry of nodes living in one process. Streams are
//! `tokio::io::duplex` pairs and the inbound handler runs on its own task.
//! Links can be severed and restored, and nodes taken offline, so connection
//! churn can be driven from tests and simulations.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{BoxedStream, StreamHandler, Transport};
use crate::domain::PeerId;
use crate::error::{SwarmError, SwarmResult};

/// Buffer size of each in-memory stream direction
const STREAM_BUFFER: usize = 64 * 1024;

#[derive(Default)]
struct NetworkState {
    /// Per-node protocol handler tables
    handlers: HashMap<PeerId, HashMap<String, StreamHandler>>,
    online: HashSet<PeerId>,
    severed: HashSet<(PeerId, PeerId)>,
}

impl NetworkState {
    fn link_key(a: &str, b: &str) -> (PeerId, PeerId) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }

    fn linked(&self, a: &str, b: &str) -> bool {
        a != b && self.online.contains(a) && self.online.contains(b) && !self.severed.contains(&Self::link_key(a, b))
    }
}

/// Shared in-process network; clones refer to the same network
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<RwLock<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node and bring it online
    pub async fn join(&self, peer_id: impl Into<PeerId>) -> MemoryTransport {
        let peer_id = peer_id.into();
        debug!(%peer_id, "MemoryNetwork::join: called");
        let mut state = self.state.write().await;
        state.handlers.entry(peer_id.clone()).or_default();
        state.online.insert(peer_id.clone());
        MemoryTransport {
            peer_id,
            network: self.clone(),
        }
    }

    /// Take a node offline or bring it back; offline nodes have no links
    pub async fn set_online(&self, peer_id: &str, online: bool) {
        debug!(%peer_id, online, "MemoryNetwork::set_online: called");
        let mut state = self.state.write().await;
        if online {
            state.online.insert(peer_id.to_string());
        } else {
            state.online.remove(peer_id);
        }
    }

    /// Sever the link between two nodes
    pub async fn disconnect(&self, a: &str, b: &str) {
        debug!(%a, %b, "MemoryNetwork::disconnect: called");
        self.state.write().await.severed.insert(NetworkState::link_key(a, b));
    }

    /// Restore a severed link
    pub async fn reconnect(&self, a: &str, b: &str) {
        debug!(%a, %b, "MemoryNetwork::reconnect: called");
        self.state.write().await.severed.remove(&NetworkState::link_key(a, b));
    }

    pub async fn is_linked(&self, a: &str, b: &str) -> bool {
        self.state.read().await.linked(a, b)
    }
}

/// One node's view of a `MemoryNetwork`
#[derive(Clone)]
pub struct MemoryTransport {
    peer_id: PeerId,
    network: MemoryNetwork,
}

impl MemoryTransport {
    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_peer_id(&self) -> &str {
        &self.peer_id
    }

    async fn dial(&self, peer: &str, protocol: &str) -> SwarmResult<BoxedStream> {
        debug!(from = %self.peer_id, to = %peer, %protocol, "MemoryTransport::dial: called");
        let handler = {
            let state = self.network.state.read().await;
            if !state.linked(&self.peer_id, peer) {
                return Err(SwarmError::PeerUnreachable {
                    peer: peer.to_string(),
                    reason: "no connection".to_string(),
                });
            }
            state
                .handlers
                .get(peer)
                .and_then(|table| table.get(protocol))
                .cloned()
                .ok_or_else(|| SwarmError::PeerUnreachable {
                    peer: peer.to_string(),
                    reason: format!("protocol {} not supported", protocol),
                })?
        };

        let (local, remote) = tokio::io::duplex(STREAM_BUFFER);
        tokio::spawn(handler(self.peer_id.clone(), Box::new(remote)));
        Ok(Box::new(local))
    }

    async fn handle(&self, protocol: &str, handler: StreamHandler) {
        debug!(peer_id = %self.peer_id, %protocol, "MemoryTransport::handle: registering");
        let mut state = self.network.state.write().await;
        state
            .handlers
            .entry(self.peer_id.clone())
            .or_default()
            .insert(protocol.to_string(), handler);
    }

    async fn list_known_peers(&self) -> Vec<PeerId> {
        let state = self.network.state.read().await;
        let mut peers: Vec<PeerId> = state.handlers.keys().filter(|p| **p != self.peer_id).cloned().collect();
        peers.sort();
        peers
    }

    async fn list_live_connections(&self) -> Vec<PeerId> {
        let state = self.network.state.read().await;
        let mut peers: Vec<PeerId> = state
            .handlers
            .keys()
            .filter(|p| state.linked(&self.peer_id, p))
            .cloned()
            .collect();
        peers.sort();
        peers
    }

    async fn connect(&self, peer: &str) -> SwarmResult<()> {
        if self.network.is_linked(&self.peer_id, peer).await {
            Ok(())
        } else {
            Err(SwarmError::PeerUnreachable {
                peer: peer.to_string(),
                reason: "no connection".to_string(),
            })
        }
    }
}
