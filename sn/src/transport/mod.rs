//! Transport substrate boundary
//!
//! The coordination core only needs to open a stream to a peer on a protocol,
//! register inbound handlers per protocol, and observe which peers are known
//! and which are currently reachable. Handler tables belong to each transport
//! instance so several nodes can share one process.

mod memory;
mod tcp;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::domain::PeerId;
use crate::error::SwarmResult;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use tcp::TcpTransport;

/// A bidirectional byte stream to a single peer
pub trait PeerStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> PeerStream for T {}

pub type BoxedStream = Box<dyn PeerStream>;

/// Inbound stream handler: receives the remote peer id and the stream
pub type StreamHandler = Arc<dyn Fn(PeerId, BoxedStream) -> BoxFuture<'static, ()> + Send + Sync>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Identity of this node
    fn local_peer_id(&self) -> &str;

    /// Open a new stream to `peer` speaking `protocol`
    async fn dial(&self, peer: &str, protocol: &str) -> SwarmResult<BoxedStream>;

    /// Register the handler for inbound streams on `protocol`
    async fn handle(&self, protocol: &str, handler: StreamHandler);

    /// Every peer this node knows about, reachable or not
    async fn list_known_peers(&self) -> Vec<PeerId>;

    /// Peers with a live connection right now
    async fn list_live_connections(&self) -> Vec<PeerId>;

    /// Connection-level dial used for liveness checks and reconnection
    async fn connect(&self, peer: &str) -> SwarmResult<()>;
}
