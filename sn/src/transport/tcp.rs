//! TCP transport with a static peer directory
//!
//! Each dial opens one TCP connection whose first line is a JSON hello naming
//! the dialing peer and the protocol. The rest of the connection belongs to
//! the protocol handler. Liveness is a bounded TCP connect probe.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BoxedStream, StreamHandler, Transport};
use crate::domain::PeerId;
use crate::error::{SwarmError, SwarmResult};
use crate::protocol::write_message;

/// Longest accepted hello line
const MAX_HELLO_SIZE: u64 = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Hello {
    peer: PeerId,
    protocol: String,
}

pub struct TcpTransport {
    peer_id: PeerId,
    listen: SocketAddr,
    directory: BTreeMap<PeerId, SocketAddr>,
    handlers: Arc<RwLock<HashMap<String, StreamHandler>>>,
    probe_timeout: Duration,
}

impl TcpTransport {
    pub fn new(
        peer_id: impl Into<PeerId>,
        listen: SocketAddr,
        directory: BTreeMap<PeerId, SocketAddr>,
        probe_timeout: Duration,
    ) -> Self {
        let peer_id = peer_id.into();
        debug!(%peer_id, %listen, peers = directory.len(), "TcpTransport::new: called");
        Self {
            peer_id,
            listen,
            directory,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            probe_timeout,
        }
    }

    /// Bind the listen address and serve inbound streams until aborted
    pub async fn listen(&self) -> SwarmResult<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.listen).await?;
        let local_addr = listener.local_addr()?;
        info!(peer_id = %self.peer_id, %local_addr, "TcpTransport listening");

        let handlers = self.handlers.clone();
        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, remote)) => {
                        let handlers = handlers.clone();
                        tokio::spawn(async move {
                            if let Err(e) = dispatch_inbound(stream, handlers).await {
                                debug!(%remote, error = %e, "TcpTransport: inbound stream dropped");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "TcpTransport: accept failed");
                    }
                }
            }
        });
        Ok((local_addr, handle))
    }

    fn address_of(&self, peer: &str) -> SwarmResult<SocketAddr> {
        self.directory.get(peer).copied().ok_or_else(|| SwarmError::PeerUnreachable {
            peer: peer.to_string(),
            reason: "not in peer directory".to_string(),
        })
    }

    async fn open(&self, peer: &str) -> SwarmResult<TcpStream> {
        let addr = self.address_of(peer)?;
        match tokio::time::timeout(self.probe_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(SwarmError::PeerUnreachable {
                peer: peer.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(SwarmError::PeerUnreachable {
                peer: peer.to_string(),
                reason: "connect timed out".to_string(),
            }),
        }
    }
}

/// Read the hello line and hand the connection to the matching handler
async fn dispatch_inbound(stream: TcpStream, handlers: Arc<RwLock<HashMap<String, StreamHandler>>>) -> SwarmResult<()> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let bytes_read = (&mut reader).take(MAX_HELLO_SIZE).read_line(&mut line).await?;
    if bytes_read == 0 {
        // liveness probe
        return Ok(());
    }

    let hello: Hello = serde_json::from_str(line.trim())?;
    let handler = handlers
        .read()
        .await
        .get(&hello.protocol)
        .cloned()
        .ok_or_else(|| SwarmError::Protocol(format!("protocol {} not supported", hello.protocol)))?;

    debug!(peer = %hello.peer, protocol = %hello.protocol, "dispatch_inbound: handing off stream");
    handler(hello.peer, Box::new(reader)).await;
    Ok(())
}

#[async_trait]
impl Transport for TcpTransport {
    fn local_peer_id(&self) -> &str {
        &self.peer_id
    }

    async fn dial(&self, peer: &str, protocol: &str) -> SwarmResult<BoxedStream> {
        debug!(to = %peer, %protocol, "TcpTransport::dial: called");
        let mut stream = self.open(peer).await?;
        let hello = Hello {
            peer: self.peer_id.clone(),
            protocol: protocol.to_string(),
        };
        write_message(&mut stream, &hello).await?;
        Ok(Box::new(stream))
    }

    async fn handle(&self, protocol: &str, handler: StreamHandler) {
        debug!(%protocol, "TcpTransport::handle: registering");
        self.handlers.write().await.insert(protocol.to_string(), handler);
    }

    async fn list_known_peers(&self) -> Vec<PeerId> {
        self.directory.keys().filter(|p| **p != self.peer_id).cloned().collect()
    }

    async fn list_live_connections(&self) -> Vec<PeerId> {
        let peers = self.list_known_peers().await;
        let probes = peers.iter().map(|peer| async move { (peer.clone(), self.open(peer).await.is_ok()) });
        futures::future::join_all(probes)
            .await
            .into_iter()
            .filter_map(|(peer, live)| live.then_some(peer))
            .collect()
    }

    async fn connect(&self, peer: &str) -> SwarmResult<()> {
        self.open(peer).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::read_message;
    use futures::FutureExt;
    use serde_json::{Value, json};

    fn reply_handler() -> StreamHandler {
        Arc::new(|peer: PeerId, mut stream: BoxedStream| {
            async move {
                if let Ok(msg) = read_message::<_, Value>(&mut stream).await {
                    let _ = write_message(&mut stream, &json!({"from": peer, "echo": msg})).await;
                }
            }
            .boxed()
        })
    }

    async fn pair() -> (TcpTransport, TcpTransport) {
        let any: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let b = TcpTransport::new("b", any, BTreeMap::new(), Duration::from_secs(1));
        b.handle("/echo", reply_handler()).await;
        let (b_addr, _handle) = b.listen().await.unwrap();

        let mut directory = BTreeMap::new();
        directory.insert("b".to_string(), b_addr);
        directory.insert("gone".to_string(), "127.0.0.1:1".parse().unwrap());
        let a = TcpTransport::new("a", any, directory, Duration::from_millis(500));
        (a, b)
    }

    #[tokio::test]
    async fn test_dial_round_trip() {
        let (a, _b) = pair().await;
        let mut stream = a.dial("b", "/echo").await.unwrap();
        write_message(&mut stream, &json!({"n": 1})).await.unwrap();
        let reply: Value = read_message(&mut stream).await.unwrap();
        assert_eq!(reply["from"], "a");
        assert_eq!(reply["echo"]["n"], 1);
    }

    #[tokio::test]
    async fn test_live_connections_probe() {
        let (a, _b) = pair().await;
        assert_eq!(a.list_known_peers().await.len(), 2);
        assert_eq!(a.list_live_connections().await, vec!["b".to_string()]);
        assert!(a.connect("gone").await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_peer() {
        let (a, _b) = pair().await;
        let err = a.dial("nobody", "/echo").await.err().unwrap();
        assert!(matches!(err, SwarmError::PeerUnreachable { .. }));
    }
}
