//! ConnectionMonitor - actor that owns a node's peer connection records

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::config::HealthConfig;
use crate::domain::{NetworkStats, PeerConnection, PeerId, PeerMetrics, PeerStatus, now_ms};
use crate::error::{SwarmError, SwarmResult};
use crate::events::{EventBus, NodeEvent};
use crate::transport::Transport;

enum MonitorCommand {
    /// Live-connection set sampled by the ticker
    Observed { live: Vec<PeerId> },
    /// Results carry the generation of the task that produced them
    HeartbeatResult {
        peer_id: PeerId,
        generation: u64,
        latency_ms: Option<u64>,
    },
    ReconnectResult {
        peer_id: PeerId,
        generation: u64,
        outcome: SwarmResult<()>,
    },
    GetConnections {
        reply: oneshot::Sender<Vec<PeerConnection>>,
    },
    GetMetrics {
        peer_id: PeerId,
        reply: oneshot::Sender<Option<PeerMetrics>>,
    },
    GetStats {
        reply: oneshot::Sender<NetworkStats>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to send commands to the ConnectionMonitor
#[derive(Clone)]
pub struct ConnectionMonitor {
    tx: mpsc::Sender<MonitorCommand>,
}

struct MonitorState {
    transport: Arc<dyn Transport>,
    config: HealthConfig,
    events: EventBus,
    connections: HashMap<PeerId, PeerConnection>,
    heartbeats: HashMap<PeerId, PeerTask>,
    reconnects: HashMap<PeerId, PeerTask>,
    next_generation: u64,
    tx: mpsc::WeakSender<MonitorCommand>,
}

/// A spawned heartbeat or reconnect task for one peer
struct PeerTask {
    generation: u64,
    handle: JoinHandle<()>,
}

impl PeerTask {
    fn abort(self) {
        self.handle.abort();
    }
}

impl ConnectionMonitor {
    /// Spawn the monitor actor and its ticker
    pub fn spawn(transport: Arc<dyn Transport>, config: HealthConfig, events: EventBus) -> Self {
        debug!(peer_id = %transport.local_peer_id(), ?config, "ConnectionMonitor::spawn: called");
        let (tx, rx) = mpsc::channel(256);
        let ticker = tokio::spawn(ticker_loop(transport.clone(), config.tick_interval(), tx.downgrade()));
        let state = MonitorState {
            transport,
            config,
            events,
            connections: HashMap::new(),
            heartbeats: HashMap::new(),
            reconnects: HashMap::new(),
            next_generation: 0,
            tx: tx.downgrade(),
        };
        tokio::spawn(actor_loop(state, rx, ticker));
        info!("ConnectionMonitor spawned");
        Self { tx }
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> MonitorCommand) -> SwarmResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(make(reply_tx)).await.map_err(|_| SwarmError::ChannelError)?;
        reply_rx.await.map_err(|_| SwarmError::ChannelError)
    }

    /// All tracked connection records, sorted by peer id
    pub async fn peer_connections(&self) -> SwarmResult<Vec<PeerConnection>> {
        self.call(|reply| MonitorCommand::GetConnections { reply }).await
    }

    pub async fn connection_metrics(&self, peer_id: &str) -> SwarmResult<Option<PeerMetrics>> {
        let peer_id = peer_id.to_string();
        self.call(|reply| MonitorCommand::GetMetrics { peer_id, reply }).await
    }

    pub async fn network_stats(&self) -> SwarmResult<NetworkStats> {
        self.call(|reply| MonitorCommand::GetStats { reply }).await
    }

    /// Stop the ticker, heartbeats and pending reconnects
    pub async fn shutdown(&self) -> SwarmResult<()> {
        debug!("ConnectionMonitor::shutdown: called");
        self.call(|reply| MonitorCommand::Shutdown { reply }).await
    }
}

async fn ticker_loop(
    transport: Arc<dyn Transport>,
    every: std::time::Duration,
    tx: mpsc::WeakSender<MonitorCommand>,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let live = transport.list_live_connections().await;
        let Some(tx) = tx.upgrade() else {
            break;
        };
        if tx.send(MonitorCommand::Observed { live }).await.is_err() {
            break;
        }
    }
    debug!("ticker_loop: exiting");
}

impl MonitorState {
    fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn observe(&mut self, live: Vec<PeerId>) {
        let live: BTreeSet<PeerId> = live.into_iter().collect();

        for peer_id in &live {
            let connected = self.connections.get(peer_id).is_some_and(PeerConnection::is_connected);
            if !connected {
                self.mark_connected(peer_id);
            }
        }

        let dropped: Vec<PeerId> = self
            .connections
            .values()
            .filter(|conn| conn.is_connected() && !live.contains(&conn.peer_id))
            .map(|conn| conn.peer_id.clone())
            .collect();
        for peer_id in dropped {
            self.handle_disconnect(&peer_id);
        }
    }

    /// Register or revive a peer record and start its heartbeat
    fn mark_connected(&mut self, peer_id: &str) {
        let now = now_ms();
        let conn = self
            .connections
            .entry(peer_id.to_string())
            .or_insert_with(|| PeerConnection::new(peer_id, now));
        conn.status = PeerStatus::Connected;
        conn.reconnect_attempts = 0;
        conn.last_seen = now;
        let connection = conn.clone();

        if let Some(pending) = self.reconnects.remove(peer_id) {
            pending.abort();
        }
        self.start_heartbeat(peer_id);
        info!(%peer_id, "Peer connected");
        self.events.emit(NodeEvent::PeerConnected {
            peer_id: peer_id.to_string(),
            connection,
        });
    }

    fn start_heartbeat(&mut self, peer_id: &str) {
        if let Some(previous) = self.heartbeats.remove(peer_id) {
            previous.abort();
        }
        let generation = self.next_generation();
        let handle = tokio::spawn(heartbeat_loop(
            self.transport.clone(),
            peer_id.to_string(),
            generation,
            self.config.heartbeat_interval(),
            self.tx.clone(),
        ));
        self.heartbeats.insert(peer_id.to_string(), PeerTask { generation, handle });
    }

    fn heartbeat(&mut self, peer_id: &str, generation: u64, latency_ms: Option<u64>) {
        if self.heartbeats.get(peer_id).map(|task| task.generation) != Some(generation) {
            debug!(%peer_id, generation, "heartbeat: stale result dropped");
            return;
        }
        let Some(conn) = self.connections.get_mut(peer_id) else {
            return;
        };
        if !conn.is_connected() {
            return;
        }
        match latency_ms {
            Some(latency) => {
                conn.metrics.record_heartbeat(true, Some(latency));
                conn.last_seen = now_ms();
                let metrics = conn.metrics.clone();
                debug!(%peer_id, latency, reliability = metrics.reliability, "heartbeat: ok");
                self.events.emit(NodeEvent::Heartbeat {
                    peer_id: peer_id.to_string(),
                    metrics,
                });
            }
            None => {
                conn.metrics.record_heartbeat(false, None);
                warn!(%peer_id, "Heartbeat failed");
                self.heartbeats.remove(peer_id);
                self.handle_disconnect(peer_id);
            }
        }
    }

    /// Mark a peer down, then schedule a reconnect or evict it
    fn handle_disconnect(&mut self, peer_id: &str) {
        if let Some(heartbeat) = self.heartbeats.remove(peer_id) {
            heartbeat.abort();
        }
        let Some(conn) = self.connections.get_mut(peer_id) else {
            return;
        };
        let attempts = conn.reconnect_attempts;
        if conn.is_connected() {
            conn.status = PeerStatus::Disconnected;
            info!(%peer_id, attempts, "Peer disconnected");
            self.events.emit(NodeEvent::PeerDisconnected {
                peer_id: peer_id.to_string(),
                attempts,
            });
        }

        if attempts >= self.config.max_retries {
            info!(%peer_id, attempts, "Evicting peer after failed reconnects");
            self.connections.remove(peer_id);
            return;
        }
        conn.reconnect_attempts += 1;

        let generation = self.next_generation();
        let transport = self.transport.clone();
        let delay = self.config.reconnect_delay();
        let tx = self.tx.clone();
        let peer = peer_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let outcome = transport.connect(&peer).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx
                    .send(MonitorCommand::ReconnectResult {
                        peer_id: peer,
                        generation,
                        outcome,
                    })
                    .await;
            }
        });
        if let Some(previous) = self.reconnects.insert(peer_id.to_string(), PeerTask { generation, handle }) {
            previous.abort();
        }
    }

    fn reconnect_result(&mut self, peer_id: &str, generation: u64, outcome: SwarmResult<()>) {
        if self.reconnects.get(peer_id).map(|task| task.generation) != Some(generation) {
            debug!(%peer_id, generation, "reconnect_result: stale result dropped");
            return;
        }
        self.reconnects.remove(peer_id);
        match self.connections.get(peer_id) {
            Some(conn) if !conn.is_connected() => {}
            _ => return,
        }
        match outcome {
            Ok(()) => self.mark_connected(peer_id),
            Err(e) => {
                warn!(%peer_id, error = %e, "Reconnect failed");
                self.events.emit(NodeEvent::ReconnectFailed {
                    peer_id: peer_id.to_string(),
                    error: e.to_string(),
                });
                self.handle_disconnect(peer_id);
            }
        }
    }

    fn sorted_connections(&self) -> Vec<PeerConnection> {
        let mut connections: Vec<PeerConnection> = self.connections.values().cloned().collect();
        connections.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        connections
    }

    fn stop(&mut self) {
        for (_, task) in self.heartbeats.drain() {
            task.abort();
        }
        for (_, task) in self.reconnects.drain() {
            task.abort();
        }
    }
}

/// Periodically confirm the peer is still in the live set
async fn heartbeat_loop(
    transport: Arc<dyn Transport>,
    peer_id: PeerId,
    generation: u64,
    every: std::time::Duration,
    tx: mpsc::WeakSender<MonitorCommand>,
) {
    loop {
        tokio::time::sleep(every).await;
        let started = Instant::now();
        let alive = transport.list_live_connections().await.contains(&peer_id);
        let latency_ms = alive.then(|| started.elapsed().as_millis() as u64);

        let Some(tx) = tx.upgrade() else {
            break;
        };
        let sent = tx
            .send(MonitorCommand::HeartbeatResult {
                peer_id: peer_id.clone(),
                generation,
                latency_ms,
            })
            .await;
        if sent.is_err() || !alive {
            break;
        }
    }
}

async fn actor_loop(mut state: MonitorState, mut rx: mpsc::Receiver<MonitorCommand>, ticker: JoinHandle<()>) {
    debug!("ConnectionMonitor actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            MonitorCommand::Observed { live } => {
                state.observe(live);
            }
            MonitorCommand::HeartbeatResult {
                peer_id,
                generation,
                latency_ms,
            } => {
                state.heartbeat(&peer_id, generation, latency_ms);
            }
            MonitorCommand::ReconnectResult {
                peer_id,
                generation,
                outcome,
            } => {
                debug!(%peer_id, generation, ok = outcome.is_ok(), "actor_loop: ReconnectResult command");
                state.reconnect_result(&peer_id, generation, outcome);
            }
            MonitorCommand::GetConnections { reply } => {
                let _ = reply.send(state.sorted_connections());
            }
            MonitorCommand::GetMetrics { peer_id, reply } => {
                let _ = reply.send(state.connections.get(&peer_id).map(|conn| conn.metrics.clone()));
            }
            MonitorCommand::GetStats { reply } => {
                let _ = reply.send(NetworkStats::from_connections(state.connections.values()));
            }
            MonitorCommand::Shutdown { reply } => {
                info!("ConnectionMonitor shutting down");
                let _ = reply.send(());
                break;
            }
        }
    }

    ticker.abort();
    state.stop();
    debug!("ConnectionMonitor actor stopped");
}
