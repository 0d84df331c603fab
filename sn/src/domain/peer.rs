//! Peer connection records kept by the health monitor

use serde::{Deserialize, Serialize};

use super::id::PeerId;

/// Weight of the newest heartbeat in the reliability average
pub const RELIABILITY_ALPHA: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerStatus {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bandwidth {
    pub up: f64,
    pub down: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerMetrics {
    /// Last heartbeat round trip in milliseconds
    pub latency: Option<u64>,
    /// Exponential moving average of heartbeat success, in [0, 1]
    pub reliability: f64,
    pub bandwidth: Bandwidth,
}

impl Default for PeerMetrics {
    fn default() -> Self {
        Self {
            latency: None,
            reliability: 1.0,
            bandwidth: Bandwidth::default(),
        }
    }
}

impl PeerMetrics {
    /// Fold one heartbeat outcome into the metrics
    pub fn record_heartbeat(&mut self, success: bool, latency_ms: Option<u64>) {
        let sample = if success { 1.0 } else { 0.0 };
        self.reliability = RELIABILITY_ALPHA * sample + (1.0 - RELIABILITY_ALPHA) * self.reliability;
        if success && latency_ms.is_some() {
            self.latency = latency_ms;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerConnection {
    pub peer_id: PeerId,
    pub status: PeerStatus,
    pub last_seen: i64,
    pub metrics: PeerMetrics,
    pub reconnect_attempts: u32,
}

impl PeerConnection {
    pub fn new(peer_id: impl Into<PeerId>, now: i64) -> Self {
        Self {
            peer_id: peer_id.into(),
            status: PeerStatus::Connected,
            last_seen: now,
            metrics: PeerMetrics::default(),
            reconnect_attempts: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == PeerStatus::Connected
    }
}

/// Aggregate view over all known connections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    pub total_peers: usize,
    pub active_peers: usize,
    pub average_latency: f64,
    pub total_bandwidth_up: f64,
    pub total_bandwidth_down: f64,
}

impl NetworkStats {
    pub fn from_connections<'a>(connections: impl IntoIterator<Item = &'a PeerConnection>) -> Self {
        let mut stats = NetworkStats::default();
        let mut latency_sum = 0u64;
        let mut latency_count = 0u64;
        for conn in connections {
            stats.total_peers += 1;
            if conn.is_connected() {
                stats.active_peers += 1;
            }
            if let Some(latency) = conn.metrics.latency {
                latency_sum += latency;
                latency_count += 1;
            }
            stats.total_bandwidth_up += conn.metrics.bandwidth.up;
            stats.total_bandwidth_down += conn.metrics.bandwidth.down;
        }
        if latency_count > 0 {
            stats.average_latency = latency_sum as f64 / latency_count as f64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_connection_defaults() {
        let conn = PeerConnection::new("peer-a", 10);
        assert!(conn.is_connected());
        assert_eq!(conn.metrics.reliability, 1.0);
        assert_eq!(conn.metrics.latency, None);
        assert_eq!(conn.reconnect_attempts, 0);
    }

    #[test]
    fn test_reliability_ema() {
        let mut metrics = PeerMetrics::default();
        metrics.record_heartbeat(false, None);
        assert!((metrics.reliability - 0.8).abs() < 1e-9);
        metrics.record_heartbeat(true, Some(12));
        assert!((metrics.reliability - 0.84).abs() < 1e-9);
        assert_eq!(metrics.latency, Some(12));
    }

    #[test]
    fn test_reliability_stays_in_range() {
        let mut metrics = PeerMetrics::default();
        for i in 0..100 {
            metrics.record_heartbeat(i % 3 == 0, Some(5));
            assert!((0.0..=1.0).contains(&metrics.reliability));
        }
    }

    #[test]
    fn test_network_stats() {
        let mut a = PeerConnection::new("a", 0);
        a.metrics.latency = Some(10);
        a.metrics.bandwidth = Bandwidth { up: 1.0, down: 2.0 };
        let mut b = PeerConnection::new("b", 0);
        b.metrics.latency = Some(30);
        b.status = PeerStatus::Disconnected;
        let c = PeerConnection::new("c", 0);

        let stats = NetworkStats::from_connections([&a, &b, &c]);
        assert_eq!(stats.total_peers, 3);
        assert_eq!(stats.active_peers, 2);
        assert_eq!(stats.average_latency, 20.0);
        assert_eq!(stats.total_bandwidth_up, 1.0);
        assert_eq!(stats.total_bandwidth_down, 2.0);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&PeerStatus::Connected).unwrap(), r#""connected""#);
    }
}
