//! Connection health configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// How often the live-connection set is diffed against known peers
    #[serde(rename = "tick-interval-ms", default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(rename = "heartbeat-interval-ms", default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    #[serde(rename = "reconnect-delay-ms", default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Reconnect attempts before a peer record is evicted
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Bound on a single TCP liveness probe
    #[serde(rename = "probe-timeout-ms", default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    debug!("default_tick_interval_ms: called");
    1000
}

fn default_heartbeat_interval_ms() -> u64 {
    debug!("default_heartbeat_interval_ms: called");
    30_000
}

fn default_reconnect_delay_ms() -> u64 {
    debug!("default_reconnect_delay_ms: called");
    5000
}

fn default_max_retries() -> u32 {
    debug!("default_max_retries: called");
    3
}

fn default_probe_timeout_ms() -> u64 {
    debug!("default_probe_timeout_ms: called");
    2000
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_retries: default_max_retries(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl HealthConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}
