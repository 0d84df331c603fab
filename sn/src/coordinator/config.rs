//! Coordinator configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// How long a granted lock blocks other claimants
    #[serde(rename = "lock-timeout-ms", default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: i64,

    /// Upper bound of the random delay before claiming a received proposal
    #[serde(rename = "claim-jitter-ms", default = "default_claim_jitter_ms")]
    pub claim_jitter_ms: u64,

    /// Deadline for one request/response exchange with a peer
    #[serde(rename = "request-timeout-ms", default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Channel buffer size for state commands
    #[serde(rename = "channel-buffer", default = "default_channel_buffer")]
    pub channel_buffer: usize,

    /// Where input files streamed from proposers are written
    #[serde(rename = "inbox-dir", default = "default_inbox_dir")]
    pub inbox_dir: PathBuf,
}

fn default_lock_timeout_ms() -> i64 {
    debug!("default_lock_timeout_ms: called");
    5000
}

fn default_claim_jitter_ms() -> u64 {
    debug!("default_claim_jitter_ms: called");
    1000
}

fn default_request_timeout_ms() -> u64 {
    debug!("default_request_timeout_ms: called");
    30_000
}

fn default_channel_buffer() -> usize {
    debug!("default_channel_buffer: called");
    256
}

fn default_inbox_dir() -> PathBuf {
    debug!("default_inbox_dir: called");
    PathBuf::from("inbox")
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            claim_jitter_ms: default_claim_jitter_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            channel_buffer: default_channel_buffer(),
            inbox_dir: default_inbox_dir(),
        }
    }
}

impl CoordinatorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinator_config_default() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.lock_timeout_ms, 5000);
        assert_eq!(config.claim_jitter_ms, 1000);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.channel_buffer, 256);
    }

    #[test]
    fn test_coordinator_config_partial_yaml() {
        let config: CoordinatorConfig = serde_yaml::from_str("lock-timeout-ms: 250\n").unwrap();
        assert_eq!(config.lock_timeout_ms, 250);
        assert_eq!(config.claim_jitter_ms, 1000);
        assert_eq!(config.inbox_dir, PathBuf::from("inbox"));
    }
}
