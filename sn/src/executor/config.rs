//! Executor configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    Simulated,
    Docker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_kind")]
    pub kind: ExecutorKind,

    /// How long the simulated executor pretends to work
    #[serde(rename = "simulated-delay-ms", default = "default_simulated_delay_ms")]
    pub simulated_delay_ms: u64,

    #[serde(rename = "docker-binary", default = "default_docker_binary")]
    pub docker_binary: String,

    /// Parent of the per-proposal working directories
    #[serde(rename = "work-dir", default = "default_work_dir")]
    pub work_dir: PathBuf,
}

fn default_kind() -> ExecutorKind {
    debug!("default_kind: called");
    ExecutorKind::Simulated
}

fn default_simulated_delay_ms() -> u64 {
    debug!("default_simulated_delay_ms: called");
    5000
}

fn default_docker_binary() -> String {
    debug!("default_docker_binary: called");
    "docker".to_string()
}

fn default_work_dir() -> PathBuf {
    debug!("default_work_dir: called");
    PathBuf::from(".")
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            simulated_delay_ms: default_simulated_delay_ms(),
            docker_binary: default_docker_binary(),
            work_dir: default_work_dir(),
        }
    }
}

impl ExecutorConfig {
    pub fn simulated_delay(&self) -> Duration {
        Duration::from_millis(self.simulated_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::default();
        assert_eq!(config.kind, ExecutorKind::Simulated);
        assert_eq!(config.simulated_delay(), Duration::from_secs(5));
        assert_eq!(config.docker_binary, "docker");
    }

    #[test]
    fn test_yaml() {
        let config: ExecutorConfig = serde_yaml::from_str("kind: docker\nwork-dir: /tmp/jobs\n").unwrap();
        assert_eq!(config.kind, ExecutorKind::Docker);
        assert_eq!(config.work_dir, PathBuf::from("/tmp/jobs"));
        assert_eq!(config.simulated_delay_ms, 5000);
    }
}
