//! swarmnode configuration types and loading

use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coordinator::CoordinatorConfig;
use crate::domain::{Capabilities, PeerId};
use crate::executor::ExecutorConfig;
use crate::health::HealthConfig;
use crate::node::NodeOptions;

/// Main swarmnode configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity and peer directory
    pub node: NodeConfig,

    /// Resources offered to the swarm
    pub capabilities: Capabilities,

    pub coordinator: CoordinatorConfig,

    pub health: HealthConfig,

    pub executor: ExecutorConfig,

    pub events: EventsConfig,

    /// Log level used when `--log-level` is not given
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Generated at startup when unset
    #[serde(rename = "peer-id", default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<PeerId>,

    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Static peer directory: peer id to address
    #[serde(default)]
    pub peers: BTreeMap<PeerId, SocketAddr>,
}

fn default_listen() -> SocketAddr {
    debug!("default_listen: called");
    SocketAddr::from(([127, 0, 0, 1], 7400))
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            peer_id: None,
            listen: default_listen(),
            peers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Directory for `{peer-id}.events.jsonl`; no event log when unset
    #[serde(rename = "log-dir", default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .swarmnode.yml
        let local_config = PathBuf::from(".swarmnode.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/swarmnode/swarmnode.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("swarmnode").join("swarmnode.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed here; `load` reports them once logging works.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".swarmnode.yml")];
                if let Some(config_dir) = dirs::config_dir() {
                    paths.push(config_dir.join("swarmnode").join("swarmnode.yml"));
                }
                paths
            }
        };
        candidates
            .iter()
            .filter(|path| path.exists())
            .find_map(|path| Self::load_from_file(path).ok())
            .and_then(|config| config.log_level)
    }

    /// Node options for the coordination core
    pub fn node_options(&self) -> NodeOptions {
        NodeOptions {
            capabilities: self.capabilities.clone(),
            coordinator: self.coordinator.clone(),
            health: self.health.clone(),
            executor: self.executor.clone(),
            workload: None,
            event_log_dir: self.events.log_dir.clone(),
        }
    }
}
