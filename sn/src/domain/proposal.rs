//! Task proposals and their lifecycle

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::id::{PeerId, is_valid_proposal_id};
use crate::error::{SwarmError, SwarmResult};

/// Lifecycle state of a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Proposed,
    Locked,
    Accepted,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    /// Completed, failed and cancelled proposals never change again
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
    }

    /// Whether `self -> next` is an edge of the lifecycle graph
    ///
    /// `Locked -> Locked` is the re-grant of an expired lock. `Locked|Accepted -> Proposed`
    /// is the unwind of a failed claim. `Accepted -> Completed|Failed` covers a proposer
    /// that never saw the advisory RUNNING status update.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Proposed, Locked)
                | (Locked, Locked)
                | (Locked, Proposed)
                | (Locked, Accepted)
                | (Accepted, Proposed)
                | (Accepted, Running)
                | (Accepted, Completed)
                | (Accepted, Failed)
                | (Running, Completed)
                | (Running, Failed)
                | (Proposed | Locked | Accepted | Running, Cancelled)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Proposed => "PROPOSED",
            TaskState::Locked => "LOCKED",
            TaskState::Accepted => "ACCEPTED",
            TaskState::Running => "RUNNING",
            TaskState::Completed => "COMPLETED",
            TaskState::Failed => "FAILED",
            TaskState::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

/// Resources a proposal needs from the executing node
///
/// Missing fields take the defaults (1 cpu, 512 MB memory, 1 Mbps, 1 GB).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Requirements {
    pub cpu: f64,
    pub memory: f64,
    pub bandwidth: f64,
    pub storage: f64,
}

impl Default for Requirements {
    fn default() -> Self {
        Self {
            cpu: 1.0,
            memory: 512.0,
            bandwidth: 1.0,
            storage: 1.0,
        }
    }
}

impl Requirements {
    fn validate(&self) -> SwarmResult<()> {
        let fields = [
            ("cpu", self.cpu),
            ("memory", self.memory),
            ("bandwidth", self.bandwidth),
            ("storage", self.storage),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(SwarmError::InvalidProposal(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }
}

/// Workload description handed to the executor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfig {
    pub image: String,
    pub command: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    /// Files on the proposer streamed to the claimant once its acceptance lands
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_files: Vec<PathBuf>,
}

/// Lock fields held by a proposal while it is LOCKED
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    pub lock_id: String,
    pub locked_by: PeerId,
    pub locked_at: i64,
}

/// Input to `create_proposal`; omitted fields take their defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProposalConfig {
    pub requirements: Requirements,
    pub container_config: ContainerConfig,
    pub instances: u32,
    /// Seconds; carried but not enforced
    pub timeout: u64,
    pub max_retries: u32,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            requirements: Requirements::default(),
            container_config: ContainerConfig::default(),
            instances: default_instances(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl ProposalConfig {
    /// Reject configurations no peer could run
    pub fn validate(&self) -> SwarmResult<()> {
        debug!(image = %self.container_config.image, "ProposalConfig::validate: called");
        let mut missing = Vec::new();
        if self.container_config.image.trim().is_empty() {
            missing.push("image");
        }
        if self.container_config.command.trim().is_empty() {
            missing.push("command");
        }
        if !missing.is_empty() {
            return Err(SwarmError::InvalidProposal(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
        if self.instances < 1 {
            return Err(SwarmError::InvalidProposal(
                "Instances must be a positive integer".to_string(),
            ));
        }
        self.requirements.validate()
    }
}

fn default_instances() -> u32 {
    1
}

fn default_timeout() -> u64 {
    3600
}

fn default_max_retries() -> u32 {
    3
}

/// A unit of work advertised to the swarm
///
/// The copy held by the proposer is authoritative; copies on other peers are
/// advisory caches. `lock_id` is set exactly while `state` is LOCKED.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProposal {
    pub id: String,
    pub proposer_id: PeerId,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub requirements: Requirements,
    pub container_config: ContainerConfig,
    #[serde(default = "default_instances")]
    pub instances: u32,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_state")]
    pub state: TaskState,
    #[serde(default)]
    pub accepted_by: Option<PeerId>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub progress: Option<Value>,
    #[serde(default)]
    pub lock_id: Option<String>,
    #[serde(default)]
    pub lock_timestamp: Option<i64>,
    #[serde(default)]
    pub locked_by: Option<PeerId>,
}

fn default_state() -> TaskState {
    TaskState::Proposed
}

impl TaskProposal {
    /// Build a fresh PROPOSED proposal from a creation config
    pub fn new(id: impl Into<String>, proposer_id: impl Into<PeerId>, config: ProposalConfig, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            proposer_id: proposer_id.into(),
            timestamp,
            requirements: config.requirements,
            container_config: config.container_config,
            instances: config.instances,
            timeout: config.timeout,
            max_retries: config.max_retries,
            state: TaskState::Proposed,
            accepted_by: None,
            result: None,
            progress: None,
            lock_id: None,
            lock_timestamp: None,
            locked_by: None,
        }
    }

    /// Minimal shape check for proposals received off the wire
    pub fn validate_received(&self) -> SwarmResult<()> {
        if self.id.is_empty() || self.proposer_id.is_empty() {
            return Err(SwarmError::InvalidProposal("Invalid proposal format".to_string()));
        }
        if !is_valid_proposal_id(&self.id) {
            return Err(SwarmError::InvalidProposal(format!("Invalid proposal id: {:?}", self.id)));
        }
        Ok(())
    }

    /// Move along a lifecycle edge, returning the previous state
    ///
    /// Leaving LOCKED clears the lock fields.
    pub fn transition_to(&mut self, next: TaskState) -> SwarmResult<TaskState> {
        if !self.state.can_transition_to(next) {
            return Err(SwarmError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        let previous = self.state;
        self.state = next;
        if next != TaskState::Locked {
            self.clear_lock();
        }
        Ok(previous)
    }

    /// Enter LOCKED under the given lock
    pub fn apply_lock(&mut self, lock: LockInfo) -> SwarmResult<TaskState> {
        let previous = self.transition_to(TaskState::Locked)?;
        self.lock_id = Some(lock.lock_id);
        self.locked_by = Some(lock.locked_by);
        self.lock_timestamp = Some(lock.locked_at);
        Ok(previous)
    }

    fn clear_lock(&mut self) {
        self.lock_id = None;
        self.lock_timestamp = None;
        self.locked_by = None;
    }
}
