//! SwarmNode - one node's components wired together
//!
//! ```text
//!             ┌──────────────── SwarmNode ────────────────┐
//!  Transport ─┤ TaskCoordinator ──► StateManager (actor)  │
//!             │        │                                  │
//!             │        └──► WorkloadExecutor              │
//!             │ ConnectionMonitor (actor)                 │
//!             │ EventBus ──► EventLogger (optional)       │
//!             └───────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::coordinator::{CoordinatorConfig, TaskCoordinator};
use crate::domain::Capabilities;
use crate::error::{SwarmError, SwarmResult};
use crate::events::{EventBus, NodeEvent, spawn_event_logger};
use crate::executor::{ExecutorConfig, WorkloadExecutor, create_executor};
use crate::health::{ConnectionMonitor, HealthConfig};
use crate::state::StateManager;
use crate::transport::Transport;

/// Everything needed to start a node besides its transport
#[derive(Clone, Default)]
pub struct NodeOptions {
    pub capabilities: Capabilities,
    pub coordinator: CoordinatorConfig,
    pub health: HealthConfig,
    pub executor: ExecutorConfig,
    /// Overrides the executor built from `executor`
    pub workload: Option<Arc<dyn WorkloadExecutor>>,
    /// Directory for the JSONL event log; no log when unset
    pub event_log_dir: Option<PathBuf>,
}

pub struct SwarmNode {
    coordinator: TaskCoordinator,
    monitor: ConnectionMonitor,
    events: EventBus,
    logger: Option<JoinHandle<()>>,
}

impl SwarmNode {
    /// Spawn the node's actors and register its protocol handlers
    pub async fn start(transport: Arc<dyn Transport>, options: NodeOptions) -> SwarmResult<Self> {
        let peer_id = transport.local_peer_id().to_string();
        debug!(%peer_id, "SwarmNode::start: called");
        let events = EventBus::with_default_capacity();

        let logger = match &options.event_log_dir {
            Some(dir) => Some(
                spawn_event_logger(dir, peer_id.clone(), events.clone())
                    .map_err(|e| SwarmError::Io(std::io::Error::other(e.to_string())))?,
            ),
            None => None,
        };

        let state = StateManager::spawn(
            options.capabilities.clone(),
            options.coordinator.lock_timeout_ms,
            options.coordinator.channel_buffer,
            events.clone(),
        );
        let executor = options
            .workload
            .clone()
            .unwrap_or_else(|| create_executor(&options.executor, &options.coordinator.inbox_dir));
        let coordinator = TaskCoordinator::new(
            transport.clone(),
            state,
            events.clone(),
            executor,
            options.coordinator.clone(),
        );
        coordinator.register_handlers().await;

        let monitor = ConnectionMonitor::spawn(transport, options.health.clone(), events.clone());
        info!(%peer_id, "Swarm node started");

        Ok(Self {
            coordinator,
            monitor,
            events,
            logger,
        })
    }

    pub fn peer_id(&self) -> &str {
        self.coordinator.peer_id()
    }

    pub fn coordinator(&self) -> &TaskCoordinator {
        &self.coordinator
    }

    pub fn monitor(&self) -> &ConnectionMonitor {
        &self.monitor
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    /// Stop connection monitoring; in-flight coordination is left to finish
    pub async fn shutdown(self) {
        debug!(peer_id = %self.peer_id(), "SwarmNode::shutdown: called");
        if let Err(e) = self.monitor.shutdown().await {
            warn!(error = %e, "Monitor already stopped");
        }
        if let Some(logger) = self.logger {
            // handlers registered on the transport still hold bus senders
            logger.abort();
        }
        info!("Swarm node stopped");
    }
}
