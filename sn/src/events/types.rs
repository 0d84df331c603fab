//! Node event vocabulary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{PeerConnection, PeerId, PeerMetrics, TaskProposal, TaskState};

/// Everything observable about a node's coordination activity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeEvent {
    // === Proposals ===
    /// This node created and broadcast a proposal
    ProposalCreated { proposal_id: String, proposal: TaskProposal },
    /// A proposal from another node was stored locally
    ProposalReceived {
        proposal_id: String,
        from: PeerId,
        proposal: TaskProposal,
    },
    /// A stored proposal moved along a lifecycle edge
    ProposalStateChanged {
        proposal_id: String,
        from: TaskState,
        to: TaskState,
    },
    /// The proposer accepted a claimant
    ProposalAccepted { proposal_id: String, accepted_by: PeerId },
    ProposalCancelled { proposal_id: String },

    // === Execution ===
    TaskStarted { proposal_id: String, executor_id: PeerId },
    TaskStatusUpdated {
        task_id: String,
        status: TaskState,
        progress: Option<Value>,
    },
    TaskCompleted { proposal_id: String, result: Value },
    TaskFailed { proposal_id: String, error: String },
    /// An input file arrived on the file protocol
    FileReceived {
        proposal_id: String,
        file_name: String,
        bytes: usize,
    },

    // === Connections ===
    PeerConnected { peer_id: PeerId, connection: PeerConnection },
    PeerDisconnected { peer_id: PeerId, attempts: u32 },
    Heartbeat { peer_id: PeerId, metrics: PeerMetrics },
    ReconnectFailed { peer_id: PeerId, error: String },
}

impl NodeEvent {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            NodeEvent::ProposalCreated { .. } => "proposalCreated",
            NodeEvent::ProposalReceived { .. } => "proposalReceived",
            NodeEvent::ProposalStateChanged { .. } => "proposalStateChanged",
            NodeEvent::ProposalAccepted { .. } => "proposalAccepted",
            NodeEvent::ProposalCancelled { .. } => "proposalCancelled",
            NodeEvent::TaskStarted { .. } => "taskStarted",
            NodeEvent::TaskStatusUpdated { .. } => "taskStatusUpdated",
            NodeEvent::TaskCompleted { .. } => "taskCompleted",
            NodeEvent::TaskFailed { .. } => "taskFailed",
            NodeEvent::FileReceived { .. } => "fileReceived",
            NodeEvent::PeerConnected { .. } => "peerConnected",
            NodeEvent::PeerDisconnected { .. } => "peerDisconnected",
            NodeEvent::Heartbeat { .. } => "heartbeat",
            NodeEvent::ReconnectFailed { .. } => "reconnectFailed",
        }
    }

    /// Proposal the event is about, if any
    pub fn proposal_id(&self) -> Option<&str> {
        match self {
            NodeEvent::ProposalCreated { proposal_id, .. }
            | NodeEvent::ProposalReceived { proposal_id, .. }
            | NodeEvent::ProposalStateChanged { proposal_id, .. }
            | NodeEvent::ProposalAccepted { proposal_id, .. }
            | NodeEvent::ProposalCancelled { proposal_id }
            | NodeEvent::TaskStarted { proposal_id, .. }
            | NodeEvent::TaskCompleted { proposal_id, .. }
            | NodeEvent::TaskFailed { proposal_id, .. }
            | NodeEvent::FileReceived { proposal_id, .. } => Some(proposal_id),
            NodeEvent::TaskStatusUpdated { task_id, .. } => Some(task_id),
            _ => None,
        }
    }

    /// Peer the event is about, if any
    pub fn peer_id(&self) -> Option<&str> {
        match self {
            NodeEvent::PeerConnected { peer_id, .. }
            | NodeEvent::PeerDisconnected { peer_id, .. }
            | NodeEvent::Heartbeat { peer_id, .. }
            | NodeEvent::ReconnectFailed { peer_id, .. } => Some(peer_id),
            _ => None,
        }
    }
}

/// A timestamped event log entry for file persistence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// Node that emitted the event
    pub node: PeerId,
    pub event: NodeEvent,
}

impl EventLogEntry {
    pub fn new(node: impl Into<PeerId>, event: NodeEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            node: node.into(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        let event = NodeEvent::ProposalStateChanged {
            proposal_id: "p1".to_string(),
            from: TaskState::Proposed,
            to: TaskState::Locked,
        };
        assert_eq!(event.event_type(), "proposalStateChanged");
        assert_eq!(event.proposal_id(), Some("p1"));
        assert_eq!(event.peer_id(), None);
    }

    #[test]
    fn test_serde_tag_matches_event_type() {
        let event = NodeEvent::ReconnectFailed {
            peer_id: "peer-a".to_string(),
            error: "no route".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(event.peer_id(), Some("peer-a"));
    }

    #[test]
    fn test_log_entry_serialization() {
        let entry = EventLogEntry::new(
            "node-1",
            NodeEvent::ProposalCancelled {
                proposal_id: "p9".to_string(),
            },
        );
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"ts\""));
        assert!(json.contains("proposalCancelled"));
        let back: EventLogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.node, "node-1");
    }
}
