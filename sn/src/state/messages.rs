//! State manager messages
//!
//! Commands and responses for the actor pattern.

use serde_json::Value;
use tokio::sync::oneshot;

use super::lock::LockDecision;
use crate::domain::{Capabilities, CapabilitiesUpdate, LockInfo, PeerId, Requirements, TaskProposal, TaskState};
use crate::error::SwarmError;
use crate::protocol::{LockRequest, UnlockRequest};

/// Response from state operations
pub type StateResponse<T> = Result<T, SwarmError>;

/// Fields written together with a transition
#[derive(Debug, Clone, Default)]
pub struct ProposalPatch {
    pub accepted_by: Option<PeerId>,
    pub result: Option<Value>,
    pub progress: Option<Value>,
    /// Required when the transition enters LOCKED
    pub lock: Option<LockInfo>,
}

impl ProposalPatch {
    pub fn accepted_by(peer: impl Into<PeerId>) -> Self {
        Self {
            accepted_by: Some(peer.into()),
            ..Default::default()
        }
    }

    pub fn result(result: Value) -> Self {
        Self {
            result: Some(result),
            ..Default::default()
        }
    }

    pub fn progress(progress: Option<Value>) -> Self {
        Self {
            progress,
            ..Default::default()
        }
    }

    pub fn lock(lock: LockInfo) -> Self {
        Self {
            lock: Some(lock),
            ..Default::default()
        }
    }
}

/// Commands sent to the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    // Proposal store
    InsertProposal {
        proposal: TaskProposal,
        reply: oneshot::Sender<bool>,
    },
    GetProposal {
        id: String,
        reply: oneshot::Sender<Option<TaskProposal>>,
    },
    ListProposals {
        state: Option<TaskState>,
        reply: oneshot::Sender<Vec<TaskProposal>>,
    },
    RemoveProposal {
        id: String,
        reply: oneshot::Sender<Option<TaskProposal>>,
    },
    Transition {
        id: String,
        to: TaskState,
        patch: ProposalPatch,
        reply: oneshot::Sender<StateResponse<TaskProposal>>,
    },
    SetProgress {
        id: String,
        progress: Option<Value>,
        reply: oneshot::Sender<StateResponse<()>>,
    },

    // Lock coordinator
    Lock {
        request: LockRequest,
        now_ms: i64,
        reply: oneshot::Sender<LockDecision>,
    },
    Unlock {
        request: UnlockRequest,
        reply: oneshot::Sender<StateResponse<()>>,
    },

    // Capabilities and active tasks
    GetCapabilities {
        reply: oneshot::Sender<Capabilities>,
    },
    UpdateCapabilities {
        update: CapabilitiesUpdate,
        reply: oneshot::Sender<Capabilities>,
    },
    CanHandle {
        requirements: Requirements,
        reply: oneshot::Sender<bool>,
    },
    ReserveSlot {
        id: String,
        requirements: Requirements,
        reply: oneshot::Sender<bool>,
    },
    FinishActive {
        id: String,
        reply: oneshot::Sender<()>,
    },
    ActiveTasks {
        reply: oneshot::Sender<Vec<String>>,
    },
}
