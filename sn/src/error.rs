//! Error types for the coordination core

use thiserror::Error;

use crate::domain::TaskState;

/// Why a proposer refused a lock request
///
/// The display strings travel on the wire as the `reason` field of a lock response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LockDenial {
    #[error("Proposal not found")]
    NotFound,

    #[error("Proposer cannot lock their own task")]
    SelfClaim,

    #[error("Task is locked")]
    AlreadyLocked,

    #[error("Task is not available")]
    NotAvailable,
}

impl LockDenial {
    /// Recover a denial from its wire reason
    pub fn from_reason(reason: &str) -> Option<Self> {
        [Self::NotFound, Self::SelfClaim, Self::AlreadyLocked, Self::NotAvailable]
            .into_iter()
            .find(|denial| denial.to_string() == reason)
    }
}

/// Errors from coordination operations
#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Proposal not found: {0}")]
    ProposalNotFound(String),

    #[error("Lock denied: {0}")]
    LockDenied(LockDenial),

    #[error("Claim failed for {proposal_id}: {reason}")]
    ClaimFailed { proposal_id: String, reason: String },

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Failed to send proposal to any peers")]
    BroadcastFailed,

    #[error("Peer unreachable: {peer}: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    #[error("Peer {peer} rejected request: {message}")]
    Rejected { peer: String, message: String },

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: TaskState, to: TaskState },

    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    #[error("Invalid lock ID")]
    InvalidLockId,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel error")]
    ChannelError,
}

/// Result alias used throughout the crate
pub type SwarmResult<T> = Result<T, SwarmError>;

impl SwarmError {
    /// Text carried in the `message` field of an error response
    pub fn wire_message(&self) -> String {
        match self {
            SwarmError::Protocol(message) => message.clone(),
            SwarmError::ProposalNotFound(_) => "Proposal not found".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for SwarmError {
    fn from(err: serde_json::Error) -> Self {
        SwarmError::Protocol(err.to_string())
    }
}
