//! Lock decisions for proposals this node originated
//!
//! Pure functions over a proposal record; the StateManager actor runs them one
//! request at a time, which is what serializes competing claims.

use tracing::{debug, info};

use crate::domain::{LockInfo, TaskProposal, TaskState};
use crate::error::{LockDenial, SwarmError, SwarmResult};
use crate::protocol::LockRequest;

/// Default lock lifetime in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: i64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockDecision {
    Granted { lock_id: String, previous: TaskState },
    Denied(LockDenial),
}

/// Decide a lock request against the proposer's authoritative record
///
/// An expired lock is re-granted to the new requester. The previous holder is
/// not told and holds no fencing token.
pub fn decide_lock(proposal: Option<&mut TaskProposal>, request: &LockRequest, now_ms: i64, lock_timeout_ms: i64) -> LockDecision {
    let Some(proposal) = proposal else {
        debug!(proposal_id = %request.proposal_id, "decide_lock: proposal not found");
        return LockDecision::Denied(LockDenial::NotFound);
    };

    if request.requester_id == proposal.proposer_id {
        debug!(proposal_id = %proposal.id, "decide_lock: proposer cannot lock own task");
        return LockDecision::Denied(LockDenial::SelfClaim);
    }

    if proposal.state == TaskState::Locked {
        let age = now_ms - proposal.lock_timestamp.unwrap_or(now_ms);
        if age < lock_timeout_ms {
            debug!(proposal_id = %proposal.id, age, locked_by = ?proposal.locked_by, "decide_lock: task is locked");
            return LockDecision::Denied(LockDenial::AlreadyLocked);
        }
        info!(
            proposal_id = %proposal.id,
            previous_holder = ?proposal.locked_by,
            requester = %request.requester_id,
            age,
            "Lock expired, granting to new requester"
        );
    } else if proposal.state != TaskState::Proposed {
        debug!(proposal_id = %proposal.id, state = %proposal.state, "decide_lock: task is not available");
        return LockDecision::Denied(LockDenial::NotAvailable);
    }

    let lock = LockInfo {
        lock_id: request.lock_id.clone(),
        locked_by: request.requester_id.clone(),
        locked_at: now_ms,
    };
    match proposal.apply_lock(lock) {
        Ok(previous) => {
            info!(proposal_id = %proposal.id, locked_by = %request.requester_id, "Lock acquired");
            LockDecision::Granted {
                lock_id: request.lock_id.clone(),
                previous,
            }
        }
        Err(_) => LockDecision::Denied(LockDenial::NotAvailable),
    }
}

/// Release a lock; the token must match exactly
pub fn release_lock(proposal: Option<&mut TaskProposal>, proposal_id: &str, lock_id: &str) -> SwarmResult<TaskState> {
    let proposal = proposal.ok_or_else(|| SwarmError::ProposalNotFound(proposal_id.to_string()))?;

    if proposal.lock_id.as_deref() != Some(lock_id) {
        debug!(%proposal_id, "release_lock: invalid lock id");
        return Err(SwarmError::InvalidLockId);
    }

    let previous_holder = proposal.locked_by.clone();
    let previous = proposal.transition_to(TaskState::Proposed)?;
    info!(%proposal_id, ?previous_holder, "Lock released");
    Ok(previous)
}
