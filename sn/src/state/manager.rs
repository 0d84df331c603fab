//! StateManager - actor that owns a node's proposal store
//!
//! The actor task is the only code that touches the proposal map, the
//! capability budget and the active-task set. Every lock and unlock decision
//! is a single command, so claims against this node's proposals are decided
//! strictly one at a time.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::lock::{LockDecision, decide_lock, release_lock};
use super::messages::{ProposalPatch, StateCommand, StateResponse};
use crate::domain::{Capabilities, CapabilitiesUpdate, Requirements, TaskProposal, TaskState};
use crate::error::SwarmError;
use crate::events::{EventBus, NodeEvent};
use crate::protocol::{LockRequest, UnlockRequest};

/// Handle to send commands to the StateManager
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
}

struct ProposalStore {
    proposals: HashMap<String, TaskProposal>,
    capabilities: Capabilities,
    active: BTreeSet<String>,
    lock_timeout_ms: i64,
    events: EventBus,
}

impl StateManager {
    /// Spawn a new StateManager actor
    pub fn spawn(capabilities: Capabilities, lock_timeout_ms: i64, channel_buffer: usize, events: EventBus) -> Self {
        debug!(?capabilities, lock_timeout_ms, "StateManager::spawn: called");
        let (tx, rx) = mpsc::channel(channel_buffer.max(1));
        let store = ProposalStore {
            proposals: HashMap::new(),
            capabilities,
            active: BTreeSet::new(),
            lock_timeout_ms,
            events,
        };
        tokio::spawn(actor_loop(store, rx));
        info!("StateManager spawned");
        Self { tx }
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> StateCommand) -> StateResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(make(reply_tx)).await.map_err(|_| SwarmError::ChannelError)?;
        reply_rx.await.map_err(|_| SwarmError::ChannelError)
    }

    // === Proposal store ===

    /// Store a proposal; returns false if the id was already present
    pub async fn insert_proposal(&self, proposal: TaskProposal) -> StateResponse<bool> {
        debug!(proposal_id = %proposal.id, "insert_proposal: called");
        self.call(|reply| StateCommand::InsertProposal { proposal, reply }).await
    }

    pub async fn get_proposal(&self, id: &str) -> StateResponse<Option<TaskProposal>> {
        debug!(%id, "get_proposal: called");
        let id = id.to_string();
        self.call(|reply| StateCommand::GetProposal { id, reply }).await
    }

    /// Get a proposal or fail with `ProposalNotFound`
    pub async fn require_proposal(&self, id: &str) -> StateResponse<TaskProposal> {
        self.get_proposal(id)
            .await?
            .ok_or_else(|| SwarmError::ProposalNotFound(id.to_string()))
    }

    pub async fn list_proposals(&self, state: Option<TaskState>) -> StateResponse<Vec<TaskProposal>> {
        debug!(?state, "list_proposals: called");
        self.call(|reply| StateCommand::ListProposals { state, reply }).await
    }

    pub async fn remove_proposal(&self, id: &str) -> StateResponse<Option<TaskProposal>> {
        debug!(%id, "remove_proposal: called");
        let id = id.to_string();
        self.call(|reply| StateCommand::RemoveProposal { id, reply }).await
    }

    /// Move a proposal along a lifecycle edge and apply the patch atomically
    pub async fn transition(&self, id: &str, to: TaskState, patch: ProposalPatch) -> StateResponse<TaskProposal> {
        debug!(%id, %to, "transition: called");
        let id = id.to_string();
        self.call(|reply| StateCommand::Transition { id, to, patch, reply }).await?
    }

    pub async fn set_progress(&self, id: &str, progress: Option<Value>) -> StateResponse<()> {
        debug!(%id, "set_progress: called");
        let id = id.to_string();
        self.call(|reply| StateCommand::SetProgress { id, progress, reply }).await?
    }

    // === Lock coordinator ===

    pub async fn try_lock(&self, request: LockRequest, now_ms: i64) -> StateResponse<LockDecision> {
        debug!(proposal_id = %request.proposal_id, requester = %request.requester_id, "try_lock: called");
        self.call(|reply| StateCommand::Lock { request, now_ms, reply }).await
    }

    pub async fn unlock(&self, request: UnlockRequest) -> StateResponse<()> {
        debug!(proposal_id = %request.proposal_id, "unlock: called");
        self.call(|reply| StateCommand::Unlock { request, reply }).await?
    }

    // === Capabilities and active tasks ===

    pub async fn capabilities(&self) -> StateResponse<Capabilities> {
        self.call(|reply| StateCommand::GetCapabilities { reply }).await
    }

    pub async fn update_capabilities(&self, update: CapabilitiesUpdate) -> StateResponse<Capabilities> {
        debug!(?update, "update_capabilities: called");
        self.call(|reply| StateCommand::UpdateCapabilities { update, reply }).await
    }

    pub async fn can_handle(&self, requirements: Requirements) -> StateResponse<bool> {
        self.call(|reply| StateCommand::CanHandle { requirements, reply }).await
    }

    /// Check capacity and take a task slot in one step
    ///
    /// False if the requirements don't fit, no slot is free, or the id
    /// already holds one. The slot is held until `finish_active`.
    pub async fn reserve_slot(&self, id: &str, requirements: Requirements) -> StateResponse<bool> {
        debug!(%id, "reserve_slot: called");
        let id = id.to_string();
        self.call(|reply| StateCommand::ReserveSlot { id, requirements, reply }).await
    }

    pub async fn finish_active(&self, id: &str) -> StateResponse<()> {
        let id = id.to_string();
        self.call(|reply| StateCommand::FinishActive { id, reply }).await
    }

    pub async fn active_tasks(&self) -> StateResponse<Vec<String>> {
        self.call(|reply| StateCommand::ActiveTasks { reply }).await
    }
}

impl ProposalStore {
    fn emit_change(&self, proposal_id: &str, from: TaskState, to: TaskState) {
        self.events.emit(NodeEvent::ProposalStateChanged {
            proposal_id: proposal_id.to_string(),
            from,
            to,
        });
    }

    fn transition(&mut self, id: &str, to: TaskState, patch: ProposalPatch) -> StateResponse<TaskProposal> {
        let proposal = self
            .proposals
            .get_mut(id)
            .ok_or_else(|| SwarmError::ProposalNotFound(id.to_string()))?;

        let previous = match (to, patch.lock) {
            (TaskState::Locked, Some(lock)) => proposal.apply_lock(lock)?,
            (TaskState::Locked, None) => {
                return Err(SwarmError::Protocol("entering LOCKED requires a lock".to_string()));
            }
            (_, _) => proposal.transition_to(to)?,
        };
        if let Some(accepted_by) = patch.accepted_by {
            proposal.accepted_by = Some(accepted_by);
        }
        if let Some(result) = patch.result {
            proposal.result = Some(result);
        }
        if patch.progress.is_some() {
            proposal.progress = patch.progress;
        }

        let snapshot = proposal.clone();
        self.emit_change(id, previous, to);
        Ok(snapshot)
    }
}

async fn actor_loop(mut store: ProposalStore, mut rx: mpsc::Receiver<StateCommand>) {
    debug!("StateManager actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StateCommand::InsertProposal { proposal, reply } => {
                debug!(proposal_id = %proposal.id, "actor_loop: InsertProposal command");
                let inserted = if store.proposals.contains_key(&proposal.id) {
                    false
                } else {
                    store.proposals.insert(proposal.id.clone(), proposal);
                    true
                };
                let _ = reply.send(inserted);
            }

            StateCommand::GetProposal { id, reply } => {
                let _ = reply.send(store.proposals.get(&id).cloned());
            }

            StateCommand::ListProposals { state, reply } => {
                let mut proposals: Vec<TaskProposal> = store
                    .proposals
                    .values()
                    .filter(|p| state.is_none_or(|s| p.state == s))
                    .cloned()
                    .collect();
                proposals.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
                let _ = reply.send(proposals);
            }

            StateCommand::RemoveProposal { id, reply } => {
                debug!(%id, "actor_loop: RemoveProposal command");
                store.active.remove(&id);
                let _ = reply.send(store.proposals.remove(&id));
            }

            StateCommand::Transition { id, to, patch, reply } => {
                debug!(%id, %to, "actor_loop: Transition command");
                let result = store.transition(&id, to, patch);
                if let Err(e) = &result {
                    debug!(%id, %to, error = %e, "actor_loop: transition rejected");
                }
                let _ = reply.send(result);
            }

            StateCommand::SetProgress { id, progress, reply } => {
                let result = match store.proposals.get_mut(&id) {
                    Some(proposal) => {
                        proposal.progress = progress;
                        Ok(())
                    }
                    None => Err(SwarmError::ProposalNotFound(id)),
                };
                let _ = reply.send(result);
            }

            StateCommand::Lock { request, now_ms, reply } => {
                debug!(proposal_id = %request.proposal_id, "actor_loop: Lock command");
                let decision = decide_lock(
                    store.proposals.get_mut(&request.proposal_id),
                    &request,
                    now_ms,
                    store.lock_timeout_ms,
                );
                if let LockDecision::Granted { previous, .. } = &decision {
                    store.emit_change(&request.proposal_id, *previous, TaskState::Locked);
                }
                let _ = reply.send(decision);
            }

            StateCommand::Unlock { request, reply } => {
                debug!(proposal_id = %request.proposal_id, "actor_loop: Unlock command");
                let result = release_lock(
                    store.proposals.get_mut(&request.proposal_id),
                    &request.proposal_id,
                    &request.lock_id,
                )
                .map(|previous| store.emit_change(&request.proposal_id, previous, TaskState::Proposed));
                let _ = reply.send(result);
            }

            StateCommand::GetCapabilities { reply } => {
                let _ = reply.send(store.capabilities.clone());
            }

            StateCommand::UpdateCapabilities { update, reply } => {
                store.capabilities.merge(update);
                info!(capabilities = ?store.capabilities, "Capabilities updated");
                let _ = reply.send(store.capabilities.clone());
            }

            StateCommand::CanHandle { requirements, reply } => {
                let _ = reply.send(store.capabilities.can_handle(&requirements, store.active.len()));
            }

            StateCommand::ReserveSlot { id, requirements, reply } => {
                let reserved = if store.active.contains(&id) {
                    warn!(%id, "actor_loop: task already holds a slot");
                    false
                } else if store.capabilities.can_handle(&requirements, store.active.len()) {
                    store.active.insert(id.clone());
                    true
                } else {
                    debug!(%id, active = store.active.len(), "actor_loop: no slot for task");
                    false
                };
                let _ = reply.send(reserved);
            }

            StateCommand::FinishActive { id, reply } => {
                store.active.remove(&id);
                let _ = reply.send(());
            }

            StateCommand::ActiveTasks { reply } => {
                let _ = reply.send(store.active.iter().cloned().collect());
            }
        }
    }

    debug!("StateManager actor stopped");
}
