//! TaskCoordinator - proposal lifecycle for one node
//!
//! Outbound: create and broadcast proposals, claim proposals from other
//! nodes, execute them and report results. Inbound (see `handlers`): answer
//! lock, unlock, acceptance, status, result and cancellation requests for
//! proposals this node originated.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info, warn};

use super::config::CoordinatorConfig;
use crate::domain::{
    Capabilities, CapabilitiesUpdate, LockInfo, PeerId, ProposalConfig, TaskProposal, TaskState, is_valid_proposal_id,
    new_lock_id, new_proposal_id, now_ms,
};
use crate::error::{LockDenial, SwarmError, SwarmResult};
use crate::events::{EventBus, NodeEvent};
use crate::executor::WorkloadExecutor;
use crate::protocol::{
    self, AcceptancePayload, CancellationPayload, LockRequest, LockResponse, MessageType, RequestEnvelope,
    ResponseEnvelope, ResultPayload, StatusPayload, UnlockRequest, UnlockResponse, read_file_frame, read_message,
    write_file_frame, write_message,
};
use crate::state::{LockDecision, ProposalPatch, StateManager};
use crate::transport::{BoxedStream, Transport};

/// Snapshot answered by `task_status`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub state: TaskState,
    pub accepted_by: Option<PeerId>,
    pub result: Option<Value>,
    pub progress: Option<Value>,
}

#[derive(Clone)]
pub struct TaskCoordinator {
    peer_id: PeerId,
    transport: Arc<dyn Transport>,
    state: StateManager,
    events: EventBus,
    executor: Arc<dyn WorkloadExecutor>,
    config: CoordinatorConfig,
}

impl TaskCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        state: StateManager,
        events: EventBus,
        executor: Arc<dyn WorkloadExecutor>,
        config: CoordinatorConfig,
    ) -> Self {
        let peer_id = transport.local_peer_id().to_string();
        debug!(%peer_id, executor = executor.name(), "TaskCoordinator::new: called");
        Self {
            peer_id,
            transport,
            state,
            events,
            executor,
            config,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // === Outbound requests ===

    /// One request/response exchange on a fresh stream
    async fn request<T: Serialize + Sync>(
        &self,
        peer: &str,
        protocol: &str,
        kind: MessageType,
        payload: &T,
    ) -> SwarmResult<Value> {
        debug!(%peer, %protocol, ?kind, "request: called");
        let envelope = RequestEnvelope::new(kind, payload)?;
        let exchange = async {
            let mut stream = self.transport.dial(peer, protocol).await?;
            write_message(&mut stream, &envelope).await?;
            let response: ResponseEnvelope = read_message(&mut stream).await?;
            response.into_result(peer)
        };
        tokio::time::timeout(self.config.request_timeout(), exchange)
            .await
            .map_err(|_| SwarmError::PeerUnreachable {
                peer: peer.to_string(),
                reason: "request timed out".to_string(),
            })?
    }

    // === Proposals ===

    /// Create a proposal, store it and broadcast it to every known peer
    ///
    /// If no peer acknowledges the broadcast the proposal is discarded.
    pub async fn create_proposal(&self, config: ProposalConfig) -> SwarmResult<TaskProposal> {
        debug!(image = %config.container_config.image, "create_proposal: called");
        config.validate()?;
        let proposal = TaskProposal::new(new_proposal_id(), self.peer_id.clone(), config, now_ms());
        self.state.insert_proposal(proposal.clone()).await?;

        match self.broadcast_proposal(&proposal).await {
            Ok(acks) => {
                info!(proposal_id = %proposal.id, acks, "Proposal created and broadcast");
                self.events.emit(NodeEvent::ProposalCreated {
                    proposal_id: proposal.id.clone(),
                    proposal: proposal.clone(),
                });
                Ok(proposal)
            }
            Err(e) => {
                warn!(proposal_id = %proposal.id, error = %e, "Broadcast failed, discarding proposal");
                self.state.remove_proposal(&proposal.id).await?;
                Err(e)
            }
        }
    }

    /// Send a proposal to all known peers; returns the number of acks
    pub async fn broadcast_proposal(&self, proposal: &TaskProposal) -> SwarmResult<usize> {
        let peers = self.transport.list_known_peers().await;
        debug!(proposal_id = %proposal.id, peers = peers.len(), "broadcast_proposal: called");

        let sends = peers.iter().map(|peer| async move {
            let outcome = self
                .request(peer, protocol::PROPOSE, MessageType::TaskProposal, proposal)
                .await;
            if let Err(e) = &outcome {
                warn!(%peer, proposal_id = %proposal.id, error = %e, "Failed to send proposal to peer");
            }
            outcome.is_ok()
        });
        let acks = futures::future::join_all(sends).await.into_iter().filter(|ok| *ok).count();

        if acks == 0 {
            return Err(SwarmError::BroadcastFailed);
        }
        Ok(acks)
    }

    /// Store a proposal received from `from` and claim it later if it fits
    pub async fn handle_proposal(&self, from: &str, proposal: TaskProposal) -> SwarmResult<Value> {
        debug!(%from, proposal_id = %proposal.id, "handle_proposal: called");
        proposal.validate_received()?;
        let ack = json!({ "proposalId": proposal.id, "received": true, "timestamp": now_ms() });

        if proposal.proposer_id == self.peer_id {
            debug!(proposal_id = %proposal.id, "handle_proposal: ignoring own proposal");
            return Ok(ack);
        }

        if !self.state.insert_proposal(proposal.clone()).await? {
            debug!(proposal_id = %proposal.id, "handle_proposal: duplicate proposal ignored");
            return Ok(ack);
        }
        info!(proposal_id = %proposal.id, proposer = %proposal.proposer_id, "Proposal received");
        self.events.emit(NodeEvent::ProposalReceived {
            proposal_id: proposal.id.clone(),
            from: from.to_string(),
            proposal: proposal.clone(),
        });

        if proposal.state == TaskState::Proposed && self.can_handle_task(&proposal).await? {
            self.schedule_claim(proposal.id.clone());
        } else {
            debug!(proposal_id = %proposal.id, "handle_proposal: not claiming");
        }
        Ok(ack)
    }

    /// Feasibility gate against local capabilities and free task slots
    pub async fn can_handle_task(&self, proposal: &TaskProposal) -> SwarmResult<bool> {
        self.state.can_handle(proposal.requirements).await
    }

    fn schedule_claim(&self, proposal_id: String) {
        let jitter_ms = if self.config.claim_jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=self.config.claim_jitter_ms)
        };
        debug!(%proposal_id, jitter_ms, "schedule_claim: called");
        let coordinator = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
            coordinator.attempt_accept_proposal(&proposal_id).await;
        });
    }

    // === Claiming ===

    /// Lock, accept and start executing a proposal from another node
    ///
    /// Every failure is logged and unwound locally; the return value only says
    /// whether execution was started.
    pub async fn attempt_accept_proposal(&self, proposal_id: &str) -> bool {
        debug!(%proposal_id, "attempt_accept_proposal: called");
        match self.claim(proposal_id).await {
            Ok(proposal) => {
                let coordinator = self.clone();
                tokio::spawn(async move {
                    let id = proposal.id.clone();
                    if let Err(e) = coordinator.start_task(proposal).await {
                        warn!(proposal_id = %id, error = %e, "Task did not complete");
                    }
                });
                true
            }
            Err(SwarmError::LockDenied(denial)) => {
                info!(%proposal_id, reason = %denial, "Claim denied");
                false
            }
            Err(e) => {
                warn!(%proposal_id, error = %e, "Claim failed");
                false
            }
        }
    }

    async fn claim(&self, proposal_id: &str) -> SwarmResult<TaskProposal> {
        let proposal = self.state.require_proposal(proposal_id).await?;
        if proposal.state != TaskState::Proposed {
            return Err(SwarmError::ClaimFailed {
                proposal_id: proposal_id.to_string(),
                reason: format!("local copy is {}", proposal.state),
            });
        }
        if !self.state.reserve_slot(proposal_id, proposal.requirements).await? {
            return Err(SwarmError::ClaimFailed {
                proposal_id: proposal_id.to_string(),
                reason: "insufficient capacity".to_string(),
            });
        }

        let claimed = self.lock_and_accept(&proposal).await;
        if claimed.is_err() {
            self.release_slot(proposal_id).await;
        }
        claimed
    }

    /// Remote lock then remote acceptance; the caller holds the task slot
    async fn lock_and_accept(&self, proposal: &TaskProposal) -> SwarmResult<TaskProposal> {
        let proposal_id = proposal.id.as_str();
        let lock_id = new_lock_id();
        let request = LockRequest {
            proposal_id: proposal_id.to_string(),
            lock_id: lock_id.clone(),
            requester_id: self.peer_id.clone(),
        };
        let value = self
            .request(&proposal.proposer_id, protocol::LOCK, MessageType::TaskLock, &request)
            .await?;
        let response: LockResponse = serde_json::from_value(value)?;
        if !response.success {
            let reason = response.reason.unwrap_or_default();
            return Err(match LockDenial::from_reason(&reason) {
                Some(denial) => SwarmError::LockDenied(denial),
                None => SwarmError::ClaimFailed {
                    proposal_id: proposal_id.to_string(),
                    reason,
                },
            });
        }
        info!(%proposal_id, proposer = %proposal.proposer_id, "Lock granted");

        let lock = LockInfo {
            lock_id: lock_id.clone(),
            locked_by: self.peer_id.clone(),
            locked_at: now_ms(),
        };
        if let Err(e) = self.state.transition(proposal_id, TaskState::Locked, ProposalPatch::lock(lock)).await {
            self.release_remote_lock(proposal, &lock_id).await;
            return Err(e);
        }

        let acceptance = AcceptancePayload {
            proposal_id: proposal_id.to_string(),
            accepted_by: self.peer_id.clone(),
            timestamp: now_ms(),
        };
        if let Err(e) = self
            .request(&proposal.proposer_id, protocol::ACCEPT, MessageType::TaskAcceptance, &acceptance)
            .await
        {
            warn!(%proposal_id, error = %e, "Acceptance failed, releasing lock");
            self.release_remote_lock(proposal, &lock_id).await;
            if let Err(revert) = self
                .state
                .transition(proposal_id, TaskState::Proposed, ProposalPatch::default())
                .await
            {
                debug!(%proposal_id, error = %revert, "lock_and_accept: local revert skipped");
            }
            return Err(SwarmError::ClaimFailed {
                proposal_id: proposal_id.to_string(),
                reason: e.to_string(),
            });
        }

        self.state
            .transition(proposal_id, TaskState::Accepted, ProposalPatch::accepted_by(self.peer_id.clone()))
            .await
    }

    async fn release_slot(&self, proposal_id: &str) {
        if let Err(e) = self.state.finish_active(proposal_id).await {
            warn!(%proposal_id, error = %e, "Failed to release task slot");
        }
    }

    async fn release_remote_lock(&self, proposal: &TaskProposal, lock_id: &str) {
        let request = UnlockRequest {
            proposal_id: proposal.id.clone(),
            lock_id: lock_id.to_string(),
        };
        match self
            .request(&proposal.proposer_id, protocol::UNLOCK, MessageType::TaskUnlock, &request)
            .await
            .and_then(|value| Ok(serde_json::from_value::<UnlockResponse>(value)?))
        {
            Ok(response) if response.success => debug!(proposal_id = %proposal.id, "release_remote_lock: released"),
            Ok(response) => debug!(proposal_id = %proposal.id, reason = ?response.reason, "release_remote_lock: refused"),
            Err(e) => warn!(proposal_id = %proposal.id, error = %e, "Failed to release lock"),
        }
    }

    // === Execution ===

    /// Run an accepted proposal and report the outcome to its proposer
    ///
    /// The task slot taken by the claim is released when this returns.
    pub async fn start_task(&self, proposal: TaskProposal) -> SwarmResult<()> {
        let proposal_id = proposal.id.clone();
        debug!(%proposal_id, "start_task: called");
        let proposal = match self
            .state
            .transition(&proposal_id, TaskState::Running, ProposalPatch::default())
            .await
        {
            Ok(proposal) => proposal,
            Err(e) => {
                self.release_slot(&proposal_id).await;
                return Err(e);
            }
        };
        info!(%proposal_id, executor = self.executor.name(), "Task started");
        self.events.emit(NodeEvent::TaskStarted {
            proposal_id: proposal_id.clone(),
            executor_id: self.peer_id.clone(),
        });
        self.send_status(&proposal, TaskState::Running, None).await;

        let outcome = match self.executor.execute(&proposal).await {
            Ok(result) => self.complete_task(&proposal_id, result).await,
            Err(e) => {
                self.fail_task(&proposal, e.to_string()).await;
                Err(e)
            }
        };
        self.state.finish_active(&proposal_id).await?;
        outcome
    }

    /// Send the result to the proposer, then mark the local copy COMPLETED
    pub async fn complete_task(&self, proposal_id: &str, result: Value) -> SwarmResult<()> {
        debug!(%proposal_id, "complete_task: called");
        let proposal = self.state.require_proposal(proposal_id).await?;
        let payload = ResultPayload {
            proposal_id: proposal_id.to_string(),
            result: result.clone(),
            timestamp: now_ms(),
        };

        match self
            .request(&proposal.proposer_id, protocol::RESULT, MessageType::TaskResult, &payload)
            .await
        {
            Ok(_) => {
                self.state
                    .transition(proposal_id, TaskState::Completed, ProposalPatch::result(result.clone()))
                    .await?;
                info!(%proposal_id, "Task completed");
                self.events.emit(NodeEvent::TaskCompleted {
                    proposal_id: proposal_id.to_string(),
                    result,
                });
                Ok(())
            }
            Err(e) => {
                self.fail_task(&proposal, format!("Failed to report result: {}", e)).await;
                Err(e)
            }
        }
    }

    async fn fail_task(&self, proposal: &TaskProposal, message: String) {
        error!(proposal_id = %proposal.id, error = %message, "Task failed");
        if let Err(e) = self
            .state
            .transition(&proposal.id, TaskState::Failed, ProposalPatch::progress(Some(json!({ "error": message }))))
            .await
        {
            debug!(proposal_id = %proposal.id, error = %e, "fail_task: local transition skipped");
        }
        self.events.emit(NodeEvent::TaskFailed {
            proposal_id: proposal.id.clone(),
            error: message.clone(),
        });
        self.send_status(proposal, TaskState::Failed, Some(json!({ "error": message })))
            .await;
    }

    /// Advisory status notification to the proposer
    async fn send_status(&self, proposal: &TaskProposal, status: TaskState, progress: Option<Value>) {
        let payload = StatusPayload {
            task_id: proposal.id.clone(),
            status,
            progress,
            timestamp: now_ms(),
        };
        if let Err(e) = self
            .request(&proposal.proposer_id, protocol::STATUS, MessageType::TaskStatusUpdate, &payload)
            .await
        {
            warn!(proposal_id = %proposal.id, %status, error = %e, "Failed to send status update");
        }
    }

    // === Proposer side ===

    /// Decide a lock request for one of this node's proposals
    pub async fn handle_lock(&self, from: &str, request: LockRequest) -> SwarmResult<LockResponse> {
        debug!(%from, proposal_id = %request.proposal_id, requester = %request.requester_id, "handle_lock: called");
        let decision = self.state.try_lock(request, now_ms()).await?;
        Ok(match decision {
            LockDecision::Granted { lock_id, .. } => LockResponse::granted(lock_id),
            LockDecision::Denied(denial) => LockResponse::denied(denial.to_string()),
        })
    }

    /// Release a lock when the caller presents the matching token
    pub async fn handle_unlock(&self, from: &str, request: UnlockRequest) -> SwarmResult<UnlockResponse> {
        debug!(%from, proposal_id = %request.proposal_id, "handle_unlock: called");
        match self.state.unlock(request).await {
            Ok(()) => Ok(UnlockResponse {
                success: true,
                reason: None,
            }),
            Err(SwarmError::InvalidLockId) => Ok(UnlockResponse {
                success: false,
                reason: Some(SwarmError::InvalidLockId.to_string()),
            }),
            Err(e) => Err(e),
        }
    }

    /// Accept the lock holder's claim and stream it the input files
    ///
    /// Only a LOCKED proposal can be accepted. The acceptance is not checked
    /// against the current lock holder.
    pub async fn handle_acceptance(&self, from: &str, payload: AcceptancePayload) -> SwarmResult<Value> {
        debug!(%from, proposal_id = %payload.proposal_id, accepted_by = %payload.accepted_by, "handle_acceptance: called");
        let proposal = self.state.require_proposal(&payload.proposal_id).await?;
        if proposal.proposer_id != self.peer_id {
            return Err(SwarmError::Protocol("Not the proposer of this task".to_string()));
        }
        if proposal.state != TaskState::Locked {
            return Err(SwarmError::ClaimFailed {
                proposal_id: proposal.id.clone(),
                reason: format!("Task is {}", proposal.state),
            });
        }

        for path in &proposal.container_config.input_files {
            if let Err(e) = self.stream_file(&payload.accepted_by, &proposal.id, path).await {
                warn!(proposal_id = %proposal.id, ?path, error = %e, "Input file streaming failed");
                if let Err(revert) = self
                    .state
                    .transition(&proposal.id, TaskState::Proposed, ProposalPatch::default())
                    .await
                {
                    debug!(proposal_id = %proposal.id, error = %revert, "handle_acceptance: revert skipped");
                }
                return Err(e);
            }
        }

        self.state
            .transition(
                &proposal.id,
                TaskState::Accepted,
                ProposalPatch::accepted_by(payload.accepted_by.clone()),
            )
            .await?;
        info!(proposal_id = %proposal.id, accepted_by = %payload.accepted_by, "Proposal accepted");
        self.events.emit(NodeEvent::ProposalAccepted {
            proposal_id: proposal.id.clone(),
            accepted_by: payload.accepted_by,
        });
        Ok(json!({ "proposalId": proposal.id, "accepted": true, "timestamp": now_ms() }))
    }

    /// Record a status update from the executing peer
    ///
    /// RUNNING and FAILED move the proposer's record; anything else only
    /// refreshes the cached progress.
    pub async fn handle_status_update(&self, from: &str, payload: StatusPayload) -> SwarmResult<Value> {
        debug!(%from, task_id = %payload.task_id, status = %payload.status, "handle_status_update: called");
        let current = self.state.require_proposal(&payload.task_id).await?;
        check_executor(&current, from)?;

        let moves = matches!(payload.status, TaskState::Running | TaskState::Failed)
            && current.state != payload.status
            && current.state.can_transition_to(payload.status);
        if moves {
            self.state
                .transition(
                    &payload.task_id,
                    payload.status,
                    ProposalPatch::progress(payload.progress.clone()),
                )
                .await?;
            if payload.status == TaskState::Failed {
                let error = payload
                    .progress
                    .as_ref()
                    .and_then(|p| p.get("error"))
                    .and_then(Value::as_str)
                    .unwrap_or("remote execution failed")
                    .to_string();
                self.events.emit(NodeEvent::TaskFailed {
                    proposal_id: payload.task_id.clone(),
                    error,
                });
            }
        } else {
            self.state.set_progress(&payload.task_id, payload.progress.clone()).await?;
        }

        self.events.emit(NodeEvent::TaskStatusUpdated {
            task_id: payload.task_id.clone(),
            status: payload.status,
            progress: payload.progress,
        });
        Ok(json!({ "taskId": payload.task_id, "received": true }))
    }

    /// Finalize a proposal with the executing peer's result
    pub async fn handle_result(&self, from: &str, payload: ResultPayload) -> SwarmResult<Value> {
        debug!(%from, proposal_id = %payload.proposal_id, "handle_result: called");
        let current = self.state.require_proposal(&payload.proposal_id).await?;
        check_executor(&current, from)?;

        self.state
            .transition(
                &payload.proposal_id,
                TaskState::Completed,
                ProposalPatch::result(payload.result.clone()),
            )
            .await?;
        info!(proposal_id = %payload.proposal_id, %from, "Result received");
        self.events.emit(NodeEvent::TaskCompleted {
            proposal_id: payload.proposal_id.clone(),
            result: payload.result,
        });
        Ok(json!({ "proposalId": payload.proposal_id, "received": true }))
    }

    /// Mark a cached copy cancelled when its proposer says so
    pub async fn handle_cancellation(&self, from: &str, payload: CancellationPayload) -> SwarmResult<Value> {
        debug!(%from, proposal_id = %payload.proposal_id, "handle_cancellation: called");
        let ack = json!({ "proposalId": payload.proposal_id, "received": true });
        let Some(current) = self.state.get_proposal(&payload.proposal_id).await? else {
            return Ok(ack);
        };
        if current.proposer_id != from {
            return Err(SwarmError::Protocol("Only the proposer can cancel a task".to_string()));
        }
        if current.state.can_transition_to(TaskState::Cancelled) {
            self.state
                .transition(&payload.proposal_id, TaskState::Cancelled, ProposalPatch::default())
                .await?;
            info!(proposal_id = %payload.proposal_id, reason = ?payload.reason, "Proposal cancelled by proposer");
            self.events.emit(NodeEvent::ProposalCancelled {
                proposal_id: payload.proposal_id,
            });
        }
        Ok(ack)
    }

    /// Cancel a proposal; returns false if it already reached a terminal state
    ///
    /// On the proposer the cancellation is also announced to known peers.
    pub async fn cancel_proposal(&self, proposal_id: &str) -> SwarmResult<bool> {
        debug!(%proposal_id, "cancel_proposal: called");
        let proposal = self.state.require_proposal(proposal_id).await?;
        if proposal.state.is_terminal() {
            info!(%proposal_id, state = %proposal.state, "Cannot cancel finished proposal");
            return Ok(false);
        }

        match self
            .state
            .transition(proposal_id, TaskState::Cancelled, ProposalPatch::default())
            .await
        {
            Ok(_) => {}
            Err(SwarmError::InvalidTransition { .. }) => return Ok(false),
            Err(e) => return Err(e),
        }
        info!(%proposal_id, "Proposal cancelled");
        self.events.emit(NodeEvent::ProposalCancelled {
            proposal_id: proposal_id.to_string(),
        });

        if proposal.proposer_id == self.peer_id {
            let notified = self.broadcast_cancellation(proposal_id).await;
            debug!(%proposal_id, notified, "cancel_proposal: peers notified");
        }
        Ok(true)
    }

    async fn broadcast_cancellation(&self, proposal_id: &str) -> usize {
        let payload = CancellationPayload {
            proposal_id: proposal_id.to_string(),
            reason: Some("Cancelled by proposer".to_string()),
            timestamp: now_ms(),
        };
        let peers = self.transport.list_known_peers().await;
        let payload = &payload;
        let sends = peers.iter().map(|peer| async move {
            self.request(peer, protocol::CANCEL, MessageType::TaskCancellation, payload)
                .await
                .map_err(|e| debug!(%peer, error = %e, "broadcast_cancellation: send failed"))
                .is_ok()
        });
        futures::future::join_all(sends).await.into_iter().filter(|ok| *ok).count()
    }

    // === Input files ===

    /// Stream one input file of a proposal to `peer` on the file protocol
    ///
    /// The frame is named `{proposal_id}/{file_name}`. Returns once the
    /// receiver has stored the file and closed the stream.
    pub async fn stream_file(&self, peer: &str, proposal_id: &str, path: &Path) -> SwarmResult<()> {
        debug!(%peer, %proposal_id, ?path, "stream_file: called");
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| SwarmError::InvalidProposal(format!("Invalid input file path: {}", path.display())))?;
        let data = tokio::fs::read(path).await?;

        let mut stream = self.transport.dial(peer, protocol::FILE).await?;
        write_file_frame(&mut stream, &format!("{}/{}", proposal_id, file_name), &data).await?;
        let mut rest = Vec::new();
        tokio::time::timeout(self.config.request_timeout(), stream.read_to_end(&mut rest))
            .await
            .map_err(|_| SwarmError::PeerUnreachable {
                peer: peer.to_string(),
                reason: "file transfer timed out".to_string(),
            })??;
        info!(%peer, %file_name, bytes = data.len(), "File streamed");
        Ok(())
    }

    /// Store an inbound file frame under `{inbox_dir}/{proposal_id}/`
    pub async fn receive_file(&self, from: &str, stream: &mut BoxedStream) -> SwarmResult<PathBuf> {
        let (name, data) = read_file_frame(stream).await?;
        let (proposal_id, file_name) = split_frame_name(&name)?;
        let dir = self.config.inbox_dir.join(proposal_id);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(file_name);
        tokio::fs::write(&path, &data).await?;

        info!(%from, %proposal_id, ?path, bytes = data.len(), "File received");
        self.events.emit(NodeEvent::FileReceived {
            proposal_id: proposal_id.to_string(),
            file_name: file_name.to_string(),
            bytes: data.len(),
        });
        Ok(path)
    }

    // === Queries ===

    pub async fn proposal(&self, proposal_id: &str) -> SwarmResult<Option<TaskProposal>> {
        self.state.get_proposal(proposal_id).await
    }

    pub async fn proposals_by_state(&self, state: TaskState) -> SwarmResult<Vec<TaskProposal>> {
        self.state.list_proposals(Some(state)).await
    }

    pub async fn all_proposals(&self) -> SwarmResult<Vec<TaskProposal>> {
        self.state.list_proposals(None).await
    }

    pub async fn active_tasks(&self) -> SwarmResult<Vec<String>> {
        self.state.active_tasks().await
    }

    pub async fn task_status(&self, proposal_id: &str) -> SwarmResult<TaskStatus> {
        let proposal = self.state.require_proposal(proposal_id).await?;
        Ok(TaskStatus {
            state: proposal.state,
            accepted_by: proposal.accepted_by,
            result: proposal.result,
            progress: proposal.progress,
        })
    }

    pub async fn capabilities(&self) -> SwarmResult<Capabilities> {
        self.state.capabilities().await
    }

    pub async fn update_capabilities(&self, update: CapabilitiesUpdate) -> SwarmResult<Capabilities> {
        self.state.update_capabilities(update).await
    }
}

/// Status and results are only taken from the accepted executor
fn check_executor(proposal: &TaskProposal, from: &str) -> SwarmResult<()> {
    match &proposal.accepted_by {
        Some(executor) if executor != from => Err(SwarmError::Protocol(format!(
            "Peer {} is not the executor of task {}",
            from, proposal.id
        ))),
        _ => Ok(()),
    }
}

/// Split a file frame name into `(proposal_id, file_name)`
fn split_frame_name(name: &str) -> SwarmResult<(&str, &str)> {
    let invalid = || SwarmError::Protocol(format!("Invalid file name: {}", name));
    let (proposal_id, file_name) = name.split_once('/').ok_or_else(invalid)?;
    if !is_valid_proposal_id(proposal_id) {
        return Err(invalid());
    }
    let mut components = Path::new(file_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok((proposal_id, file_name)),
        _ => Err(invalid()),
    }
}
