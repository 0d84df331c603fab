//! Integration tests for multi-node task coordination
//!
//! Every test builds several nodes on one in-process `MemoryNetwork`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use swarmnode::coordinator::CoordinatorConfig;
use swarmnode::domain::{Capabilities, ContainerConfig, ProposalConfig, Requirements, TaskProposal, TaskState};
use swarmnode::error::SwarmError;
use swarmnode::events::NodeEvent;
use swarmnode::executor::{SimulatedExecutor, WorkloadExecutor};
use swarmnode::health::HealthConfig;
use swarmnode::node::{NodeOptions, SwarmNode};
use swarmnode::protocol::{
    self, LockRequest, MessageType, RequestEnvelope, ResponseEnvelope, ResponseStatus, UnlockRequest, read_message,
    write_message,
};
use swarmnode::transport::{MemoryNetwork, MemoryTransport, Transport};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;

// =============================================================================
// Helpers
// =============================================================================

fn capabilities(cpu: f64) -> Capabilities {
    Capabilities {
        cpu,
        ..Capabilities::default()
    }
}

fn simulated(result: Value) -> Arc<dyn WorkloadExecutor> {
    Arc::new(SimulatedExecutor::new(Duration::from_millis(50)).with_result(result))
}

fn options(cpu: f64, workload: Arc<dyn WorkloadExecutor>, inbox: &TempDir) -> NodeOptions {
    NodeOptions {
        capabilities: capabilities(cpu),
        coordinator: CoordinatorConfig {
            claim_jitter_ms: 0,
            request_timeout_ms: 5000,
            inbox_dir: inbox.path().to_path_buf(),
            ..CoordinatorConfig::default()
        },
        health: HealthConfig {
            tick_interval_ms: 50,
            ..HealthConfig::default()
        },
        workload: Some(workload),
        ..NodeOptions::default()
    }
}

async fn start(network: &MemoryNetwork, peer_id: &str, options: NodeOptions) -> SwarmNode {
    let transport: Arc<dyn Transport> = Arc::new(network.join(peer_id).await);
    SwarmNode::start(transport, options).await.expect("Failed to start node")
}

fn job(cpu: f64) -> ProposalConfig {
    ProposalConfig {
        requirements: Requirements {
            cpu,
            ..Requirements::default()
        },
        container_config: ContainerConfig {
            image: "alpine:3".to_string(),
            command: "echo hi".to_string(),
            ..ContainerConfig::default()
        },
        ..ProposalConfig::default()
    }
}

/// Wait until `matcher` picks an event off the bus
async fn wait_for<T>(rx: &mut broadcast::Receiver<NodeEvent>, mut matcher: impl FnMut(&NodeEvent) -> Option<T>) -> T {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(found) = matcher(&event) {
                        return found;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("Timed out waiting for event")
}

async fn wait_completed(rx: &mut broadcast::Receiver<NodeEvent>, id: &str) -> Value {
    wait_for(rx, |event| match event {
        NodeEvent::TaskCompleted { proposal_id, result } if proposal_id == id => Some(result.clone()),
        _ => None,
    })
    .await
}

/// One request/response exchange on a raw stream
async fn raw_request(transport: &MemoryTransport, peer: &str, protocol_id: &str, request: &RequestEnvelope) -> ResponseEnvelope {
    let mut stream = transport.dial(peer, protocol_id).await.unwrap();
    write_message(&mut stream, request).await.unwrap();
    read_message(&mut stream).await.unwrap()
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_capable_peer_claims_and_completes() {
    let network = MemoryNetwork::new();
    let inbox = TempDir::new().unwrap();
    let payload = json!({"status": "success", "data": "from a"});

    let p = start(&network, "p", options(4.0, simulated(json!(null)), &inbox)).await;
    let a = start(&network, "a", options(4.0, simulated(payload.clone()), &inbox)).await;
    let b = start(&network, "b", options(0.0, simulated(json!(null)), &inbox)).await;
    let mut p_events = p.subscribe();
    let mut a_events = a.subscribe();
    let mut b_events = b.subscribe();

    let proposal = p.coordinator().create_proposal(job(1.0)).await.unwrap();
    assert_eq!(proposal.state, TaskState::Proposed);

    // transitions observed at the proposer
    let mut seen = Vec::new();
    wait_for(&mut p_events, |event| match event {
        NodeEvent::ProposalStateChanged { proposal_id, to, .. } if *proposal_id == proposal.id => {
            seen.push(*to);
            (*to == TaskState::Completed).then_some(())
        }
        _ => None,
    })
    .await;
    assert_eq!(
        seen,
        vec![TaskState::Locked, TaskState::Accepted, TaskState::Running, TaskState::Completed]
    );

    let at_p = p.coordinator().proposal(&proposal.id).await.unwrap().unwrap();
    assert_eq!(at_p.state, TaskState::Completed);
    assert_eq!(at_p.accepted_by.as_deref(), Some("a"));
    assert_eq!(at_p.result, Some(payload.clone()));
    assert!(at_p.lock_id.is_none());

    // the claimant finalizes its own copy after the proposer has the result
    assert_eq!(wait_completed(&mut a_events, &proposal.id).await, payload);
    let at_a = a.coordinator().task_status(&proposal.id).await.unwrap();
    assert_eq!(at_a.state, TaskState::Completed);
    assert_eq!(at_a.accepted_by.as_deref(), Some("a"));

    // b stored the proposal but never tried to claim it
    wait_for(&mut b_events, |event| match event {
        NodeEvent::ProposalReceived { proposal_id, .. } if *proposal_id == proposal.id => Some(()),
        _ => None,
    })
    .await;
    let at_b = b.coordinator().proposal(&proposal.id).await.unwrap().unwrap();
    assert_eq!(at_b.state, TaskState::Proposed);
    assert!(at_b.accepted_by.is_none());
    while let Ok(event) = b_events.try_recv() {
        assert!(!matches!(event, NodeEvent::TaskStarted { .. }), "b must not execute");
    }
}

#[tokio::test]
async fn test_at_most_one_winner() {
    let network = MemoryNetwork::new();
    let inbox = TempDir::new().unwrap();

    let p = start(&network, "p", options(4.0, simulated(json!(null)), &inbox)).await;
    let mut claimants = Vec::new();
    for i in 0..4 {
        let id = format!("c{}", i);
        claimants.push(start(&network, &id, options(4.0, simulated(json!({ "by": id })), &inbox)).await);
    }
    let mut p_events = p.subscribe();

    let proposal = p.coordinator().create_proposal(job(1.0)).await.unwrap();
    let result = wait_completed(&mut p_events, &proposal.id).await;

    let mut winners = Vec::new();
    for node in &claimants {
        let copy = node.coordinator().proposal(&proposal.id).await.unwrap().unwrap();
        if copy.accepted_by.as_deref() == Some(node.peer_id()) {
            winners.push(node.peer_id().to_string());
        } else {
            assert_eq!(copy.state, TaskState::Proposed, "loser {} must not advance", node.peer_id());
        }
    }
    assert_eq!(winners.len(), 1, "winners: {:?}", winners);
    assert_eq!(result, json!({ "by": winners[0] }));

    let at_p = p.coordinator().proposal(&proposal.id).await.unwrap().unwrap();
    assert_eq!(at_p.accepted_by.as_deref(), Some(winners[0].as_str()));
}

#[tokio::test]
async fn test_slot_limit_holds_under_concurrent_proposals() {
    let network = MemoryNetwork::new();
    let inbox = TempDir::new().unwrap();

    let p = start(&network, "p", options(4.0, simulated(json!(null)), &inbox)).await;
    let slow: Arc<dyn WorkloadExecutor> = Arc::new(SimulatedExecutor::new(Duration::from_millis(500)));
    let mut single = options(4.0, slow, &inbox);
    single.capabilities.max_concurrent_tasks = 1;
    let a = start(&network, "a", single).await;
    let mut a_events = a.subscribe();

    let creates = (0..3).map(|_| p.coordinator().create_proposal(job(1.0)));
    let created = futures::future::join_all(creates).await;
    assert!(created.iter().all(|r| r.is_ok()));

    // count running tasks on a until the first one finishes
    let mut running = 0usize;
    let mut peak = 0usize;
    wait_for(&mut a_events, |event| match event {
        NodeEvent::TaskStarted { .. } => {
            running += 1;
            peak = peak.max(running);
            None
        }
        NodeEvent::TaskCompleted { .. } | NodeEvent::TaskFailed { .. } => Some(()),
        _ => None,
    })
    .await;
    assert_eq!(peak, 1, "a ran {} tasks at once with one slot", peak);

    for _ in 0..50 {
        if a.coordinator().active_tasks().await.unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(a.coordinator().active_tasks().await.unwrap().is_empty());
    let accepted_by_a = a
        .coordinator()
        .all_proposals()
        .await
        .unwrap()
        .into_iter()
        .filter(|proposal| proposal.accepted_by.as_deref() == Some("a"))
        .count();
    assert_eq!(accepted_by_a, 1);
}

#[tokio::test]
async fn test_executor_failure_reaches_proposer() {
    let network = MemoryNetwork::new();
    let inbox = TempDir::new().unwrap();
    let failing: Arc<dyn WorkloadExecutor> =
        Arc::new(SimulatedExecutor::new(Duration::from_millis(10)).failing("image not found"));

    let p = start(&network, "p", options(4.0, simulated(json!(null)), &inbox)).await;
    let a = start(&network, "a", options(4.0, failing, &inbox)).await;
    let mut p_events = p.subscribe();

    let proposal = p.coordinator().create_proposal(job(1.0)).await.unwrap();
    let error = wait_for(&mut p_events, |event| match event {
        NodeEvent::TaskFailed { proposal_id, error } if *proposal_id == proposal.id => Some(error.clone()),
        _ => None,
    })
    .await;
    assert!(error.contains("image not found"));

    let at_p = p.coordinator().task_status(&proposal.id).await.unwrap();
    assert_eq!(at_p.state, TaskState::Failed);
    assert_eq!(a.coordinator().task_status(&proposal.id).await.unwrap().state, TaskState::Failed);
}

// =============================================================================
// Broadcast
// =============================================================================

#[tokio::test]
async fn test_broadcast_without_peers_discards_proposal() {
    let network = MemoryNetwork::new();
    let inbox = TempDir::new().unwrap();
    let p = start(&network, "p", options(4.0, simulated(json!(null)), &inbox)).await;

    let err = p.coordinator().create_proposal(job(1.0)).await.unwrap_err();
    assert!(matches!(err, SwarmError::BroadcastFailed));
    assert!(p.coordinator().all_proposals().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_broadcast_partial_failure_succeeds() {
    let network = MemoryNetwork::new();
    let inbox = TempDir::new().unwrap();
    let p = start(&network, "p", options(4.0, simulated(json!(null)), &inbox)).await;
    let _a = start(&network, "a", options(0.0, simulated(json!(null)), &inbox)).await;
    let _b = start(&network, "b", options(0.0, simulated(json!(null)), &inbox)).await;
    network.set_online("b", false).await;

    let proposal = p.coordinator().create_proposal(job(1.0)).await.unwrap();
    let stored = p.coordinator().proposals_by_state(TaskState::Proposed).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, proposal.id);
}

#[tokio::test]
async fn test_invalid_proposal_rejected_before_broadcast() {
    let network = MemoryNetwork::new();
    let inbox = TempDir::new().unwrap();
    let p = start(&network, "p", options(4.0, simulated(json!(null)), &inbox)).await;

    let err = p.coordinator().create_proposal(ProposalConfig::default()).await.unwrap_err();
    assert_eq!(err.to_string(), "Invalid proposal: Missing required fields: image, command");
}

#[tokio::test]
async fn test_duplicate_and_own_proposals_ignored() {
    let network = MemoryNetwork::new();
    let inbox = TempDir::new().unwrap();
    let a = start(&network, "a", options(0.0, simulated(json!(null)), &inbox)).await;
    let mut events = a.subscribe();

    let foreign = TaskProposal::new("p-1", "p", job(1.0), 1);
    let ack = a.coordinator().handle_proposal("p", foreign.clone()).await.unwrap();
    assert_eq!(ack["received"], true);
    assert_eq!(ack["proposalId"], "p-1");
    a.coordinator().handle_proposal("p", foreign).await.unwrap();

    let own = TaskProposal::new("a-1", "a", job(1.0), 1);
    a.coordinator().handle_proposal("p", own).await.unwrap();

    let received: Vec<NodeEvent> = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|event| matches!(event, NodeEvent::ProposalReceived { .. }))
        .collect();
    assert_eq!(received.len(), 1);
    assert!(a.coordinator().proposal("a-1").await.unwrap().is_none());
}

// =============================================================================
// Lock protocol
// =============================================================================

/// Proposer with one peer that acknowledges but never claims
async fn idle_proposer(network: &MemoryNetwork, inbox: &TempDir, lock_timeout_ms: i64) -> (SwarmNode, SwarmNode, TaskProposal) {
    let mut p_options = options(4.0, simulated(json!(null)), inbox);
    p_options.coordinator.lock_timeout_ms = lock_timeout_ms;
    let p = start(network, "p", p_options).await;
    let idle = start(network, "idle", options(0.0, simulated(json!(null)), inbox)).await;
    let proposal = p.coordinator().create_proposal(job(1.0)).await.unwrap();
    (p, idle, proposal)
}

fn lock_request(proposal_id: &str, lock_id: &str, requester: &str) -> LockRequest {
    LockRequest {
        proposal_id: proposal_id.to_string(),
        lock_id: lock_id.to_string(),
        requester_id: requester.to_string(),
    }
}

#[tokio::test]
async fn test_lock_expiry_and_unlock_identity() {
    let network = MemoryNetwork::new();
    let inbox = TempDir::new().unwrap();
    let (p, _idle, proposal) = idle_proposer(&network, &inbox, 200).await;
    let coordinator = p.coordinator();

    let first = coordinator.handle_lock("x", lock_request(&proposal.id, "lock-x", "x")).await.unwrap();
    assert!(first.success);
    assert_eq!(first.reason.as_deref(), Some("Lock acquired"));
    assert_eq!(first.lock_id.as_deref(), Some("lock-x"));

    let denied = coordinator.handle_lock("y", lock_request(&proposal.id, "lock-y", "y")).await.unwrap();
    assert!(!denied.success);
    assert_eq!(denied.reason.as_deref(), Some("Task is locked"));
    assert!(denied.lock_id.is_none());

    // a stale lock is grantable even though the state is still LOCKED
    tokio::time::sleep(Duration::from_millis(300)).await;
    let regranted = coordinator.handle_lock("y", lock_request(&proposal.id, "lock-y", "y")).await.unwrap();
    assert!(regranted.success);

    let wrong = coordinator
        .handle_unlock("x", UnlockRequest {
            proposal_id: proposal.id.clone(),
            lock_id: "lock-x".to_string(),
        })
        .await
        .unwrap();
    assert!(!wrong.success);
    assert_eq!(wrong.reason.as_deref(), Some("Invalid lock ID"));
    let still = coordinator.proposal(&proposal.id).await.unwrap().unwrap();
    assert_eq!(still.state, TaskState::Locked);
    assert_eq!(still.lock_id.as_deref(), Some("lock-y"));
    assert_eq!(still.locked_by.as_deref(), Some("y"));

    let released = coordinator
        .handle_unlock("y", UnlockRequest {
            proposal_id: proposal.id.clone(),
            lock_id: "lock-y".to_string(),
        })
        .await
        .unwrap();
    assert!(released.success);
    let after = coordinator.proposal(&proposal.id).await.unwrap().unwrap();
    assert_eq!(after.state, TaskState::Proposed);
    assert!(after.lock_id.is_none());

    let missing = coordinator
        .handle_unlock("y", UnlockRequest {
            proposal_id: "nope".to_string(),
            lock_id: "lock-y".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(missing, SwarmError::ProposalNotFound(_)));
}

#[tokio::test]
async fn test_self_claim_denied() {
    let network = MemoryNetwork::new();
    let inbox = TempDir::new().unwrap();
    let (p, _idle, proposal) = idle_proposer(&network, &inbox, 5000).await;

    let response = p
        .coordinator()
        .handle_lock("p", lock_request(&proposal.id, "mine", "p"))
        .await
        .unwrap();
    assert!(!response.success);
    assert_eq!(response.reason.as_deref(), Some("Proposer cannot lock their own task"));
    assert_eq!(
        p.coordinator().proposal(&proposal.id).await.unwrap().unwrap().state,
        TaskState::Proposed
    );
}

#[tokio::test]
async fn test_lock_over_the_wire() {
    let network = MemoryNetwork::new();
    let inbox = TempDir::new().unwrap();
    let (_p, _idle, proposal) = idle_proposer(&network, &inbox, 5000).await;
    let client = network.join("client").await;

    let request = RequestEnvelope::new(MessageType::TaskLock, &lock_request(&proposal.id, "wire", "client")).unwrap();
    let response = raw_request(&client, "p", protocol::LOCK, &request).await;
    assert_eq!(response.status, ResponseStatus::Ok);
    let result = response.result.unwrap();
    assert_eq!(result["success"], true);
    assert_eq!(result["lockId"], "wire");

    let unknown = RequestEnvelope::new(MessageType::TaskUnlock, &UnlockRequest {
        proposal_id: "nope".to_string(),
        lock_id: "wire".to_string(),
    })
    .unwrap();
    let response = raw_request(&client, "p", protocol::UNLOCK, &unknown).await;
    assert_eq!(response.status, ResponseStatus::Error);
    assert_eq!(response.message.as_deref(), Some("Proposal not found"));
}

#[tokio::test]
async fn test_malformed_requests_get_error_envelopes() {
    let network = MemoryNetwork::new();
    let inbox = TempDir::new().unwrap();
    let _p = start(&network, "p", options(4.0, simulated(json!(null)), &inbox)).await;
    let client = network.join("client").await;

    let mut stream = client.dial("p", protocol::PROPOSE).await.unwrap();
    stream.write_all(b"this is not json\n").await.unwrap();
    let response: ResponseEnvelope = read_message(&mut stream).await.unwrap();
    assert_eq!(response.status, ResponseStatus::Error);

    let mut stream = client.dial("p", protocol::STATUS).await.unwrap();
    stream.shutdown().await.unwrap();
    let response: ResponseEnvelope = read_message(&mut stream).await.unwrap();
    assert_eq!(response.message.as_deref(), Some("No data received"));

    // the node keeps serving after bad input
    let request = RequestEnvelope::new(MessageType::TaskLock, &lock_request("nope", "l", "client")).unwrap();
    let response = raw_request(&client, "p", protocol::LOCK, &request).await;
    assert_eq!(response.result.unwrap()["reason"], "Proposal not found");
}

#[tokio::test]
async fn test_path_like_proposal_id_rejected() {
    let network = MemoryNetwork::new();
    let inbox = TempDir::new().unwrap();
    let a = start(&network, "a", options(4.0, simulated(json!(null)), &inbox)).await;
    let client = network.join("client").await;

    let hostile = TaskProposal::new("x/../../../../etc/cron.d", "client", job(1.0), 1);
    let request = RequestEnvelope::new(MessageType::TaskProposal, &hostile).unwrap();
    let response = raw_request(&client, "a", protocol::PROPOSE, &request).await;
    assert_eq!(response.status, ResponseStatus::Error);
    assert!(a.coordinator().all_proposals().await.unwrap().is_empty());
    assert!(a.coordinator().active_tasks().await.unwrap().is_empty());
}

// =============================================================================
// Cancellation and files
// =============================================================================

#[tokio::test]
async fn test_cancellation_propagates_to_peers() {
    let network = MemoryNetwork::new();
    let inbox = TempDir::new().unwrap();
    let p = start(&network, "p", options(4.0, simulated(json!(null)), &inbox)).await;
    let a = start(&network, "a", options(0.0, simulated(json!(null)), &inbox)).await;
    let mut a_events = a.subscribe();

    let proposal = p.coordinator().create_proposal(job(1.0)).await.unwrap();
    assert!(p.coordinator().cancel_proposal(&proposal.id).await.unwrap());
    assert_eq!(
        p.coordinator().task_status(&proposal.id).await.unwrap().state,
        TaskState::Cancelled
    );

    wait_for(&mut a_events, |event| match event {
        NodeEvent::ProposalCancelled { proposal_id } if *proposal_id == proposal.id => Some(()),
        _ => None,
    })
    .await;
    assert_eq!(
        a.coordinator().task_status(&proposal.id).await.unwrap().state,
        TaskState::Cancelled
    );

    // terminal proposals stay put
    assert!(!p.coordinator().cancel_proposal(&proposal.id).await.unwrap());
}

#[tokio::test]
async fn test_input_files_streamed_to_claimant() {
    let network = MemoryNetwork::new();
    let p_inbox = TempDir::new().unwrap();
    let a_inbox = TempDir::new().unwrap();
    let source = TempDir::new().unwrap();
    let input = source.path().join("input.csv");
    std::fs::write(&input, b"x,y\n1,2\n").unwrap();

    let p = start(&network, "p", options(4.0, simulated(json!(null)), &p_inbox)).await;
    let a = start(&network, "a", options(4.0, simulated(json!({"ok": true})), &a_inbox)).await;
    let mut a_events = a.subscribe();
    let mut p_events = p.subscribe();

    let mut config = job(1.0);
    config.container_config.input_files.push(input);
    let proposal = p.coordinator().create_proposal(config).await.unwrap();

    let (owner, name, bytes) = wait_for(&mut a_events, |event| match event {
        NodeEvent::FileReceived {
            proposal_id,
            file_name,
            bytes,
        } => Some((proposal_id.clone(), file_name.clone(), *bytes)),
        _ => None,
    })
    .await;
    assert_eq!(owner, proposal.id);
    assert_eq!(name, "input.csv");
    assert_eq!(bytes, 8);
    let stored = a_inbox.path().join(&proposal.id).join("input.csv");
    assert_eq!(std::fs::read(stored).unwrap(), b"x,y\n1,2\n");

    wait_completed(&mut p_events, &proposal.id).await;
}

#[tokio::test]
async fn test_same_named_inputs_kept_per_proposal() {
    let network = MemoryNetwork::new();
    let p_inbox = TempDir::new().unwrap();
    let a_inbox = TempDir::new().unwrap();
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    std::fs::write(first.path().join("input.csv"), b"first").unwrap();
    std::fs::write(second.path().join("input.csv"), b"second").unwrap();

    let p = start(&network, "p", options(4.0, simulated(json!(null)), &p_inbox)).await;
    let _a = start(&network, "a", options(4.0, simulated(json!({"ok": true})), &a_inbox)).await;
    let mut p_events = p.subscribe();

    let mut ids = Vec::new();
    for source in [&first, &second] {
        let mut config = job(1.0);
        config.container_config.input_files.push(source.path().join("input.csv"));
        ids.push(p.coordinator().create_proposal(config).await.unwrap().id);
    }
    let mut pending = ids.clone();
    wait_for(&mut p_events, |event| match event {
        NodeEvent::TaskCompleted { proposal_id, .. } => {
            pending.retain(|id| id != proposal_id);
            pending.is_empty().then_some(())
        }
        _ => None,
    })
    .await;

    let read = |id: &str| std::fs::read(a_inbox.path().join(id).join("input.csv")).unwrap();
    assert_eq!(read(&ids[0]), b"first");
    assert_eq!(read(&ids[1]), b"second");
}

#[tokio::test]
async fn test_missing_input_file_unwinds_claim() {
    let network = MemoryNetwork::new();
    let inbox = TempDir::new().unwrap();
    let p = start(&network, "p", options(4.0, simulated(json!(null)), &inbox)).await;
    let a = start(&network, "a", options(4.0, simulated(json!(null)), &inbox)).await;
    let mut p_events = p.subscribe();

    let mut config = job(1.0);
    config.container_config.input_files.push(inbox.path().join("does-not-exist.bin"));
    let proposal = p.coordinator().create_proposal(config).await.unwrap();

    // LOCKED, then back to PROPOSED when streaming fails
    wait_for(&mut p_events, |event| match event {
        NodeEvent::ProposalStateChanged { proposal_id, from, to }
            if *proposal_id == proposal.id && *from == TaskState::Locked && *to == TaskState::Proposed =>
        {
            Some(())
        }
        _ => None,
    })
    .await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    let at_a = a.coordinator().proposal(&proposal.id).await.unwrap().unwrap();
    assert_eq!(at_a.state, TaskState::Proposed);
    assert!(a.coordinator().active_tasks().await.unwrap().is_empty());
}
