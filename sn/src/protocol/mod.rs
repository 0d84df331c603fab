//! Wire protocols between swarm nodes
//!
//! Every request protocol carries exactly one newline-terminated JSON request
//! envelope and one response envelope per stream. The file protocol carries a
//! raw `proposal_id/name NUL bytes` frame with no envelope.

pub mod codec;
pub mod messages;

pub use codec::{MAX_MESSAGE_SIZE, read_file_frame, read_message, write_file_frame, write_message};
pub use messages::{
    AcceptancePayload, CancellationPayload, LockRequest, LockResponse, MessageType, RequestEnvelope,
    ResponseEnvelope, ResponseStatus, ResultPayload, StatusPayload, UnlockRequest, UnlockResponse,
};

pub const PROPOSE: &str = "/swarmnode/task/propose/1.0.0";
pub const ACCEPT: &str = "/swarmnode/task/accept/1.0.0";
pub const STATUS: &str = "/swarmnode/task/status/1.0.0";
pub const LOCK: &str = "/swarmnode/task/lock/1.0.0";
pub const UNLOCK: &str = "/swarmnode/task/unlock/1.0.0";
pub const RESULT: &str = "/swarmnode/task/result/1.0.0";
pub const CANCEL: &str = "/swarmnode/task/cancel/1.0.0";
pub const FILE: &str = "/swarmnode/task/file/1.0.0";

/// Request/response protocols and the message type each one carries
pub const REQUEST_PROTOCOLS: [(&str, MessageType); 7] = [
    (PROPOSE, MessageType::TaskProposal),
    (ACCEPT, MessageType::TaskAcceptance),
    (STATUS, MessageType::TaskStatusUpdate),
    (LOCK, MessageType::TaskLock),
    (UNLOCK, MessageType::TaskUnlock),
    (RESULT, MessageType::TaskResult),
    (CANCEL, MessageType::TaskCancellation),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_request_protocol_has_its_own_type() {
        for (i, (_, kind)) in REQUEST_PROTOCOLS.iter().enumerate() {
            assert!(REQUEST_PROTOCOLS[i + 1..].iter().all(|(_, other)| other != kind));
        }
        assert!(REQUEST_PROTOCOLS.iter().all(|(id, _)| *id != FILE));
    }

    #[test]
    fn test_protocol_ids_are_versioned() {
        for (id, _) in REQUEST_PROTOCOLS {
            assert!(id.starts_with("/swarmnode/task/"));
            assert!(id.ends_with("/1.0.0"));
        }
    }
}
