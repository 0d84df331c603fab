//! Message envelopes and payloads
//!
//! Request: `{"type", "payload", "timestamp"}`.
//! Response: `{"status": "ok"|"error", "result"|"message", "timestamp"}`.
//! Field names are camelCase on the wire.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{PeerId, TaskState, now_ms};
use crate::error::{SwarmError, SwarmResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    TaskProposal,
    TaskAcceptance,
    TaskStatusUpdate,
    TaskResult,
    TaskLock,
    TaskUnlock,
    TaskCancellation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub payload: Value,
    pub timestamp: i64,
}

impl RequestEnvelope {
    pub fn new<T: Serialize>(kind: MessageType, payload: &T) -> SwarmResult<Self> {
        Ok(Self {
            kind,
            payload: serde_json::to_value(payload)?,
            timestamp: now_ms(),
        })
    }

    pub fn decode_payload<T: DeserializeOwned>(&self) -> SwarmResult<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: i64,
}

impl ResponseEnvelope {
    pub fn ok(result: Value) -> Self {
        Self {
            status: ResponseStatus::Ok,
            result: Some(result),
            message: None,
            timestamp: now_ms(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            result: None,
            message: Some(message.into()),
            timestamp: now_ms(),
        }
    }

    /// Unwrap an ok envelope, or turn an error envelope into `Rejected`
    pub fn into_result(self, peer: &str) -> SwarmResult<Value> {
        match self.status {
            ResponseStatus::Ok => Ok(self.result.unwrap_or(Value::Null)),
            ResponseStatus::Error => Err(SwarmError::Rejected {
                peer: peer.to_string(),
                message: self.message.unwrap_or_else(|| "unknown error".to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptancePayload {
    pub proposal_id: String,
    pub accepted_by: PeerId,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub task_id: String,
    pub status: TaskState,
    #[serde(default)]
    pub progress: Option<Value>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRequest {
    pub proposal_id: String,
    pub lock_id: String,
    pub requester_id: PeerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockResponse {
    pub success: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub lock_id: Option<String>,
}

impl LockResponse {
    pub fn granted(lock_id: impl Into<String>) -> Self {
        Self {
            success: true,
            reason: Some("Lock acquired".to_string()),
            lock_id: Some(lock_id.into()),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            lock_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockRequest {
    pub proposal_id: String,
    pub lock_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPayload {
    pub proposal_id: String,
    pub result: Value,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationPayload {
    pub proposal_id: String,
    #[serde(default)]
    pub reason: Option<String>,
    pub timestamp: i64,
}
