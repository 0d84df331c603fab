//! Inbound protocol handlers
//!
//! One stream per request: read the request envelope, dispatch on its type,
//! write exactly one response envelope. Handler errors become error envelopes
//! and never take the node down.

use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::task_coordinator::TaskCoordinator;
use crate::domain::{PeerId, TaskProposal};
use crate::error::{SwarmError, SwarmResult};
use crate::protocol::{
    self, AcceptancePayload, CancellationPayload, LockRequest, MessageType, RequestEnvelope, ResponseEnvelope,
    ResultPayload, StatusPayload, UnlockRequest, read_message, write_message,
};
use crate::transport::{BoxedStream, StreamHandler};

impl TaskCoordinator {
    /// Register a handler for every request protocol and the file protocol
    pub async fn register_handlers(&self) {
        debug!(peer_id = %self.peer_id(), "register_handlers: called");
        for (protocol_id, kind) in protocol::REQUEST_PROTOCOLS {
            let coordinator = self.clone();
            let handler: StreamHandler = Arc::new(move |from: PeerId, stream: BoxedStream| {
                let coordinator = coordinator.clone();
                async move { coordinator.serve_request(from, kind, stream).await }.boxed()
            });
            self.transport().handle(protocol_id, handler).await;
        }

        let coordinator = self.clone();
        let file_handler: StreamHandler = Arc::new(move |from: PeerId, mut stream: BoxedStream| {
            let coordinator = coordinator.clone();
            async move {
                if let Err(e) = coordinator.receive_file(&from, &mut stream).await {
                    warn!(%from, error = %e, "Failed to receive file");
                }
                // dropping the stream tells the sender the file is stored
            }
            .boxed()
        });
        self.transport().handle(protocol::FILE, file_handler).await;
    }

    async fn serve_request(&self, from: PeerId, expected: MessageType, mut stream: BoxedStream) {
        let response = match read_message::<_, RequestEnvelope>(&mut stream).await {
            Ok(request) if request.kind != expected => {
                warn!(%from, ?expected, got = ?request.kind, "Message type does not match protocol");
                ResponseEnvelope::error(format!("Unexpected message type {:?}", request.kind))
            }
            Ok(request) => match self.dispatch(&from, request).await {
                Ok(result) => ResponseEnvelope::ok(result),
                Err(e) => {
                    debug!(%from, ?expected, error = %e, "serve_request: handler failed");
                    ResponseEnvelope::error(e.wire_message())
                }
            },
            Err(e) => {
                warn!(%from, error = %e, "Failed to read request");
                ResponseEnvelope::error(e.wire_message())
            }
        };

        if let Err(e) = write_message(&mut stream, &response).await {
            warn!(%from, error = %e, "Failed to write response");
        }
    }

    async fn dispatch(&self, from: &str, request: RequestEnvelope) -> SwarmResult<Value> {
        match request.kind {
            MessageType::TaskProposal => {
                let proposal: TaskProposal = request.decode_payload()?;
                self.handle_proposal(from, proposal).await
            }
            MessageType::TaskAcceptance => {
                let payload: AcceptancePayload = request.decode_payload()?;
                self.handle_acceptance(from, payload).await
            }
            MessageType::TaskStatusUpdate => {
                let payload: StatusPayload = request.decode_payload()?;
                self.handle_status_update(from, payload).await
            }
            MessageType::TaskLock => {
                let payload: LockRequest = request.decode_payload()?;
                to_value(self.handle_lock(from, payload).await?)
            }
            MessageType::TaskUnlock => {
                let payload: UnlockRequest = request.decode_payload()?;
                to_value(self.handle_unlock(from, payload).await?)
            }
            MessageType::TaskResult => {
                let payload: ResultPayload = request.decode_payload()?;
                self.handle_result(from, payload).await
            }
            MessageType::TaskCancellation => {
                let payload: CancellationPayload = request.decode_payload()?;
                self.handle_cancellation(from, payload).await
            }
        }
    }
}

fn to_value<T: Serialize>(value: T) -> SwarmResult<Value> {
    serde_json::to_value(value).map_err(SwarmError::from)
}
