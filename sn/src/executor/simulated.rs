//! Placeholder executor that sleeps and reports a canned result

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::WorkloadExecutor;
use crate::domain::TaskProposal;
use crate::error::{SwarmError, SwarmResult};

pub struct SimulatedExecutor {
    delay: Duration,
    result: Value,
    failure: Option<String>,
}

impl SimulatedExecutor {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            result: json!({ "status": "success", "data": "Task completed successfully" }),
            failure: None,
        }
    }

    /// Report `result` instead of the canned success value
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = result;
        self
    }

    /// Fail every execution with `message`
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }
}

#[async_trait]
impl WorkloadExecutor for SimulatedExecutor {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn execute(&self, proposal: &TaskProposal) -> SwarmResult<Value> {
        debug!(proposal_id = %proposal.id, delay = ?self.delay, "SimulatedExecutor::execute: called");
        tokio::time::sleep(self.delay).await;
        match &self.failure {
            Some(message) => Err(SwarmError::Execution(message.clone())),
            None => Ok(self.result.clone()),
        }
    }
}
