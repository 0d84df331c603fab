//! Workload executors
//!
//! The coordinator hands an accepted proposal to a `WorkloadExecutor` and
//! reports whatever JSON value comes back as the task result.

mod config;
mod docker;
mod simulated;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::TaskProposal;
use crate::error::SwarmResult;

pub use config::{ExecutorConfig, ExecutorKind};
pub use docker::DockerExecutor;
pub use simulated::SimulatedExecutor;

#[async_trait]
pub trait WorkloadExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run the proposal's workload to completion
    async fn execute(&self, proposal: &TaskProposal) -> SwarmResult<Value>;
}

/// Build the executor selected by the configuration
pub fn create_executor(config: &ExecutorConfig, inbox_dir: &Path) -> Arc<dyn WorkloadExecutor> {
    match config.kind {
        ExecutorKind::Simulated => Arc::new(SimulatedExecutor::new(config.simulated_delay())),
        ExecutorKind::Docker => Arc::new(DockerExecutor::new(
            config.docker_binary.clone(),
            config.work_dir.clone(),
            inbox_dir.to_path_buf(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_executor_by_kind() {
        let mut config = ExecutorConfig::default();
        assert_eq!(create_executor(&config, Path::new("inbox")).name(), "simulated");
        config.kind = ExecutorKind::Docker;
        assert_eq!(create_executor(&config, Path::new("inbox")).name(), "docker");
    }
}
