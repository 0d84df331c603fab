//! Container executor driving the docker CLI

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::WorkloadExecutor;
use crate::domain::{TaskProposal, is_valid_proposal_id};
use crate::error::{SwarmError, SwarmResult};

/// Mount point of the per-proposal directory inside the container
const CONTAINER_WORK_DIR: &str = "/work";

pub struct DockerExecutor {
    binary: String,
    work_dir: PathBuf,
    inbox_dir: PathBuf,
}

impl DockerExecutor {
    pub fn new(binary: impl Into<String>, work_dir: impl Into<PathBuf>, inbox_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            work_dir: work_dir.into(),
            inbox_dir: inbox_dir.into(),
        }
    }

    /// Working directory for one proposal: `{work_dir}/proposal_{id}`
    ///
    /// Fails unless the result is a direct child of `work_dir`.
    pub fn proposal_dir(&self, proposal: &TaskProposal) -> SwarmResult<PathBuf> {
        let dir = self.work_dir.join(format!("proposal_{}", proposal.id));
        let direct_child = is_valid_proposal_id(&proposal.id)
            && dir.parent() == Some(self.work_dir.as_path())
            && matches!(dir.components().next_back(), Some(Component::Normal(_)));
        if !direct_child {
            return Err(SwarmError::InvalidProposal(format!(
                "Proposal id {:?} escapes the work directory",
                proposal.id
            )));
        }
        Ok(dir)
    }

    /// Arguments for `docker run`
    pub fn build_args(&self, proposal: &TaskProposal, proposal_dir: &Path) -> Vec<String> {
        let config = &proposal.container_config;
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "-v".to_string(),
            format!("{}:{}", proposal_dir.display(), CONTAINER_WORK_DIR),
            "-w".to_string(),
            CONTAINER_WORK_DIR.to_string(),
        ];
        for (key, value) in &config.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        for port in &config.ports {
            args.push("-p".to_string());
            args.push(port.clone());
        }
        for volume in &config.volumes {
            args.push("-v".to_string());
            args.push(volume.clone());
        }
        args.push(config.image.clone());
        args.push("sh".to_string());
        args.push("-c".to_string());
        args.push(config.command.clone());
        args
    }

    /// Copy this proposal's received input files into its directory
    async fn stage_inputs(&self, proposal: &TaskProposal, proposal_dir: &Path) -> SwarmResult<()> {
        let inbox = self.inbox_dir.join(&proposal.id);
        for input in &proposal.container_config.input_files {
            let Some(name) = input.file_name() else {
                continue;
            };
            let src = inbox.join(name);
            if !tokio::fs::try_exists(&src).await.unwrap_or(false) {
                warn!(?src, "DockerExecutor: input file missing from inbox");
                continue;
            }
            tokio::fs::copy(&src, proposal_dir.join(name)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl WorkloadExecutor for DockerExecutor {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn execute(&self, proposal: &TaskProposal) -> SwarmResult<Value> {
        debug!(proposal_id = %proposal.id, image = %proposal.container_config.image, "DockerExecutor::execute: called");
        let proposal_dir = self.proposal_dir(proposal)?;
        tokio::fs::create_dir_all(&proposal_dir).await?;
        self.stage_inputs(proposal, &proposal_dir).await?;

        let args = self.build_args(proposal, &proposal_dir);
        info!(proposal_id = %proposal.id, binary = %self.binary, "Starting container");
        let output = tokio::process::Command::new(&self.binary)
            .args(&args)
            .current_dir(&proposal_dir)
            .output()
            .await
            .map_err(|e| SwarmError::Execution(format!("Failed to start {}: {}", self.binary, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        debug!(status = ?output.status, stdout_len = stdout.len(), stderr_len = stderr.len(), "DockerExecutor::execute: finished");

        if output.status.success() {
            Ok(json!({
                "status": "success",
                "exitCode": output.status.code().unwrap_or(0),
                "stdout": stdout,
            }))
        } else {
            Err(SwarmError::Execution(format!(
                "Process exited with code {}\nError: {}",
                output.status.code().unwrap_or(-1),
                stderr
            )))
        }
    }
}
