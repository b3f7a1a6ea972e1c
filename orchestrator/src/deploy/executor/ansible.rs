//! Physical-host executor
//!
//! Drives a configuration-management playbook in a subprocess. The
//! playbook receives the target as scalar extra-vars and the host list
//! through the inline inventory flag; its exit code is the result.
//! Output is streamed line by line to the logger.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::deploy::executor::{Executor, ExecutorConfig, ExecutorSettings};
use crate::deploy::registry::CancelToken;
use crate::errors::OrchestratorError;

pub struct AnsibleExecutor {
    config: ExecutorConfig,
    playbook_path: String,
}

impl AnsibleExecutor {
    pub fn new(config: ExecutorConfig, settings: &ExecutorSettings) -> Self {
        Self {
            config,
            playbook_path: settings.playbook_path.clone(),
        }
    }

    /// The scalar variables handed to the playbook. `rollback=true`
    /// inverts the playbook's semantics toward `prev_version`.
    fn extra_vars(&self, rollback: bool) -> String {
        let mut vars = format!(
            "ansible_user=root service_name={} deploy_version={} package_url={} package_sha256={} prev_version={}",
            self.config.service,
            self.config.version,
            self.config.package_url,
            self.config.sha256,
            self.config.prev_version,
        );
        if rollback {
            vars.push_str(" rollback=true");
        }
        vars
    }

    fn playbook_args(&self, rollback: bool) -> Vec<String> {
        let mut args = vec![self.playbook_path.clone()];
        if !self.config.ip.is_empty() {
            args.push("-i".to_string());
            args.push(format!("{},", self.config.ip));
        }
        args.push("-e".to_string());
        args.push(self.extra_vars(rollback));
        args.push("-v".to_string());
        args
    }

    async fn run_playbook(
        &self,
        cancel: &CancelToken,
        rollback: bool,
    ) -> Result<(), OrchestratorError> {
        let args = self.playbook_args(rollback);
        info!(
            host = %self.config.host,
            "Running ansible-playbook {}",
            args.join(" ")
        );

        let mut child = Command::new("ansible-playbook")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                OrchestratorError::ExecutorFailure(format!("failed to spawn ansible-playbook: {e}"))
            })?;

        // Drain the pipes into the logger so the child never blocks on
        // a full pipe.
        if let Some(stdout) = child.stdout.take() {
            let host = self.config.host.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(host = %host, "ansible: {}", line);
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let host = self.config.host.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(host = %host, "ansible: {}", line);
                }
            });
        }

        let status = tokio::select! {
            _ = cancel.canceled() => {
                if let Err(e) = child.start_kill() {
                    error!(host = %self.config.host, "failed to kill playbook: {}", e);
                }
                return Err(OrchestratorError::Canceled);
            }
            status = child.wait() => status?,
        };

        if !status.success() {
            return Err(OrchestratorError::ExecutorFailure(format!(
                "ansible-playbook exited with {}",
                status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for AnsibleExecutor {
    async fn deploy(&self, cancel: &CancelToken) -> Result<(), OrchestratorError> {
        self.run_playbook(cancel, false).await
    }

    async fn rollback(&self, cancel: &CancelToken) -> Result<(), OrchestratorError> {
        if self.config.prev_version.is_empty() {
            return Err(OrchestratorError::ExecutorFailure(
                "no previous version to rollback to".to_string(),
            ));
        }
        self.run_playbook(cancel, true).await
    }
}
