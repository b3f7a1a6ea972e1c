//! Container-orchestrator executor
//!
//! Two actions: patch the workload's image reference to the target
//! version, then poll readiness until the rollout settles. Rollback is
//! the same patch+poll toward the previous version.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use serde::Deserialize;
use tracing::{debug, info};

use crate::deploy::executor::{Executor, ExecutorConfig, ExecutorSettings};
use crate::deploy::registry::CancelToken;
use crate::errors::OrchestratorError;

const READY_POLL_INTERVAL: Duration = Duration::from_secs(5);
const READY_TIMEOUT: Duration = Duration::from_secs(300);

pub struct K8sExecutor {
    config: ExecutorConfig,
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
    namespace: String,
    image_repo: String,
}

impl K8sExecutor {
    pub fn new(
        config: ExecutorConfig,
        settings: &ExecutorSettings,
    ) -> Result<Self, OrchestratorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            config,
            client,
            api_url: settings.k8s_api_url.trim_end_matches('/').to_string(),
            token: settings.k8s_token.clone(),
            namespace: settings.k8s_namespace.clone(),
            image_repo: settings.k8s_image_repo.clone(),
        })
    }

    fn image_url(&self, version: &str) -> String {
        if self.image_repo.is_empty() {
            format!("{}:{}", self.config.service, version)
        } else {
            format!("{}/{}:{}", self.image_repo, self.config.service, version)
        }
    }

    fn workload_url(&self) -> String {
        format!(
            "{}/apis/apps/v1/namespaces/{}/deployments/{}",
            self.api_url, self.namespace, self.config.host
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header(header::AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn set_workload_image(&self, image: &str) -> Result<(), OrchestratorError> {
        let patch = serde_json::json!({
            "spec": {
                "template": {
                    "spec": {
                        "containers": [
                            { "name": self.config.service, "image": image }
                        ]
                    }
                }
            }
        });

        debug!(workload = %self.config.host, "Patching workload image to {}", image);
        let response = self
            .authorize(self.client.patch(self.workload_url()))
            .header(header::CONTENT_TYPE, "application/strategic-merge-patch+json")
            .json(&patch)
            .send()
            .await
            .map_err(|e| {
                OrchestratorError::ExecutorFailure(format!("failed to patch workload: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::ExecutorFailure(format!(
                "workload patch failed with {}: {}",
                status, body
            )));
        }
        Ok(())
    }

    async fn check_workload_ready(&self) -> Result<bool, OrchestratorError> {
        let response = self
            .authorize(self.client.get(self.workload_url()))
            .send()
            .await
            .map_err(|e| {
                OrchestratorError::ExecutorFailure(format!("failed to read workload: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(OrchestratorError::ExecutorFailure(format!(
                "workload read failed with {}",
                response.status()
            )));
        }

        let workload: Workload = response.json().await.map_err(|e| {
            OrchestratorError::ExecutorFailure(format!("failed to decode workload: {e}"))
        })?;

        let desired = workload.spec.replicas;
        Ok(desired > 0
            && workload.status.ready_replicas >= desired
            && workload.status.updated_replicas >= desired)
    }

    async fn wait_for_ready(&self, cancel: &CancelToken) -> Result<(), OrchestratorError> {
        let deadline = tokio::time::Instant::now() + READY_TIMEOUT;
        loop {
            tokio::select! {
                _ = cancel.canceled() => return Err(OrchestratorError::Canceled),
                _ = tokio::time::sleep(READY_POLL_INTERVAL) => {}
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(OrchestratorError::ExecutorFailure(
                    "timeout waiting for workload to become ready".to_string(),
                ));
            }

            if self.check_workload_ready().await? {
                info!(workload = %self.config.host, "Workload is ready");
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl Executor for K8sExecutor {
    async fn deploy(&self, cancel: &CancelToken) -> Result<(), OrchestratorError> {
        self.set_workload_image(&self.image_url(&self.config.version))
            .await?;
        self.wait_for_ready(cancel).await
    }

    async fn rollback(&self, cancel: &CancelToken) -> Result<(), OrchestratorError> {
        if self.config.prev_version.is_empty() {
            return Err(OrchestratorError::ExecutorFailure(
                "no previous version to rollback to".to_string(),
            ));
        }
        self.set_workload_image(&self.image_url(&self.config.prev_version))
            .await?;
        self.wait_for_ready(cancel).await
    }
}

#[derive(Debug, Default, Deserialize)]
struct Workload {
    #[serde(default)]
    spec: WorkloadSpec,
    #[serde(default)]
    status: WorkloadStatus,
}

#[derive(Debug, Default, Deserialize)]
struct WorkloadSpec {
    #[serde(default)]
    replicas: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkloadStatus {
    #[serde(default)]
    ready_replicas: i64,
    #[serde(default)]
    updated_replicas: i64,
}
