//! Platform executors
//!
//! An executor makes one node run one version. The managers stay
//! opaque to the platform: they build a config, ask the factory for an
//! executor, and call deploy or rollback. Both operations honor
//! cooperative cancellation and are idempotent for identical configs.

pub mod ansible;
pub mod k8s;
pub mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::deploy::registry::CancelToken;
use crate::errors::OrchestratorError;
use crate::model::Platform;

/// Platform-specific worker performing deploy/rollback on one node
#[async_trait]
pub trait Executor: Send + Sync {
    /// Make the node run the target version.
    async fn deploy(&self, cancel: &CancelToken) -> Result<(), OrchestratorError>;

    /// Make the node run the previous version. Fails when no previous
    /// version is recorded.
    async fn rollback(&self, cancel: &CancelToken) -> Result<(), OrchestratorError>;
}

/// Everything an executor needs to know about its (platform, node) target
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub platform: Platform,
    /// Node identity: host name, or workload name on k8s
    pub host: String,
    pub ip: String,
    /// Application name
    pub service: String,
    /// Version being installed
    pub version: String,
    /// Version a rollback would land on
    pub prev_version: String,
    pub package_url: String,
    pub sha256: String,
}

/// Fixed executor configuration from the settings file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorSettings {
    /// Playbook invoked for physical hosts
    #[serde(default = "default_playbook_path")]
    pub playbook_path: String,

    /// Base URL of the container-orchestrator API server
    #[serde(default = "default_k8s_api_url")]
    pub k8s_api_url: String,

    /// Bearer token for the orchestrator API, if required
    #[serde(default)]
    pub k8s_token: Option<String>,

    #[serde(default = "default_k8s_namespace")]
    pub k8s_namespace: String,

    /// Image repository prefix; the workload image becomes
    /// `<image_repo>/<service>:<version>`. When empty the service name
    /// is used as the repository.
    #[serde(default)]
    pub k8s_image_repo: String,
}

fn default_playbook_path() -> String {
    "/etc/playbook/deploy.yml".to_string()
}

fn default_k8s_api_url() -> String {
    "https://kubernetes.default.svc".to_string()
}

fn default_k8s_namespace() -> String {
    "default".to_string()
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            playbook_path: default_playbook_path(),
            k8s_api_url: default_k8s_api_url(),
            k8s_token: None,
            k8s_namespace: default_k8s_namespace(),
            k8s_image_repo: String::new(),
        }
    }
}

/// Creates the executor for a (platform, node) target
pub trait ExecutorFactory: Send + Sync {
    fn create(&self, config: ExecutorConfig) -> Result<Arc<dyn Executor>, OrchestratorError>;
}

/// Production factory dispatching on the platform tag
pub struct PlatformExecutorFactory {
    settings: ExecutorSettings,
}

impl PlatformExecutorFactory {
    pub fn new(settings: ExecutorSettings) -> Self {
        Self { settings }
    }
}

impl ExecutorFactory for PlatformExecutorFactory {
    fn create(&self, config: ExecutorConfig) -> Result<Arc<dyn Executor>, OrchestratorError> {
        match config.platform {
            Platform::Physical => Ok(Arc::new(ansible::AnsibleExecutor::new(
                config,
                &self.settings,
            ))),
            Platform::K8s => Ok(Arc::new(k8s::K8sExecutor::new(config, &self.settings)?)),
            Platform::Mock => Err(OrchestratorError::ConfigError(format!(
                "unsupported platform: {}",
                config.platform
            ))),
        }
    }
}
