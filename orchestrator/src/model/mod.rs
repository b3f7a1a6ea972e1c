//! Persisted record types and status state machines

pub mod application;
pub mod deployment;
pub mod node_status;

pub use application::{AlertRule, Application, RollbackPolicy};
pub use deployment::{Deployment, NodeDeployment, PackageInfo, PacerConfig};
pub use node_status::NodeStatusRecord;

use serde::{Deserialize, Serialize};

/// Current epoch seconds, the stamp format used on persisted records.
pub fn epoch_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Target platform for a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Physical host, driven by a configuration-management playbook
    Physical,
    /// Container-orchestrator managed workload
    K8s,
    /// Test-only platform
    Mock,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Physical => "physical",
            Platform::K8s => "k8s",
            Platform::Mock => "mock",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Deploying,
    Success,
    Failed,
    RollingBack,
    RolledBack,
    Canceled,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::RollingBack => "rolling_back",
            DeploymentStatus::RolledBack => "rolled_back",
            DeploymentStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Success
                | DeploymentStatus::Failed
                | DeploymentStatus::RolledBack
                | DeploymentStatus::Canceled
        )
    }

    /// Whether `next` is a legal edge of the deployment state machine.
    pub fn can_transition_to(&self, next: DeploymentStatus) -> bool {
        use DeploymentStatus::*;
        matches!(
            (self, next),
            (Pending, Deploying)
                | (Pending, Canceled)
                | (Deploying, Success)
                | (Deploying, RollingBack)
                | (Deploying, Canceled)
                | (RollingBack, RolledBack)
                | (RollingBack, Failed)
        )
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-node deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeDeploymentStatus {
    Pending,
    Deploying,
    Skipped,
    Success,
    RollingBack,
    RolledBack,
    Failed,
}

impl NodeDeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeDeploymentStatus::Pending => "pending",
            NodeDeploymentStatus::Deploying => "deploying",
            NodeDeploymentStatus::Skipped => "skipped",
            NodeDeploymentStatus::Success => "success",
            NodeDeploymentStatus::RollingBack => "rolling_back",
            NodeDeploymentStatus::RolledBack => "rolled_back",
            NodeDeploymentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeDeploymentStatus::Skipped
                | NodeDeploymentStatus::Success
                | NodeDeploymentStatus::RolledBack
                | NodeDeploymentStatus::Failed
        )
    }

    /// Whether `next` is a legal edge of the node state machine.
    ///
    /// `Failed -> Deploying` is the manual retry path and
    /// `Success -> RolledBack / Failed` are the deployment-wide rollback
    /// outcomes; there is no automatic retry edge.
    pub fn can_transition_to(&self, next: NodeDeploymentStatus) -> bool {
        use NodeDeploymentStatus::*;
        matches!(
            (self, next),
            (Pending, Deploying)
                | (Deploying, Success)
                | (Deploying, Failed)
                | (Deploying, RolledBack)
                | (Deploying, Skipped)
                | (Deploying, RollingBack)
                | (RollingBack, RolledBack)
                | (RollingBack, Failed)
                | (Success, RollingBack)
                | (Success, RolledBack)
                | (Success, Failed)
                | (Failed, Deploying)
        )
    }
}

impl std::fmt::Display for NodeDeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
