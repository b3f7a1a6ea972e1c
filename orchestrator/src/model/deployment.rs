//! Deployment record with embedded per-node slots

use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;
use crate::model::{DeploymentStatus, NodeDeploymentStatus, Platform};

/// Package descriptor carried on a deployment and forwarded to executors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    pub url: String,
    pub sha256: String,
    pub size: i64,
    /// Epoch seconds the artifact was published
    pub created_at: i64,
}

/// Pacing control for the fan-out: how many nodes proceed in parallel
/// and how long to wait between batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacerConfig {
    pub batch_size: i32,
    pub interval_seconds: i32,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            interval_seconds: 0,
        }
    }
}

/// One release attempt for an application across its nodes.
///
/// The record is the system of record for deployment progress: node slots
/// are embedded and every per-node write is a full-document update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    #[serde(rename = "_id")]
    pub id: String,
    pub app_id: String,
    pub app_name: String,
    pub package_version: String,
    pub platform: Platform,
    pub package: PackageInfo,
    pub pacer: PacerConfig,
    /// Singled-out leading node that receives the release first, if any.
    /// Selection happens in the API layer; the fan-out gives it a
    /// leading batch of its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gray_node: Option<String>,
    pub node_deployments: Vec<NodeDeployment>,
    pub status: DeploymentStatus,
    #[serde(default)]
    pub release_log: String,
    pub created_time: i64,
    pub updated_time: i64,
}

impl Deployment {
    pub fn find_node(&self, node_id: &str) -> Option<&NodeDeployment> {
        self.node_deployments.iter().find(|n| n.id == node_id)
    }

    pub fn find_node_mut(&mut self, node_id: &str) -> Option<&mut NodeDeployment> {
        self.node_deployments.iter_mut().find(|n| n.id == node_id)
    }

    /// Node ids currently in the given state.
    pub fn nodes_in(&self, status: NodeDeploymentStatus) -> Vec<String> {
        self.node_deployments
            .iter()
            .filter(|n| n.status == status)
            .map(|n| n.id.clone())
            .collect()
    }

    /// Nodes that count toward overall success: `success` and `skipped`.
    pub fn finished_node_count(&self) -> usize {
        self.node_deployments
            .iter()
            .filter(|n| {
                matches!(
                    n.status,
                    NodeDeploymentStatus::Success | NodeDeploymentStatus::Skipped
                )
            })
            .count()
    }

    pub fn is_gray_node(&self, node_id: &str) -> bool {
        self.gray_node.as_deref() == Some(node_id)
    }

    /// Apply a status transition, refusing any edge the state machine
    /// does not list. All manager-side status writes go through here.
    pub fn transition_to(&mut self, next: DeploymentStatus) -> Result<(), OrchestratorError> {
        if !self.status.can_transition_to(next) {
            return Err(OrchestratorError::InvalidState(format!(
                "deployment {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }
}

/// One target node embedded in a deployment record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDeployment {
    /// Node identity (host name for physical nodes, workload name for k8s)
    pub id: String,
    pub ip: String,
    #[serde(default)]
    pub name: String,
    pub status: NodeDeploymentStatus,
    /// What runs on the node now
    #[serde(default)]
    pub current_version: String,
    /// Non-empty exactly while the node is deploying
    #[serde(default)]
    pub deploying_version: String,
    /// What a rollback would land on
    #[serde(default)]
    pub prev_version: String,
    #[serde(default)]
    pub release_log: String,
    pub platform: Platform,
    pub created_at: i64,
    pub updated_at: i64,
}

impl NodeDeployment {
    /// Apply a status transition, refusing any edge the node state
    /// machine does not list.
    pub fn transition_to(&mut self, next: NodeDeploymentStatus) -> Result<(), OrchestratorError> {
        if !self.status.can_transition_to(next) {
            return Err(OrchestratorError::InvalidState(format!(
                "node {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    pub fn new(id: &str, ip: &str, platform: Platform) -> Self {
        Self {
            id: id.to_string(),
            ip: ip.to_string(),
            name: id.to_string(),
            status: NodeDeploymentStatus::Pending,
            current_version: String::new(),
            deploying_version: String::new(),
            prev_version: String::new(),
            release_log: String::new(),
            platform,
            created_at: 0,
            updated_at: 0,
        }
    }
}
