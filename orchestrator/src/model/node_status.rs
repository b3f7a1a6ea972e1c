//! Per-(host, service) node status projection
//!
//! Deployment records roll over with every release; this projection is
//! the cross-deployment answer to "what is on this host right now".

use serde::{Deserialize, Serialize};

use crate::model::{NodeDeployment, NodeDeploymentStatus, Platform};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatusRecord {
    #[serde(rename = "_id", default)]
    pub id: String,
    pub host: String,
    pub service: String,
    #[serde(default)]
    pub current_version: String,
    #[serde(default)]
    pub deploying_version: String,
    #[serde(default)]
    pub prev_version: String,
    pub platform: Platform,
    pub state: NodeDeploymentStatus,
    #[serde(default)]
    pub last_error: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl NodeStatusRecord {
    /// Project a deployment node slot onto the (host, service) record.
    pub fn from_node(service: &str, node: &NodeDeployment) -> Self {
        let last_error = if node.status == NodeDeploymentStatus::Failed {
            node.release_log.clone()
        } else {
            String::new()
        };
        Self {
            id: String::new(),
            host: node.id.clone(),
            service: service.to_string(),
            current_version: node.current_version.clone(),
            deploying_version: node.deploying_version.clone(),
            prev_version: node.prev_version.clone(),
            platform: node.platform,
            state: node.status,
            last_error,
            created_at: 0,
            updated_at: 0,
        }
    }
}
