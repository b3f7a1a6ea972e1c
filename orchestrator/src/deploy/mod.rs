//! Deployment core: managers, monitor, executors, cancel registry

pub mod executor;
pub mod manager;
pub mod monitor;
pub mod registry;
pub mod rollback;

use tracing::warn;

use crate::errors::OrchestratorError;
use crate::model::{NodeDeployment, NodeStatusRecord};
use crate::store::{DeploymentStore, NodeStatusStore};

/// Write one node slot back into its deployment record.
///
/// Node slots are embedded in the deployment document and peer tasks
/// persist concurrently, so the record is re-read and only this slot is
/// replaced before writing back (last-writer-wins per slot).
pub(crate) async fn persist_node_slot(
    store: &dyn DeploymentStore,
    deployment_id: &str,
    node: &NodeDeployment,
) -> Result<(), OrchestratorError> {
    let mut deployment = store.find_by_id(deployment_id).await?;
    match deployment.find_node_mut(&node.id) {
        Some(slot) => *slot = node.clone(),
        None => {
            return Err(OrchestratorError::NotFound(format!(
                "node {} not found in deployment {}",
                node.id, deployment_id
            )))
        }
    }
    store.update(&deployment).await
}

/// Refresh the cross-deployment (host, service) projection after a node
/// transition. Projection failures are logged, never fatal.
pub(crate) async fn project_node_status(
    store: &dyn NodeStatusStore,
    service: &str,
    node: &NodeDeployment,
) {
    let record = NodeStatusRecord::from_node(service, node);
    if let Err(e) = store.upsert(record).await {
        warn!(
            "Failed to project node status for {}/{}: {}",
            node.id, service, e
        );
    }
}
