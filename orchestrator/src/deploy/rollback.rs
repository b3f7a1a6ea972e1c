//! Rollback manager
//!
//! Reverses node state through the same executor abstraction, in two
//! modes: per-node rollback on deployments still deploying (nodes the
//! API or the monitor flipped to rolling-back), and deployment-wide
//! rollback of everything that succeeded once the record itself is in
//! rolling-back. Outcomes are reconciled into the deployment status on
//! the same pass.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::deploy::executor::{ExecutorConfig, ExecutorFactory};
use crate::deploy::registry::{CancelToken, TaskRegistry};
use crate::deploy::{persist_node_slot, project_node_status};
use crate::errors::OrchestratorError;
use crate::model::{epoch_now, Deployment, DeploymentStatus, NodeDeploymentStatus};
use crate::store::{ApplicationStore, DeploymentCond, DeploymentStore, NodeStatusStore};

pub struct RollbackManager {
    deployments: Arc<dyn DeploymentStore>,
    applications: Arc<dyn ApplicationStore>,
    node_status: Arc<dyn NodeStatusStore>,
    executor_factory: Arc<dyn ExecutorFactory>,
    registry: TaskRegistry,
}

impl RollbackManager {
    pub fn new(
        deployments: Arc<dyn DeploymentStore>,
        applications: Arc<dyn ApplicationStore>,
        node_status: Arc<dyn NodeStatusStore>,
        executor_factory: Arc<dyn ExecutorFactory>,
    ) -> Self {
        Self {
            deployments,
            applications,
            node_status,
            executor_factory,
            registry: TaskRegistry::new(),
        }
    }

    /// Tick entry point: resume both rollback modes from store state.
    pub async fn continue_rolling_back_deployments(
        self: &Arc<Self>,
    ) -> Result<(), OrchestratorError> {
        self.rollback_nodes_in_flight().await?;
        self.rollback_whole_deployments().await?;
        Ok(())
    }

    /// Per-node rollback: deployments still deploying whose node slots
    /// were flipped to rolling-back roll those nodes to the
    /// application's current version.
    async fn rollback_nodes_in_flight(self: &Arc<Self>) -> Result<(), OrchestratorError> {
        let deployments = self
            .deployments
            .search(&DeploymentCond::with_status(DeploymentStatus::Deploying))
            .await?;

        for deployment in deployments {
            let nodes = deployment.nodes_in(NodeDeploymentStatus::RollingBack);
            if nodes.is_empty() {
                continue;
            }

            let app = match self.applications.find_by_id(&deployment.app_id).await {
                Ok(app) => app,
                Err(e) => {
                    error!(
                        "Failed to load application {} for deployment {}: {}",
                        deployment.app_id, deployment.id, e
                    );
                    continue;
                }
            };

            let cancel = self.registry.register(&deployment.id).await;
            self.execute_rollback(&deployment, &nodes, &app.current_version, &cancel)
                .await;
            self.registry.unregister(&deployment.id).await;
        }
        Ok(())
    }

    /// Deployment-wide rollback: revert every node that succeeded to
    /// the application's previous version, then reconcile the record.
    /// Full success commits `rolled_back` and swaps the application's
    /// current version back; anything less commits `failed` and leaves
    /// the application alone.
    async fn rollback_whole_deployments(self: &Arc<Self>) -> Result<(), OrchestratorError> {
        let deployments = self
            .deployments
            .search(&DeploymentCond::with_status(DeploymentStatus::RollingBack))
            .await?;

        for deployment in deployments {
            let nodes = deployment.nodes_in(NodeDeploymentStatus::Success);

            let mut app = match self.applications.find_by_id(&deployment.app_id).await {
                Ok(app) => app,
                Err(e) => {
                    error!(
                        "Failed to load application {} for deployment {}: {}",
                        deployment.app_id, deployment.id, e
                    );
                    continue;
                }
            };

            let cancel = self.registry.register(&deployment.id).await;
            let succeeded = self
                .execute_rollback(&deployment, &nodes, &app.prev_version, &cancel)
                .await;
            self.registry.unregister(&deployment.id).await;

            // An empty selection completes vacuously: every node that
            // needed reverting already left `success`.
            let outcome = if succeeded == nodes.len() {
                DeploymentStatus::RolledBack
            } else {
                DeploymentStatus::Failed
            };

            // Re-read before committing so a concurrent transition wins.
            let current = match self.deployments.find_by_id(&deployment.id).await {
                Ok(current) => current,
                Err(e) => {
                    error!("Failed to reload deployment {}: {}", deployment.id, e);
                    continue;
                }
            };
            if !current.status.can_transition_to(outcome) {
                warn!(
                    "Skipping rollback outcome for deployment {}: cannot move from {} to {}",
                    deployment.id, current.status, outcome
                );
                continue;
            }

            if outcome == DeploymentStatus::RolledBack {
                app.current_version = app.prev_version.clone();
                if let Err(e) = self.applications.update(&app).await {
                    error!("Failed to revert application {}: {}", app.id, e);
                }
                if let Err(e) = self.deployments.update_status(&deployment.id, outcome).await {
                    error!("Failed to mark deployment {} rolled back: {}", deployment.id, e);
                }
                info!(
                    "Deployment {} rolled back to version {}",
                    deployment.id, app.current_version
                );
            } else {
                if let Err(e) = self.deployments.update_status(&deployment.id, outcome).await {
                    error!("Failed to mark deployment {} failed: {}", deployment.id, e);
                }
                error!(
                    "Deployment {} rollback incomplete: {}/{} nodes reverted",
                    deployment.id,
                    succeeded,
                    nodes.len()
                );
            }
        }
        Ok(())
    }

    /// Fan out one rollback task per node and count full successes.
    async fn execute_rollback(
        self: &Arc<Self>,
        deployment: &Deployment,
        node_ids: &[String],
        target_version: &str,
        cancel: &CancelToken,
    ) -> usize {
        if node_ids.is_empty() {
            return 0;
        }

        let mut tasks = JoinSet::new();
        for node_id in node_ids {
            info!(
                "Start rolling back deployment: {}, node: {}",
                deployment.id, node_id
            );
            let manager = Arc::clone(self);
            let deployment_id = deployment.id.clone();
            let node_id = node_id.clone();
            let target = target_version.to_string();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                manager
                    .rollback_node(&deployment_id, &node_id, &target, &cancel)
                    .await
            });
        }

        let mut success_count = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => success_count += 1,
                Ok(Err(e)) => error!("Rollback task failed: {}", e),
                Err(e) => error!("Rollback task aborted: {}", e),
            }
        }
        success_count
    }

    async fn rollback_node(
        self: &Arc<Self>,
        deployment_id: &str,
        node_id: &str,
        target_version: &str,
        cancel: &CancelToken,
    ) -> Result<(), OrchestratorError> {
        if target_version.is_empty() {
            return Err(OrchestratorError::InvalidState(
                "no previous version to roll back to".to_string(),
            ));
        }

        let deployment = self.deployments.find_by_id(deployment_id).await?;
        let mut node = deployment
            .find_node(node_id)
            .cloned()
            .ok_or_else(|| {
                OrchestratorError::NotFound(format!(
                    "node {} not found in deployment {}",
                    node_id, deployment_id
                ))
            })?;

        let config = ExecutorConfig {
            platform: node.platform,
            host: node.id.clone(),
            ip: node.ip.clone(),
            service: deployment.app_name.clone(),
            version: node.current_version.clone(),
            prev_version: target_version.to_string(),
            package_url: deployment.package.url.clone(),
            sha256: deployment.package.sha256.clone(),
        };

        let executor = match self.executor_factory.create(config) {
            Ok(executor) => executor,
            Err(e) => {
                node.transition_to(NodeDeploymentStatus::Failed)?;
                node.release_log = e.to_string();
                node.deploying_version.clear();
                node.updated_at = epoch_now();
                persist_node_slot(self.deployments.as_ref(), deployment_id, &node).await?;
                project_node_status(self.node_status.as_ref(), &deployment.app_name, &node).await;
                return Err(e);
            }
        };

        info!("{}@{} start rolling back", deployment.app_name, node.id);
        match executor.rollback(cancel).await {
            Err(e) if e.is_canceled() || cancel.is_canceled() => {
                node.transition_to(NodeDeploymentStatus::Failed)?;
                node.release_log = "rollback canceled".to_string();
                node.deploying_version.clear();
                node.updated_at = epoch_now();
                persist_node_slot(self.deployments.as_ref(), deployment_id, &node).await?;
                project_node_status(self.node_status.as_ref(), &deployment.app_name, &node).await;
                Err(OrchestratorError::Canceled)
            }
            Err(e) => {
                node.transition_to(NodeDeploymentStatus::Failed)?;
                node.release_log = format!("rollback failed: {}", e);
                node.deploying_version.clear();
                node.updated_at = epoch_now();
                persist_node_slot(self.deployments.as_ref(), deployment_id, &node).await?;
                project_node_status(self.node_status.as_ref(), &deployment.app_name, &node).await;
                Err(e)
            }
            Ok(()) => {
                node.transition_to(NodeDeploymentStatus::RolledBack)?;
                node.release_log = "rollback successful".to_string();
                node.current_version = target_version.to_string();
                node.deploying_version.clear();
                node.updated_at = epoch_now();
                persist_node_slot(self.deployments.as_ref(), deployment_id, &node).await?;
                project_node_status(self.node_status.as_ref(), &deployment.app_name, &node).await;
                Ok(())
            }
        }
    }
}
