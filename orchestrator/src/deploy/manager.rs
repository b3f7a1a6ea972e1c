//! Deployment manager
//!
//! Drives a deployment record through its lifecycle by fanning out one
//! task per node, bounded by the pacer. The manager itself is
//! stateless across restarts: `continue_deploying_deployments` re-spawns
//! supervisors from whatever the store says is in flight, and the
//! cancel registry guarantees a single supervisor per deployment.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::deploy::executor::{ExecutorConfig, ExecutorFactory};
use crate::deploy::monitor::AlertMonitor;
use crate::deploy::registry::{CancelToken, TaskRegistry};
use crate::deploy::{persist_node_slot, project_node_status};
use crate::errors::OrchestratorError;
use crate::model::{epoch_now, Deployment, DeploymentStatus, NodeDeploymentStatus};
use crate::store::{ApplicationStore, DeploymentCond, DeploymentStore, NodeStatusStore};

pub struct DeploymentManager {
    deployments: Arc<dyn DeploymentStore>,
    applications: Arc<dyn ApplicationStore>,
    node_status: Arc<dyn NodeStatusStore>,
    executor_factory: Arc<dyn ExecutorFactory>,
    registry: TaskRegistry,
    monitor: Option<Arc<AlertMonitor>>,
}

impl DeploymentManager {
    pub fn new(
        deployments: Arc<dyn DeploymentStore>,
        applications: Arc<dyn ApplicationStore>,
        node_status: Arc<dyn NodeStatusStore>,
        executor_factory: Arc<dyn ExecutorFactory>,
        monitor: Option<Arc<AlertMonitor>>,
    ) -> Self {
        Self {
            deployments,
            applications,
            node_status,
            executor_factory,
            registry: TaskRegistry::new(),
            monitor,
        }
    }

    /// Promote a pending deployment to deploying and kick off its
    /// fan-out supervisor. Refused for any other state.
    pub async fn execute_deployment(
        self: &Arc<Self>,
        deployment_id: &str,
    ) -> Result<(), OrchestratorError> {
        let mut deployment = self.deployments.find_by_id(deployment_id).await?;

        if deployment.status != DeploymentStatus::Pending {
            return Err(OrchestratorError::InvalidState(format!(
                "deployment status is not pending, current status: {}",
                deployment.status
            )));
        }

        deployment.transition_to(DeploymentStatus::Deploying)?;
        self.deployments.update(&deployment).await?;

        self.ensure_monitoring(&deployment).await;
        self.spawn_supervisor(deployment_id).await;
        Ok(())
    }

    /// Abort a pending or deploying deployment. The per-node tasks see
    /// the cancellation at their next suspension point.
    pub async fn cancel_deployment(&self, deployment_id: &str) -> Result<(), OrchestratorError> {
        let mut deployment = self.deployments.find_by_id(deployment_id).await?;

        if !matches!(
            deployment.status,
            DeploymentStatus::Pending | DeploymentStatus::Deploying
        ) {
            return Err(OrchestratorError::InvalidState(format!(
                "cannot cancel deployment with status: {}",
                deployment.status
            )));
        }

        deployment.transition_to(DeploymentStatus::Canceled)?;
        self.deployments.update(&deployment).await?;

        self.registry.cancel(deployment_id).await;
        Ok(())
    }

    pub async fn get_deployment_status(
        &self,
        deployment_id: &str,
    ) -> Result<Deployment, OrchestratorError> {
        self.deployments.find_by_id(deployment_id).await
    }

    /// Crash-recovery path, called every tick: re-spawn the supervisor
    /// for every deployment the store says is deploying. The registry
    /// replaces (and cancels) any supervisor already running for the
    /// same id.
    pub async fn continue_deploying_deployments(
        self: &Arc<Self>,
    ) -> Result<(), OrchestratorError> {
        let deployments = self
            .deployments
            .search(&DeploymentCond::with_status(DeploymentStatus::Deploying))
            .await?;

        for deployment in deployments {
            info!("Continuing deployment: {}", deployment.id);
            self.ensure_monitoring(&deployment).await;
            self.spawn_supervisor(&deployment.id).await;
        }
        Ok(())
    }

    /// Re-arm the alert monitor; a no-op when already monitored, so the
    /// tick path can call it idempotently after a restart.
    async fn ensure_monitoring(&self, deployment: &Deployment) {
        let Some(monitor) = &self.monitor else {
            return;
        };
        match self.applications.find_by_id(&deployment.app_id).await {
            Ok(app) => monitor.start_monitoring(deployment, &app).await,
            Err(e) => warn!(
                "Skipping alert monitoring for deployment {}: {}",
                deployment.id, e
            ),
        }
    }

    async fn spawn_supervisor(self: &Arc<Self>, deployment_id: &str) {
        let cancel = self.registry.register(deployment_id).await;
        let manager = Arc::clone(self);
        let deployment_id = deployment_id.to_string();

        tokio::spawn(async move {
            manager.execute_nodes(&deployment_id, cancel).await;
            manager.registry.unregister(&deployment_id).await;
        });
    }

    /// Fan-out body: work the nodes currently in `deploying`, paced into
    /// batches, then commit overall success if every node finished.
    async fn execute_nodes(self: &Arc<Self>, deployment_id: &str, cancel: CancelToken) {
        let deployment = match self.deployments.find_by_id(deployment_id).await {
            Ok(deployment) => deployment,
            Err(e) => {
                error!("Failed to load deployment {}: {}", deployment_id, e);
                return;
            }
        };

        let mut batch = deployment.nodes_in(NodeDeploymentStatus::Deploying);
        let batch_size = deployment.pacer.batch_size.max(1) as usize;
        let interval = std::time::Duration::from_secs(deployment.pacer.interval_seconds.max(0) as u64);

        // The gray node leads: it gets a batch of its own before its
        // peers, and its failure halts the advance like any other batch.
        let mut chunks: Vec<Vec<String>> = Vec::new();
        if let Some(position) = batch.iter().position(|id| deployment.is_gray_node(id)) {
            chunks.push(vec![batch.remove(position)]);
        }
        chunks.extend(batch.chunks(batch_size).map(|chunk| chunk.to_vec()));

        for (index, chunk) in chunks.iter().enumerate() {
            if cancel.is_canceled() {
                info!("Deployment {} fan-out canceled", deployment_id);
                break;
            }
            if index > 0 && !interval.is_zero() {
                tokio::select! {
                    _ = cancel.canceled() => {
                        info!("Deployment {} fan-out canceled", deployment_id);
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }

            if let Err(e) = self.execute_batch(deployment_id, chunk, &cancel).await {
                // A failed batch pauses the advance; the deployment stays
                // deploying so the operator (or the next tick) can act on
                // the per-node outcomes.
                if e.is_canceled() {
                    info!("Deployment {} fan-out canceled", deployment_id);
                } else {
                    error!("Deployment {} batch halted: {}", deployment_id, e);
                }
                break;
            }
        }

        self.finalize_deployment(deployment_id).await;
    }

    async fn execute_batch(
        self: &Arc<Self>,
        deployment_id: &str,
        node_ids: &[String],
        cancel: &CancelToken,
    ) -> Result<(), OrchestratorError> {
        let mut tasks = JoinSet::new();
        for node_id in node_ids {
            let manager = Arc::clone(self);
            let deployment_id = deployment_id.to_string();
            let node_id = node_id.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                manager
                    .execute_node(&deployment_id, &node_id, &cancel)
                    .await
            });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error =
                            Some(OrchestratorError::ExecutorFailure(format!(
                                "node task aborted: {e}"
                            )));
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Commit `deploying -> success` when every node finished, and bump
    /// the application's version pair. The status is re-read first so a
    /// concurrent cancel or rollback transition wins.
    async fn finalize_deployment(&self, deployment_id: &str) {
        let deployment = match self.deployments.find_by_id(deployment_id).await {
            Ok(deployment) => deployment,
            Err(e) => {
                error!("Failed to reload deployment {}: {}", deployment_id, e);
                return;
            }
        };

        // A concurrent cancel or rollback transition wins: success is
        // only reachable from deploying.
        if !deployment
            .status
            .can_transition_to(DeploymentStatus::Success)
        {
            return;
        }

        if deployment.finished_node_count() != deployment.node_deployments.len() {
            return;
        }

        if let Err(e) = self
            .deployments
            .update_status(&deployment.id, DeploymentStatus::Success)
            .await
        {
            error!("Failed to mark deployment {} successful: {}", deployment.id, e);
            return;
        }

        match self.applications.find_by_id(&deployment.app_id).await {
            Ok(mut app) => {
                app.prev_version = app.current_version.clone();
                app.current_version = deployment.package_version.clone();
                if let Err(e) = self.applications.update(&app).await {
                    error!("Failed to update application {}: {}", app.id, e);
                }
            }
            Err(e) => error!(
                "Failed to load application {} for version bump: {}",
                deployment.app_id, e
            ),
        }

        info!(
            "Deployment {} finished successfully at version {}",
            deployment.id, deployment.package_version
        );
    }

    /// One node's deploy sequence. Every transition is persisted before
    /// the next step depends on it; peer slots are preserved by
    /// re-reading the record inside each persist.
    async fn execute_node(
        self: &Arc<Self>,
        deployment_id: &str,
        node_id: &str,
        cancel: &CancelToken,
    ) -> Result<(), OrchestratorError> {
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

        // A replaced supervisor can leave a completed slot in a stale
        // batch; terminal nodes are never re-executed.
        if node.status.is_terminal() {
            info!("Node {} is already {}, skipping", node.id, node.status);
            return Ok(());
        }

        info!(
            "Start executing node {} for deployment {}",
            node.id, deployment.id
        );

        let now = epoch_now();
        node.deploying_version = deployment.package_version.clone();
        node.platform = deployment.platform;
        node.updated_at = now;
        if node.created_at == 0 {
            node.created_at = now;
        }
        persist_node_slot(self.deployments.as_ref(), deployment_id, &node).await?;

        let config = ExecutorConfig {
            platform: deployment.platform,
            host: node.id.clone(),
            ip: node.ip.clone(),
            service: deployment.app_name.clone(),
            version: deployment.package_version.clone(),
            prev_version: node.prev_version.clone(),
            package_url: deployment.package.url.clone(),
            sha256: deployment.package.sha256.clone(),
        };

        let executor = match self.executor_factory.create(config) {
            Ok(executor) => executor,
            Err(e) => {
                error!("Failed to create executor for node {}: {}", node.id, e);
                node.transition_to(NodeDeploymentStatus::Failed)?;
                node.release_log = e.to_string();
                node.deploying_version.clear();
                node.updated_at = epoch_now();
                persist_node_slot(self.deployments.as_ref(), deployment_id, &node).await?;
                project_node_status(self.node_status.as_ref(), &deployment.app_name, &node).await;
                return Err(e);
            }
        };

        match executor.deploy(cancel).await {
            Err(e) if e.is_canceled() || cancel.is_canceled() => {
                error!("Deployment canceled for node {}", node.id);
                node.transition_to(NodeDeploymentStatus::Failed)?;
                node.release_log = "deployment canceled".to_string();
                node.deploying_version.clear();
                node.updated_at = epoch_now();
                persist_node_slot(self.deployments.as_ref(), deployment_id, &node).await?;
                project_node_status(self.node_status.as_ref(), &deployment.app_name, &node).await;
                Err(OrchestratorError::Canceled)
            }
            Err(e) => {
                error!("Deployment failed for node {}: {}", node.id, e);
                node.release_log = e.to_string();
                node.deploying_version.clear();

                // Best-effort revert of the half-deployed node.
                match executor.rollback(cancel).await {
                    Ok(()) => {
                        node.transition_to(NodeDeploymentStatus::RolledBack)?;
                    }
                    Err(rollback_err) => {
                        error!("Rollback failed for node {}: {}", node.id, rollback_err);
                        node.release_log =
                            format!("deploy failed: {}, rollback failed: {}", e, rollback_err);
                        node.transition_to(NodeDeploymentStatus::Failed)?;
                    }
                }
                node.updated_at = epoch_now();
                persist_node_slot(self.deployments.as_ref(), deployment_id, &node).await?;
                project_node_status(self.node_status.as_ref(), &deployment.app_name, &node).await;
                Err(e)
            }
            Ok(()) => {
                node.prev_version = node.current_version.clone();
                node.current_version = deployment.package_version.clone();
                node.deploying_version.clear();
                node.transition_to(NodeDeploymentStatus::Success)?;
                node.release_log = "deployment successful".to_string();
                node.updated_at = epoch_now();
                persist_node_slot(self.deployments.as_ref(), deployment_id, &node).await?;
                project_node_status(self.node_status.as_ref(), &deployment.app_name, &node).await;

                info!(
                    "Deployment successful: {}, node: {}, version: {}",
                    deployment.id, node.id, deployment.package_version
                );
                Ok(())
            }
        }
    }
}
