//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::alert::{AlertSink, LogSink, WebhookSink};
use crate::app::options::AppOptions;
use crate::deploy::executor::PlatformExecutorFactory;
use crate::deploy::manager::DeploymentManager;
use crate::deploy::monitor::AlertMonitor;
use crate::deploy::rollback::RollbackManager;
use crate::errors::OrchestratorError;
use crate::metrics::DeploymentCollector;
use crate::prom::PromClient;
use crate::store::mongo;
use crate::store::{ApplicationStore, DeploymentStore, NodeStatusStore};

/// Shared application state owned by the composition root
pub struct AppState {
    pub deployments: Arc<dyn DeploymentStore>,
    pub applications: Arc<dyn ApplicationStore>,
    pub node_status: Arc<dyn NodeStatusStore>,
    pub manager: Arc<DeploymentManager>,
    pub rollback_manager: Arc<RollbackManager>,
    pub monitor: Arc<AlertMonitor>,
    pub collector: Arc<DeploymentCollector>,
}

impl AppState {
    /// Connect the stores and wire the managers together.
    pub async fn init(options: &AppOptions) -> Result<Self, OrchestratorError> {
        let stores = mongo::connect(&options.store.url, &options.store.database).await?;
        let deployments: Arc<dyn DeploymentStore> = Arc::new(stores.deployments);
        let applications: Arc<dyn ApplicationStore> = Arc::new(stores.applications);
        let node_status: Arc<dyn NodeStatusStore> = Arc::new(stores.node_status);

        let metrics_backend = Arc::new(PromClient::new(&options.prom_base_url)?);
        let sink: Arc<dyn AlertSink> = match &options.alert_webhook_url {
            Some(url) => Arc::new(WebhookSink::new(url)?),
            None => Arc::new(LogSink),
        };

        let monitor = Arc::new(AlertMonitor::new(
            deployments.clone(),
            applications.clone(),
            metrics_backend,
            sink,
        ));

        let executor_factory = Arc::new(PlatformExecutorFactory::new(options.executor.clone()));

        let manager = Arc::new(DeploymentManager::new(
            deployments.clone(),
            applications.clone(),
            node_status.clone(),
            executor_factory.clone(),
            Some(monitor.clone()),
        ));

        let rollback_manager = Arc::new(RollbackManager::new(
            deployments.clone(),
            applications.clone(),
            node_status.clone(),
            executor_factory,
        ));

        let collector = Arc::new(DeploymentCollector::new(deployments.clone())?);

        info!("Application state initialized");
        Ok(Self {
            deployments,
            applications,
            node_status,
            manager,
            rollback_manager,
            monitor,
            collector,
        })
    }
}
