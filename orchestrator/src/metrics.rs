//! Deployment telemetry gauges
//!
//! Two gauge vectors are exported to the scrape endpoint:
//! `deploying_info{host, app, version}` and
//! `rolling_back_info{host, app, version}`, one series per node of
//! every deployment currently in that state. The gauges are recomputed
//! from the store on every scrape rather than maintained incrementally.

use std::sync::Arc;

use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tokio::sync::Mutex;
use tracing::error;

use crate::errors::OrchestratorError;
use crate::model::DeploymentStatus;
use crate::store::{DeploymentCond, DeploymentStore};

pub struct DeploymentCollector {
    deployments: Arc<dyn DeploymentStore>,
    deploying_info: GaugeVec,
    rolling_back_info: GaugeVec,
    registry: Registry,
    scrape_lock: Mutex<()>,
}

impl DeploymentCollector {
    pub fn new(deployments: Arc<dyn DeploymentStore>) -> Result<Self, OrchestratorError> {
        let deploying_info = GaugeVec::new(
            Opts::new(
                "deploying_info",
                "Information about deployments currently in progress",
            ),
            &["host", "app", "version"],
        )
        .map_err(|e| OrchestratorError::ServerError(e.to_string()))?;

        let rolling_back_info = GaugeVec::new(
            Opts::new(
                "rolling_back_info",
                "Information about deployments currently rolling back",
            ),
            &["host", "app", "version"],
        )
        .map_err(|e| OrchestratorError::ServerError(e.to_string()))?;

        let registry = Registry::new();
        registry
            .register(Box::new(deploying_info.clone()))
            .map_err(|e| OrchestratorError::ServerError(e.to_string()))?;
        registry
            .register(Box::new(rolling_back_info.clone()))
            .map_err(|e| OrchestratorError::ServerError(e.to_string()))?;

        Ok(Self {
            deployments,
            deploying_info,
            rolling_back_info,
            registry,
            scrape_lock: Mutex::new(()),
        })
    }

    /// Recompute both gauges from the store and render the exposition
    /// text. One scrape at a time; concurrent scrapes queue.
    pub async fn render(&self) -> Result<String, OrchestratorError> {
        let _guard = self.scrape_lock.lock().await;

        self.deploying_info.reset();
        self.rolling_back_info.reset();

        self.collect_status(DeploymentStatus::Deploying, &self.deploying_info)
            .await;
        self.collect_status(DeploymentStatus::RollingBack, &self.rolling_back_info)
            .await;

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| OrchestratorError::ServerError(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| OrchestratorError::ServerError(e.to_string()))
    }

    async fn collect_status(&self, status: DeploymentStatus, gauge: &GaugeVec) {
        match self
            .deployments
            .search(&DeploymentCond::with_status(status))
            .await
        {
            Ok(deployments) => {
                for deployment in deployments {
                    for node in &deployment.node_deployments {
                        gauge
                            .with_label_values(&[
                                &node.id,
                                &deployment.app_name,
                                &deployment.package_version,
                            ])
                            .set(1.0);
                    }
                }
            }
            Err(e) => error!("Failed to fetch {} deployments: {}", status, e),
        }
    }
}
