//! Alert monitor
//!
//! While a deployment is active the monitor evaluates the rollback
//! policy's metric expressions on every reconciler tick. A rule whose
//! expression keeps firing past its dwell triggers a notification and,
//! with auto-rollback enabled, flips the deployment to rolling-back for
//! the rollback manager's next pass.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::alert::{AlertNotification, AlertSink};
use crate::errors::OrchestratorError;
use crate::model::{
    AlertRule, Application, Deployment, DeploymentStatus, NodeDeploymentStatus,
};
use crate::prom::{InstantQueryResult, MetricsBackend};
use crate::store::{ApplicationStore, DeploymentStore};

/// How long a terminal deployment keeps its observer before removal.
const POST_TERMINAL_GRACE_SECS: i64 = 30 * 60;

/// Tracking state for one rule on one deployment
#[derive(Debug, Clone)]
pub struct DeploymentAlert {
    pub deployment_id: String,
    pub app_name: String,
    pub rule: AlertRule,
    pub start_time: DateTime<Utc>,
    pub last_check_time: DateTime<Utc>,
    pub firing_start: Option<DateTime<Utc>>,
    pub is_firing: bool,
}

pub struct AlertMonitor {
    deployments: Arc<dyn DeploymentStore>,
    applications: Arc<dyn ApplicationStore>,
    metrics: Arc<dyn MetricsBackend>,
    sink: Arc<dyn AlertSink>,
    active_alerts: RwLock<HashMap<String, Vec<DeploymentAlert>>>,
}

impl AlertMonitor {
    pub fn new(
        deployments: Arc<dyn DeploymentStore>,
        applications: Arc<dyn ApplicationStore>,
        metrics: Arc<dyn MetricsBackend>,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            deployments,
            applications,
            metrics,
            sink,
            active_alerts: RwLock::new(HashMap::new()),
        }
    }

    /// Install the deployment's rule observers. A no-op when the policy
    /// is missing or disabled, when the deployment is not in a
    /// monitored state, or when the deployment is already monitored.
    pub async fn start_monitoring(&self, deployment: &Deployment, app: &Application) {
        let policy = match &app.rollback_policy {
            Some(policy) if policy.enabled => policy,
            _ => {
                debug!(
                    "Rollback policy not enabled for app {}, skipping alert monitoring",
                    app.name
                );
                return;
            }
        };

        if !is_monitored_status(deployment.status) {
            info!(
                "Deployment {} status is {}, no need to start alert monitoring",
                deployment.id, deployment.status
            );
            return;
        }

        let mut active = self.active_alerts.write().await;
        if active.contains_key(&deployment.id) {
            debug!("Deployment {} is already being monitored", deployment.id);
            return;
        }

        let now = Utc::now();
        let alerts: Vec<DeploymentAlert> = policy
            .alert_rules
            .iter()
            .map(|rule| DeploymentAlert {
                deployment_id: deployment.id.clone(),
                app_name: deployment.app_name.clone(),
                rule: rule.clone(),
                start_time: now,
                last_check_time: now,
                firing_start: None,
                is_firing: false,
            })
            .collect();

        info!(
            "Started monitoring deployment {} (status: {}) with {} alert rules",
            deployment.id,
            deployment.status,
            alerts.len()
        );
        active.insert(deployment.id.clone(), alerts);
    }

    pub async fn stop_monitoring(&self, deployment_id: &str) {
        let mut active = self.active_alerts.write().await;
        if let Some(alerts) = active.remove(deployment_id) {
            let firing = alerts.iter().filter(|a| a.is_firing).count();
            info!(
                "Stopped monitoring deployment {} ({} alerts, {} firing)",
                deployment_id,
                alerts.len(),
                firing
            );
        }
    }

    /// Evaluate every active deployment's rules. Called once per
    /// reconciler tick.
    pub async fn check_alerts(&self) {
        self.check_alerts_at(Utc::now()).await;
    }

    /// Tick body with an injected clock, so dwell behavior is testable.
    ///
    /// Snapshot under the read lock, evaluate without holding it (the
    /// metric queries must not run under lock), then re-acquire the
    /// write lock to publish state changes and removals.
    pub async fn check_alerts_at(&self, now: DateTime<Utc>) {
        let snapshot: Vec<(String, Vec<DeploymentAlert>)> = {
            let active = self.active_alerts.read().await;
            active
                .iter()
                .map(|(id, alerts)| (id.clone(), alerts.clone()))
                .collect()
        };

        if !snapshot.is_empty() {
            debug!("Checking alerts for {} deployments", snapshot.len());
        }

        for (deployment_id, mut alerts) in snapshot {
            let deployment = match self.deployments.find_by_id(&deployment_id).await {
                Ok(deployment) => deployment,
                Err(e) => {
                    error!("Failed to find deployment {}: {}", deployment_id, e);
                    self.stop_monitoring(&deployment_id).await;
                    continue;
                }
            };

            if !is_monitored_status(deployment.status)
                && self.should_stop_monitoring(&deployment, now)
            {
                self.stop_monitoring(&deployment_id).await;
                continue;
            }

            for alert in alerts.iter_mut() {
                if let Err(e) = self.check_single_alert(&deployment, alert, now).await {
                    error!(
                        "Failed to check alert {} for deployment {}: {}",
                        alert.rule.name, deployment_id, e
                    );
                }
            }

            let mut active = self.active_alerts.write().await;
            if let Some(slot) = active.get_mut(&deployment_id) {
                *slot = alerts;
            }
        }
    }

    /// Terminal deployments keep their observer for a grace period
    /// after the state change, then drop off.
    fn should_stop_monitoring(&self, deployment: &Deployment, now: DateTime<Utc>) -> bool {
        if !deployment.status.is_terminal() {
            return false;
        }
        if now.timestamp() - deployment.updated_time > POST_TERMINAL_GRACE_SECS {
            info!(
                "Stopping monitoring for deployment {} with status {} unchanged past the grace period",
                deployment.id, deployment.status
            );
            return true;
        }
        false
    }

    async fn check_single_alert(
        &self,
        deployment: &Deployment,
        alert: &mut DeploymentAlert,
        now: DateTime<Utc>,
    ) -> Result<(), OrchestratorError> {
        alert.last_check_time = now;

        let results = self.metrics.query_instant(&alert.rule.expr).await?;
        let firing_now = is_alert_firing(&results, &alert.rule);

        if firing_now {
            if !alert.is_firing {
                alert.is_firing = true;
                alert.firing_start = Some(now);
                info!(
                    "Alert {} started firing for deployment {}",
                    alert.rule.name, deployment.id
                );
            } else if let Some(firing_start) = alert.firing_start {
                let dwell = alert.rule.dwell()?;
                let firing_for = now
                    .signed_duration_since(firing_start)
                    .to_std()
                    .unwrap_or_default();
                if firing_for >= dwell {
                    self.trigger_alert(deployment, alert, &results, now).await?;
                }
            }
        } else if alert.is_firing {
            info!(
                "Alert {} stopped firing for deployment {}",
                alert.rule.name, deployment.id
            );
            alert.is_firing = false;
            alert.firing_start = None;
        }

        Ok(())
    }

    async fn trigger_alert(
        &self,
        deployment: &Deployment,
        alert: &DeploymentAlert,
        results: &[InstantQueryResult],
        now: DateTime<Utc>,
    ) -> Result<(), OrchestratorError> {
        info!(
            "Triggering alert {} for deployment {} (status: {})",
            alert.rule.name, deployment.id, deployment.status
        );

        let notification = compose_notification(deployment, alert, results, now);
        if let Err(e) = self.sink.notify(&notification).await {
            error!("Failed to deliver alert {}: {}", notification.key, e);
        }

        let app = self.applications.find_by_id(&deployment.app_id).await?;
        let auto_rollback = app
            .rollback_policy
            .as_ref()
            .map(|policy| policy.auto_rollback)
            .unwrap_or(false);

        if auto_rollback {
            if deployment
                .status
                .can_transition_to(DeploymentStatus::RollingBack)
            {
                info!(
                    "Auto rollback triggered for deployment {} by alert {}",
                    deployment.id, alert.rule.name
                );
                self.deployments
                    .update_status(&deployment.id, DeploymentStatus::RollingBack)
                    .await?;
            } else {
                debug!(
                    "Deployment {} is {}, skipping auto rollback",
                    deployment.id, deployment.status
                );
            }
        }

        Ok(())
    }

    pub async fn active_alerts_count(&self) -> usize {
        self.active_alerts.read().await.len()
    }

    pub async fn firing_alerts_count(&self) -> usize {
        self.active_alerts
            .read()
            .await
            .values()
            .flatten()
            .filter(|a| a.is_firing)
            .count()
    }

    pub async fn is_monitoring(&self, deployment_id: &str) -> bool {
        self.active_alerts.read().await.contains_key(deployment_id)
    }
}

fn is_monitored_status(status: DeploymentStatus) -> bool {
    matches!(
        status,
        DeploymentStatus::Deploying | DeploymentStatus::RollingBack
    )
}

/// A rule fires when any sample carries the rule's labels and a
/// positive value. An empty rule label set matches every sample.
fn is_alert_firing(results: &[InstantQueryResult], rule: &AlertRule) -> bool {
    results
        .iter()
        .any(|result| matches_labels(&result.metric, &rule.labels) && result.value.value > 0.0)
}

fn matches_labels(
    metric: &HashMap<String, String>,
    rule_labels: &HashMap<String, String>,
) -> bool {
    rule_labels
        .iter()
        .all(|(key, expected)| metric.get(key) == Some(expected))
}

fn compose_notification(
    deployment: &Deployment,
    alert: &DeploymentAlert,
    results: &[InstantQueryResult],
    now: DateTime<Utc>,
) -> AlertNotification {
    let desc = alert
        .rule
        .annotations
        .get("description")
        .cloned()
        .unwrap_or_else(|| {
            format!(
                "Alert {} has been firing for {} (deployment status: {})",
                alert.rule.name, alert.rule.duration, deployment.status
            )
        });

    let hostnames: Vec<String> = deployment
        .node_deployments
        .iter()
        .filter(|node| node.status != NodeDeploymentStatus::Pending)
        .map(|node| node.name.clone())
        .collect();

    let mut labels = HashMap::new();
    labels.insert("deploymentId".to_string(), deployment.id.clone());
    labels.insert("appName".to_string(), deployment.app_name.clone());
    labels.insert("hostname".to_string(), hostnames.join(","));
    for result in results {
        for (key, value) in &result.metric {
            labels.insert(key.clone(), value.clone());
        }
    }

    AlertNotification {
        key: format!(
            "{}-{}-{}",
            deployment.id,
            alert.rule.name,
            now.timestamp()
        ),
        status: "firing".to_string(),
        desc,
        starts_at: alert
            .firing_start
            .map(|t| t.to_rfc3339())
            .unwrap_or_default(),
        receive_at: now.to_rfc3339(),
        severity: alert.rule.severity.clone(),
        alertname: alert.rule.name.clone(),
        labels,
        annotations: alert.rule.annotations.clone(),
        value: results.first().map(|r| r.value.value).unwrap_or(0.0),
    }
}
