//! Alert monitor tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use stagehand::alert::{AlertNotification, AlertSink};
use stagehand::deploy::monitor::AlertMonitor;
use stagehand::errors::OrchestratorError;
use stagehand::model::{
    AlertRule, Application, Deployment, DeploymentStatus, NodeDeployment, NodeDeploymentStatus,
    PackageInfo, PacerConfig, Platform, RollbackPolicy,
};
use stagehand::prom::{InstantQueryResult, MetricsBackend, Sample};
use stagehand::store::memory::{MemoryApplicationStore, MemoryDeploymentStore};
use stagehand::store::{ApplicationStore, DeploymentStore};

/// Metrics backend returning scripted samples
#[derive(Default)]
struct ScriptedBackend {
    samples: Mutex<Vec<InstantQueryResult>>,
    fail: Mutex<bool>,
}

impl ScriptedBackend {
    fn set_value(&self, value: f64) {
        self.set_sample(HashMap::new(), value);
    }

    fn set_sample(&self, metric: HashMap<String, String>, value: f64) {
        *self.samples.lock().unwrap() = vec![InstantQueryResult {
            metric,
            value: Sample {
                timestamp: 0,
                value,
            },
        }];
    }

    fn clear(&self) {
        self.samples.lock().unwrap().clear();
    }

    fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl MetricsBackend for ScriptedBackend {
    async fn query_instant(
        &self,
        _query: &str,
    ) -> Result<Vec<InstantQueryResult>, OrchestratorError> {
        if *self.fail.lock().unwrap() {
            return Err(OrchestratorError::QueryFailure("backend down".to_string()));
        }
        Ok(self.samples.lock().unwrap().clone())
    }
}

/// Sink collecting delivered notifications
#[derive(Default)]
struct RecordingSink {
    notifications: Mutex<Vec<AlertNotification>>,
}

impl RecordingSink {
    fn delivered(&self) -> Vec<AlertNotification> {
        self.notifications.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn notify(&self, alert: &AlertNotification) -> Result<(), OrchestratorError> {
        self.notifications.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

struct Fixture {
    deployments: Arc<MemoryDeploymentStore>,
    applications: Arc<MemoryApplicationStore>,
    backend: Arc<ScriptedBackend>,
    sink: Arc<RecordingSink>,
    monitor: AlertMonitor,
}

fn fixture() -> Fixture {
    let deployments = Arc::new(MemoryDeploymentStore::new());
    let applications = Arc::new(MemoryApplicationStore::new());
    let backend = Arc::new(ScriptedBackend::default());
    let sink = Arc::new(RecordingSink::default());
    let monitor = AlertMonitor::new(
        deployments.clone(),
        applications.clone(),
        backend.clone(),
        sink.clone(),
    );
    Fixture {
        deployments,
        applications,
        backend,
        sink,
        monitor,
    }
}

fn rule(name: &str, dwell: &str, labels: HashMap<String, String>) -> AlertRule {
    AlertRule {
        name: name.to_string(),
        expr: name.to_string(),
        duration: dwell.to_string(),
        severity: "critical".to_string(),
        labels,
        annotations: HashMap::new(),
    }
}

fn application(rules: Vec<AlertRule>, auto_rollback: bool) -> Application {
    Application {
        id: "app-1".to_string(),
        name: "svc".to_string(),
        current_version: "v1".to_string(),
        prev_version: String::new(),
        rollback_policy: Some(RollbackPolicy {
            enabled: true,
            auto_rollback,
            alert_rules: rules,
            notify_channel: String::new(),
        }),
        created_time: 0,
        updated_time: 0,
    }
}

fn deployment(status: DeploymentStatus) -> Deployment {
    let mut node = NodeDeployment::new("h1", "10.0.0.1", Platform::Mock);
    node.status = NodeDeploymentStatus::Success;
    Deployment {
        id: "dep-1".to_string(),
        app_id: "app-1".to_string(),
        app_name: "svc".to_string(),
        package_version: "v2".to_string(),
        platform: Platform::Mock,
        package: PackageInfo::default(),
        pacer: PacerConfig::default(),
        gray_node: None,
        node_deployments: vec![node],
        status,
        release_log: String::new(),
        created_time: 0,
        updated_time: 0,
    }
}

#[tokio::test]
async fn test_start_monitoring_requires_enabled_policy() {
    let f = fixture();
    let dep = deployment(DeploymentStatus::Deploying);

    let mut app = application(vec![rule("err_rate", "2m", HashMap::new())], true);
    app.rollback_policy.as_mut().unwrap().enabled = false;

    f.monitor.start_monitoring(&dep, &app).await;
    assert!(!f.monitor.is_monitoring("dep-1").await);
}

#[tokio::test]
async fn test_start_monitoring_noop_for_terminal_deployment() {
    let f = fixture();
    let dep = deployment(DeploymentStatus::Success);
    let app = application(vec![rule("err_rate", "2m", HashMap::new())], true);

    f.monitor.start_monitoring(&dep, &app).await;
    assert!(!f.monitor.is_monitoring("dep-1").await);
}

#[tokio::test]
async fn test_start_monitoring_is_idempotent() {
    let f = fixture();
    let dep = deployment(DeploymentStatus::Deploying);
    let app = application(vec![rule("err_rate", "2m", HashMap::new())], true);

    f.monitor.start_monitoring(&dep, &app).await;
    f.monitor.start_monitoring(&dep, &app).await;
    assert_eq!(f.monitor.active_alerts_count().await, 1);
}

#[tokio::test]
async fn test_dwell_gates_the_trigger() {
    let f = fixture();
    let mut app = application(vec![rule("err_rate", "2m", HashMap::new())], true);
    f.applications.insert(&mut app).await.unwrap();
    let mut dep = deployment(DeploymentStatus::Deploying);
    f.deployments.insert(&mut dep).await.unwrap();
    let dep = f.deployments.find_by_id("dep-1").await.unwrap();

    f.monitor.start_monitoring(&dep, &app).await;
    f.backend.set_value(1.0);

    let t0 = Utc::now();

    // Firing starts
    f.monitor.check_alerts_at(t0).await;
    assert_eq!(f.monitor.firing_alerts_count().await, 1);
    assert!(f.sink.delivered().is_empty());

    // Still firing but under the dwell: no trigger
    f.monitor.check_alerts_at(t0 + Duration::seconds(90)).await;
    assert!(f.sink.delivered().is_empty());
    assert_eq!(
        f.deployments.find_by_id("dep-1").await.unwrap().status,
        DeploymentStatus::Deploying
    );

    // Past the dwell: trigger fires and auto-rollback flips the record
    f.monitor.check_alerts_at(t0 + Duration::seconds(130)).await;
    let delivered = f.sink.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].alertname, "err_rate");
    assert_eq!(delivered[0].status, "firing");
    assert_eq!(delivered[0].labels["deploymentId"], "dep-1");
    assert_eq!(delivered[0].labels["hostname"], "h1");
    assert_eq!(delivered[0].value, 1.0);

    assert_eq!(
        f.deployments.find_by_id("dep-1").await.unwrap().status,
        DeploymentStatus::RollingBack
    );
}

#[tokio::test]
async fn test_trigger_without_auto_rollback_only_notifies() {
    let f = fixture();
    let mut app = application(vec![rule("err_rate", "1m", HashMap::new())], false);
    f.applications.insert(&mut app).await.unwrap();
    let mut dep = deployment(DeploymentStatus::Deploying);
    f.deployments.insert(&mut dep).await.unwrap();
    let dep = f.deployments.find_by_id("dep-1").await.unwrap();

    f.monitor.start_monitoring(&dep, &app).await;
    f.backend.set_value(1.0);

    let t0 = Utc::now();
    f.monitor.check_alerts_at(t0).await;
    f.monitor.check_alerts_at(t0 + Duration::seconds(120)).await;

    assert_eq!(f.sink.delivered().len(), 1);
    assert_eq!(
        f.deployments.find_by_id("dep-1").await.unwrap().status,
        DeploymentStatus::Deploying
    );
}

#[tokio::test]
async fn test_firing_clears_when_expression_clears() {
    let f = fixture();
    let mut app = application(vec![rule("err_rate", "2m", HashMap::new())], true);
    f.applications.insert(&mut app).await.unwrap();
    let mut dep = deployment(DeploymentStatus::Deploying);
    f.deployments.insert(&mut dep).await.unwrap();
    let dep = f.deployments.find_by_id("dep-1").await.unwrap();

    f.monitor.start_monitoring(&dep, &app).await;

    let t0 = Utc::now();
    f.backend.set_value(1.0);
    f.monitor.check_alerts_at(t0).await;
    assert_eq!(f.monitor.firing_alerts_count().await, 1);

    f.backend.clear();
    f.monitor.check_alerts_at(t0 + Duration::seconds(60)).await;
    assert_eq!(f.monitor.firing_alerts_count().await, 0);

    // The dwell clock restarts from scratch on the next firing
    f.backend.set_value(1.0);
    f.monitor.check_alerts_at(t0 + Duration::seconds(120)).await;
    f.monitor
        .check_alerts_at(t0 + Duration::seconds(120 + 90))
        .await;
    assert!(f.sink.delivered().is_empty());
}

#[tokio::test]
async fn test_rule_labels_must_be_subset_of_sample() {
    let f = fixture();
    let mut labels = HashMap::new();
    labels.insert("app".to_string(), "svc".to_string());
    let mut app = application(vec![rule("err_rate", "1m", labels)], true);
    f.applications.insert(&mut app).await.unwrap();
    let mut dep = deployment(DeploymentStatus::Deploying);
    f.deployments.insert(&mut dep).await.unwrap();
    let dep = f.deployments.find_by_id("dep-1").await.unwrap();

    f.monitor.start_monitoring(&dep, &app).await;

    // A sample with different labels does not match the rule
    let mut other = HashMap::new();
    other.insert("app".to_string(), "other".to_string());
    f.backend.set_sample(other, 1.0);
    f.monitor.check_alerts_at(Utc::now()).await;
    assert_eq!(f.monitor.firing_alerts_count().await, 0);

    // A superset of the rule labels matches
    let mut matching = HashMap::new();
    matching.insert("app".to_string(), "svc".to_string());
    matching.insert("host".to_string(), "h1".to_string());
    f.backend.set_sample(matching, 1.0);
    f.monitor.check_alerts_at(Utc::now()).await;
    assert_eq!(f.monitor.firing_alerts_count().await, 1);
}

#[tokio::test]
async fn test_zero_valued_samples_do_not_fire() {
    let f = fixture();
    let mut app = application(vec![rule("err_rate", "1m", HashMap::new())], true);
    f.applications.insert(&mut app).await.unwrap();
    let mut dep = deployment(DeploymentStatus::Deploying);
    f.deployments.insert(&mut dep).await.unwrap();
    let dep = f.deployments.find_by_id("dep-1").await.unwrap();

    f.monitor.start_monitoring(&dep, &app).await;
    f.backend.set_value(0.0);
    f.monitor.check_alerts_at(Utc::now()).await;
    assert_eq!(f.monitor.firing_alerts_count().await, 0);
}

#[tokio::test]
async fn test_query_failure_leaves_state_untouched() {
    let f = fixture();
    let mut app = application(vec![rule("err_rate", "1m", HashMap::new())], true);
    f.applications.insert(&mut app).await.unwrap();
    let mut dep = deployment(DeploymentStatus::Deploying);
    f.deployments.insert(&mut dep).await.unwrap();
    let dep = f.deployments.find_by_id("dep-1").await.unwrap();

    f.monitor.start_monitoring(&dep, &app).await;

    let t0 = Utc::now();
    f.backend.set_value(1.0);
    f.monitor.check_alerts_at(t0).await;
    assert_eq!(f.monitor.firing_alerts_count().await, 1);

    // Backend failures are transient: no trigger, the firing flag stays
    f.backend.set_fail(true);
    f.monitor.check_alerts_at(t0 + Duration::seconds(120)).await;
    assert_eq!(f.monitor.firing_alerts_count().await, 1);
    assert!(f.sink.delivered().is_empty());
    assert_eq!(
        f.deployments.find_by_id("dep-1").await.unwrap().status,
        DeploymentStatus::Deploying
    );
}

#[tokio::test]
async fn test_missing_deployment_stops_monitoring() {
    let f = fixture();
    let app = application(vec![rule("err_rate", "1m", HashMap::new())], true);
    // The deployment record is never inserted into the store
    let dep = deployment(DeploymentStatus::Deploying);

    f.monitor.start_monitoring(&dep, &app).await;
    assert!(f.monitor.is_monitoring("dep-1").await);

    f.monitor.check_alerts_at(Utc::now()).await;
    assert!(!f.monitor.is_monitoring("dep-1").await);
}

#[tokio::test]
async fn test_terminal_deployment_kept_through_grace_then_removed() {
    let f = fixture();
    let mut app = application(vec![rule("err_rate", "1m", HashMap::new())], true);
    f.applications.insert(&mut app).await.unwrap();
    let mut dep = deployment(DeploymentStatus::Deploying);
    f.deployments.insert(&mut dep).await.unwrap();
    let dep = f.deployments.find_by_id("dep-1").await.unwrap();

    f.monitor.start_monitoring(&dep, &app).await;
    f.deployments
        .update_status("dep-1", DeploymentStatus::Success)
        .await
        .unwrap();

    // Within the grace window the observer stays alive
    f.monitor.check_alerts_at(Utc::now()).await;
    assert!(f.monitor.is_monitoring("dep-1").await);

    // Past the grace window it drops off
    f.monitor
        .check_alerts_at(Utc::now() + Duration::minutes(31))
        .await;
    assert!(!f.monitor.is_monitoring("dep-1").await);
}
