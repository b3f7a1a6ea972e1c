//! Rollback manager scenario tests

use std::sync::Arc;

use stagehand::deploy::executor::mock::MockExecutorFactory;
use stagehand::deploy::rollback::RollbackManager;
use stagehand::model::{
    Application, Deployment, DeploymentStatus, NodeDeployment, NodeDeploymentStatus, PackageInfo,
    PacerConfig, Platform,
};
use stagehand::store::memory::{
    MemoryApplicationStore, MemoryDeploymentStore, MemoryNodeStatusStore,
};
use stagehand::store::{ApplicationStore, DeploymentStore};

struct Fixture {
    deployments: Arc<MemoryDeploymentStore>,
    applications: Arc<MemoryApplicationStore>,
    factory: Arc<MockExecutorFactory>,
    manager: Arc<RollbackManager>,
}

fn fixture() -> Fixture {
    let deployments = Arc::new(MemoryDeploymentStore::new());
    let applications = Arc::new(MemoryApplicationStore::new());
    let node_status = Arc::new(MemoryNodeStatusStore::new());
    let factory = Arc::new(MockExecutorFactory::new());
    let manager = Arc::new(RollbackManager::new(
        deployments.clone(),
        applications.clone(),
        node_status,
        factory.clone(),
    ));
    Fixture {
        deployments,
        applications,
        factory,
        manager,
    }
}

fn application(current: &str, prev: &str) -> Application {
    Application {
        id: "app-1".to_string(),
        name: "svc".to_string(),
        current_version: current.to_string(),
        prev_version: prev.to_string(),
        rollback_policy: None,
        created_time: 0,
        updated_time: 0,
    }
}

fn node(id: &str, status: NodeDeploymentStatus, current: &str, prev: &str) -> NodeDeployment {
    let mut node = NodeDeployment::new(id, "10.0.0.1", Platform::Mock);
    node.status = status;
    node.current_version = current.to_string();
    node.prev_version = prev.to_string();
    node
}

fn deployment(status: DeploymentStatus, nodes: Vec<NodeDeployment>) -> Deployment {
    Deployment {
        id: "dep-1".to_string(),
        app_id: "app-1".to_string(),
        app_name: "svc".to_string(),
        package_version: "v2".to_string(),
        platform: Platform::Mock,
        package: PackageInfo {
            url: "https://pkg.example.com/svc.tar.gz".to_string(),
            sha256: "abc123".to_string(),
            size: 1024,
            created_at: 0,
        },
        pacer: PacerConfig::default(),
        gray_node: None,
        node_deployments: nodes,
        status,
        release_log: String::new(),
        created_time: 0,
        updated_time: 0,
    }
}

#[tokio::test]
async fn test_full_rollback_reverts_everything() {
    let f = fixture();
    let mut app = application("v2", "v1");
    f.applications.insert(&mut app).await.unwrap();

    let mut dep = deployment(
        DeploymentStatus::RollingBack,
        vec![
            node("h1", NodeDeploymentStatus::Success, "v2", "v1"),
            node("h2", NodeDeploymentStatus::Success, "v2", "v1"),
            node("h3", NodeDeploymentStatus::Success, "v2", "v1"),
        ],
    );
    f.deployments.insert(&mut dep).await.unwrap();

    f.manager.continue_rolling_back_deployments().await.unwrap();

    let done = f.deployments.find_by_id("dep-1").await.unwrap();
    assert_eq!(done.status, DeploymentStatus::RolledBack);
    for node in &done.node_deployments {
        assert_eq!(node.status, NodeDeploymentStatus::RolledBack);
        assert_eq!(node.current_version, "v1");
        assert!(node.deploying_version.is_empty());
        assert_eq!(node.release_log, "rollback successful");
    }

    // The application's current version swaps back; prev is untouched
    let app = f.applications.find_by_id("app-1").await.unwrap();
    assert_eq!(app.current_version, "v1");
    assert_eq!(app.prev_version, "v1");
}

#[tokio::test]
async fn test_partial_rollback_fails_deployment() {
    let f = fixture();
    let mut app = application("v2", "v1");
    f.applications.insert(&mut app).await.unwrap();

    let mut dep = deployment(
        DeploymentStatus::RollingBack,
        vec![
            node("h1", NodeDeploymentStatus::Success, "v2", "v1"),
            node("h2", NodeDeploymentStatus::Success, "v2", "v1"),
            node("h3", NodeDeploymentStatus::Success, "v2", "v1"),
        ],
    );
    f.deployments.insert(&mut dep).await.unwrap();

    f.factory.set_rollback_error("h3", "unreachable");

    f.manager.continue_rolling_back_deployments().await.unwrap();

    let done = f.deployments.find_by_id("dep-1").await.unwrap();
    assert_eq!(done.status, DeploymentStatus::Failed);

    let h3 = done.find_node("h3").unwrap();
    assert_eq!(h3.status, NodeDeploymentStatus::Failed);
    assert!(h3.release_log.contains("rollback failed"));

    // The application is only reverted on full success
    let app = f.applications.find_by_id("app-1").await.unwrap();
    assert_eq!(app.current_version, "v2");
}

#[tokio::test]
async fn test_per_node_rollback_mid_flight() {
    let f = fixture();
    let mut app = application("v1", "");
    f.applications.insert(&mut app).await.unwrap();

    // The deployment is still deploying; one node was flipped to
    // rolling-back by the operator or the monitor.
    let mut dep = deployment(
        DeploymentStatus::Deploying,
        vec![
            node("h1", NodeDeploymentStatus::Deploying, "v1", ""),
            node("h2", NodeDeploymentStatus::RollingBack, "v1", ""),
        ],
    );
    f.deployments.insert(&mut dep).await.unwrap();

    f.manager.continue_rolling_back_deployments().await.unwrap();

    let done = f.deployments.find_by_id("dep-1").await.unwrap();
    // The deployment itself stays deploying
    assert_eq!(done.status, DeploymentStatus::Deploying);

    let h2 = done.find_node("h2").unwrap();
    assert_eq!(h2.status, NodeDeploymentStatus::RolledBack);
    // Per-node rollback targets the application's current version
    assert_eq!(h2.current_version, "v1");

    // The untouched node is left alone
    assert_eq!(
        done.find_node("h1").unwrap().status,
        NodeDeploymentStatus::Deploying
    );
    assert!(f.factory.executor("h1", "svc").is_none());
}

#[tokio::test]
async fn test_empty_selection_completes_vacuously() {
    let f = fixture();
    let mut app = application("v2", "v1");
    f.applications.insert(&mut app).await.unwrap();

    // Every node already left success (all failed mid-deploy); there is
    // nothing to revert, so the record converges instead of sticking in
    // rolling-back forever.
    let mut dep = deployment(
        DeploymentStatus::RollingBack,
        vec![node("h1", NodeDeploymentStatus::Failed, "v1", "")],
    );
    f.deployments.insert(&mut dep).await.unwrap();

    f.manager.continue_rolling_back_deployments().await.unwrap();

    let done = f.deployments.find_by_id("dep-1").await.unwrap();
    assert_eq!(done.status, DeploymentStatus::RolledBack);

    let app = f.applications.find_by_id("app-1").await.unwrap();
    assert_eq!(app.current_version, "v1");
}

#[tokio::test]
async fn test_rollback_without_previous_version_fails() {
    let f = fixture();
    let mut app = application("v2", "");
    f.applications.insert(&mut app).await.unwrap();

    let mut dep = deployment(
        DeploymentStatus::RollingBack,
        vec![node("h1", NodeDeploymentStatus::Success, "v2", "")],
    );
    f.deployments.insert(&mut dep).await.unwrap();

    f.manager.continue_rolling_back_deployments().await.unwrap();

    let done = f.deployments.find_by_id("dep-1").await.unwrap();
    assert_eq!(done.status, DeploymentStatus::Failed);

    // No executor ran: the empty target is refused up front
    assert!(f.factory.executor("h1", "svc").is_none());

    let app = f.applications.find_by_id("app-1").await.unwrap();
    assert_eq!(app.current_version, "v2");
}

#[tokio::test]
async fn test_deploy_then_full_rollback_restores_app_version() {
    // Round-trip law: deploy to v2 then a full rollback restores the
    // application's current version to its pre-deploy value.
    let f = fixture();
    let mut app = application("v2", "v1"); // state after a committed deploy to v2
    f.applications.insert(&mut app).await.unwrap();

    let mut dep = deployment(
        DeploymentStatus::RollingBack,
        vec![
            node("h1", NodeDeploymentStatus::Success, "v2", "v1"),
            node("h2", NodeDeploymentStatus::Success, "v2", "v1"),
        ],
    );
    f.deployments.insert(&mut dep).await.unwrap();

    f.manager.continue_rolling_back_deployments().await.unwrap();

    let app = f.applications.find_by_id("app-1").await.unwrap();
    assert_eq!(app.current_version, "v1");

    let done = f.deployments.find_by_id("dep-1").await.unwrap();
    for node in &done.node_deployments {
        assert_eq!(node.current_version, "v1");
    }

    // Nothing stays behind for the next pass
    assert_eq!(done.nodes_in(NodeDeploymentStatus::Success).len(), 0);
}
