//! Record and state machine tests

use stagehand::errors::OrchestratorError;
use stagehand::model::{
    AlertRule, Deployment, DeploymentStatus, NodeDeployment, NodeDeploymentStatus, PackageInfo,
    PacerConfig, Platform,
};

fn deployment_with(statuses: &[NodeDeploymentStatus]) -> Deployment {
    let nodes = statuses
        .iter()
        .enumerate()
        .map(|(i, status)| {
            let mut node = NodeDeployment::new(&format!("h{}", i + 1), "10.0.0.1", Platform::Mock);
            node.status = *status;
            node
        })
        .collect();
    Deployment {
        id: "dep-1".to_string(),
        app_id: "app-1".to_string(),
        app_name: "svc".to_string(),
        package_version: "v2".to_string(),
        platform: Platform::Mock,
        package: PackageInfo::default(),
        pacer: PacerConfig::default(),
        gray_node: Some("h1".to_string()),
        node_deployments: nodes,
        status: DeploymentStatus::Deploying,
        release_log: String::new(),
        created_time: 0,
        updated_time: 0,
    }
}

#[test]
fn test_deployment_state_machine_edges() {
    use DeploymentStatus::*;

    let legal = [
        (Pending, Deploying),
        (Pending, Canceled),
        (Deploying, Success),
        (Deploying, RollingBack),
        (Deploying, Canceled),
        (RollingBack, RolledBack),
        (RollingBack, Failed),
    ];
    for (from, to) in legal {
        assert!(from.can_transition_to(to), "{from} -> {to} should be legal");
    }

    let all = [
        Pending,
        Deploying,
        Success,
        Failed,
        RollingBack,
        RolledBack,
        Canceled,
    ];
    for from in all {
        for to in all {
            let expected = legal.contains(&(from, to));
            assert_eq!(
                from.can_transition_to(to),
                expected,
                "{from} -> {to} legality mismatch"
            );
        }
    }
}

#[test]
fn test_terminal_statuses() {
    use DeploymentStatus::*;
    assert!(Success.is_terminal());
    assert!(Failed.is_terminal());
    assert!(RolledBack.is_terminal());
    assert!(Canceled.is_terminal());
    assert!(!Pending.is_terminal());
    assert!(!Deploying.is_terminal());
    assert!(!RollingBack.is_terminal());
}

#[test]
fn test_transition_to_enforces_deployment_edges() {
    let mut deployment = deployment_with(&[]);
    deployment.status = DeploymentStatus::Success;

    let err = deployment
        .transition_to(DeploymentStatus::Deploying)
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidState(_)));
    // A rejected edge leaves the record untouched
    assert_eq!(deployment.status, DeploymentStatus::Success);

    deployment.status = DeploymentStatus::Deploying;
    deployment
        .transition_to(DeploymentStatus::RollingBack)
        .unwrap();
    deployment
        .transition_to(DeploymentStatus::RolledBack)
        .unwrap();
}

#[test]
fn test_transition_to_enforces_node_edges() {
    let mut node = NodeDeployment::new("h1", "10.0.0.1", Platform::Mock);
    node.status = NodeDeploymentStatus::Success;
    assert!(node
        .transition_to(NodeDeploymentStatus::Deploying)
        .is_err());
    assert_eq!(node.status, NodeDeploymentStatus::Success);

    node.status = NodeDeploymentStatus::Failed;
    node.transition_to(NodeDeploymentStatus::Deploying).unwrap();
    node.transition_to(NodeDeploymentStatus::Success).unwrap();
}

#[test]
fn test_node_retry_edge() {
    use NodeDeploymentStatus::*;
    // Manual retry re-enters deploying from failed, and only from failed
    assert!(Failed.can_transition_to(Deploying));
    assert!(!Success.can_transition_to(Deploying));
    assert!(!Skipped.can_transition_to(Deploying));
}

#[test]
fn test_status_serialization_matches_store_layout() {
    assert_eq!(
        serde_json::to_string(&DeploymentStatus::RollingBack).unwrap(),
        "\"rolling_back\""
    );
    assert_eq!(
        serde_json::to_string(&NodeDeploymentStatus::RolledBack).unwrap(),
        "\"rolled_back\""
    );
    assert_eq!(serde_json::to_string(&Platform::K8s).unwrap(), "\"k8s\"");
}

#[test]
fn test_deployment_document_round_trip() {
    let deployment = deployment_with(&[
        NodeDeploymentStatus::Success,
        NodeDeploymentStatus::Deploying,
    ]);
    let json = serde_json::to_string(&deployment).unwrap();
    assert!(json.contains("\"_id\":\"dep-1\""));
    assert!(json.contains("\"nodeDeployments\""));

    let decoded: Deployment = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded.id, deployment.id);
    assert_eq!(decoded.node_deployments.len(), 2);
    assert!(decoded.is_gray_node("h1"));
    assert!(!decoded.is_gray_node("h2"));
}

#[test]
fn test_finished_node_count_treats_skipped_as_success() {
    use NodeDeploymentStatus::*;
    let deployment = deployment_with(&[Success, Skipped]);
    assert_eq!(
        deployment.finished_node_count(),
        deployment.node_deployments.len()
    );
}

#[test]
fn test_alert_rule_dwell() {
    let rule = AlertRule {
        name: "err_rate".to_string(),
        expr: "err_rate".to_string(),
        duration: "90s".to_string(),
        severity: String::new(),
        labels: Default::default(),
        annotations: Default::default(),
    };
    assert_eq!(rule.dwell().unwrap().as_secs(), 90);
}
