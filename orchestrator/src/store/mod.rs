//! Durable store traits
//!
//! The orchestrator writes every progress fact through one of these
//! traits before the next step depends on it. Production runs against
//! the Mongo-backed implementations; tests run against the in-memory
//! ones.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;

use crate::errors::OrchestratorError;
use crate::model::{Application, Deployment, DeploymentStatus, NodeStatusRecord};

/// Search condition for deployment records
#[derive(Debug, Clone, Default)]
pub struct DeploymentCond {
    pub id: Option<String>,
    pub ids: Vec<String>,
    pub app_name: Option<String>,
    pub status: Option<DeploymentStatus>,
}

impl DeploymentCond {
    pub fn with_status(status: DeploymentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// Deployment record store: one document per deployment with embedded
/// node slots, full-document updates.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Insert a new record, generating an id when empty and stamping
    /// created/updated times.
    async fn insert(&self, deployment: &mut Deployment) -> Result<(), OrchestratorError>;

    /// Full-document update; refreshes the updated stamp.
    async fn update(&self, deployment: &Deployment) -> Result<(), OrchestratorError>;

    /// Update only the top-level status.
    async fn update_status(
        &self,
        id: &str,
        status: DeploymentStatus,
    ) -> Result<(), OrchestratorError>;

    async fn find_by_id(&self, id: &str) -> Result<Deployment, OrchestratorError>;

    async fn search(&self, cond: &DeploymentCond) -> Result<Vec<Deployment>, OrchestratorError>;
}

/// Application store
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn insert(&self, application: &mut Application) -> Result<(), OrchestratorError>;

    async fn update(&self, application: &Application) -> Result<(), OrchestratorError>;

    async fn find_by_id(&self, id: &str) -> Result<Application, OrchestratorError>;
}

/// Node status projection store, keyed by (host, service)
#[async_trait]
pub trait NodeStatusStore: Send + Sync {
    /// Insert or replace the record for the (host, service) pair.
    async fn upsert(&self, record: NodeStatusRecord) -> Result<(), OrchestratorError>;

    async fn find_by_host_and_service(
        &self,
        host: &str,
        service: &str,
    ) -> Result<NodeStatusRecord, OrchestratorError>;
}
