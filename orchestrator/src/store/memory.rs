//! In-memory store implementations
//!
//! Back the test suites and mock-platform runs with the same semantics
//! as the Mongo stores: missing-id updates are no-ops, lookups by id
//! error with not-found, stamps are refreshed on every write.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::OrchestratorError;
use crate::model::{epoch_now, Application, Deployment, DeploymentStatus, NodeStatusRecord};
use crate::store::{ApplicationStore, DeploymentCond, DeploymentStore, NodeStatusStore};

#[derive(Default)]
pub struct MemoryDeploymentStore {
    records: RwLock<HashMap<String, Deployment>>,
}

impl MemoryDeploymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_cond(deployment: &Deployment, cond: &DeploymentCond) -> bool {
    if let Some(id) = &cond.id {
        if &deployment.id != id {
            return false;
        }
    } else if !cond.ids.is_empty() && !cond.ids.contains(&deployment.id) {
        return false;
    }
    if let Some(app_name) = &cond.app_name {
        if !deployment
            .app_name
            .to_lowercase()
            .contains(&app_name.to_lowercase())
        {
            return false;
        }
    }
    if let Some(status) = cond.status {
        if deployment.status != status {
            return false;
        }
    }
    true
}

#[async_trait]
impl DeploymentStore for MemoryDeploymentStore {
    async fn insert(&self, deployment: &mut Deployment) -> Result<(), OrchestratorError> {
        if deployment.id.is_empty() {
            deployment.id = uuid::Uuid::new_v4().to_string();
        }
        let now = epoch_now();
        deployment.created_time = now;
        deployment.updated_time = now;

        self.records
            .write()
            .await
            .insert(deployment.id.clone(), deployment.clone());
        Ok(())
    }

    async fn update(&self, deployment: &Deployment) -> Result<(), OrchestratorError> {
        let mut records = self.records.write().await;
        if let Some(slot) = records.get_mut(&deployment.id) {
            *slot = deployment.clone();
            slot.updated_time = epoch_now();
        }
        Ok(())
    }

    async fn update_status(
        &self,
        id: &str,
        status: DeploymentStatus,
    ) -> Result<(), OrchestratorError> {
        let mut records = self.records.write().await;
        if let Some(slot) = records.get_mut(id) {
            slot.status = status;
            slot.updated_time = epoch_now();
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Deployment, OrchestratorError> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound(format!("deployment {}", id)))
    }

    async fn search(&self, cond: &DeploymentCond) -> Result<Vec<Deployment>, OrchestratorError> {
        let records = self.records.read().await;
        let mut result: Vec<Deployment> = records
            .values()
            .filter(|d| matches_cond(d, cond))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(result)
    }
}

#[derive(Default)]
pub struct MemoryApplicationStore {
    records: RwLock<HashMap<String, Application>>,
}

impl MemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApplicationStore for MemoryApplicationStore {
    async fn insert(&self, application: &mut Application) -> Result<(), OrchestratorError> {
        if application.id.is_empty() {
            application.id = uuid::Uuid::new_v4().to_string();
        }
        let now = epoch_now();
        application.created_time = now;
        application.updated_time = now;

        self.records
            .write()
            .await
            .insert(application.id.clone(), application.clone());
        Ok(())
    }

    async fn update(&self, application: &Application) -> Result<(), OrchestratorError> {
        let mut records = self.records.write().await;
        if let Some(slot) = records.get_mut(&application.id) {
            *slot = application.clone();
            slot.updated_time = epoch_now();
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Application, OrchestratorError> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound(format!("application {}", id)))
    }
}

#[derive(Default)]
pub struct MemoryNodeStatusStore {
    records: RwLock<HashMap<String, NodeStatusRecord>>,
}

impl MemoryNodeStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(host: &str, service: &str) -> String {
        format!("{}-{}", host, service)
    }
}

#[async_trait]
impl NodeStatusStore for MemoryNodeStatusStore {
    async fn upsert(&self, record: NodeStatusRecord) -> Result<(), OrchestratorError> {
        let mut record = record;
        let now = epoch_now();
        record.updated_at = now;

        let key = Self::key(&record.host, &record.service);
        let mut records = self.records.write().await;
        match records.get(&key) {
            Some(existing) => {
                record.id = existing.id.clone();
                record.created_at = existing.created_at;
            }
            None => {
                record.id = uuid::Uuid::new_v4().to_string();
                record.created_at = now;
            }
        }
        records.insert(key, record);
        Ok(())
    }

    async fn find_by_host_and_service(
        &self,
        host: &str,
        service: &str,
    ) -> Result<NodeStatusRecord, OrchestratorError> {
        self.records
            .read()
            .await
            .get(&Self::key(host, service))
            .cloned()
            .ok_or_else(|| {
                OrchestratorError::NotFound(format!("node status {}/{}", host, service))
            })
    }
}
