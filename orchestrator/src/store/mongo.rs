//! Mongo-backed store implementations

use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::{Client, Collection};
use tracing::info;

use crate::errors::OrchestratorError;
use crate::model::{epoch_now, Application, Deployment, DeploymentStatus, NodeStatusRecord};
use crate::store::{ApplicationStore, DeploymentCond, DeploymentStore, NodeStatusStore};

const COLLECTION_DEPLOYMENT: &str = "deployment";
const COLLECTION_APPLICATION: &str = "application";
const COLLECTION_NODE_STATUS: &str = "node_status";

/// The three collection-backed stores sharing one client
pub struct MongoStores {
    pub deployments: MongoDeploymentStore,
    pub applications: MongoApplicationStore,
    pub node_status: MongoNodeStatusStore,
}

/// Connect to the Mongo-compatible store named in the settings.
pub async fn connect(url: &str, database: &str) -> Result<MongoStores, OrchestratorError> {
    let client = Client::with_uri_str(url).await?;
    let db = client.database(database);
    info!("Connected to document store, database: {}", database);

    Ok(MongoStores {
        deployments: MongoDeploymentStore {
            collection: db.collection(COLLECTION_DEPLOYMENT),
        },
        applications: MongoApplicationStore {
            collection: db.collection(COLLECTION_APPLICATION),
        },
        node_status: MongoNodeStatusStore {
            collection: db.collection(COLLECTION_NODE_STATUS),
        },
    })
}

pub struct MongoDeploymentStore {
    collection: Collection<Deployment>,
}

impl DeploymentCond {
    fn to_filter(&self) -> Document {
        let mut filter = Document::new();
        if let Some(id) = &self.id {
            filter.insert("_id", id.as_str());
        } else if !self.ids.is_empty() {
            filter.insert("_id", doc! { "$in": self.ids.clone() });
        }
        if let Some(app_name) = &self.app_name {
            filter.insert("appName", doc! { "$regex": app_name.as_str(), "$options": "i" });
        }
        if let Some(status) = self.status {
            filter.insert("status", status.as_str());
        }
        filter
    }
}

#[async_trait]
impl DeploymentStore for MongoDeploymentStore {
    async fn insert(&self, deployment: &mut Deployment) -> Result<(), OrchestratorError> {
        if deployment.id.is_empty() {
            deployment.id = uuid::Uuid::new_v4().to_string();
        }
        let now = epoch_now();
        deployment.created_time = now;
        deployment.updated_time = now;

        self.collection.insert_one(&*deployment).await?;
        Ok(())
    }

    async fn update(&self, deployment: &Deployment) -> Result<(), OrchestratorError> {
        let mut record = deployment.clone();
        record.updated_time = epoch_now();

        self.collection
            .replace_one(doc! { "_id": record.id.as_str() }, &record)
            .await?;
        Ok(())
    }

    async fn update_status(
        &self,
        id: &str,
        status: DeploymentStatus,
    ) -> Result<(), OrchestratorError> {
        self.collection
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "status": status.as_str(), "updatedTime": epoch_now() } },
            )
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Deployment, OrchestratorError> {
        self.collection
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("deployment {}", id)))
    }

    async fn search(&self, cond: &DeploymentCond) -> Result<Vec<Deployment>, OrchestratorError> {
        let mut cursor = self.collection.find(cond.to_filter()).await?;
        let mut result = Vec::new();
        while let Some(deployment) = cursor.try_next().await? {
            result.push(deployment);
        }
        Ok(result)
    }
}

pub struct MongoApplicationStore {
    collection: Collection<Application>,
}

#[async_trait]
impl ApplicationStore for MongoApplicationStore {
    async fn insert(&self, application: &mut Application) -> Result<(), OrchestratorError> {
        if application.id.is_empty() {
            application.id = uuid::Uuid::new_v4().to_string();
        }
        let now = epoch_now();
        application.created_time = now;
        application.updated_time = now;

        self.collection.insert_one(&*application).await?;
        Ok(())
    }

    async fn update(&self, application: &Application) -> Result<(), OrchestratorError> {
        let mut record = application.clone();
        record.updated_time = epoch_now();

        self.collection
            .replace_one(doc! { "_id": record.id.as_str() }, &record)
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Application, OrchestratorError> {
        self.collection
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("application {}", id)))
    }
}

pub struct MongoNodeStatusStore {
    collection: Collection<NodeStatusRecord>,
}

#[async_trait]
impl NodeStatusStore for MongoNodeStatusStore {
    async fn upsert(&self, record: NodeStatusRecord) -> Result<(), OrchestratorError> {
        let mut record = record;
        let now = epoch_now();
        record.updated_at = now;

        match self
            .collection
            .find_one(doc! { "host": record.host.as_str(), "service": record.service.as_str() })
            .await?
        {
            Some(existing) => {
                record.id = existing.id;
                record.created_at = existing.created_at;
                self.collection
                    .replace_one(doc! { "_id": record.id.as_str() }, &record)
                    .await?;
            }
            None => {
                record.id = uuid::Uuid::new_v4().to_string();
                record.created_at = now;
                self.collection.insert_one(&record).await?;
            }
        }
        Ok(())
    }

    async fn find_by_host_and_service(
        &self,
        host: &str,
        service: &str,
    ) -> Result<NodeStatusRecord, OrchestratorError> {
        self.collection
            .find_one(doc! { "host": host, "service": service })
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("node status {}/{}", host, service)))
    }
}
