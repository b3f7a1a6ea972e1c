//! Alert notifications and delivery sinks

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::OrchestratorError;

/// Structured notification composed when a rule trigger fires
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertNotification {
    /// `<deployment-id>-<rule-name>-<unix-ts>`
    pub key: String,
    pub status: String,
    pub desc: String,
    pub starts_at: String,
    pub receive_at: String,
    pub severity: String,
    pub alertname: String,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub value: f64,
}

/// Downstream consumer of alert notifications
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, alert: &AlertNotification) -> Result<(), OrchestratorError>;
}

/// Delivers notifications to an HTTP webhook
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: &str) -> Result<Self, OrchestratorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn notify(&self, alert: &AlertNotification) -> Result<(), OrchestratorError> {
        debug!("POST {} alert {}", self.url, alert.key);

        let response = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(alert)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OrchestratorError::ServerError(format!(
                "alert webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Fallback sink when no webhook is configured: the notification goes
/// to the log and nowhere else.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn notify(&self, alert: &AlertNotification) -> Result<(), OrchestratorError> {
        warn!(
            key = %alert.key,
            severity = %alert.severity,
            value = alert.value,
            "Alert firing: {}",
            alert.desc
        );
        Ok(())
    }
}
