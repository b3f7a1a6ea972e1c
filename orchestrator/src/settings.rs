//! Settings file management

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::deploy::executor::ExecutorSettings;
use crate::errors::OrchestratorError;
use crate::logs::LogLevel;

/// Orchestrator settings, read from a JSON file at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Document store configuration
    #[serde(default)]
    pub store: StoreSettings,

    /// Scrape/health endpoint configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Enable the scrape/health endpoint
    #[serde(default = "default_true")]
    pub enable_server: bool,

    /// Enable the reconciler worker
    #[serde(default = "default_true")]
    pub enable_reconciler: bool,

    /// Reconciler tick period in seconds
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// Executor configuration
    #[serde(default)]
    pub executor: ExecutorSettings,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringSettings,
}

fn default_true() -> bool {
    true
}

fn default_reconcile_interval() -> u64 {
    60
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            store: StoreSettings::default(),
            server: ServerSettings::default(),
            enable_server: true,
            enable_reconciler: true,
            reconcile_interval_secs: default_reconcile_interval(),
            executor: ExecutorSettings::default(),
            monitoring: MonitoringSettings::default(),
        }
    }
}

impl Settings {
    /// Read the settings file, falling back to defaults when it does
    /// not exist.
    pub async fn load_or_default(path: &Path) -> Result<Self, OrchestratorError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Mongo-compatible document store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_store_url")]
    pub url: String,

    #[serde(default = "default_store_database")]
    pub database: String,
}

fn default_store_url() -> String {
    "mongodb://127.0.0.1:27017".to_string()
}

fn default_store_database() -> String {
    "stagehand".to_string()
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            database: default_store_database(),
        }
    }
}

/// Scrape/health endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    9090
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// Metric backend and alert delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringSettings {
    /// Base URL of the Prometheus-compatible instant-query endpoint
    #[serde(default = "default_prom_base_url")]
    pub prom_base_url: String,

    /// Webhook receiving alert notifications. When absent,
    /// notifications only go to the log.
    #[serde(default)]
    pub alert_webhook_url: Option<String>,
}

fn default_prom_base_url() -> String {
    "http://127.0.0.1:8428".to_string()
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            prom_base_url: default_prom_base_url(),
            alert_webhook_url: None,
        }
    }
}
