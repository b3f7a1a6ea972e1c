//! Application configuration options

use std::time::Duration;

use crate::deploy::executor::ExecutorSettings;
use crate::settings::{ServerSettings, StoreSettings};
use crate::workers::reconciler;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Document store configuration
    pub store: StoreSettings,

    /// Enable the scrape/health endpoint
    pub enable_server: bool,

    /// Enable the reconciler worker
    pub enable_reconciler: bool,

    /// Server configuration
    pub server: ServerSettings,

    /// Reconciler worker options
    pub reconciler: reconciler::Options,

    /// Executor configuration
    pub executor: ExecutorSettings,

    /// Base URL of the metric backend
    pub prom_base_url: String,

    /// Webhook receiving alert notifications, if configured
    pub alert_webhook_url: Option<String>,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            store: StoreSettings::default(),
            enable_server: true,
            enable_reconciler: true,
            server: ServerSettings::default(),
            reconciler: reconciler::Options::default(),
            executor: ExecutorSettings::default(),
            prom_base_url: "http://127.0.0.1:8428".to_string(),
            alert_webhook_url: None,
        }
    }
}

/// Lifecycle options for the orchestrator
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}
