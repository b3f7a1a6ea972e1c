//! Reconciler worker
//!
//! The periodic pass that makes store state authoritative: resume
//! in-flight deployments, resume rollbacks, evaluate alert rules. Each
//! step catches and logs its own error so one failing step never
//! starves the others.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::deploy::manager::DeploymentManager;
use crate::deploy::monitor::AlertMonitor;
use crate::deploy::rollback::RollbackManager;

/// Reconciler worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Tick period
    pub interval: Duration,

    /// Initial delay before the first tick
    pub initial_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            initial_delay: Duration::from_secs(5),
        }
    }
}

/// Run the reconciler worker
pub async fn run<S, F>(
    options: &Options,
    manager: Arc<DeploymentManager>,
    rollback_manager: Arc<RollbackManager>,
    monitor: Arc<AlertMonitor>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Reconciler worker starting...");

    // Initial delay
    sleep_fn(options.initial_delay).await;

    loop {
        // Check for shutdown
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Reconciler worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {
                // Continue with tick
            }
        }

        debug!("Reconciler tick");

        if let Err(e) = manager.continue_deploying_deployments().await {
            error!("Continue deploying deployments error: {}", e);
        }

        if let Err(e) = rollback_manager.continue_rolling_back_deployments().await {
            error!("Continue rolling back deployments error: {}", e);
        }

        monitor.check_alerts().await;
    }
}
