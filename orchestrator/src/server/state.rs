//! Server state

use std::sync::Arc;

use crate::deploy::monitor::AlertMonitor;
use crate::metrics::DeploymentCollector;

/// Server state shared across handlers
pub struct ServerState {
    pub collector: Arc<DeploymentCollector>,
    pub monitor: Arc<AlertMonitor>,
}

impl ServerState {
    pub fn new(collector: Arc<DeploymentCollector>, monitor: Arc<AlertMonitor>) -> Self {
        Self { collector, monitor }
    }
}
