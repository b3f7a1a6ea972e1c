//! Application record and rollback policy

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;

/// An application whose releases the orchestrator drives.
///
/// Read-mostly for the core: only the version pair is updated, on
/// full-success and full-rollback commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub current_version: String,
    #[serde(default)]
    pub prev_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_policy: Option<RollbackPolicy>,
    pub created_time: i64,
    pub updated_time: i64,
}

/// Health-driven rollback configuration attached to an application
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackPolicy {
    pub enabled: bool,
    /// Whether a sustained firing rule flips the deployment to
    /// rolling-back automatically, or only notifies.
    pub auto_rollback: bool,
    #[serde(default)]
    pub alert_rules: Vec<AlertRule>,
    #[serde(default)]
    pub notify_channel: String,
}

/// One metric expression evaluated against the time-series backend
/// while a deployment is active.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub name: String,
    /// Instant-query expression
    pub expr: String,
    /// Dwell: how long the expression must keep firing before the
    /// monitor triggers, as a duration string ("90s", "2m").
    pub duration: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

impl AlertRule {
    /// Parse the dwell duration string.
    pub fn dwell(&self) -> Result<Duration, OrchestratorError> {
        humantime::parse_duration(&self.duration).map_err(|e| {
            OrchestratorError::ConfigError(format!("invalid duration {}: {}", self.duration, e))
        })
    }
}
