//! Mock executor for tests
//!
//! Records invocations and returns scripted results. The factory keys
//! executors by (host, service) so tests can script failures per node
//! and assert on what ran.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::deploy::executor::{Executor, ExecutorConfig, ExecutorFactory};
use crate::deploy::registry::CancelToken;
use crate::errors::OrchestratorError;

#[derive(Debug, Default)]
struct MockState {
    deploy_called: bool,
    rollback_called: bool,
}

#[derive(Debug, Clone, Default)]
struct MockScript {
    deploy_error: Option<String>,
    rollback_error: Option<String>,
    deploy_delay: Option<Duration>,
}

pub struct MockExecutor {
    config: ExecutorConfig,
    script: MockScript,
    state: Mutex<MockState>,
}

impl MockExecutor {
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn deploy_called(&self) -> bool {
        self.state.lock().unwrap().deploy_called
    }

    pub fn rollback_called(&self) -> bool {
        self.state.lock().unwrap().rollback_called
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn deploy(&self, cancel: &CancelToken) -> Result<(), OrchestratorError> {
        if let Some(delay) = self.script.deploy_delay {
            tokio::select! {
                _ = cancel.canceled() => return Err(OrchestratorError::Canceled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        self.state.lock().unwrap().deploy_called = true;
        if cancel.is_canceled() {
            return Err(OrchestratorError::Canceled);
        }
        match &self.script.deploy_error {
            Some(message) => Err(OrchestratorError::ExecutorFailure(message.clone())),
            None => Ok(()),
        }
    }

    async fn rollback(&self, cancel: &CancelToken) -> Result<(), OrchestratorError> {
        self.state.lock().unwrap().rollback_called = true;
        if cancel.is_canceled() {
            return Err(OrchestratorError::Canceled);
        }
        if self.config.prev_version.is_empty() {
            return Err(OrchestratorError::ExecutorFailure(
                "no previous version to rollback to".to_string(),
            ));
        }
        match &self.script.rollback_error {
            Some(message) => Err(OrchestratorError::ExecutorFailure(message.clone())),
            None => Ok(()),
        }
    }
}

/// Factory handing out mock executors, scriptable per host
#[derive(Default)]
pub struct MockExecutorFactory {
    scripts: Mutex<HashMap<String, MockScript>>,
    executors: Mutex<HashMap<String, Arc<MockExecutor>>>,
}

impl MockExecutorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_deploy_error(&self, host: &str, message: &str) {
        self.scripts
            .lock()
            .unwrap()
            .entry(host.to_string())
            .or_default()
            .deploy_error = Some(message.to_string());
    }

    pub fn set_rollback_error(&self, host: &str, message: &str) {
        self.scripts
            .lock()
            .unwrap()
            .entry(host.to_string())
            .or_default()
            .rollback_error = Some(message.to_string());
    }

    pub fn set_deploy_delay(&self, host: &str, delay: Duration) {
        self.scripts
            .lock()
            .unwrap()
            .entry(host.to_string())
            .or_default()
            .deploy_delay = Some(delay);
    }

    /// The last executor created for (host, service), if any.
    pub fn executor(&self, host: &str, service: &str) -> Option<Arc<MockExecutor>> {
        self.executors
            .lock()
            .unwrap()
            .get(&format!("{}-{}", host, service))
            .cloned()
    }
}

impl ExecutorFactory for MockExecutorFactory {
    fn create(&self, config: ExecutorConfig) -> Result<Arc<dyn Executor>, OrchestratorError> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&config.host)
            .cloned()
            .unwrap_or_default();

        let key = format!("{}-{}", config.host, config.service);
        let executor = Arc::new(MockExecutor {
            config,
            script,
            state: Mutex::new(MockState::default()),
        });
        self.executors
            .lock()
            .unwrap()
            .insert(key, executor.clone());
        Ok(executor)
    }
}
