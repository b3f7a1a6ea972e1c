//! Per-deployment supervisor cancel registry
//!
//! One supervisor task may run per deployment id. Registering a new
//! supervisor cancels and replaces any previous one, so the reconciler
//! can re-enter in-flight deployments without duplicating work.

use std::collections::HashMap;

use tokio::sync::{watch, RwLock};

/// Cooperative cancellation token handed down the supervisor task tree.
///
/// Tokens observe cancellation at suspension points; a token whose
/// registry slot was replaced or dropped also reads as canceled.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_canceled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the token is canceled (or its sender is gone).
    pub async fn canceled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Registry of live supervisor cancel handles, keyed by deployment id
#[derive(Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, watch::Sender<bool>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a supervisor for the deployment, canceling any previous
    /// one registered under the same id.
    pub async fn register(&self, deployment_id: &str) -> CancelToken {
        let (tx, rx) = watch::channel(false);
        let mut tasks = self.tasks.write().await;
        if let Some(old) = tasks.insert(deployment_id.to_string(), tx) {
            let _ = old.send(true);
        }
        CancelToken { rx }
    }

    pub async fn unregister(&self, deployment_id: &str) {
        self.tasks.write().await.remove(deployment_id);
    }

    /// Signal the registered supervisor, if any. Returns whether one
    /// was registered.
    pub async fn cancel(&self, deployment_id: &str) -> bool {
        let tasks = self.tasks.read().await;
        match tasks.get(deployment_id) {
            Some(tx) => {
                let _ = tx.send(true);
                true
            }
            None => false,
        }
    }
}
