//! Error types for the stagehand orchestrator

use thiserror::Error;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("store error: {0}")]
    StoreError(#[from] mongodb::error::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("executor failure: {0}")]
    ExecutorFailure(String),

    #[error("operation canceled")]
    Canceled,

    #[error("metric query failed: {0}")]
    QueryFailure(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("server error: {0}")]
    ServerError(String),

    #[error("shutdown error: {0}")]
    ShutdownError(String),
}

impl OrchestratorError {
    /// True when the error came from cooperative cancellation.
    pub fn is_canceled(&self) -> bool {
        matches!(self, OrchestratorError::Canceled)
    }
}
