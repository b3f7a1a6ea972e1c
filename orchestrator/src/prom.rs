//! Prometheus-compatible instant-query client
//!
//! The monitor only needs the instant-query endpoint: GET
//! `/api/v1/query?query=<expr>` with the usual
//! `{status, data: {result: [{metric, value: [ts, "val"]}]}}` response
//! shape. Anything other than `status == "success"` is a query error;
//! the monitor treats those as transient and never escalates them.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::errors::OrchestratorError;

/// One sample of an instant-query result
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
}

/// One series returned by an instant query
#[derive(Debug, Clone)]
pub struct InstantQueryResult {
    pub metric: HashMap<String, String>,
    pub value: Sample,
}

/// The time-series backend as the monitor sees it
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    async fn query_instant(
        &self,
        query: &str,
    ) -> Result<Vec<InstantQueryResult>, OrchestratorError>;
}

/// HTTP client for the metric backend
pub struct PromClient {
    client: reqwest::Client,
    base_url: String,
}

impl PromClient {
    pub fn new(base_url: &str) -> Result<Self, OrchestratorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MetricsBackend for PromClient {
    async fn query_instant(
        &self,
        query: &str,
    ) -> Result<Vec<InstantQueryResult>, OrchestratorError> {
        let url = format!("{}/api/v1/query", self.base_url);
        debug!("GET {} query={}", url, query);

        let response = self
            .client
            .get(&url)
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|e| OrchestratorError::QueryFailure(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OrchestratorError::QueryFailure(format!(
                "query failed with status {}",
                response.status()
            )));
        }

        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| OrchestratorError::QueryFailure(format!("failed to decode response: {e}")))?;

        if body.status != "success" {
            return Err(OrchestratorError::QueryFailure(format!(
                "query failed: {}",
                body.error
            )));
        }

        Ok(parse_instant_results(body.data.result))
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    error: String,
    #[serde(default)]
    data: ApiData,
}

#[derive(Debug, Default, Deserialize)]
struct ApiData {
    #[serde(default)]
    result: Vec<ApiResult>,
}

#[derive(Debug, Deserialize)]
struct ApiResult {
    #[serde(default)]
    metric: HashMap<String, String>,
    #[serde(default)]
    value: Option<(f64, String)>,
}

fn parse_instant_results(results: Vec<ApiResult>) -> Vec<InstantQueryResult> {
    results
        .into_iter()
        .filter_map(|r| {
            let (timestamp, raw) = r.value?;
            Some(InstantQueryResult {
                metric: r.metric,
                value: Sample {
                    timestamp: timestamp as i64,
                    value: raw.parse().unwrap_or(0.0),
                },
            })
        })
        .collect()
}
