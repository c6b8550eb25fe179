//! HTTP client for the assignee query endpoint.
//!
//! Classifies each response into success, throttling or a hard failure.
//! Retrying and budget bookkeeping are the worker's job.

use crate::error::{describe_transport, FetchError};
use reqwest::StatusCode;
use std::time::Duration;

/// Connect timeout for the shared HTTP client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of a single request that reached the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// HTTP 200 with the raw body
    Success(Vec<u8>),

    /// HTTP 429
    Throttled,
}

/// Client for the assignee query API.
///
/// Cloning is cheap; all clones share one connection pool.
#[derive(Clone, Debug)]
pub struct AssigneeClient {
    http_client: reqwest::Client,
    endpoint: String,
}

impl AssigneeClient {
    /// Create a client for `endpoint` with a transport-level request timeout.
    pub fn new<S: Into<String>>(endpoint: S, timeout: Duration) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build()
            .map_err(|e| {
                FetchError::config(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
        })
    }

    /// The endpoint this client queries.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issue one query for `patent_id`.
    ///
    /// # Errors
    ///
    /// - `FetchError::Transport` when the request cannot be completed
    /// - `FetchError::HardStatus` for any status other than 200 and 429
    pub async fn fetch(&self, patent_id: &str) -> Result<FetchOutcome, FetchError> {
        let response = self
            .http_client
            .get(&self.endpoint)
            .query(&[("q", query_filter(patent_id))])
            .send()
            .await
            .map_err(|e| FetchError::transport(patent_id, describe_transport(&e)))?;

        let status = response.status();
        tracing::debug!(patent_id, status = status.as_u16(), "assignee query response");

        match status {
            StatusCode::OK => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| FetchError::transport(patent_id, describe_transport(&e)))?;
                Ok(FetchOutcome::Success(body.to_vec()))
            }
            StatusCode::TOO_MANY_REQUESTS => Ok(FetchOutcome::Throttled),
            code => Err(FetchError::hard_status(patent_id, code.as_u16())),
        }
    }
}

/// Build the `q` filter value for `patent_id`.
///
/// The identifier is embedded as a JSON string, so quotes and backslashes
/// are escaped; URL encoding happens when the value is added to the query.
pub fn query_filter(patent_id: &str) -> String {
    serde_json::json!({ "_eq": { "patent_id": patent_id } }).to_string()
}
