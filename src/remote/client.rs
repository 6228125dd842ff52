//! HTTP client for the search service
//!
//! Speaks the service's JSON protocol: `POST /query` with `{"q": ...}` and
//! `GET /health`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::{HealthStatus, RemoteError, SearchService};

/// Longest slice of a rejected response body kept for diagnostics
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Body of a `POST /query` request
#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    q: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<usize>,
}

/// Client for the remote search service
///
/// Holds a pooled `reqwest::Client`; clones share the pool.
#[derive(Debug, Clone)]
pub struct SearchClient {
    /// HTTP client for making requests
    http_client: Client,
    /// Service root, e.g. `http://127.0.0.1:5000`
    base_url: String,
    /// Number of results to ask for, or the service default
    top_k: Option<usize>,
}

impl SearchClient {
    /// Creates a client for the service at `base_url`
    ///
    /// `timeout` bounds each whole request; `None` leaves it to the transport.
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_client(builder.build()?, base_url))
    }

    /// Creates a client around an existing HTTP client
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client: client,
            base_url: base_url.into(),
            top_k: None,
        }
    }

    /// Sets how many results to request per query
    pub fn with_top_k(mut self, top_k: Option<usize>) -> Self {
        self.top_k = top_k;
        self
    }

    /// Service root this client talks to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Keeps the head of an error body so log lines stay readable
fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[async_trait]
impl SearchService for SearchClient {
    async fn search(&self, query: &str) -> Result<String, RemoteError> {
        let url = self.url("query");
        debug!(%url, "sending search request");

        let response = self
            .http_client
            .post(&url)
            .json(&QueryRequest {
                q: query,
                top_k: self.top_k,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }
        if body.trim().is_empty() {
            return Err(RemoteError::EmptyResponse);
        }

        Ok(body)
    }

    async fn health(&self) -> Result<HealthStatus, RemoteError> {
        let response = self.http_client.get(self.url("health")).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}
