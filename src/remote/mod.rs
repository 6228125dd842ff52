//! Remote search service interface
//!
//! The dispatcher only needs two things from the search service: run a query
//! and report whether it is alive. Both are expressed by [`SearchService`] so
//! the dispatcher can be driven by the real HTTP client or by a stand-in.

mod client;

pub use client::SearchClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when talking to the search service
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The request never got a response (connection refused, DNS, timeout)
    #[error("search service unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    /// The service answered with a non-success status
    #[error("search service rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The service answered successfully but with nothing in the body
    #[error("search service returned an empty response")]
    EmptyResponse,

    /// The health endpoint returned something other than a health report
    #[error("failed to parse health response: {0}")]
    InvalidHealth(#[from] serde_json::Error),
}

impl RemoteError {
    /// Short machine-friendly name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteError::Unreachable(_) => "remote_unreachable",
            RemoteError::Rejected { .. } => "remote_rejected",
            RemoteError::EmptyResponse => "empty_response",
            RemoteError::InvalidHealth(_) => "invalid_health",
        }
    }
}

/// Health report returned by `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// `"ok"` when the service is serving queries
    pub status: String,
    /// Number of documents in the remote index
    #[serde(default)]
    pub docs: u64,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// A remote service that answers search queries
///
/// `search` returns the response body verbatim. Callers never parse it.
#[async_trait]
pub trait SearchService: Send + Sync {
    /// Runs one query against the service, with no retries
    async fn search(&self, query: &str) -> Result<String, RemoteError>;

    /// Probes the service's health endpoint
    async fn health(&self) -> Result<HealthStatus, RemoteError>;
}
