//! Dispatcher configuration
//!
//! Values come from built-in defaults, then `OFFSEARCH_*` environment
//! variables, then command-line flags (applied by the CLI layer).

use reqwest::Url;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::cache::{CacheStore, MAX_ENTRIES};

/// Search service the client talks to when nothing else is configured
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5000";

/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors that make a configuration unusable
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The endpoint is not an http(s) URL
    #[error("Invalid endpoint '{0}': expected an http:// or https:// URL")]
    InvalidEndpoint(String),

    /// The cache must be allowed to hold at least one entry
    #[error("max entries must be at least 1")]
    InvalidMaxEntries,

    /// No cache directory was configured and none could be derived
    #[error("Could not determine a cache directory; pass --cache-dir or set OFFSEARCH_CACHE_DIR")]
    NoCacheDir,

    /// The HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Settings needed to construct a dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root URL of the search service
    pub endpoint: String,
    /// Cache directory; `None` means the XDG default
    pub cache_dir: Option<PathBuf>,
    /// Entry count at which the cache starts evicting
    pub max_entries: usize,
    /// Per-request timeout; `None` leaves it to the transport
    pub request_timeout: Option<Duration>,
    /// Number of results to request; `None` uses the service default
    pub top_k: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            cache_dir: None,
            max_entries: MAX_ENTRIES,
            request_timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            top_k: None,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `OFFSEARCH_ENDPOINT` - Search service URL (default: http://127.0.0.1:5000)
    /// - `OFFSEARCH_CACHE_DIR` - Cache directory (default: XDG cache dir)
    /// - `OFFSEARCH_MAX_ENTRIES` - Cached queries kept (default: 50)
    /// - `OFFSEARCH_TIMEOUT_SECS` - Request timeout, 0 disables (default: 30)
    /// - `OFFSEARCH_TOP_K` - Results per query (default: service default)
    ///
    /// Unparseable numbers fall back to their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            endpoint: lookup("OFFSEARCH_ENDPOINT")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.endpoint),
            cache_dir: lookup("OFFSEARCH_CACHE_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            max_entries: parse("OFFSEARCH_MAX_ENTRIES")
                .map(|v| v as usize)
                .unwrap_or(defaults.max_entries),
            request_timeout: match parse("OFFSEARCH_TIMEOUT_SECS") {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.request_timeout,
            },
            top_k: parse("OFFSEARCH_TOP_K").map(|v| v as usize),
        }
    }

    /// Checks the values that cannot be fixed up with defaults
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.endpoint)
            .map_err(|_| ConfigError::InvalidEndpoint(self.endpoint.clone()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEndpoint(self.endpoint.clone()));
        }
        if self.max_entries == 0 {
            return Err(ConfigError::InvalidMaxEntries);
        }
        Ok(())
    }

    /// Returns the configured cache directory or the XDG default
    pub fn resolve_cache_dir(&self) -> Result<PathBuf, ConfigError> {
        self.cache_dir
            .clone()
            .or_else(CacheStore::default_dir)
            .ok_or(ConfigError::NoCacheDir)
    }
}
