//! Command-line interface parsing for offsearch
//!
//! This module handles parsing of CLI arguments using clap and folding the
//! global flags over the environment-derived [`Config`].

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::cache::CacheError;
use crate::config::{Config, ConfigError};
use crate::remote::RemoteError;

/// Error types surfaced by the command-line front end
#[derive(Debug, Error)]
pub enum CliError {
    /// Flags or environment produced an unusable configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A cache maintenance command failed
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The search service could not be reached for a health check
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// offsearch - search with an offline cache
#[derive(Parser, Debug)]
#[command(name = "offsearch")]
#[command(about = "Query a search service, falling back to cached results when offline")]
#[command(version)]
pub struct Cli {
    /// Search service URL (env: OFFSEARCH_ENDPOINT)
    #[arg(long, global = true, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Directory for cached results (env: OFFSEARCH_CACHE_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Number of cached queries to keep (env: OFFSEARCH_MAX_ENTRIES)
    #[arg(long, global = true, value_name = "N")]
    pub max_entries: Option<usize>,

    /// Request timeout in seconds, 0 for none (env: OFFSEARCH_TIMEOUT_SECS)
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Number of results to request (env: OFFSEARCH_TOP_K)
    #[arg(long, global = true, value_name = "N")]
    pub top_k: Option<usize>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run a query, answering from the cache when possible
    Query {
        /// Query text, passed to the service as-is
        #[arg(allow_hyphen_values = true)]
        text: String,
    },
    /// Check whether the search service is up
    Health,
    /// Inspect or clear the result cache
    #[command(subcommand)]
    Cache(CacheCommand),
}

/// Cache maintenance commands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCommand {
    /// List cached queries, oldest first
    List,
    /// Delete every cached query
    Clear,
    /// Print the cache directory
    Path,
}

impl Cli {
    /// Applies command-line overrides on top of `base` and validates the result
    ///
    /// # Arguments
    /// * `base` - Configuration from defaults and environment
    ///
    /// # Returns
    /// * `Ok(Config)` with flags taking precedence
    /// * `Err(CliError)` if the combined configuration is invalid
    pub fn resolve_config(&self, base: Config) -> Result<Config, CliError> {
        let mut config = base;

        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(cache_dir) = &self.cache_dir {
            config.cache_dir = Some(cache_dir.clone());
        }
        if let Some(max_entries) = self.max_entries {
            config.max_entries = max_entries;
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout = (timeout > 0).then(|| Duration::from_secs(timeout));
        }
        if let Some(top_k) = self.top_k {
            config.top_k = Some(top_k);
        }

        config.validate()?;
        Ok(config)
    }

    /// Default log filter for the requested verbosity
    ///
    /// `RUST_LOG` takes precedence over this when set.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "offsearch=warn",
            1 => "offsearch=info",
            _ => "offsearch=debug",
        }
    }
}
