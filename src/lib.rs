//! Offline-aware search client
//!
//! Answers search queries from a bounded on-disk cache when possible and from
//! a remote search service otherwise, caching every successful answer so the
//! same query keeps working without a network connection.

pub mod cache;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod remote;

pub use cache::{CacheError, CacheKey, CacheStore, EntryInfo, MAX_ENTRIES};
pub use config::{Config, ConfigError};
pub use dispatcher::{Dispatcher, Outcome};
pub use remote::{HealthStatus, RemoteError, SearchClient, SearchService};
