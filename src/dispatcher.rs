//! Cache-first query dispatcher
//!
//! A [`Dispatcher`] answers a query from the on-disk cache when it can and
//! from the remote search service when it must, caching every successful
//! remote answer. All failures collapse into [`Outcome::NoResult`]; the reason
//! is logged rather than returned.
//!
//! Concurrent calls for the same query share one resolution: the first caller
//! does the lookup and fetch, later callers wait on its result through a
//! `watch` channel. If the first caller is cancelled, waiting callers start
//! over on their own.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, CacheKey, CacheStore};
use crate::config::{Config, ConfigError};
use crate::remote::{HealthStatus, RemoteError, SearchClient, SearchService};

/// Result of dispatching one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Answered from the local cache, no network traffic
    LocalHit(String),
    /// Answered by the search service
    RemoteHit(String),
    /// No answer: empty query, service failure, or nothing found
    NoResult,
}

impl Outcome {
    /// The response payload, if there is one
    pub fn payload(&self) -> Option<&str> {
        match self {
            Outcome::LocalHit(payload) | Outcome::RemoteHit(payload) => Some(payload),
            Outcome::NoResult => None,
        }
    }

    /// Consumes the outcome, returning the payload if there is one
    pub fn into_payload(self) -> Option<String> {
        match self {
            Outcome::LocalHit(payload) | Outcome::RemoteHit(payload) => Some(payload),
            Outcome::NoResult => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        !matches!(self, Outcome::NoResult)
    }

    /// Where the payload came from: `"cache"` or `"remote"`
    pub fn source(&self) -> Option<&'static str> {
        match self {
            Outcome::LocalHit(_) => Some("cache"),
            Outcome::RemoteHit(_) => Some("remote"),
            Outcome::NoResult => None,
        }
    }
}

/// Completion signals for queries currently being resolved, by cache key
type InFlight = HashMap<CacheKey, watch::Receiver<Option<Outcome>>>;

struct Inner<S> {
    store: CacheStore,
    service: S,
    in_flight: Mutex<InFlight>,
    closed: AtomicBool,
}

/// Offline-aware query dispatcher
///
/// Cloning is cheap and every clone shares the same cache store, service
/// client and in-flight table.
pub struct Dispatcher<S = SearchClient> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Dispatcher<SearchClient> {
    /// Builds a dispatcher that talks HTTP to the configured endpoint
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let cache_dir = config.resolve_cache_dir()?;
        let store = CacheStore::with_dir(&cache_dir, config.max_entries);
        let service = SearchClient::new(&config.endpoint, config.request_timeout)?
            .with_top_k(config.top_k);

        info!(
            endpoint = %config.endpoint,
            cache_dir = %cache_dir.display(),
            max_entries = config.max_entries,
            "dispatcher ready"
        );

        Ok(Self::with_parts(store, service))
    }
}

/// Who does the work for a key
enum Role<'a> {
    /// Resolve the query and publish the outcome
    Leader(InFlightGuard<'a>),
    /// Wait for the leader's outcome
    Follower(watch::Receiver<Option<Outcome>>),
}

/// Removes the in-flight entry when the leader finishes or is dropped
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<InFlight>,
    key: CacheKey,
    tx: watch::Sender<Option<Outcome>>,
}

impl InFlightGuard<'_> {
    fn publish(self, outcome: Outcome) {
        self.tx.send_replace(Some(outcome));
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
    }
}

impl<S: SearchService + 'static> Dispatcher<S> {
    /// Builds a dispatcher from an existing store and service
    pub fn with_parts(store: CacheStore, service: S) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                service,
                in_flight: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// The cache store backing this dispatcher
    pub fn store(&self) -> &CacheStore {
        &self.inner.store
    }

    /// The search service this dispatcher queries
    pub fn service(&self) -> &S {
        &self.inner.service
    }

    /// Resolves a query: cache first, then the search service
    ///
    /// Performs no I/O at all for empty or whitespace-only queries. Otherwise
    /// makes at most one request to the service and at most one cache write.
    /// Never fails; every problem ends up as [`Outcome::NoResult`] with a log
    /// line explaining why.
    pub async fn handle(&self, query: &str) -> Outcome {
        if query.trim().is_empty() {
            debug!("ignoring empty query");
            return Outcome::NoResult;
        }
        if self.is_shut_down() {
            warn!("dispatcher is shut down, dropping query");
            return Outcome::NoResult;
        }

        let key = CacheKey::from_query(query);
        loop {
            match self.join_or_lead(&key) {
                Role::Leader(guard) => {
                    let outcome = self.resolve(&key, query).await;
                    guard.publish(outcome.clone());
                    return outcome;
                }
                Role::Follower(mut rx) => {
                    debug!(key = %key, "joining in-flight request");
                    let joined = rx
                        .wait_for(Option::is_some)
                        .await
                        .map(|outcome| (*outcome).clone());
                    match joined {
                        Ok(Some(outcome)) => return outcome,
                        Ok(None) => return Outcome::NoResult,
                        Err(_) => {
                            debug!(key = %key, "in-flight request was cancelled, retrying");
                        }
                    }
                }
            }
        }
    }

    /// Runs [`handle`](Self::handle) on a new task
    ///
    /// The returned handle can be awaited, aborted, or wrapped in
    /// `tokio::time::timeout`. Aborting a call that other callers joined does
    /// not fail them; they resolve the query themselves.
    pub fn spawn(&self, query: impl Into<String>) -> JoinHandle<Outcome> {
        let dispatcher = self.clone();
        let query = query.into();
        tokio::spawn(async move { dispatcher.handle(&query).await })
    }

    /// Probes the search service
    pub async fn health(&self) -> Result<HealthStatus, RemoteError> {
        self.inner.service.health().await
    }

    /// Stops accepting queries and waits for in-flight ones to finish
    ///
    /// Queries arriving after this returns `NoResult`. The HTTP connection
    /// pool is released once the last clone of the dispatcher is dropped.
    pub async fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);

        let pending: Vec<_> = self.inner.in_flight.lock().values().cloned().collect();
        info!(pending = pending.len(), "shutting down dispatcher");

        futures::future::join_all(pending.into_iter().map(|mut rx| async move {
            let _ = rx.wait_for(Option::is_some).await;
        }))
        .await;
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn join_or_lead(&self, key: &CacheKey) -> Role<'_> {
        let mut in_flight = self.inner.in_flight.lock();
        if let Some(rx) = in_flight.get(key) {
            return Role::Follower(rx.clone());
        }

        let (tx, rx) = watch::channel(None);
        in_flight.insert(key.clone(), rx);
        Role::Leader(InFlightGuard {
            in_flight: &self.inner.in_flight,
            key: key.clone(),
            tx,
        })
    }

    async fn resolve(&self, key: &CacheKey, query: &str) -> Outcome {
        let cached = {
            let query = query.to_string();
            self.with_store(move |store| store.lookup(&query)).await
        };
        match cached {
            Ok(Some(payload)) => {
                debug!(key = %key, "cache hit");
                return Outcome::LocalHit(payload);
            }
            Ok(None) => debug!(key = %key, "cache miss"),
            Err(e) => warn!(key = %key, error = %e, "cache unavailable, treating as miss"),
        }

        let payload = match self.inner.service.search(query).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %key, kind = e.kind(), error = %e, "remote search failed");
                return Outcome::NoResult;
            }
        };

        let stored = {
            let query = query.to_string();
            let payload = payload.clone();
            self.with_store(move |store| store.store(&query, &payload)).await
        };
        if let Err(e) = stored {
            warn!(key = %key, error = %e, "failed to cache response");
        }

        Outcome::RemoteHit(payload)
    }

    /// Runs a cache operation on the blocking thread pool
    async fn with_store<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(CacheStore) -> Result<T, CacheError> + Send + 'static,
    {
        let store = self.inner.store.clone();
        let dir = store.dir().to_path_buf();
        tokio::task::spawn_blocking(move || op(store))
            .await
            .unwrap_or_else(|e| {
                Err(CacheError::Io {
                    path: dir,
                    source: io::Error::other(e),
                })
            })
    }
}
