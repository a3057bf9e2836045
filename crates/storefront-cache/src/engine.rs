//! Cache execution engine.
//!
//! Orchestrates one sub-request per call: key normalization, store lookup,
//! freshness evaluation, hit/stale/miss branching, single-flight producer
//! invocation, and background revalidation. Stale callers never block on a
//! refresh, and cache population never fails a caller's request.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::clock::{Clock, SystemClock};
use crate::error::CacheError;
use crate::flight::{await_outcome, Flight, FlightGuard, InFlightRegistry};
use crate::headers::cache_control_header;
use crate::key::CacheKey;
use crate::store::{CacheEntry, CacheStore};
use crate::strategy::CachingStrategy;
use crate::task::{TokioSpawn, WaitUntil};

/// Outcome of a cache lookup, logged with every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Fresh cache hit.
    Hit,
    /// Stale hit: served from cache while revalidating in the background.
    Stale,
    /// Cache miss: the producer ran in the foreground.
    Miss,
    /// Caching disabled for this call.
    Bypass,
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hit => write!(f, "HIT"),
            Self::Stale => write!(f, "STALE"),
            Self::Miss => write!(f, "MISS"),
            Self::Bypass => write!(f, "BYPASS"),
        }
    }
}

/// Predicate deciding whether a produced value may be written to the store.
/// Used to keep transient failures (e.g. GraphQL error payloads) out of the
/// cache while still returning them to the caller.
pub type ShouldCacheResult<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Per-call options for [`CacheEngine::run_with_options`].
pub struct CacheOptions<T> {
    /// Strategy applied to this call.
    pub strategy: CachingStrategy,
    /// Optional gate on store writes. `None` caches every success.
    pub should_cache_result: Option<ShouldCacheResult<T>>,
}

impl<T> Default for CacheOptions<T> {
    fn default() -> Self {
        Self {
            strategy: CachingStrategy::default_strategy(),
            should_cache_result: None,
        }
    }
}

impl<T> CacheOptions<T> {
    /// Options with an explicit strategy.
    pub fn strategy(strategy: CachingStrategy) -> Self {
        Self {
            strategy,
            should_cache_result: None,
        }
    }

    /// Gate store writes on a predicate over the produced value.
    pub fn with_should_cache_result<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.should_cache_result = Some(Arc::new(predicate));
        self
    }
}

/// Cache execution engine wrapping arbitrary async producers with
/// cache-control semantics and single-flight de-duplication.
///
/// All collaborators are injected: the store, the in-flight registry, the
/// background-task hook, and the clock. Multiple engines can share a
/// registry (and a store) to behave as one cache.
pub struct CacheEngine<S: CacheStore> {
    store: Arc<S>,
    registry: Arc<InFlightRegistry>,
    wait_until: Arc<dyn WaitUntil>,
    clock: Arc<dyn Clock>,
}

impl<S: CacheStore> Clone for CacheEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            wait_until: Arc::clone(&self.wait_until),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: CacheStore + 'static> CacheEngine<S> {
    /// Create an engine over `store` with a fresh in-flight registry, the
    /// tokio spawner for background work, and the system clock.
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
            registry: Arc::new(InFlightRegistry::new()),
            wait_until: Arc::new(TokioSpawn),
            clock: Arc::new(SystemClock),
        }
    }

    /// Share an in-flight registry with other engines.
    pub fn with_registry(mut self, registry: Arc<InFlightRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Use the host's `waitUntil` hook for background refreshes and store
    /// writes.
    pub fn with_wait_until(mut self, wait_until: Arc<dyn WaitUntil>) -> Self {
        self.wait_until = wait_until;
        self
    }

    /// Override the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The in-flight registry.
    pub fn registry(&self) -> &Arc<InFlightRegistry> {
        &self.registry
    }

    /// Run `producer` under `strategy`, caching its result.
    pub async fn run<T, F, Fut>(
        &self,
        key: impl Into<CacheKey>,
        strategy: CachingStrategy,
        producer: F,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.run_with_options(key, CacheOptions::strategy(strategy), producer)
            .await
    }

    /// Run `producer` with full per-call options.
    ///
    /// State machine per call: bypass on `no-store`; otherwise look the key
    /// up and serve a fresh hit directly, a stale hit immediately with at
    /// most one background refresh, or fall through to a single-flight
    /// foreground production. An expired entry still within its
    /// stale-if-error grace is served if that production fails.
    pub async fn run_with_options<T, F, Fut>(
        &self,
        key: impl Into<CacheKey>,
        options: CacheOptions<T>,
        producer: F,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let strategy = options.strategy;

        // no-store skips the store and the registry entirely; the producer's
        // result or rejection passes through unchanged.
        if strategy.is_no_store() {
            debug!(status = %CacheStatus::Bypass, "sub-request cache bypass");
            return producer().await.map_err(CacheError::producer);
        }

        let key = key.into().normalize();

        let entry = match self.store.get(&key).await {
            Ok(entry) => entry,
            Err(err) => {
                // A failing store read is a normal miss.
                error!(key = %key, error = %err, "cache store read failed");
                None
            }
        };

        let now = self.clock.now_ms();

        let Some(entry) = entry else {
            debug!(key = %key, status = %CacheStatus::Miss, "sub-request cache miss");
            return self
                .produce(&key, strategy, options.should_cache_result, producer)
                .await;
        };

        if entry.is_fresh(now) {
            match deserialize_value(entry.value) {
                Ok(value) => {
                    debug!(
                        key = %key,
                        status = %CacheStatus::Hit,
                        age_ms = now.saturating_sub(entry.stored_at),
                        "sub-request cache hit"
                    );
                    return Ok(value);
                }
                Err(err) => {
                    error!(key = %key, error = %err, "corrupt cache entry, treating as miss");
                    return self
                        .produce(&key, strategy, options.should_cache_result, producer)
                        .await;
                }
            }
        }

        if entry.within_stale_window(now) {
            let age_ms = entry.age_ms(now);
            match deserialize_value(entry.value) {
                Ok(value) => {
                    // Serve stale immediately and refresh at most once: if a
                    // flight is already up for this key, skip scheduling and
                    // let it finish.
                    match InFlightRegistry::begin(&self.registry, &key) {
                        Flight::Leader(guard) => {
                            self.schedule_revalidation(
                                key.clone(),
                                strategy,
                                options.should_cache_result,
                                producer,
                                guard,
                            );
                        }
                        Flight::Follower(_) => {}
                    }
                    debug!(
                        key = %key,
                        status = %CacheStatus::Stale,
                        age_ms = age_ms,
                        "sub-request cache stale hit"
                    );
                    return Ok(value);
                }
                Err(err) => {
                    error!(key = %key, error = %err, "corrupt cache entry, treating as miss");
                    return self
                        .produce(&key, strategy, options.should_cache_result, producer)
                        .await;
                }
            }
        }

        // Expired past both windows: produce in the foreground, falling back
        // to the stale value when the producer fails within the
        // stale-if-error grace.
        debug!(key = %key, status = %CacheStatus::Miss, "sub-request cache expired");
        match self
            .produce(&key, strategy, options.should_cache_result, producer)
            .await
        {
            Err(CacheError::Producer(source)) => {
                if entry.within_error_grace(self.clock.now_ms()) {
                    if let Ok(value) = deserialize_value(entry.value) {
                        error!(
                            key = %key,
                            error = %source,
                            "producer failed, serving stale value within stale-if-error grace"
                        );
                        return Ok(value);
                    }
                }
                Err(CacheError::Producer(source))
            }
            other => other,
        }
    }

    /// Single-flight foreground production for a miss.
    ///
    /// The leader invokes the producer, broadcasts the outcome to followers,
    /// and schedules the store write in the background. Followers await the
    /// broadcast and never invoke the producer.
    async fn produce<T, F, Fut>(
        &self,
        key: &str,
        strategy: CachingStrategy,
        should_cache: Option<ShouldCacheResult<T>>,
        producer: F,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        match InFlightRegistry::begin(&self.registry, key) {
            Flight::Leader(guard) => match producer().await {
                Ok(value) => {
                    match serde_json::to_value(&value) {
                        Ok(json) => {
                            guard.settle(Ok(json.clone()));
                            if should_cache.as_ref().map_or(true, |p| p(&value)) {
                                self.schedule_store_write(key.to_string(), strategy, json);
                            }
                        }
                        Err(err) => {
                            // The leader keeps its value; followers cannot
                            // share what we failed to serialize.
                            error!(key = %key, error = %err, "failed to serialize produced value");
                            guard.settle(Err(CacheError::Serialization(err.to_string())));
                        }
                    }
                    Ok(value)
                }
                Err(err) => {
                    let err = CacheError::producer(err);
                    guard.settle(Err(err.clone()));
                    Err(err)
                }
            },
            Flight::Follower(rx) => deserialize_value(await_outcome(rx).await?),
        }
    }

    /// Persist a produced value without blocking the caller. Write failures
    /// are logged and swallowed.
    fn schedule_store_write(&self, key: String, strategy: CachingStrategy, value: Value) {
        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);

        self.wait_until.wait_until(Box::pin(async move {
            let entry = CacheEntry::new(value, clock.now_ms(), strategy);
            match store.set(&key, entry).await {
                Ok(()) => {
                    debug!(
                        key = %key,
                        cache_control = %cache_control_header(&strategy),
                        "sub-request cache put"
                    );
                }
                Err(err) => {
                    // Cache population is best effort.
                    error!(key = %key, error = %err, "cache store write failed");
                }
            }
        }));
    }

    /// Refresh a stale entry in the background. The caller has already been
    /// answered with the stale value, so failures here are logged, broadcast
    /// to any followers, and never surface to a caller.
    fn schedule_revalidation<T, F, Fut>(
        &self,
        key: String,
        strategy: CachingStrategy,
        should_cache: Option<ShouldCacheResult<T>>,
        producer: F,
        guard: FlightGuard,
    ) where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);

        self.wait_until.wait_until(Box::pin(async move {
            match producer().await {
                Ok(value) => match serde_json::to_value(&value) {
                    Ok(json) => {
                        guard.settle(Ok(json.clone()));
                        if should_cache.as_ref().map_or(true, |p| p(&value)) {
                            let entry = CacheEntry::new(json, clock.now_ms(), strategy);
                            match store.set(&key, entry).await {
                                Ok(()) => {
                                    debug!(
                                        key = %key,
                                        cache_control = %cache_control_header(&strategy),
                                        "sub-request cache put"
                                    );
                                }
                                Err(err) => {
                                    error!(key = %key, error = %err, "cache store write failed");
                                }
                            }
                        }
                    }
                    Err(err) => {
                        error!(key = %key, error = %err, "failed to serialize revalidated value");
                        guard.settle(Err(CacheError::Serialization(err.to_string())));
                    }
                },
                Err(err) => {
                    let err = CacheError::producer(err);
                    error!(key = %key, error = %err, "stale-while-revalidate refresh failed");
                    guard.settle(Err(err));
                }
            }
        }));
    }
}

fn deserialize_value<T: DeserializeOwned>(value: Value) -> Result<T, CacheError> {
    serde_json::from_value(value).map_err(|err| CacheError::Serialization(err.to_string()))
}
