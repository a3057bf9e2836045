//! Cache store adapter and entry metadata.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CacheError;
use crate::strategy::CachingStrategy;

/// A persisted cache record: the serialized producer result plus the
/// metadata needed to evaluate freshness on later lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached value.
    pub value: Value,
    /// Milliseconds since epoch at which the entry was stored.
    pub stored_at: u64,
    /// The strategy under which the entry was written.
    pub strategy: CachingStrategy,
}

impl CacheEntry {
    /// Create a new entry.
    pub fn new(value: Value, stored_at: u64, strategy: CachingStrategy) -> Self {
        Self {
            value,
            stored_at,
            strategy,
        }
    }

    /// Age of the entry in milliseconds.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.stored_at)
    }

    /// Age of the entry in whole seconds.
    pub fn age_secs(&self, now_ms: u64) -> u64 {
        self.age_ms(now_ms) / 1000
    }

    /// Fresh while age is within `max_age`. A strategy without `max_age`
    /// never goes stale.
    pub fn is_fresh(&self, now_ms: u64) -> bool {
        match self.strategy.max_age {
            Some(max_age) => self.age_ms(now_ms) <= max_age.saturating_mul(1000),
            None => true,
        }
    }

    /// Within `max_age + stale_while_revalidate`: the entry may still be
    /// served while a background refresh runs.
    pub fn within_stale_window(&self, now_ms: u64) -> bool {
        match self.strategy.total_cache_window() {
            Some(window) => self.age_ms(now_ms) <= window.saturating_mul(1000),
            None => true,
        }
    }

    /// Within `max_age + stale_while_revalidate + stale_if_error`: the entry
    /// may still be served if a refresh fails.
    pub fn within_error_grace(&self, now_ms: u64) -> bool {
        match (self.strategy.total_cache_window(), self.strategy.stale_if_error) {
            (Some(window), Some(grace)) => {
                self.age_ms(now_ms) <= window.saturating_add(grace).saturating_mul(1000)
            }
            (None, _) => true,
            (_, None) => false,
        }
    }
}

/// Narrow key/value interface over whatever response store the host
/// supplies (an HTTP Cache-API wrapper on edge runtimes, an in-memory map
/// elsewhere).
///
/// Only `get` and `set` are required by the engine; richer behavior (LRU,
/// TTL sweeps, tag invalidation) belongs to the implementation. The engine
/// treats `get` failures as misses and `set` failures as logged no-ops, so
/// a misbehaving store can never fail a caller's request.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up an entry. Absence is a normal miss.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Write an entry, overwriting any previous value for the key.
    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError>;

    /// Remove an entry. Optional; the engine never calls it.
    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }
}

/// In-memory store for tests and non-edge deployments.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| CacheError::Store("in-memory store lock poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CacheError::Store("in-memory store lock poisoned".into()))?;
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CacheError::Store("in-memory store lock poisoned".into()))?;
        entries.remove(key);
        Ok(())
    }
}
