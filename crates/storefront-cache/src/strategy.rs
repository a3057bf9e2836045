//! Caching strategy value objects.
//!
//! A [`CachingStrategy`] describes the cache-control directives applied to a
//! sub-request: who may cache it, how long it stays fresh, and the grace
//! windows for serving stale values. Strategies are plain immutable values;
//! the engine and the header codec both consume them.

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Cache mode determining who can cache the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    /// Cacheable by CDN and browser (shared cache).
    #[default]
    Public,
    /// Cacheable by browser only.
    Private,
    /// No caching.
    NoStore,
}

impl CacheMode {
    /// Get the Cache-Control directive for this mode.
    pub fn directive(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::NoStore => "no-store",
        }
    }

    /// Check if this mode allows any caching.
    pub fn allows_caching(&self) -> bool {
        !matches!(self, Self::NoStore)
    }
}

/// Immutable cache-control directives for a sub-request.
///
/// All durations are in seconds. A missing `max_age` means the value never
/// goes stale once cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachingStrategy {
    /// Cache mode.
    pub mode: CacheMode,
    /// Freshness window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u64>,
    /// Grace window during which a stale value is served while a refresh
    /// runs in the background.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_while_revalidate: Option<u64>,
    /// Freshness window for shared/intermediary caches. Informational; only
    /// affects header emission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s_max_age: Option<u64>,
    /// Grace window during which a stale value is served if the refresh
    /// producer fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_if_error: Option<u64>,
}

/// Partial strategy used to override the built-in presets.
///
/// Merging is explicit and total: a set field replaces the preset's value,
/// an unset field keeps it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrategyOverrides {
    pub mode: Option<CacheMode>,
    pub max_age: Option<u64>,
    pub stale_while_revalidate: Option<u64>,
    pub s_max_age: Option<u64>,
    pub stale_if_error: Option<u64>,
}

impl CachingStrategy {
    /// No caching at all. The engine invokes the producer directly and never
    /// touches the store.
    pub fn none() -> Self {
        Self {
            mode: CacheMode::NoStore,
            max_age: None,
            stale_while_revalidate: None,
            s_max_age: None,
            stale_if_error: None,
        }
    }

    /// Short-lived public cache: fresh for 1 second, stale-while-revalidate
    /// for 9 more.
    pub fn short() -> Self {
        Self {
            mode: CacheMode::Public,
            max_age: Some(1),
            stale_while_revalidate: Some(9),
            s_max_age: None,
            stale_if_error: None,
        }
    }

    /// Long-lived public cache: fresh for 1 hour, stale-while-revalidate for
    /// 23 more.
    pub fn long() -> Self {
        Self {
            mode: CacheMode::Public,
            max_age: Some(3600),
            stale_while_revalidate: Some(82800),
            s_max_age: None,
            stale_if_error: None,
        }
    }

    /// The strategy applied when a caller provides none: fresh for 1 second,
    /// stale-while-revalidate for just under a day.
    pub fn default_strategy() -> Self {
        Self {
            mode: CacheMode::Public,
            max_age: Some(1),
            stale_while_revalidate: Some(86399),
            s_max_age: None,
            stale_if_error: None,
        }
    }

    /// Build a strategy directly from options, without preset defaults.
    /// Unset numeric fields stay unset; a missing mode defaults to public.
    pub fn custom(options: StrategyOverrides) -> Self {
        Self {
            mode: options.mode.unwrap_or_default(),
            max_age: options.max_age,
            stale_while_revalidate: options.stale_while_revalidate,
            s_max_age: options.s_max_age,
            stale_if_error: options.stale_if_error,
        }
    }

    /// [`CachingStrategy::short`] with overrides applied.
    pub fn short_with(overrides: StrategyOverrides) -> Result<Self, CacheError> {
        Self::short().merged(overrides)
    }

    /// [`CachingStrategy::long`] with overrides applied.
    pub fn long_with(overrides: StrategyOverrides) -> Result<Self, CacheError> {
        Self::long().merged(overrides)
    }

    /// [`CachingStrategy::default_strategy`] with overrides applied.
    pub fn default_with(overrides: StrategyOverrides) -> Result<Self, CacheError> {
        Self::default_strategy().merged(overrides)
    }

    /// Merge overrides onto an expirable preset.
    ///
    /// Rejects a `no-store` mode override: expiration fields and `no-store`
    /// are mutually exclusive, so presets that carry `max_age` or
    /// `stale_while_revalidate` only accept `public` or `private`.
    fn merged(self, overrides: StrategyOverrides) -> Result<Self, CacheError> {
        if overrides.mode == Some(CacheMode::NoStore) {
            return Err(CacheError::Configuration(
                "mode must be either 'public' or 'private' for expirable strategies".into(),
            ));
        }

        Ok(Self {
            mode: overrides.mode.unwrap_or(self.mode),
            max_age: overrides.max_age.or(self.max_age),
            stale_while_revalidate: overrides.stale_while_revalidate.or(self.stale_while_revalidate),
            s_max_age: overrides.s_max_age.or(self.s_max_age),
            stale_if_error: overrides.stale_if_error.or(self.stale_if_error),
        })
    }

    /// Check if this strategy bypasses the cache entirely.
    pub fn is_no_store(&self) -> bool {
        !self.mode.allows_caching()
    }

    /// Total window (seconds) during which a cached value may still be
    /// served: freshness plus stale-while-revalidate. `None` means the value
    /// never expires.
    pub fn total_cache_window(&self) -> Option<u64> {
        self.max_age
            .map(|max_age| max_age.saturating_add(self.stale_while_revalidate.unwrap_or(0)))
    }

    /// Generate the Cache-Control header value for this strategy.
    pub fn cache_control_header(&self) -> String {
        crate::headers::cache_control_header(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // === Preset Tests ===

    #[test]
    fn test_none_is_no_store() {
        let strategy = CachingStrategy::none();
        assert_eq!(strategy.mode, CacheMode::NoStore);
        assert!(strategy.is_no_store());
        assert_eq!(strategy.max_age, None);
        assert_eq!(strategy.total_cache_window(), None);
    }

    #[test]
    fn test_short_defaults() {
        let strategy = CachingStrategy::short();
        assert_eq!(strategy.mode, CacheMode::Public);
        assert_eq!(strategy.max_age, Some(1));
        assert_eq!(strategy.stale_while_revalidate, Some(9));
        assert_eq!(strategy.total_cache_window(), Some(10));
    }

    #[test]
    fn test_long_defaults() {
        let strategy = CachingStrategy::long();
        assert_eq!(strategy.max_age, Some(3600));
        assert_eq!(strategy.stale_while_revalidate, Some(82800));
    }

    #[test]
    fn test_default_strategy() {
        let strategy = CachingStrategy::default_strategy();
        assert_eq!(strategy.max_age, Some(1));
        assert_eq!(strategy.stale_while_revalidate, Some(86399));
    }

    // === Override Tests ===

    #[test]
    fn test_short_with_overrides_replaces_fields() {
        let strategy = CachingStrategy::short_with(StrategyOverrides {
            mode: Some(CacheMode::Private),
            max_age: Some(30),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(strategy.mode, CacheMode::Private);
        assert_eq!(strategy.max_age, Some(30));
        // Unset override keeps the preset value.
        assert_eq!(strategy.stale_while_revalidate, Some(9));
    }

    #[test]
    fn test_expirable_mode_guard_rejects_no_store() {
        let result = CachingStrategy::short_with(StrategyOverrides {
            mode: Some(CacheMode::NoStore),
            ..Default::default()
        });

        assert!(matches!(result, Err(CacheError::Configuration(_))));

        let result = CachingStrategy::long_with(StrategyOverrides {
            mode: Some(CacheMode::NoStore),
            max_age: Some(10),
            ..Default::default()
        });

        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }

    #[test]
    fn test_custom_passes_options_through() {
        let strategy = CachingStrategy::custom(StrategyOverrides {
            max_age: Some(60),
            stale_if_error: Some(600),
            ..Default::default()
        });

        assert_eq!(strategy.mode, CacheMode::Public);
        assert_eq!(strategy.max_age, Some(60));
        assert_eq!(strategy.stale_while_revalidate, None);
        assert_eq!(strategy.stale_if_error, Some(600));
    }

    #[test]
    fn test_total_cache_window_saturates() {
        let strategy = CachingStrategy::custom(StrategyOverrides {
            max_age: Some(u64::MAX),
            stale_while_revalidate: Some(10),
            ..Default::default()
        });

        assert_eq!(strategy.total_cache_window(), Some(u64::MAX));
    }

    // === Serde Tests ===

    #[test]
    fn test_mode_serializes_as_kebab_case() {
        assert_eq!(
            serde_json::to_string(&CacheMode::NoStore).unwrap(),
            "\"no-store\""
        );
        assert_eq!(
            serde_json::to_string(&CacheMode::Public).unwrap(),
            "\"public\""
        );
    }

    #[test]
    fn test_strategy_round_trips_through_json() {
        let strategy = CachingStrategy::long();
        let json = serde_json::to_string(&strategy).unwrap();
        let back: CachingStrategy = serde_json::from_str(&json).unwrap();
        assert_eq!(strategy, back);
    }
}
