//! Cache-Control header generation and cache debug headers.

use crate::engine::CacheStatus;
use crate::strategy::CachingStrategy;

/// Header names for cache debugging.
pub mod header_names {
    /// Cache status header (HIT, MISS, STALE, BYPASS).
    pub const X_CACHE_STATUS: &str = "X-Cache-Status";
    /// Normalized cache key used for lookup.
    pub const X_CACHE_KEY: &str = "X-Cache-Key";
    /// Age of the served entry in seconds.
    pub const X_CACHE_AGE: &str = "X-Cache-Age";
}

/// Generate a `Cache-Control` header value from a strategy.
///
/// The mode directive is emitted verbatim, followed by one `<name>=<value>`
/// token per set numeric field, joined with `", "`. This is the canonical
/// textual form of a strategy and is safe to attach to outbound responses so
/// upstream proxies and CDNs apply the same directives.
pub fn cache_control_header(strategy: &CachingStrategy) -> String {
    let mut directives = vec![strategy.mode.directive().to_string()];

    if let Some(max_age) = strategy.max_age {
        directives.push(format!("max-age={max_age}"));
    }

    if let Some(swr) = strategy.stale_while_revalidate {
        directives.push(format!("stale-while-revalidate={swr}"));
    }

    if let Some(s_max_age) = strategy.s_max_age {
        directives.push(format!("s-maxage={s_max_age}"));
    }

    if let Some(sie) = strategy.stale_if_error {
        directives.push(format!("stale-if-error={sie}"));
    }

    directives.join(", ")
}

/// Build debug headers describing how a sub-request was served.
pub fn debug_headers(
    status: CacheStatus,
    key: &str,
    age_secs: Option<u64>,
) -> Vec<(String, String)> {
    let mut headers = vec![
        (header_names::X_CACHE_STATUS.to_string(), status.to_string()),
        (header_names::X_CACHE_KEY.to_string(), key.to_string()),
    ];

    if let Some(age) = age_secs {
        headers.push((header_names::X_CACHE_AGE.to_string(), age.to_string()));
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{CacheMode, StrategyOverrides};

    // === Codec Tests ===

    #[test]
    fn test_short_round_trip_example() {
        assert_eq!(
            cache_control_header(&CachingStrategy::short()),
            "public, max-age=1, stale-while-revalidate=9"
        );
    }

    #[test]
    fn test_long_header() {
        assert_eq!(
            cache_control_header(&CachingStrategy::long()),
            "public, max-age=3600, stale-while-revalidate=82800"
        );
    }

    #[test]
    fn test_none_emits_only_no_store() {
        assert_eq!(cache_control_header(&CachingStrategy::none()), "no-store");
    }

    #[test]
    fn test_all_fields_in_order() {
        let strategy = CachingStrategy::custom(StrategyOverrides {
            mode: Some(CacheMode::Private),
            max_age: Some(10),
            stale_while_revalidate: Some(20),
            s_max_age: Some(30),
            stale_if_error: Some(40),
        });

        assert_eq!(
            cache_control_header(&strategy),
            "private, max-age=10, stale-while-revalidate=20, s-maxage=30, stale-if-error=40"
        );
    }

    #[test]
    fn test_codec_is_pure() {
        let strategy = CachingStrategy::long();
        assert_eq!(
            cache_control_header(&strategy),
            cache_control_header(&strategy)
        );
    }

    #[test]
    fn test_strategy_method_matches_free_function() {
        let strategy = CachingStrategy::short();
        assert_eq!(strategy.cache_control_header(), cache_control_header(&strategy));
    }

    // === Debug Header Tests ===

    #[test]
    fn test_debug_headers_include_status_and_key() {
        let headers = debug_headers(CacheStatus::Stale, "product:123", Some(42));

        assert_eq!(
            headers,
            vec![
                ("X-Cache-Status".to_string(), "STALE".to_string()),
                ("X-Cache-Key".to_string(), "product:123".to_string()),
                ("X-Cache-Age".to_string(), "42".to_string()),
            ]
        );
    }

    #[test]
    fn test_debug_headers_omit_age_when_unknown() {
        let headers = debug_headers(CacheStatus::Miss, "k", None);
        assert_eq!(headers.len(), 2);
    }
}
