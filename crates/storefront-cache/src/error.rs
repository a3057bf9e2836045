//! Error types for the sub-request cache.

use std::sync::Arc;

/// Errors surfaced by the sub-request cache.
///
/// The enum is `Clone` so that a leader's failure can be broadcast to every
/// follower awaiting the same in-flight producer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// Invalid strategy construction. Surfaced synchronously to the caller,
    /// never swallowed.
    #[error("invalid caching strategy: {0}")]
    Configuration(String),

    /// The wrapped producer rejected. Propagated to the caller only when no
    /// usable cached value exists.
    #[error("producer failed: {0}")]
    Producer(Arc<anyhow::Error>),

    /// The store adapter failed. Read failures become cache misses and write
    /// failures are logged, so callers never observe this variant from the
    /// engine.
    #[error("cache store error: {0}")]
    Store(String),

    /// A cached value could not be serialized for storage or deserialized
    /// back into the requested type.
    #[error("cache serialization error: {0}")]
    Serialization(String),

    /// The in-flight leader was dropped before settling. Observed only by
    /// followers whose leader was cancelled mid-flight.
    #[error("in-flight producer dropped before settling")]
    Aborted,
}

impl CacheError {
    /// Wrap a producer rejection.
    pub fn producer(err: anyhow::Error) -> Self {
        Self::Producer(Arc::new(err))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
