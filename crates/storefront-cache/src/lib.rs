//! Sub-request caching for storefront API calls.
//!
//! This crate provides:
//! - `CachingStrategy` - Cache-control strategies (`none`, `short`, `long`,
//!   `custom`) with field-level overrides
//! - `cache_control_header` - Serialization of a strategy into a
//!   `Cache-Control` header value
//! - `CacheKey` - Composite cache key normalization
//! - `CacheStore` - Pluggable key/value store adapter with an in-memory
//!   implementation
//! - `InFlightRegistry` - Single-flight de-duplication of concurrent
//!   producers
//! - `CacheEngine` - The execution engine wrapping async producers with
//!   fresh/stale-while-revalidate/stale-if-error semantics
//!
//! # Example
//!
//! ```ignore
//! use storefront_cache::{CacheEngine, CachingStrategy, InMemoryStore};
//!
//! let engine = CacheEngine::new(InMemoryStore::new());
//!
//! // Fetch a product, cached under the long strategy (1h fresh, 23h
//! // stale-while-revalidate). Concurrent callers share one fetch.
//! let product: Product = engine
//!     .run("product:123", CachingStrategy::long(), || async {
//!         fetch_product("123").await
//!     })
//!     .await?;
//! ```

mod clock;
mod engine;
mod error;
mod flight;
mod headers;
mod key;
mod store;
mod strategy;
mod task;

pub use clock::*;
pub use engine::*;
pub use error::*;
pub use flight::InFlightRegistry;
pub use headers::*;
pub use key::*;
pub use store::*;
pub use strategy::*;
pub use task::*;
