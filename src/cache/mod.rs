//! Larder cache system.
//!
//! Read-through caching over an external key/value store:
//!
//! - **Accessor**: cache-aside reads for service queries
//! - **Route cache**: buffered GET responses, reported through `X-Cache`
//! - **Invalidation**: per-resource policy templates purged after writes
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! redis_url = "redis://127.0.0.1:6379"
//! store_timeout_ms = 250
//! key_version = "v1"
//!
//! [cache.policies.dish]
//! ttl_seconds = 120
//! ```
//!
//! Without `redis_url` entries live in a bounded in-process store.

mod accessor;
mod config;
mod context;
mod invalidation;
mod keys;
mod middleware;
mod policy;
mod redis_store;
mod store;

pub use accessor::{CacheAccessor, CacheError, CacheStatus, Cached};
pub use config::CacheConfig;
pub use context::CacheContext;
pub use invalidation::{
    InvalidationDispatcher, InvalidationReport, InvalidationSet, InvalidationTarget,
    PartialInvalidation, WriteEvent,
};
pub use keys::{
    CacheKey, InvalidSelectorError, KEY_SEPARATOR, MAX_SELECTOR_LEN, SelectorPart, build_key,
    escape_segment, selectors_from_values,
};
pub use middleware::{
    CachedResponse, ROUTE_NAMESPACE, RouteCache, RouteCacheState, X_CACHE, canonical_path,
    is_storable, route_cache_layer, route_key,
};
pub use policy::{
    ALL_OWNERS, CachePolicies, CachePolicy, LIST_ENTITY, PolicyOverride, ResourceType,
    UnknownResourceType,
};
pub use redis_store::RedisStore;
pub use store::{
    CacheStore, MemoryStore, StoreError, compile_pattern, glob_match, is_pattern, ttl_seconds,
};

pub const METRIC_CACHE_HIT_TOTAL: &str = "larder_cache_hit_total";
pub const METRIC_CACHE_MISS_TOTAL: &str = "larder_cache_miss_total";
pub const METRIC_CACHE_DEGRADED_TOTAL: &str = "larder_cache_degraded_total";
pub const METRIC_CACHE_INVALIDATED_KEYS_TOTAL: &str = "larder_cache_invalidated_keys_total";
pub const METRIC_CACHE_INVALIDATION_FAILURES_TOTAL: &str =
    "larder_cache_invalidation_failures_total";
pub const METRIC_CACHE_INVALIDATE_MS: &str = "larder_cache_invalidate_ms";
