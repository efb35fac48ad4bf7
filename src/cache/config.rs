//! Cache configuration.
//!
//! Runtime view of the `[cache]` section of `larder.toml`.

use std::{num::NonZeroUsize, time::Duration};

const DEFAULT_STORE_TIMEOUT_MS: u64 = 250;
const DEFAULT_KEY_VERSION: &str = "v1";
const DEFAULT_TTL_SECS: u64 = 300;
const DEFAULT_ROUTE_TTL_SECS: u64 = 60;
const DEFAULT_ROUTE_BODY_LIMIT_BYTES: usize = 1024 * 1024;
const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

/// Cache configuration shared by the accessor, dispatcher and route layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Enable the data cache. When off every read goes to the repository.
    pub enabled: bool,
    /// Enable the route response cache.
    pub route_cache_enabled: bool,
    /// Upper bound on any single store round trip.
    pub store_timeout: Duration,
    /// Suffix of every key. Bumping it orphans all existing entries.
    pub key_version: String,
    /// TTL for resources without a policy override.
    pub default_ttl: Duration,
    /// TTL for cached route responses.
    pub route_ttl: Duration,
    /// Responses with larger bodies are served but not stored.
    pub route_body_limit_bytes: usize,
    /// Entry bound of the in-process store.
    pub memory_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            route_cache_enabled: true,
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            key_version: DEFAULT_KEY_VERSION.to_string(),
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            route_ttl: Duration::from_secs(DEFAULT_ROUTE_TTL_SECS),
            route_body_limit_bytes: DEFAULT_ROUTE_BODY_LIMIT_BYTES,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            route_cache_enabled: settings.route_cache_enabled,
            store_timeout: settings.store_timeout,
            key_version: settings.key_version.clone(),
            default_ttl: settings.default_ttl,
            route_ttl: settings.route_ttl,
            route_body_limit_bytes: settings.route_body_limit_bytes,
            memory_capacity: settings.memory_capacity,
        }
    }
}

impl CacheConfig {
    /// Memory store capacity, clamped to 1.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    /// Whether the route layer should consult the store at all.
    pub fn route_cache_active(&self) -> bool {
        self.enabled && self.route_cache_enabled
    }
}
