//! Cache-aside accessor.
//!
//! Reads check the store first and fall back to the caller's fetch on a miss.
//! The store is never allowed to fail a read: unavailability, timeouts and
//! corrupt entries all degrade to calling `fetch` directly.

use std::{future::Future, sync::Arc, time::Duration};

use bytes::Bytes;
use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use super::{
    METRIC_CACHE_DEGRADED_TOTAL, METRIC_CACHE_HIT_TOTAL, METRIC_CACHE_MISS_TOTAL,
    keys::CacheKey,
    store::{CacheStore, StoreError},
};

/// Errors the accessor surfaces to callers.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to serialize cache entry: {0}")]
    Serialization(String),
    /// Only produced by deserializers; the accessor recovers it as a miss.
    #[error("failed to deserialize cache entry: {0}")]
    Deserialization(String),
}

impl CacheError {
    pub fn serialization(err: impl std::fmt::Display) -> Self {
        Self::Serialization(err.to_string())
    }

    pub fn deserialization(err: impl std::fmt::Display) -> Self {
        Self::Deserialization(err.to_string())
    }
}

/// How a value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    /// The store was unusable and the value came straight from `fetch`.
    Degraded,
}

impl CacheStatus {
    /// Value of the `X-Cache` header. A degraded read is reported as a miss.
    pub fn header_value(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss | CacheStatus::Degraded => "MISS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cached<T> {
    pub value: T,
    pub status: CacheStatus,
}

/// Cache-aside reads over an injected store.
#[derive(Clone)]
pub struct CacheAccessor {
    store: Arc<dyn CacheStore>,
    timeout: Duration,
    layer: &'static str,
}

impl CacheAccessor {
    pub fn new(store: Arc<dyn CacheStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            layer: "data",
        }
    }

    /// Label hit/miss metrics with `layer` instead of `data`.
    pub fn for_layer(mut self, layer: &'static str) -> Self {
        self.layer = layer;
        self
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Return the cached value for `key`, or run `fetch`, store its result for
    /// `ttl` and return it. Values are encoded as JSON.
    ///
    /// Errors from `fetch` propagate unchanged and nothing is written.
    pub async fn get_or_set<T, E, F, Fut>(&self, key: &CacheKey, ttl: Duration, fetch: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.get_or_set_with(key, ttl, fetch, encode_json, decode_json)
            .await
            .map(|cached| cached.value)
    }

    /// [`get_or_set`](Self::get_or_set) with a caller-supplied codec and the
    /// cache status of the returned value.
    pub async fn get_or_set_with<T, E, F, Fut, S, D>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        fetch: F,
        serialize: S,
        deserialize: D,
    ) -> Result<Cached<T>, E>
    where
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        S: FnOnce(&T) -> Result<Bytes, CacheError>,
        D: FnOnce(&[u8]) -> Result<T, CacheError>,
    {
        match self.guarded("get", self.store.get(key.as_str())).await {
            Ok(Some(bytes)) => match deserialize(&bytes) {
                Ok(value) => {
                    counter!(METRIC_CACHE_HIT_TOTAL, "layer" => self.layer).increment(1);
                    debug!(key = %key, "cache hit");
                    return Ok(Cached {
                        value,
                        status: CacheStatus::Hit,
                    });
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "discarding corrupt cache entry");
                    if let Err(err) = self.guarded("delete", self.store.delete(key.as_str())).await {
                        self.record_degraded("delete", key, &err);
                    }
                }
            },
            Ok(None) => {}
            Err(err) => {
                self.record_degraded("get", key, &err);
                let value = fetch().await?;
                return Ok(Cached {
                    value,
                    status: CacheStatus::Degraded,
                });
            }
        }

        counter!(METRIC_CACHE_MISS_TOTAL, "layer" => self.layer).increment(1);
        let value = fetch().await?;
        let encoded = serialize(&value)?;
        if let Err(err) = self.guarded("set", self.store.set(key.as_str(), encoded, ttl)).await {
            self.record_degraded("set", key, &err);
        }
        Ok(Cached {
            value,
            status: CacheStatus::Miss,
        })
    }

    /// Delete one key, swallowing store failures.
    pub async fn evict(&self, key: &CacheKey) -> u64 {
        match self.guarded("delete", self.store.delete(key.as_str())).await {
            Ok(removed) => removed,
            Err(err) => {
                self.record_degraded("delete", key, &err);
                0
            }
        }
    }

    async fn guarded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let started = Instant::now();
        match timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                op,
                elapsed_ms: started.elapsed().as_millis() as u64,
            }),
        }
    }

    fn record_degraded(&self, op: &'static str, key: &CacheKey, err: &StoreError) {
        counter!(METRIC_CACHE_DEGRADED_TOTAL, "op" => op).increment(1);
        warn!(
            key = %key,
            backend = self.store.backend(),
            error = %err,
            "cache store degraded, bypassing"
        );
    }
}

fn encode_json<T: Serialize>(value: &T) -> Result<Bytes, CacheError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(CacheError::serialization)
}

fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CacheError> {
    serde_json::from_slice(bytes).map_err(CacheError::deserialization)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde::Deserialize;

    use super::*;
    use crate::cache::{keys::build_key, store::MemoryStore};

    #[derive(Debug, Error)]
    enum TestError {
        #[error("source failed")]
        Source,
        #[error(transparent)]
        Cache(#[from] CacheError),
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Dish {
        id: i64,
        price_cents: i64,
    }

    struct DownStore;

    #[async_trait]
    impl CacheStore for DownStore {
        fn backend(&self) -> &'static str {
            "down"
        }
        async fn get(&self, _key: &str) -> Result<Option<Bytes>, StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }
        async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }
        async fn delete(&self, _key: &str) -> Result<u64, StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }
        async fn delete_pattern(&self, _pattern: &str) -> Result<u64, StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }
    }

    struct HangingStore;

    #[async_trait]
    impl CacheStore for HangingStore {
        fn backend(&self) -> &'static str {
            "hanging"
        }
        async fn get(&self, _key: &str) -> Result<Option<Bytes>, StoreError> {
            std::future::pending().await
        }
        async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), StoreError> {
            std::future::pending().await
        }
        async fn delete(&self, _key: &str) -> Result<u64, StoreError> {
            std::future::pending().await
        }
        async fn delete_pattern(&self, _pattern: &str) -> Result<u64, StoreError> {
            std::future::pending().await
        }
        async fn ping(&self) -> Result<(), StoreError> {
            std::future::pending().await
        }
    }

    fn key() -> CacheKey {
        build_key("dish", "1", &[], "v1")
    }

    fn memory_accessor() -> (Arc<MemoryStore>, CacheAccessor) {
        let store = Arc::new(MemoryStore::default());
        let accessor = CacheAccessor::new(store.clone(), Duration::from_millis(250));
        (store, accessor)
    }

    #[tokio::test]
    async fn second_read_is_served_from_store() {
        let (_store, accessor) = memory_accessor();
        let calls = AtomicUsize::new(0);
        let fetch = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TestError>(Dish {
                id: 1,
                price_cents: 500,
            })
        };

        let first = accessor
            .get_or_set_with(&key(), Duration::from_secs(60), fetch, encode_json, decode_json)
            .await
            .expect("first read");
        let second = accessor
            .get_or_set_with(&key(), Duration::from_secs(60), fetch, encode_json, decode_json)
            .await
            .expect("second read");

        assert_eq!(first.status, CacheStatus::Miss);
        assert_eq!(second.status, CacheStatus::Hit);
        assert_eq!(first.value, second.value);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_errors_propagate_and_are_not_cached() {
        let (store, accessor) = memory_accessor();

        let result: Result<Dish, TestError> = accessor
            .get_or_set(&key(), Duration::from_secs(60), || async {
                Err(TestError::Source)
            })
            .await;

        assert!(matches!(result, Err(TestError::Source)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn corrupt_entry_is_replaced() {
        let (store, accessor) = memory_accessor();
        store
            .set(key().as_str(), Bytes::from_static(b"{not json"), Duration::from_secs(60))
            .await
            .expect("seed");

        let dish: Dish = accessor
            .get_or_set(&key(), Duration::from_secs(60), || async {
                Ok::<_, TestError>(Dish {
                    id: 1,
                    price_cents: 750,
                })
            })
            .await
            .expect("read");

        assert_eq!(dish.price_cents, 750);
        let stored = store.get(key().as_str()).await.expect("get").expect("entry");
        assert_eq!(decode_json::<Dish>(&stored).expect("valid json"), dish);
    }

    #[tokio::test]
    async fn unavailable_store_degrades_to_fetch() {
        let accessor = CacheAccessor::new(Arc::new(DownStore), Duration::from_millis(250));
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let cached = accessor
                .get_or_set_with(
                    &key(),
                    Duration::from_secs(60),
                    || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, TestError>(Dish {
                            id: 1,
                            price_cents: 500,
                        })
                    },
                    encode_json,
                    decode_json,
                )
                .await
                .expect("degraded read");
            assert_eq!(cached.status, CacheStatus::Degraded);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_times_out_and_degrades() {
        let accessor = CacheAccessor::new(Arc::new(HangingStore), Duration::from_millis(250));

        let cached = accessor
            .get_or_set_with(
                &key(),
                Duration::from_secs(60),
                || async {
                    Ok::<_, TestError>(Dish {
                        id: 1,
                        price_cents: 500,
                    })
                },
                encode_json,
                decode_json,
            )
            .await
            .expect("degraded read");

        assert_eq!(cached.status, CacheStatus::Degraded);
        assert_eq!(cached.value.price_cents, 500);
    }

    #[tokio::test]
    async fn serialization_failure_surfaces_and_skips_write() {
        let (store, accessor) = memory_accessor();

        let result = accessor
            .get_or_set_with(
                &key(),
                Duration::from_secs(60),
                || async { Ok::<_, TestError>(1_i64) },
                |_| Err(CacheError::serialization("unsupported value")),
                decode_json,
            )
            .await;

        assert!(matches!(
            result,
            Err(TestError::Cache(CacheError::Serialization(_)))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn degraded_reads_report_miss_header() {
        assert_eq!(CacheStatus::Hit.header_value(), "HIT");
        assert_eq!(CacheStatus::Miss.header_value(), "MISS");
        assert_eq!(CacheStatus::Degraded.header_value(), "MISS");
    }
}
