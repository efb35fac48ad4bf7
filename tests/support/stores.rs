use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use larder::cache::{CacheStore, StoreError};

/// Store whose every operation fails as an unreachable backend would.
pub struct DownStore;

fn refused() -> StoreError {
    StoreError::unavailable("connection refused")
}

#[async_trait]
impl CacheStore for DownStore {
    fn backend(&self) -> &'static str {
        "down"
    }

    async fn get(&self, _key: &str) -> Result<Option<Bytes>, StoreError> {
        Err(refused())
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), StoreError> {
        Err(refused())
    }

    async fn delete(&self, _key: &str) -> Result<u64, StoreError> {
        Err(refused())
    }

    async fn delete_pattern(&self, _pattern: &str) -> Result<u64, StoreError> {
        Err(refused())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(refused())
    }
}
