//! Redis-backed cache store.

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::{Client, aio::ConnectionManager};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, instrument, warn};

use super::store::{CacheStore, StoreError, ttl_seconds};

const SCAN_BATCH: usize = 500;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Cache store over a multiplexed Redis connection.
///
/// The connection is established lazily. While Redis is unreachable every
/// operation fails fast with [`StoreError::Unavailable`] and one background
/// task retries, so callers degrade to their fallback instead of waiting.
/// Once connected, `ConnectionManager` reconnects on its own and is cloned per
/// operation.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    connection: Arc<RwLock<Option<ConnectionManager>>>,
    reconnecting: Arc<AtomicBool>,
}

impl RedisStore {
    /// Open a store for `url` and try to connect once.
    ///
    /// Only a malformed URL is an error. An unreachable server is logged and
    /// retried in the background.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(StoreError::unavailable)?;
        let store = Self {
            client,
            connection: Arc::default(),
            reconnecting: Arc::default(),
        };
        if let Err(err) = store.establish().await {
            warn!(
                error = %err,
                "redis unreachable at startup; cache operations degrade until it recovers"
            );
        }
        Ok(store)
    }

    /// Whether a connection has been established.
    pub fn is_connected(&self) -> bool {
        self.current().is_some()
    }

    async fn establish(&self) -> Result<(), StoreError> {
        let started = Instant::now();
        let manager = match timeout(CONNECT_TIMEOUT, ConnectionManager::new(self.client.clone())).await
        {
            Ok(Ok(manager)) => manager,
            Ok(Err(err)) => return Err(StoreError::unavailable(err)),
            Err(_) => {
                return Err(StoreError::Timeout {
                    op: "connect",
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
        };
        let mut slot = match self.connection.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(manager);
        info!("redis connection established");
        Ok(())
    }

    fn current(&self) -> Option<ConnectionManager> {
        match self.connection.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn connection(&self) -> Result<ConnectionManager, StoreError> {
        if let Some(connection) = self.current() {
            return Ok(connection);
        }
        self.reconnect_in_background();
        Err(StoreError::unavailable("redis connection not established"))
    }

    fn reconnect_in_background(&self) {
        if self.reconnecting.swap(true, Ordering::AcqRel) {
            return;
        }
        let store = self.clone();
        tokio::spawn(async move {
            if let Err(err) = store.establish().await {
                debug!(error = %err, "redis reconnect failed");
                sleep(RECONNECT_BACKOFF).await;
            }
            store.reconnecting.store(false, Ordering::Release);
        });
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut connection = self.connection()?;
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut connection)
                .await
                .map_err(StoreError::unavailable)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let mut connection = self.connection()?;
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut connection)
            .await
            .map_err(StoreError::unavailable)?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        let mut connection = self.connection()?;
        redis::cmd("SET")
            .arg(key)
            .arg(value.as_ref())
            .arg("EX")
            .arg(ttl_seconds(ttl))
            .query_async::<()>(&mut connection)
            .await
            .map_err(StoreError::unavailable)
    }

    async fn delete(&self, key: &str) -> Result<u64, StoreError> {
        let mut connection = self.connection()?;
        redis::cmd("DEL")
            .arg(key)
            .query_async(&mut connection)
            .await
            .map_err(StoreError::unavailable)
    }

    #[instrument(skip(self))]
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, StoreError> {
        let keys = self.scan_keys(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }

        let mut connection = self.connection()?;
        let mut removed = 0u64;
        for chunk in keys.chunks(SCAN_BATCH) {
            let count: u64 = redis::cmd("DEL")
                .arg(chunk)
                .query_async(&mut connection)
                .await
                .map_err(StoreError::unavailable)?;
            removed += count;
        }
        debug!(matched = keys.len(), removed, "pattern delete complete");
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut connection = self.connection()?;
        redis::cmd("PING")
            .query_async::<String>(&mut connection)
            .await
            .map(|_| ())
            .map_err(StoreError::unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn malformed_url_is_rejected() {
        assert!(RedisStore::connect("not a url").await.is_err());
    }

    #[tokio::test]
    async fn unreachable_server_fails_fast_per_operation() {
        let store = RedisStore::connect("redis://127.0.0.1:1")
            .await
            .expect("a well-formed url opens a store");
        assert!(!store.is_connected());

        let started = Instant::now();
        assert!(matches!(
            store.get("dish:1:v1").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.delete_pattern("dish:*").await.is_err());
        assert!(store.ping().await.is_err());
        assert!(started.elapsed() < CONNECT_TIMEOUT);
    }
}
