//! Cache store abstraction.
//!
//! The store is the only shared mutable resource of the cache layer. It is
//! constructed once at startup and injected as `Arc<dyn CacheStore>`; per-key
//! operations are atomic, so no locking is needed above this trait.

use std::num::NonZeroUsize;
use std::sync::{LockResult, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use globset::{GlobBuilder, GlobMatcher};
use lru::LruCache;
use thiserror::Error;
use tokio::time::Instant;
use tracing::warn;

/// Failures of the backing store. Always recovered by the cache layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("cache store operation `{op}` timed out after {elapsed_ms} ms")]
    Timeout { op: &'static str, elapsed_ms: u64 },
}

impl StoreError {
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable(message.to_string())
    }
}

/// Key/value store with TTL expiry and glob-pattern deletion.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short backend label used in logs and health output.
    fn backend(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError>;

    /// Delete one key, returning how many keys were removed (0 or 1).
    async fn delete(&self, key: &str) -> Result<u64, StoreError>;

    /// Delete every key matching a Redis-style glob pattern.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Clamp a TTL to whole seconds with a minimum of one second.
pub fn ttl_seconds(ttl: Duration) -> u64 {
    let mut seconds = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        seconds += 1;
    }
    seconds.max(1)
}

/// Whether a pattern contains glob metacharacters.
pub fn is_pattern(candidate: &str) -> bool {
    candidate
        .bytes()
        .any(|byte| matches!(byte, b'*' | b'?' | b'['))
}

/// Compile a Redis-style glob (`*`, `?`, `[...]`, `[^...]` and backslash
/// escapes).
///
/// Returns `None` for patterns that do not compile; such patterns match
/// nothing.
pub fn compile_pattern(pattern: &str) -> Option<GlobMatcher> {
    GlobBuilder::new(&redis_to_globset(pattern))
        .literal_separator(false)
        .backslash_escape(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|err| warn!(pattern, error = %err, "ignoring invalid cache key pattern"))
        .ok()
}

/// Match `text` against a Redis-style glob.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    compile_pattern(pattern).is_some_and(|matcher| matcher.is_match(text))
}

/// Rewrite Redis glob syntax into globset syntax: `[^` negation becomes `[!`,
/// braces are literal and runs of `*` collapse.
fn redis_to_globset(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 4);
    let mut chars = pattern.chars().peekable();
    let mut in_class = false;
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                out.push('\\');
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '[' if !in_class => {
                in_class = true;
                out.push('[');
                if chars.next_if_eq(&'^').is_some() {
                    out.push('!');
                }
            }
            ']' if in_class => {
                in_class = false;
                out.push(']');
            }
            '*' if !in_class => {
                out.push('*');
                while chars.next_if_eq(&'*').is_some() {}
            }
            '{' | '}' if !in_class => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

// ============================================================================
// In-process store
// ============================================================================

struct MemoryEntry {
    value: Bytes,
    expires_at: Instant,
}

/// Bounded in-process store with LRU eviction and TTL expiry.
///
/// Used when no Redis URL is configured and as the store in tests. Expiry
/// follows `tokio::time`, so paused-clock tests can advance past a TTL.
pub struct MemoryStore {
    entries: RwLock<LruCache<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        recover(self.entries.read(), "len")
            .iter()
            .filter(|(_, entry)| entry.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live keys, most recently used first.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        recover(self.entries.read(), "keys")
            .iter()
            .filter(|(_, entry)| entry.expires_at > now)
            .map(|(key, _)| key.clone())
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(10_000).unwrap_or(NonZeroUsize::MIN))
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let mut entries = recover(self.entries.write(), "get");
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_seconds(ttl));
        recover(self.entries.write(), "set").put(key.to_string(), MemoryEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        let removed = recover(self.entries.write(), "delete").pop(key);
        Ok(match removed {
            Some(entry) if entry.expires_at > now => 1,
            _ => 0,
        })
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        let Some(matcher) = compile_pattern(pattern) else {
            return Ok(0);
        };
        let mut entries = recover(self.entries.write(), "delete_pattern");
        let matching: Vec<String> = entries
            .iter()
            .filter(|(key, _)| matcher.is_match(key.as_str()))
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = 0;
        for key in matching {
            if let Some(entry) = entries.pop(&key)
                && entry.expires_at > now
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

fn recover<G>(result: LockResult<G>, op: &'static str) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(
            op,
            store = "memory",
            result = "poisoned_recovered",
            hint = "entries may be stale after panic in another thread",
            "Recovered from poisoned cache store lock"
        );
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::new(NonZeroUsize::new(16).expect("non-zero"))
    }

    #[test]
    fn ttl_is_clamped_to_whole_seconds() {
        assert_eq!(ttl_seconds(Duration::ZERO), 1);
        assert_eq!(ttl_seconds(Duration::from_millis(200)), 1);
        assert_eq!(ttl_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(ttl_seconds(Duration::from_secs(300)), 300);
    }

    #[test]
    fn glob_matches_redis_semantics() {
        assert!(glob_match("dish:7:*", "dish:7:v1"));
        assert!(glob_match("dish:list:3:*", "dish:list:3:true:v1"));
        assert!(!glob_match("dish:list:3:*", "dish:list:31:true:v1"));
        assert!(glob_match("route:chefs.*", "route:chefs.show:GET:/api/v1/chefs/1:-:v1"));
        assert!(glob_match("h?llo", "hello"));
        assert!(glob_match("h[ae]llo", "hallo"));
        assert!(!glob_match("h[^e]llo", "hello"));
        assert!(glob_match("h[a-c]llo", "hbllo"));
        assert!(glob_match("a\\*b", "a*b"));
        assert!(!glob_match("a\\*b", "axb"));
        assert!(glob_match("*", ""));
        assert!(!glob_match("dish:*", "menu:1:v1"));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(!glob_match("a*b*c", "aXXbYY"));
        assert!(glob_match("route:**", "route:dishes.show:GET:/api/v1/dishes/7:-:v1"));
        assert!(glob_match("menu:{id}:*", "menu:{id}:v1"));
        assert!(!glob_match("menu:{id}:*", "menu:id:v1"));
    }

    #[test]
    fn invalid_patterns_match_nothing() {
        assert!(compile_pattern("dish:[7").is_none());
        assert!(!glob_match("dish:[7", "dish:[7"));
    }

    #[tokio::test]
    async fn invalid_pattern_delete_removes_nothing() {
        let store = store();
        store
            .set("dish:7:v1", Bytes::from_static(b"x"), Duration::from_secs(60))
            .await
            .expect("set");
        assert_eq!(store.delete_pattern("dish:[7").await.expect("del"), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn exact_keys_are_not_patterns() {
        assert!(!is_pattern("dish:7:v1"));
        assert!(is_pattern("dish:7:*"));
    }

    #[tokio::test]
    async fn set_get_delete_roundtrip() {
        let store = store();
        store
            .set("dish:1:v1", Bytes::from_static(b"soup"), Duration::from_secs(60))
            .await
            .expect("set");
        assert_eq!(
            store.get("dish:1:v1").await.expect("get"),
            Some(Bytes::from_static(b"soup"))
        );
        assert_eq!(store.delete("dish:1:v1").await.expect("delete"), 1);
        assert_eq!(store.delete("dish:1:v1").await.expect("delete again"), 0);
        assert!(store.get("dish:1:v1").await.expect("get").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = store();
        store
            .set("dish:1:v1", Bytes::from_static(b"soup"), Duration::from_secs(1))
            .await
            .expect("set");
        tokio::time::advance(Duration::from_millis(1100)).await;
        assert!(store.get("dish:1:v1").await.expect("get").is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn delete_pattern_counts_only_matches() {
        let store = store();
        for key in ["dish:1:v1", "dish:list:3:true:v1", "dish:list:3:false:v1", "menu:1:v1"] {
            store
                .set(key, Bytes::from_static(b"x"), Duration::from_secs(60))
                .await
                .expect("set");
        }
        assert_eq!(store.delete_pattern("dish:list:3:*").await.expect("del"), 2);
        assert_eq!(store.delete_pattern("dish:list:3:*").await.expect("del"), 0);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn lru_evicts_least_recently_used() {
        let store = MemoryStore::new(NonZeroUsize::new(2).expect("non-zero"));
        let ttl = Duration::from_secs(60);
        store.set("a", Bytes::from_static(b"1"), ttl).await.expect("set");
        store.set("b", Bytes::from_static(b"2"), ttl).await.expect("set");
        store.get("a").await.expect("get");
        store.set("c", Bytes::from_static(b"3"), ttl).await.expect("set");

        assert!(store.get("b").await.expect("get").is_none());
        assert!(store.get("a").await.expect("get").is_some());
        assert!(store.get("c").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn recovers_from_poisoned_lock() {
        let store = store();
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store.entries.write().expect("lock should be acquired");
            panic!("poison store lock");
        }));

        store
            .set("k", Bytes::from_static(b"v"), Duration::from_secs(5))
            .await
            .expect("set after poison");
        assert!(store.get("k").await.expect("get").is_some());
    }
}
