//! Cache backend implementations.
//!
//! This module provides pluggable cache backends:
//! - **InMemoryBackend**: process-local cache on a sharded `DashMap`
//! - **RedisBackend**: distributed cache using Redis through a shared
//!   [`ConnectionManager`](redis::aio::ConnectionManager)
//!
//! Backends store opaque bytes. Key patterns use Redis glob syntax (`*`, `?`,
//! backslash escapes) on every backend.

use crate::error::{ErrorCode, Result, WardenError};
use async_trait::async_trait;
use dashmap::DashMap;
use metrics::counter;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

// ═══════════════════════════════════════════════════════════════════════════════
// Cache Backend Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Trait for cache backends.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get the raw value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `data` under `key`, replacing any previous value.
    async fn set(&self, key: &str, data: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Delete the given keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// List keys matching a glob pattern.
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>>;

    /// Atomically increment the integer under `key` and refresh its TTL.
    ///
    /// A missing or expired key starts from zero.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64>;

    /// Get the backend name.
    fn name(&self) -> &'static str;
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-Memory Backend
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for in-memory cache.
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// Maximum number of entries
    pub max_capacity: u64,

    /// Shard count for concurrent access (power of 2)
    pub shard_count: usize,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            shard_count: 16,
        }
    }
}

struct InMemoryEntry {
    data: Vec<u8>,
    expires_at: Instant,
}

impl InMemoryEntry {
    fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Process-local cache backend.
pub struct InMemoryBackend {
    entries: DashMap<String, InMemoryEntry>,
    config: InMemoryConfig,
    evictions: AtomicU64,
}

impl InMemoryBackend {
    /// Create a new in-memory backend.
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            entries: DashMap::with_shard_amount(config.shard_count),
            config,
            evictions: AtomicU64::new(0),
        }
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.value().is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total entries evicted for capacity so far.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Cleanup expired entries.
    pub fn cleanup_expired(&self) -> u64 {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let expired = before.saturating_sub(self.entries.len()) as u64;
        if expired > 0 {
            debug!("Cleaned up {} expired cache entries", expired);
        }
        expired
    }

    /// Make room for one more entry: drop expired entries first, then the
    /// entries closest to expiry.
    fn maybe_evict(&self, incoming: &str) {
        if (self.entries.len() as u64) < self.config.max_capacity
            || self.entries.contains_key(incoming)
        {
            return;
        }

        self.cleanup_expired();
        if (self.entries.len() as u64) < self.config.max_capacity {
            return;
        }

        let to_evict = (self.config.max_capacity / 10).max(1) as usize;
        let mut by_expiry: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().expires_at))
            .collect();
        by_expiry.sort_by_key(|(_, expires_at)| *expires_at);

        let mut evicted = 0u64;
        for (key, _) in by_expiry.into_iter().take(to_evict) {
            if self.entries.remove(&key).is_some() {
                evicted += 1;
            }
        }

        self.evictions.fetch_add(evicted, Ordering::Relaxed);
        counter!("cache_evictions_total", "backend" => "in_memory").increment(evicted);
        debug!("Evicted {} entries from cache", evicted);
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let hit = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.data.clone()),
            Some(_) => None,
            None => {
                counter!("cache_misses_total", "backend" => "in_memory", "reason" => "not_found")
                    .increment(1);
                return Ok(None);
            }
        };

        match hit {
            Some(data) => {
                counter!("cache_hits_total", "backend" => "in_memory").increment(1);
                Ok(Some(data))
            }
            None => {
                self.entries.remove_if(key, |_, entry| entry.is_expired());
                counter!("cache_misses_total", "backend" => "in_memory", "reason" => "expired")
                    .increment(1);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, data: Vec<u8>, ttl: Duration) -> Result<()> {
        self.maybe_evict(key);
        self.entries
            .insert(key.to_string(), InMemoryEntry::new(data, ttl));
        counter!("cache_sets_total", "backend" => "in_memory").increment(1);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let mut deleted = 0u64;
        for key in keys {
            if let Some((_, entry)) = self.entries.remove(key) {
                if !entry.is_expired() {
                    deleted += 1;
                }
            }
        }
        counter!("cache_deletes_total", "backend" => "in_memory").increment(deleted);
        Ok(deleted)
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let regex = glob_to_regex(pattern)?;
        Ok(self
            .entries
            .iter()
            .filter(|e| !e.value().is_expired() && regex.is_match(e.key()))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64> {
        self.maybe_evict(key);

        // The entry guard holds the shard lock for the read-modify-write.
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| InMemoryEntry::new(b"0".to_vec(), ttl));

        let current = if entry.is_expired() {
            0
        } else {
            serde_json::from_slice::<i64>(&entry.data).map_err(|e| {
                WardenError::with_internal(
                    ErrorCode::CacheError,
                    "Cached value is not an integer",
                    format!("{}: {}", key, e),
                )
            })?
        };

        let next = current + 1;
        *entry = InMemoryEntry::new(next.to_string().into_bytes(), ttl);
        counter!("cache_increments_total", "backend" => "in_memory").increment(1);
        Ok(next)
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

/// Compile a Redis-style glob into an anchored regex.
fn glob_to_regex(pattern: &str) -> Result<regex::Regex> {
    let mut source = String::with_capacity(pattern.len() * 2 + 2);
    source.push('^');

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            '\\' => {
                if let Some(literal) = chars.next() {
                    source.push_str(&regex::escape(&literal.to_string()));
                }
            }
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');

    regex::Regex::new(&source).map_err(|e| {
        WardenError::new(ErrorCode::InvalidInput, format!("Invalid pattern: {}", e))
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Redis Backend
// ═══════════════════════════════════════════════════════════════════════════════

/// INCR and EXPIRE in one round trip so the TTL can never be lost.
const INCREMENT_SCRIPT: &str = r#"
local current = redis.call('INCR', KEYS[1])
redis.call('EXPIRE', KEYS[1], ARGV[1])
return current
"#;

/// Configuration for Redis cache.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Key prefix, joined to keys with `:`
    pub key_prefix: Option<String>,

    /// Connection timeout
    pub connect_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: None,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&crate::config::RedisConfig> for RedisConfig {
    fn from(config: &crate::config::RedisConfig) -> Self {
        Self {
            url: config.url.clone(),
            key_prefix: config.key_prefix.clone(),
            connect_timeout: config.connect_timeout,
        }
    }
}

/// Redis cache backend.
///
/// The connection manager is created once and cloned per command; it
/// reconnects on its own after a dropped connection.
pub struct RedisBackend {
    conn: ConnectionManager,
    prefix: String,
    increment: redis::Script,
}

impl RedisBackend {
    /// Connect to Redis and verify the connection with `PING`.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;

        let mut conn = tokio::time::timeout(config.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                WardenError::with_internal(
                    ErrorCode::CacheConnectionFailed,
                    "Failed to connect to Redis",
                    format!("connect timed out after {:?}", config.connect_timeout),
                )
            })??;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        info!("Redis cache backend connected");

        Ok(Self {
            conn,
            prefix: config
                .key_prefix
                .map(|p| format!("{}:", p))
                .unwrap_or_default(),
            increment: redis::Script::new(INCREMENT_SCRIPT),
        })
    }

    /// Build the full key with prefix.
    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn strip_prefix(&self, key: String) -> String {
        match key.strip_prefix(&self.prefix) {
            Some(stripped) => stripped.to_string(),
            None => key,
        }
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let data: Option<Vec<u8>> = conn.get(self.full_key(key)).await?;

        if data.is_some() {
            counter!("cache_hits_total", "backend" => "redis").increment(1);
        } else {
            counter!("cache_misses_total", "backend" => "redis", "reason" => "not_found")
                .increment(1);
        }
        Ok(data)
    }

    async fn set(&self, key: &str, data: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(self.full_key(key), data, ttl.as_secs().max(1))
            .await?;
        counter!("cache_sets_total", "backend" => "redis").increment(1);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.clone();
        let full_keys: Vec<String> = keys.iter().map(|k| self.full_key(k)).collect();
        let deleted: u64 = conn.del(&full_keys).await?;
        counter!("cache_deletes_total", "backend" => "redis").increment(deleted);
        Ok(deleted)
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let full_pattern = format!("{}{}", self.prefix, pattern);
        let mut cursor: u64 = 0;
        let mut matched = Vec::new();

        loop {
            let (new_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&full_pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;

            matched.extend(keys.into_iter().map(|k| self.strip_prefix(k)));

            cursor = new_cursor;
            if cursor == 0 {
                break;
            }
        }

        // SCAN may return a key more than once
        matched.sort_unstable();
        matched.dedup();
        Ok(matched)
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = self
            .increment
            .key(self.full_key(key))
            .arg(ttl.as_secs().max(1))
            .invoke_async(&mut conn)
            .await?;
        counter!("cache_increments_total", "backend" => "redis").increment(1);
        Ok(value)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn backend() -> InMemoryBackend {
        InMemoryBackend::default()
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = backend();
        cache
            .set("auth:ban:m1", b"true".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("auth:ban:m1").await.unwrap(), Some(b"true".to_vec()));

        let deleted = cache
            .delete(&["auth:ban:m1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(cache.get("auth:ban:m1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let cache = backend();
        cache
            .set("k", b"1".to_vec(), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.keys_matching("*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_keys_matching_glob() {
        let cache = backend();
        let ttl = Duration::from_secs(60);
        for key in [
            "auth:context:m1:org-1",
            "auth:context:m2:org-1",
            "auth:context:m3:org-2",
            "permissions:m1:org-1",
        ] {
            cache.set(key, b"{}".to_vec(), ttl).await.unwrap();
        }

        let mut keys = cache.keys_matching("auth:context:*:org-1").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["auth:context:m1:org-1", "auth:context:m2:org-1"]);

        // '.' in ids is literal, not a regex wildcard
        cache.set("permissions:m1:orgX1", b"{}".to_vec(), ttl).await.unwrap();
        let keys = cache.keys_matching("permissions:*:org.1").await.unwrap();
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn test_escaped_glob_is_literal() {
        let cache = backend();
        let ttl = Duration::from_secs(60);
        cache.set("permissions:m1:a*b", b"{}".to_vec(), ttl).await.unwrap();
        cache.set("permissions:m1:axxb", b"{}".to_vec(), ttl).await.unwrap();

        let keys = cache.keys_matching("permissions:*:a\\*b").await.unwrap();
        assert_eq!(keys, vec!["permissions:m1:a*b"]);
    }

    #[tokio::test]
    async fn test_increment_starts_at_one_and_counts() {
        let cache = backend();
        let ttl = Duration::from_secs(60);
        assert_eq!(cache.increment("c", ttl).await.unwrap(), 1);
        assert_eq!(cache.increment("c", ttl).await.unwrap(), 2);
        assert_eq!(cache.get("c").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn test_increment_restarts_after_expiry() {
        let cache = backend();
        cache.increment("c", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.increment("c", Duration::from_secs(60)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_increment_rejects_non_integer() {
        let cache = backend();
        cache
            .set("c", b"\"text\"".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        let err = cache.increment("c", Duration::from_secs(60)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::CacheError);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_atomic() {
        let cache = Arc::new(backend());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.increment("shared", Duration::from_secs(60)).await.unwrap()
            }));
        }

        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.await.unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=50).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_capacity_eviction() {
        let cache = InMemoryBackend::new(InMemoryConfig {
            max_capacity: 10,
            shard_count: 4,
        });
        for i in 0..25 {
            cache
                .set(&format!("k{}", i), b"1".to_vec(), Duration::from_secs(60 + i))
                .await
                .unwrap();
        }
        assert!(cache.len() <= 10);
        assert!(cache.evictions() > 0);
        // The most recent write always survives
        assert!(cache.get("k24").await.unwrap().is_some());
    }
}
