//! Caching layer for Warden Core.
//!
//! - **Backend Abstraction**: pluggable backends (in-memory, Redis)
//! - **Type-safe Keys**: one [`KeyType`] per authorization cache family
//! - **Atomic counters**: [`Cache::increment_and_get`] for failed-attempt tracking
//!
//! # Usage
//!
//! ```rust,ignore
//! use warden_core::cache::{Cache, CacheKey};
//!
//! let cache = Cache::in_memory(10_000);
//! let key = CacheKey::ban("mem-1");
//! cache.set(&key, &true).await?;
//! let banned: Option<bool> = cache.get(&key).await?;
//! ```
//!
//! Callers on the authorization path treat every error from this module as a
//! cache miss; nothing here is authoritative.

pub mod backend;
pub mod key;

pub use backend::{CacheBackend, InMemoryBackend, InMemoryConfig, RedisBackend, RedisConfig};
pub use key::{CacheKey, KeyType};

use crate::error::{ErrorCode, Result, WardenError};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

// ═══════════════════════════════════════════════════════════════════════════════
// Main Cache Interface
// ═══════════════════════════════════════════════════════════════════════════════

/// Typed JSON API over a [`CacheBackend`].
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
}

impl Cache {
    /// Create a new cache with the given backend.
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Create an in-memory cache.
    pub fn in_memory(max_capacity: u64) -> Self {
        Self::new(Arc::new(InMemoryBackend::new(InMemoryConfig {
            max_capacity,
            ..Default::default()
        })))
    }

    /// Create a Redis-backed cache.
    pub async fn redis(config: RedisConfig) -> Result<Self> {
        let backend = RedisBackend::new(config).await?;
        Ok(Self::new(Arc::new(backend)))
    }

    /// Name of the underlying backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Get a value from the cache.
    #[instrument(skip(self), fields(key = %key, backend = self.backend.name()))]
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>> {
        let full_key = key.build();
        match self.backend.get(&full_key).await? {
            Some(data) => {
                let value: T = serde_json::from_slice(&data).map_err(|e| {
                    WardenError::with_internal(
                        ErrorCode::DeserializationError,
                        "Failed to deserialize cached value",
                        e.to_string(),
                    )
                })?;
                debug!("Cache hit for key: {}", full_key);
                Ok(Some(value))
            }
            None => {
                debug!("Cache miss for key: {}", full_key);
                Ok(None)
            }
        }
    }

    /// Set a value with the key family's default TTL.
    pub async fn set<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<()> {
        self.set_with_ttl(key, value, key.ttl()).await
    }

    /// Set a value with a specific TTL.
    #[instrument(skip(self, value), fields(key = %key, ttl_secs = ttl.as_secs()))]
    pub async fn set_with_ttl<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let data = serde_json::to_vec(value).map_err(|e| {
            WardenError::with_internal(
                ErrorCode::SerializationError,
                "Failed to serialize value for cache",
                e.to_string(),
            )
        })?;

        self.backend.set(&key.build(), data, ttl).await?;
        debug!("Cache set for key: {} with TTL: {:?}", key, ttl);
        Ok(())
    }

    /// Delete the given keys, returning how many existed.
    #[instrument(skip(self, keys), fields(count = keys.len()))]
    pub async fn delete(&self, keys: &[CacheKey]) -> Result<u64> {
        let raw: Vec<String> = keys.iter().map(CacheKey::build).collect();
        self.delete_raw(&raw).await
    }

    /// Delete keys returned by [`Cache::keys_matching`].
    pub async fn delete_raw(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let deleted = self.backend.delete(keys).await?;
        debug!("Cache delete of {} keys - deleted: {}", keys.len(), deleted);
        Ok(deleted)
    }

    /// List keys matching a glob pattern.
    #[instrument(skip(self))]
    pub async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        self.backend.keys_matching(pattern).await
    }

    /// Delete every key matching a glob pattern.
    #[instrument(skip(self))]
    pub async fn delete_matching(&self, pattern: &str) -> Result<u64> {
        let keys = self.keys_matching(pattern).await?;
        self.delete_raw(&keys).await
    }

    /// Cheap round trip used by health checks.
    pub async fn ping(&self) -> Result<()> {
        self.backend.get("health:ping").await.map(|_| ())
    }

    /// Atomically increment the counter under `key`, (re)setting its TTL.
    #[instrument(skip(self), fields(key = %key, ttl_secs = ttl.as_secs()))]
    pub async fn increment_and_get(&self, key: &CacheKey, ttl: Duration) -> Result<i64> {
        self.backend.increment(&key.build(), ttl).await
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("backend", &self.backend.name())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
