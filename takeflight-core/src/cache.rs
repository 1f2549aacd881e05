//! Cache coherence for display-path reads.
//!
//! Nothing in here is consulted when deciding whether seats can be reserved;
//! the cache only serves snapshots to readers and is invalidated by every
//! mutation of the entity it mirrors.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;
use crate::error::CacheError;
use crate::repository::Cache;

/// Namespaced cache key, e.g. `flight:{id}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn flight(id: Uuid) -> Self {
        Self(format!("flight:{}", id))
    }

    pub fn booking(id: Uuid) -> Self {
        Self(format!("booking:{}", id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReadStrategy {
    /// Serve the cached value if present, otherwise load and populate
    CacheAside,
    /// Always load from the store and refresh the cache
    WriteThrough,
    /// Serve the cached value and push its expiry out on every hit
    Sliding,
}

/// Per-call-site read configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadPolicy {
    pub strategy: ReadStrategy,
    pub ttl_seconds: u64,
}

impl ReadPolicy {
    pub fn new(strategy: ReadStrategy, ttl: Duration) -> Self {
        Self { strategy, ttl_seconds: ttl.as_secs() }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl Default for ReadPolicy {
    fn default() -> Self {
        Self { strategy: ReadStrategy::CacheAside, ttl_seconds: 300 }
    }
}

const GENERATION_STRIPES: usize = 64;

/// Cached value together with the invalidation generation it was loaded under
#[derive(Serialize, Deserialize)]
struct Stamped<T> {
    generation: u64,
    value: T,
}

/// Keeps display-path reads coherent with invalidations.
///
/// Every invalidation bumps a generation counter for the key's stripe before
/// deleting the entry. Readers stamp what they store with the generation they
/// started under, and a hit whose stamp is behind the current generation is a
/// miss. A snapshot loaded before a mutation is therefore never served after
/// the mutation's invalidation, even if it reaches the cache late. Clones
/// share the counters; across processes sharing one Redis staleness is
/// bounded by the TTL.
#[derive(Clone)]
pub struct CacheCoherence {
    cache: Arc<dyn Cache>,
    generations: Arc<[AtomicU64]>,
}

impl CacheCoherence {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        let generations = (0..GENERATION_STRIPES).map(|_| AtomicU64::new(0)).collect();
        Self { cache, generations }
    }

    /// Drop the entry for `key`. Missing keys are fine.
    pub async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.generation_slot(key).fetch_add(1, Ordering::SeqCst);
        self.cache.delete(key.as_str()).await?;
        debug!("Cache invalidated: {}", key);
        Ok(())
    }

    /// Invalidate after a mutation. The mutation already committed, so a
    /// failure here is reported loudly but does not fail the caller.
    pub async fn invalidate_after_write(&self, key: &CacheKey) {
        if let Err(e) = self.invalidate(key).await {
            warn!("Failed to invalidate {} after write, readers may see stale data: {}", key, e);
        }
    }

    /// Read-through: hit returns the cached value, miss calls `loader`
    /// and caches its result. Loader errors propagate and nothing is cached.
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &CacheKey, ttl: Duration, loader: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let seen = self.generation(key);
        if let Some((value, _)) = self.lookup::<T>(key, seen).await {
            return Ok(value);
        }
        let value = loader().await?;
        self.populate(key, &value, ttl, seen).await;
        Ok(value)
    }

    /// Read according to a per-call-site policy
    pub async fn read<T, E, F, Fut>(&self, key: &CacheKey, policy: ReadPolicy, loader: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match policy.strategy {
            ReadStrategy::CacheAside => self.get_or_load(key, policy.ttl(), loader).await,
            ReadStrategy::WriteThrough => {
                let seen = self.generation(key);
                let value = loader().await?;
                self.populate(key, &value, policy.ttl(), seen).await;
                Ok(value)
            }
            ReadStrategy::Sliding => {
                let seen = self.generation(key);
                if let Some((value, raw)) = self.lookup::<T>(key, seen).await {
                    if let Err(e) = self.cache.set(key.as_str(), &raw, policy.ttl()).await {
                        warn!("Failed to extend TTL for {}: {}", key, e);
                    }
                    return Ok(value);
                }
                let value = loader().await?;
                self.populate(key, &value, policy.ttl(), seen).await;
                Ok(value)
            }
        }
    }

    fn generation_slot(&self, key: &CacheKey) -> &AtomicU64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.generations[(hasher.finish() % self.generations.len() as u64) as usize]
    }

    fn generation(&self, key: &CacheKey) -> u64 {
        self.generation_slot(key).load(Ordering::SeqCst)
    }

    /// Cached value and its raw entry, if present, decodable and stamped
    /// with the current generation `seen`
    async fn lookup<T: DeserializeOwned>(&self, key: &CacheKey, seen: u64) -> Option<(T, String)> {
        let raw = match self.cache.get(key.as_str()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache read failed for {}, falling back to store: {}", key, e);
                return None;
            }
        };
        match decode::<T>(&raw) {
            Ok(entry) if entry.generation == seen => Some((entry.value, raw)),
            Ok(_) => {
                debug!("Ignoring cache entry {} loaded before its last invalidation", key);
                None
            }
            Err(e) => {
                warn!("Discarding undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    async fn populate<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration, seen: u64) {
        if self.generation(key) != seen {
            debug!("Skipping cache write for {}, invalidated during the read", key);
            return;
        }
        let raw = match encode(value, seen) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Could not serialize value for {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.cache.set(key.as_str(), &raw, ttl).await {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }
}

fn encode<T: Serialize>(value: &T, generation: u64) -> Result<String, CacheError> {
    Ok(serde_json::to_string(&Stamped { generation, value })?)
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<Stamped<T>, CacheError> {
    Ok(serde_json::from_str(raw)?)
}

/// Process-local cache with TTL expiry, used by tests and single-node setups
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining lifetime of a live entry
    pub async fn ttl_of(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .and_then(|(_, expires_at)| expires_at.checked_duration_since(Instant::now()))
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
