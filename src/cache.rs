use axum::body::Bytes;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::metrics::CACHE_SIZE;
use crate::models::ProxyRequest;

// Cache entry with timestamp, body kept exactly as the provider sent it
#[derive(Clone)]
pub struct CacheEntry {
    pub body: Bytes,
    pub created_at: Instant,
}

// Create a cache key (hash of endpoint + canonical params, never the API key)
pub fn make_cache_key(req: &ProxyRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(req.kind.as_str());
    // params is a BTreeMap so iteration order is stable
    for (name, value) in &req.params {
        hasher.update([0u8]);
        hasher.update(name);
        hasher.update([b'=']);
        hasher.update(value);
    }
    format!("{:x}", hasher.finalize())
}

// Successful upstream bodies, reused for identical requests within the TTL
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    // one lock per key currently being fetched
    inflight: DashMap<String, Arc<Mutex<()>>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            inflight: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached body together with how long it stays fresh.
    pub fn get(&self, key: &str, now: Instant) -> Option<(Bytes, Duration)> {
        let entry = self.entries.get(key)?;
        let age = now.saturating_duration_since(entry.created_at);
        if age < self.ttl {
            Some((entry.body.clone(), self.ttl - age))
        } else {
            None
        }
    }

    /// Waits until no other request is fetching `key`, then holds it until
    /// the returned guard is dropped. Callers re-check the cache after this
    /// so that concurrent misses for one key reach upstream once.
    pub async fn single_flight(&self, key: &str) -> FlightGuard<'_> {
        let lock = Arc::clone(&self.inflight.entry(key.to_string()).or_default());
        let guard = lock.lock_owned().await;
        FlightGuard {
            cache: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    pub fn insert(&self, key: String, body: Bytes, now: Instant) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries.insert(
            key,
            CacheEntry {
                body,
                created_at: now,
            },
        );
        CACHE_SIZE.set(self.entries.len() as f64);
    }

    // Drop expired entries, returns how many were removed
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.created_at) < self.ttl);
        CACHE_SIZE.set(self.entries.len() as f64);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct FlightGuard<'a> {
    cache: &'a ResponseCache,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        // release first so the map holds the last reference when nobody waits
        self.guard.take();
        self.cache
            .inflight
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
