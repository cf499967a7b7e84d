use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::CacheConfig;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    generation: u64,
}

/// Thread-safe memoization keyed by normalized query text.
///
/// Unbounded and non-expiring unless `max_entries` / `ttl` are set. With a bound, the
/// oldest inserted key is evicted first. Clones share the same storage.
#[derive(Clone)]
pub struct MemoCache<V: Clone> {
    name: &'static str,
    storage: Arc<DashMap<String, CacheEntry<V>>>,
    /// Insertion order as (key, generation); stale pairs are skipped on eviction.
    order: Arc<Mutex<VecDeque<(String, u64)>>>,
    next_generation: Arc<AtomicU64>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    max_entries: Option<usize>,
    ttl: Option<Duration>,
}

impl<V: Clone> MemoCache<V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            storage: Arc::new(DashMap::new()),
            order: Arc::new(Mutex::new(VecDeque::new())),
            next_generation: Arc::new(AtomicU64::new(0)),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            max_entries: None,
            ttl: None,
        }
    }

    pub fn from_config(name: &'static str, config: &CacheConfig) -> Self {
        let mut cache = Self::new(name);
        cache.max_entries = config.max_entries.filter(|n| *n > 0);
        cache.ttl = config.ttl_seconds.map(Duration::from_secs);
        info!(
            "Initializing {} cache (max_entries: {:?}, ttl: {:?})",
            name, cache.max_entries, cache.ttl
        );
        cache
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries).filter(|n| *n > 0);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn is_expired(&self, entry: &CacheEntry<V>) -> bool {
        self.ttl
            .map(|ttl| entry.inserted_at.elapsed() > ttl)
            .unwrap_or(false)
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let Some(entry) = self.storage.get(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        // Lazy deletion
        if self.is_expired(&entry) {
            drop(entry); // release read lock
            self.remove_if_expired(key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.value.clone())
    }

    /// Removes `key` only if the stored entry is still expired; a value written
    /// since the caller's read survives.
    fn remove_if_expired(&self, key: &str) -> bool {
        let removed = self
            .storage
            .remove_if(key, |_, e| self.is_expired(e))
            .is_some();
        if removed {
            debug!("{} cache entry expired: {:?}", self.name, key);
        }
        removed
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let mut order = self.order.lock();
        self.storage.insert(
            key.clone(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                generation,
            },
        );
        order.push_back((key, generation));

        let Some(max) = self.max_entries else {
            return;
        };

        while self.storage.len() > max {
            let Some((old_key, old_generation)) = order.pop_front() else {
                break;
            };
            if self
                .storage
                .remove_if(&old_key, |_, e| e.generation == old_generation)
                .is_some()
            {
                debug!("{} cache evicted {:?}", self.name, old_key);
            }
        }

        // Superseded pairs pile up when a key is rewritten; drop them once they
        // outnumber live entries.
        if order.len() > max.saturating_mul(2) {
            let storage = &self.storage;
            order.retain(|(k, g)| {
                storage
                    .get(k)
                    .map(|e| e.generation == *g)
                    .unwrap_or(false)
            });
        }
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.storage.remove(key).map(|(_, entry)| entry.value)
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn clear(&self) {
        let mut order = self.order.lock();
        self.storage.clear();
        order.clear();
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }

        let start_len = self.storage.len();
        self.storage.retain(|_, entry| !self.is_expired(entry));
        let count = start_len.saturating_sub(self.storage.len());

        if count > 0 {
            info!("Cleaned up {} expired {} cache entries", count, self.name);
        }

        count
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            name: self.name,
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub name: &'static str,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}
