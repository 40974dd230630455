//! Bounded in-memory cache for hot resources and containers.
//!
//! [`BoundedCache`] keeps recently used items under three simultaneous
//! limits: total bytes, entry count, and per-entry TTL. Reads take a shared
//! lock and bump per-entry atomics; only inserts, evictions, and expiry
//! take the exclusive lock. A background sweeper removes entries past
//! expiry so idle caches do not pin memory until the next lookup.
//!
//! The cache is strictly a read-side accelerator. Writers invalidate after
//! every mutation and a lost entry only costs a trip to the backing store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use strata_core::config::CacheConfig;
use strata_core::{Container, Resource};

/// A value that can live in a [`BoundedCache`].
///
/// Size is an estimate used for the byte bound; it only needs to be
/// proportional to real memory use, not exact.
pub trait CacheItem: Clone + Send + Sync + 'static {
    /// Key the item is stored and invalidated under.
    fn cache_key(&self) -> &str;

    /// Approximate in-memory size in bytes.
    fn size_bytes(&self) -> u64;
}

impl CacheItem for Resource {
    fn cache_key(&self) -> &str {
        &self.id
    }

    fn size_bytes(&self) -> u64 {
        let tags: usize = self
            .tags
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum();
        (self.data.len() + self.id.len() + self.content_type.len() + tags) as u64
    }
}

impl CacheItem for Container {
    fn cache_key(&self) -> &str {
        &self.id
    }

    fn size_bytes(&self) -> u64 {
        let members: usize = self.members.iter().map(String::len).sum();
        let parent = self.parent_id.as_deref().map_or(0, str::len);
        let tags: usize = self.tags.iter().map(|(k, v)| k.len() + v.len()).sum();
        (self.data.len()
            + self.id.len()
            + self.content_type.len()
            + self.title.len()
            + self.description.len()
            + members
            + parent
            + tags) as u64
    }
}

/// Point-in-time cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub max_bytes: u64,
    pub max_entries: usize,
}

struct Entry<T> {
    value: T,
    size: u64,
    /// Nanoseconds since the cache epoch after which the sweeper drops this
    /// entry, regardless of access.
    expires_at: u64,
    /// Nanoseconds since the cache epoch, updated on every hit.
    last_accessed: AtomicU64,
    hit_count: AtomicU64,
}

struct Shared<T> {
    entries: RwLock<HashMap<String, Entry<T>>>,
    bytes: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    max_bytes: u64,
    max_entries: usize,
    ttl: Duration,
    epoch: Instant,
}

impl<T: CacheItem> Shared<T> {
    fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn expired(&self, last_accessed: u64, now: u64) -> bool {
        now.saturating_sub(last_accessed) > self.ttl.as_nanos() as u64
    }

    fn get(&self, key: &str) -> Option<T> {
        let now = self.now_nanos();
        {
            let entries = read_lock(&self.entries);
            match entries.get(key) {
                Some(entry) if !self.expired(entry.last_accessed.load(Ordering::Relaxed), now) => {
                    entry.last_accessed.store(now, Ordering::Relaxed);
                    entry.hit_count.fetch_add(1, Ordering::Relaxed);
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        // Entry was present but stale; upgrade to the write lock and evict
        // it lazily. Re-check under the exclusive lock since another caller
        // may have replaced it in the meantime.
        let mut entries = write_lock(&self.entries);
        let now = self.now_nanos();
        let stale = match entries.get(key) {
            Some(entry) if self.expired(entry.last_accessed.load(Ordering::Relaxed), now) => true,
            Some(entry) => {
                entry.last_accessed.store(now, Ordering::Relaxed);
                entry.hit_count.fetch_add(1, Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            None => false,
        };
        if stale {
            if let Some(entry) = entries.remove(key) {
                self.bytes.fetch_sub(entry.size, Ordering::Relaxed);
                self.expirations.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn put(&self, item: T) {
        let size = item.size_bytes();
        // Items this large would evict half the cache on their own; serving
        // them straight from the backing store is cheaper overall.
        if size > self.max_bytes / 2 {
            tracing::debug!(
                key = item.cache_key(),
                size = size,
                max_bytes = self.max_bytes,
                "item too large to cache, skipping"
            );
            return;
        }

        let key = item.cache_key().to_string();
        let now = self.now_nanos();
        let mut entries = write_lock(&self.entries);

        if let Some(old) = entries.remove(&key) {
            self.bytes.fetch_sub(old.size, Ordering::Relaxed);
        }

        while !entries.is_empty()
            && (self.bytes.load(Ordering::Relaxed) + size > self.max_bytes
                || entries.len() + 1 > self.max_entries)
        {
            let victim = entries
                .iter()
                .min_by_key(|(k, e)| (e.last_accessed.load(Ordering::Relaxed), k.as_str()))
                .map(|(k, _)| k.clone());
            match victim {
                Some(victim) => {
                    if let Some(entry) = entries.remove(&victim) {
                        self.bytes.fetch_sub(entry.size, Ordering::Relaxed);
                        self.evictions.fetch_add(1, Ordering::Relaxed);
                        tracing::trace!(key = victim.as_str(), "evicted least recently used entry");
                    }
                }
                None => break,
            }
        }

        entries.insert(
            key,
            Entry {
                value: item,
                size,
                expires_at: now + self.ttl.as_nanos() as u64,
                last_accessed: AtomicU64::new(now),
                hit_count: AtomicU64::new(0),
            },
        );
        self.bytes.fetch_add(size, Ordering::Relaxed);
    }

    fn invalidate(&self, key: &str) -> bool {
        let mut entries = write_lock(&self.entries);
        match entries.remove(key) {
            Some(entry) => {
                self.bytes.fetch_sub(entry.size, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    fn clear(&self) {
        let mut entries = write_lock(&self.entries);
        entries.clear();
        self.bytes.store(0, Ordering::Relaxed);
    }

    /// Drop every entry past its absolute expiry. Returns how many were
    /// removed.
    fn sweep(&self) -> usize {
        let now = self.now_nanos();
        let mut entries = write_lock(&self.entries);
        let before = entries.len();
        let mut freed = 0u64;
        entries.retain(|_, entry| {
            if now >= entry.expires_at {
                freed += entry.size;
                false
            } else {
                true
            }
        });
        let removed = before - entries.len();
        if removed > 0 {
            self.bytes.fetch_sub(freed, Ordering::Relaxed);
            self.expirations
                .fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    fn stats(&self) -> CacheStats {
        let entries = read_lock(&self.entries);
        CacheStats {
            entries: entries.len(),
            bytes: self.bytes.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            max_bytes: self.max_bytes,
            max_entries: self.max_entries,
        }
    }

    fn most_accessed(&self, n: usize) -> Vec<(String, u64)> {
        let entries = read_lock(&self.entries);
        let mut ranked: Vec<(String, u64)> = entries
            .iter()
            .map(|(k, e)| (k.clone(), e.hit_count.load(Ordering::Relaxed)))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        tracing::warn!("cache lock poisoned, recovering");
        poisoned.into_inner()
    })
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        tracing::warn!("cache lock poisoned, recovering");
        poisoned.into_inner()
    })
}

/// LRU cache bounded by bytes, entry count, and TTL.
///
/// Must be constructed inside a Tokio runtime; the background sweeper is
/// spawned at construction and aborted when the cache is dropped.
pub struct BoundedCache<T: CacheItem> {
    shared: Arc<Shared<T>>,
    sweeper: tokio::task::JoinHandle<()>,
}

impl<T: CacheItem> BoundedCache<T> {
    pub fn new(config: CacheConfig) -> Self {
        let shared = Arc::new(Shared {
            entries: RwLock::new(HashMap::new()),
            bytes: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            max_bytes: config.max_bytes,
            max_entries: config.max_entries.max(1),
            ttl: config.ttl(),
            epoch: Instant::now(),
        });
        let sweeper = spawn_sweeper(Arc::downgrade(&shared), config.sweep_interval());
        Self { shared, sweeper }
    }

    /// Look up a value, refreshing its recency on a hit.
    ///
    /// Entries idle longer than the TTL count as misses and are removed.
    pub fn get(&self, key: &str) -> Option<T> {
        self.shared.get(key)
    }

    /// Insert or replace a value under its own key.
    ///
    /// Evicts least recently used entries until the byte and entry bounds
    /// hold. Items larger than half the byte bound are not cached.
    pub fn put(&self, item: T) {
        self.shared.put(item);
    }

    /// Remove one entry. Returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.shared.invalidate(key)
    }

    /// Remove all entries, keeping the counters.
    pub fn clear(&self) {
        self.shared.clear();
    }

    /// Current counters and occupancy.
    pub fn stats(&self) -> CacheStats {
        self.shared.stats()
    }

    /// The `n` entries with the most hits, ordered hottest first.
    pub fn most_accessed(&self, n: usize) -> Vec<(String, u64)> {
        self.shared.most_accessed(n)
    }

    /// Run one expiry pass immediately, outside the sweeper schedule.
    pub fn sweep_now(&self) -> usize {
        self.shared.sweep()
    }
}

impl<T: CacheItem> Drop for BoundedCache<T> {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

fn spawn_sweeper<T: CacheItem>(
    shared: std::sync::Weak<Shared<T>>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick fires immediately; skip it so a fresh cache is not
        // swept before anything is inserted.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(shared) = shared.upgrade() else {
                break;
            };
            let removed = shared.sweep();
            if removed > 0 {
                tracing::debug!(removed = removed, "cache sweeper expired stale entries");
            }
        }
    })
}
