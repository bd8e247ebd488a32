//! Byte-budgeted LRU cache of rendered frames.
//!
//! One cache is shared by every mount and every pipeline worker. All state
//! lives under a single mutex so `get`/`put`/`mark_load_failed` are
//! linearizable and the byte accounting can never drift.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace};

use super::{CacheKey, CatalogId};

/// Default window during which a failed frame is not retried.
pub const DEFAULT_FAILURE_BACKOFF: Duration = Duration::from_secs(2);

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub resident_bytes: u64,
    pub entries: usize,
    pub max_bytes: u64,
}

impl FrameCacheStats {
    /// Fraction of lookups served from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Slot {
    data: Bytes,
    tick: u64,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<CacheKey, Slot>,
    /// Recency order: oldest tick first.
    recency: BTreeMap<u64, CacheKey>,
    failures: HashMap<CacheKey, Instant>,
    /// Invalidated catalogs; results arriving for them are dropped.
    retired: HashSet<CatalogId>,
    clock: u64,
    resident_bytes: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl Inner {
    fn touch(&mut self, key: &CacheKey) {
        self.clock += 1;
        let tick = self.clock;
        if let Some(slot) = self.slots.get_mut(key) {
            self.recency.remove(&slot.tick);
            slot.tick = tick;
            self.recency.insert(tick, key.clone());
        }
    }

    fn remove(&mut self, key: &CacheKey) -> Option<Slot> {
        let slot = self.slots.remove(key)?;
        self.recency.remove(&slot.tick);
        self.resident_bytes -= slot.data.len() as u64;
        Some(slot)
    }
}

/// Shared frame cache with LRU eviction and failure markers.
///
/// An entry larger than the whole budget is still admitted; it then
/// evicts everything else and stays resident alone until displaced.
pub struct FrameCache {
    inner: Mutex<Inner>,
    max_bytes: u64,
    failure_backoff: Duration,
}

impl FrameCache {
    pub fn new(max_bytes: u64) -> Self {
        Self::with_failure_backoff(max_bytes, DEFAULT_FAILURE_BACKOFF)
    }

    /// Create a cache whose failure markers expire after `failure_backoff`.
    pub fn with_failure_backoff(max_bytes: u64, failure_backoff: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_bytes,
            failure_backoff,
        }
    }

    /// Look up `key`, refreshing its recency on a hit.
    pub fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let mut inner = self.inner.lock();
        let data = inner.slots.get(key).map(|slot| slot.data.clone());
        match data {
            Some(data) => {
                inner.hits += 1;
                inner.touch(key);
                Some(data)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Insert or replace `key`, then evict least recently used entries until
    /// the budget holds or only this entry remains.
    ///
    /// Clears any failure marker for `key`. Ignored if the catalog of `key`
    /// was invalidated.
    pub fn put(&self, key: CacheKey, data: Bytes) {
        let mut inner = self.inner.lock();
        if inner.retired.contains(&key.catalog) {
            trace!(key = %key, "Dropping frame of invalidated catalog");
            return;
        }
        inner.failures.remove(&key);
        inner.remove(&key);

        inner.clock += 1;
        let tick = inner.clock;
        inner.resident_bytes += data.len() as u64;
        inner.recency.insert(tick, key.clone());
        inner.slots.insert(key, Slot { data, tick });

        while inner.resident_bytes > self.max_bytes && inner.slots.len() > 1 {
            let Some((_, oldest)) = inner.recency.pop_first() else {
                break;
            };
            if let Some(slot) = inner.slots.remove(&oldest) {
                inner.resident_bytes -= slot.data.len() as u64;
                inner.evictions += 1;
                trace!(key = %oldest, bytes = slot.data.len(), "Evicted frame");
            }
        }
    }

    /// Record that generating `key` failed.
    ///
    /// Reads of `key` are short-circuited until the backoff window expires
    /// or a later `put` succeeds.
    pub fn mark_load_failed(&self, key: &CacheKey) {
        let mut inner = self.inner.lock();
        if inner.retired.contains(&key.catalog) {
            return;
        }
        inner.remove(key);
        inner.failures.insert(key.clone(), Instant::now());
    }

    /// Whether `key` failed within the backoff window.
    pub fn is_load_failed(&self, key: &CacheKey) -> bool {
        let mut inner = self.inner.lock();
        match inner.failures.get(key) {
            Some(at) if at.elapsed() < self.failure_backoff => true,
            Some(_) => {
                inner.failures.remove(key);
                false
            }
            None => false,
        }
    }

    /// Drop every entry and failure marker of `catalog`, and ignore any
    /// result stored for it afterwards. Catalog ids are never reused, so
    /// jobs still in flight for a retired catalog cannot hold budget.
    ///
    /// Returns the number of cached entries removed.
    pub fn invalidate_catalog(&self, catalog: CatalogId) -> usize {
        let mut inner = self.inner.lock();
        inner.retired.insert(catalog);
        let stale: Vec<CacheKey> = inner
            .slots
            .keys()
            .filter(|key| key.catalog == catalog)
            .cloned()
            .collect();
        for key in &stale {
            inner.remove(key);
        }
        inner.failures.retain(|key, _| key.catalog != catalog);

        if !stale.is_empty() {
            debug!(%catalog, removed = stale.len(), "Invalidated cached frames");
        }
        stale.len()
    }

    pub fn stats(&self) -> FrameCacheStats {
        let inner = self.inner.lock();
        FrameCacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            resident_bytes: inner.resident_bytes,
            entries: inner.slots.len(),
            max_bytes: self.max_bytes,
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }
}
