//! LRU cache for uncompressed, checksum-verified block contents.
//!
//! Keys pair a per-reader id with the block's file offset, so readers
//! over different files can share one cache without collisions. The
//! cache is capacity-bounded by the total byte size of cached payloads.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique id for one cache client.
pub fn new_cache_id() -> u64 {
    NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identifies one cached block: owning reader plus file offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Id of the reader the block belongs to.
    pub cache_id: u64,
    /// File offset of the block.
    pub offset: u64,
}

impl CacheKey {
    /// Create a new cache key.
    pub fn new(cache_id: u64, offset: u64) -> Self {
        Self { cache_id, offset }
    }
}

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of lookups.
    pub lookups: u64,
    /// Lookups that found an entry.
    pub hits: u64,
    /// Lookups that missed.
    pub misses: u64,
    /// Entries inserted.
    pub insertions: u64,
    /// Entries evicted to make room.
    pub evictions: u64,
}

impl CacheStats {
    /// Hit rate in [0.0, 1.0]; 0.0 when there were no lookups.
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            return 0.0;
        }
        self.hits as f64 / self.lookups as f64
    }
}

struct CacheInner {
    entries: HashMap<CacheKey, Bytes>,
    /// Recency order, least recently used at the front.
    queue: VecDeque<CacheKey>,
    current_size: usize,
    stats: CacheStats,
}

/// A byte-capacity-bounded LRU cache of block contents.
pub struct BlockCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl BlockCache {
    /// Create a cache bounded to `capacity` bytes of payload.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                queue: VecDeque::new(),
                current_size: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Look up a block, refreshing its recency on a hit.
    pub fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let mut inner = self.inner.lock();
        inner.stats.lookups += 1;

        match inner.entries.get(key).cloned() {
            Some(value) => {
                inner.stats.hits += 1;
                if let Some(pos) = inner.queue.iter().position(|k| k == key) {
                    inner.queue.remove(pos);
                }
                inner.queue.push_back(*key);
                Some(value)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Insert a block, evicting least recently used entries until the
    /// cache fits its capacity. Oversized values are simply not cached.
    pub fn insert(&self, key: CacheKey, value: Bytes) {
        if value.len() > self.capacity {
            return;
        }

        let mut inner = self.inner.lock();
        if let Some(old) = inner.entries.remove(&key) {
            inner.current_size -= old.len();
            if let Some(pos) = inner.queue.iter().position(|k| *k == key) {
                inner.queue.remove(pos);
            }
        }

        while inner.current_size + value.len() > self.capacity {
            let Some(victim) = inner.queue.pop_front() else { break };
            if let Some(evicted) = inner.entries.remove(&victim) {
                inner.current_size -= evicted.len();
                inner.stats.evictions += 1;
            }
        }

        inner.current_size += value.len();
        inner.entries.insert(key, value);
        inner.queue.push_back(key);
        inner.stats.insertions += 1;
    }

    /// Drop every entry belonging to `cache_id`.
    pub fn erase_client(&self, cache_id: u64) {
        let mut inner = self.inner.lock();
        let doomed: Vec<CacheKey> = inner
            .entries
            .keys()
            .filter(|k| k.cache_id == cache_id)
            .copied()
            .collect();
        for key in doomed {
            if let Some(value) = inner.entries.remove(&key) {
                inner.current_size -= value.len();
            }
            if let Some(pos) = inner.queue.iter().position(|k| *k == key) {
                inner.queue.remove(pos);
            }
        }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// True if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes of cached payload.
    pub fn current_size(&self) -> usize {
        self.inner.lock().current_size
    }

    /// Snapshot of the effectiveness counters.
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }
}

impl std::fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("BlockCache")
            .field("capacity", &self.capacity)
            .field("entries", &inner.entries.len())
            .field("current_size", &inner.current_size)
            .finish()
    }
}
