//! L2 cache — shared, fixed-capacity, clock-sweep eviction with an external
//! hash index. One instance is shared by every worker process/task.

use fga_proto::CacheKey;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use tracing::trace;

const USAGE_MAX: u8 = 5;

#[derive(Debug)]
struct CacheEntry {
    key: CacheKey,
    allowed: bool,
    generation: u16,
    expires_at_ms: u64,
    /// Atomic so [`L2Cache::lookup`] can bump it while holding only the
    /// shared lock.
    usage_count: AtomicU8,
    valid: bool,
}

impl Default for CacheEntry {
    fn default() -> Self {
        Self {
            key: CacheKey { low: 0, high: 0 },
            allowed: false,
            generation: 0,
            expires_at_ms: 0,
            usage_count: AtomicU8::new(0),
            valid: false,
        }
    }
}

#[derive(Debug, Default)]
struct L2Stats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Shared L2 cache. Internally `Arc`-free — callers wrap it in an `Arc`
/// themselves, matching `fga-channel`'s convention of owning shared state
/// explicitly rather than hiding it.
pub struct L2Cache {
    lock: RwLock<L2Inner>,
    next_victim: AtomicU32,
    capacity: usize,
    stats: L2Stats,
}

struct L2Inner {
    entries: Vec<CacheEntry>,
    index: HashMap<(u64, u64), usize>,
}

impl L2Cache {
    /// `capacity` is the number of entries, derived by the caller from
    /// `cache_size_mb` divided by entry size, or capped by `max_cache_entries`
    /// if configured.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "L2 cache capacity must be positive");
        Self {
            lock: RwLock::new(L2Inner {
                entries: (0..capacity).map(|_| CacheEntry::default()).collect(),
                index: HashMap::with_capacity(capacity * 2),
            }),
            next_victim: AtomicU32::new(0),
            capacity,
            stats: L2Stats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn entry_expired(entry: &CacheEntry, current_generation: u16, now_ms: u64) -> bool {
        !entry.valid || entry.expires_at_ms <= now_ms || entry.generation != current_generation
    }

    /// Looks up `key`. Increments the clock-sweep usage counter (saturating
    /// at [`USAGE_MAX`]) on a hit. `current_generation` is compared against
    /// the per-entry generation; callers are expected to have already bumped
    /// the registry before calling if a scoped invalidation is in flight.
    pub fn lookup(&self, key: &CacheKey, current_generation: u16, now_ms: u64) -> Option<bool> {
        let index_key = (key.low, key.high);
        let guard = self.lock.read();
        let Some(&slot) = guard.index.get(&index_key) else {
            drop(guard);
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        let entry = &guard.entries[slot];

        if Self::entry_expired(entry, current_generation, now_ms) {
            entry.usage_count.store(0, Ordering::Relaxed);
            drop(guard);
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        entry
            .usage_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |u| {
                (u < USAGE_MAX).then_some(u + 1)
            })
            .ok();
        let allowed = entry.allowed;
        drop(guard);
        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        Some(allowed)
    }

    /// Finds a victim slot by clock-sweep: advance the hand, claim the first
    /// invalid/expired/stale entry, otherwise decrement usage and continue.
    /// Returns `None` if a full sweep finds no victim (every entry pinned at
    /// max usage with none stale).
    fn find_victim(inner: &mut L2Inner, capacity: usize, next_victim: &AtomicU32, current_generation: u16, now_ms: u64) -> Option<usize> {
        let mut remaining = capacity;
        loop {
            let victim = (next_victim.fetch_add(1, Ordering::Relaxed) as usize) % capacity;
            let entry = &inner.entries[victim];

            if Self::entry_expired(entry, current_generation, now_ms) {
                return Some(victim);
            }
            let usage = entry.usage_count.load(Ordering::Relaxed);
            if usage > 0 {
                entry.usage_count.store(usage - 1, Ordering::Relaxed);
            } else {
                return Some(victim);
            }

            remaining -= 1;
            if remaining == 0 {
                return None;
            }
        }
    }

    /// Stores (or updates in place) an entry for `key`. A store that cannot
    /// find a victim slot silently aborts — a cache miss remains correct.
    pub fn store(&self, key: &CacheKey, current_generation: u16, now_ms: u64, expires_at_ms: u64, allowed: bool) {
        let index_key = (key.low, key.high);
        let mut guard = self.lock.write();

        if let Some(&slot) = guard.index.get(&index_key) {
            let entry = &mut guard.entries[slot];
            entry.key = *key;
            entry.allowed = allowed;
            entry.expires_at_ms = expires_at_ms;
            entry.generation = current_generation;
            entry.usage_count.store(USAGE_MAX, Ordering::Relaxed);
            entry.valid = true;
            return;
        }

        let Some(victim) = Self::find_victim(&mut guard, self.capacity, &self.next_victim, current_generation, now_ms) else {
            return;
        };

        let evicted_key = {
            let entry = &guard.entries[victim];
            entry.valid.then_some((entry.key.low, entry.key.high))
        };
        if let Some(evicted_key) = evicted_key {
            guard.index.remove(&evicted_key);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            trace!(victim, "l2 clock-sweep evicted an entry");
        }

        guard.entries[victim] = CacheEntry {
            key: *key,
            allowed,
            generation: current_generation,
            expires_at_ms,
            usage_count: AtomicU8::new(USAGE_MAX),
            valid: true,
        };
        guard.index.insert(index_key, victim);
    }

    /// Eagerly invalidates every entry still tagged with `generation`,
    /// regardless of which scope produced it. Used when a
    /// [`crate::GenerationRegistry`] bump wraps its 16-bit counter past
    /// `u16::MAX`: lazy invalidation alone can't tell an entry written under
    /// "generation 1" two cycles ago from one written under the just-wrapped
    /// "generation 1", so the stale entry must be evicted up front instead of
    /// waiting for a `generation != current_generation` check that would
    /// never trip. Scans the whole table — rare enough (once per ~65535
    /// bumps of one scope) that an O(capacity) sweep is the right tradeoff
    /// over tracking a secondary generation index.
    pub fn invalidate_by_generation(&self, generation: u16) {
        let mut guard = self.lock.write();
        let L2Inner { entries, index } = &mut *guard;
        let mut purged = 0u32;
        for entry in entries.iter_mut() {
            if entry.valid && entry.generation == generation {
                entry.valid = false;
                index.remove(&(entry.key.low, entry.key.high));
                purged += 1;
            }
        }
        if purged > 0 {
            trace!(generation, purged, "purged aliased entries after a generation wrap");
        }
    }

    pub fn hits(&self) -> u64 {
        self.stats.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.stats.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.stats.evictions.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.lock.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
