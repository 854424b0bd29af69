//! L1 cache — per-worker, 2-way set-associative, pseudo-LRU.
//!
//! Private to a single worker; no synchronization. Lookups and stores are
//! O(1) without atomics because nothing else ever touches this instance.

use fga_proto::CacheKey;

const NUM_SETS_BITS: u32 = 14;
/// 16384 sets × 2 ways = 32768 entries.
const NUM_SETS: usize = 1 << NUM_SETS_BITS;
const NUM_WAYS: usize = 2;

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    valid: bool,
    key: CacheKeyBits,
    allowed: bool,
    generation: u16,
    expires_at_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CacheKeyBits {
    low: u64,
    high: u64,
}

impl From<CacheKey> for CacheKeyBits {
    fn from(k: CacheKey) -> Self {
        Self {
            low: k.low,
            high: k.high,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Set {
    ways: [Entry; NUM_WAYS],
    /// Pseudo-LRU "next victim" bit: the way NOT most recently accessed.
    victim: u8,
}

/// Per-worker L1 cache. Not `Send`/`Sync` by convention — each query worker
/// owns its own instance.
pub struct L1Cache {
    sets: Box<[Set]>,
}

impl Default for L1Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl L1Cache {
    pub fn new() -> Self {
        Self {
            sets: vec![Set::default(); NUM_SETS].into_boxed_slice(),
        }
    }

    fn set_index(key: &CacheKey) -> usize {
        (key.low as usize) & (NUM_SETS - 1)
    }

    /// Looks up `key`. Returns `Some(allowed)` on a live hit, `None` on miss
    /// (including lazily-discovered expiry or generation staleness, both of
    /// which invalidate the entry in place before returning).
    pub fn lookup(&mut self, key: &CacheKey, current_gen: u16, now_ms: u64) -> Option<bool> {
        let set = &mut self.sets[Self::set_index(key)];
        let bits = CacheKeyBits::from(*key);

        for way in 0..NUM_WAYS {
            let entry = &mut set.ways[way];
            if !entry.valid || entry.key != bits {
                continue;
            }
            // TTL exactly equal to now counts as expired.
            if entry.expires_at_ms <= now_ms {
                entry.valid = false;
                return None;
            }
            if entry.generation != current_gen {
                entry.valid = false;
                return None;
            }
            set.victim = (way as u8) ^ 1;
            return Some(entry.allowed);
        }
        None
    }

    /// Stores (or updates in place) an entry for `key`.
    pub fn store(&mut self, key: &CacheKey, generation: u16, expires_at_ms: u64, allowed: bool) {
        let set = &mut self.sets[Self::set_index(key)];
        let bits = CacheKeyBits::from(*key);

        let mut empty_way = None;
        for way in 0..NUM_WAYS {
            let entry = &mut set.ways[way];
            if !entry.valid {
                if empty_way.is_none() {
                    empty_way = Some(way);
                }
                continue;
            }
            if entry.key == bits {
                entry.allowed = allowed;
                entry.expires_at_ms = expires_at_ms;
                entry.generation = generation;
                set.victim = (way as u8) ^ 1;
                return;
            }
        }

        let target = empty_way.unwrap_or(set.victim as usize);
        set.ways[target] = Entry {
            valid: true,
            key: bits,
            allowed,
            generation,
            expires_at_ms,
        };
        set.victim = (target as u8) ^ 1;
    }

    pub fn invalidate_all(&mut self) {
        for set in self.sets.iter_mut() {
            for way in &mut set.ways {
                way.valid = false;
            }
            set.victim = 0;
        }
    }

    pub fn invalidate_by_generation(&mut self, old_generation: u16) {
        for set in self.sets.iter_mut() {
            for way in &mut set.ways {
                if way.valid && way.generation == old_generation {
                    way.valid = false;
                }
            }
        }
    }
}
