//! Atomic counters backing `stats() -> (per-metric rows)`. Every read is a
//! plain atomic load — `stats()` never blocks, even while a cache lookup or
//! RPC is in flight elsewhere.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Stats {
    pub l1_hits: AtomicU64,
    pub l1_misses: AtomicU64,
    pub requests_dispatched: AtomicU64,
    pub requests_failed: AtomicU64,
    pub cancellations: AtomicU64,
}

impl Stats {
    pub fn record_l1_hit(&self) {
        self.l1_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l1_miss(&self) {
        self.l1_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self) {
        self.requests_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancellation(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }

    /// One `(metric_name, value)` row per counter, plus the L2 cache's own
    /// hit/miss/eviction counters — the shape a host's SQL-visible stats
    /// view would project directly.
    pub fn rows(&self, l2: &fga_cache::L2Cache) -> Vec<(&'static str, u64)> {
        vec![
            ("l1_hits", self.l1_hits.load(Ordering::Relaxed)),
            ("l1_misses", self.l1_misses.load(Ordering::Relaxed)),
            ("l2_hits", l2.hits()),
            ("l2_misses", l2.misses()),
            ("l2_evictions", l2.evictions()),
            ("requests_dispatched", self.requests_dispatched.load(Ordering::Relaxed)),
            ("requests_failed", self.requests_failed.load(Ordering::Relaxed)),
            ("cancellations", self.cancellations.load(Ordering::Relaxed)),
        ]
    }
}
