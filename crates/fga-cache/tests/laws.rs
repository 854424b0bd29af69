//! Property tests over two laws the cache tiers must uphold: a round-trip
//! `store` followed by a not-yet-expired, current-generation `lookup`
//! returns what was stored, and a generation bump makes a live entry miss
//! on the next lookup. Exercised against both L1 and L2 so neither tier can
//! special-case its way around the other's invariant.

use fga_cache::{GenerationRegistry, L1Cache, L2Cache, Scope};
use fga_proto::CacheKey;
use proptest::prelude::*;

fn arb_key() -> impl Strategy<Value = CacheKey> {
    (any::<u64>(), any::<u64>()).prop_map(|(low, high)| CacheKey { low, high })
}

proptest! {
    #[test]
    fn l1_round_trip(key in arb_key(), gen in any::<u16>(), allowed in any::<bool>(), now in 0u64..1_000_000) {
        let mut l1 = L1Cache::new();
        let expires_at = now + 1;
        l1.store(&key, gen, expires_at, allowed);
        prop_assert_eq!(l1.lookup(&key, gen, now), Some(allowed));
    }

    #[test]
    fn l1_lazy_invalidation_on_generation_bump(key in arb_key(), gen in 0u16..u16::MAX, allowed in any::<bool>()) {
        let mut l1 = L1Cache::new();
        l1.store(&key, gen, u64::MAX, allowed);
        prop_assert_eq!(l1.lookup(&key, gen + 1, 0), None);
    }

    #[test]
    fn l2_round_trip(key in arb_key(), gen in any::<u16>(), allowed in any::<bool>(), now in 0u64..1_000_000) {
        let l2 = L2Cache::new(64);
        let expires_at = now + 1;
        l2.store(&key, gen, now, expires_at, allowed);
        prop_assert_eq!(l2.lookup(&key, gen, now), Some(allowed));
    }

    #[test]
    fn l2_lazy_invalidation_on_generation_bump(key in arb_key(), gen in 0u16..u16::MAX, allowed in any::<bool>()) {
        let l2 = L2Cache::new(64);
        l2.store(&key, gen, 0, u64::MAX, allowed);
        prop_assert_eq!(l2.lookup(&key, gen + 1, 0), None);
    }

    /// End-to-end through the registry rather than a hand-picked generation
    /// pair: after `bump(scope)`, a lookup using the registry's new current
    /// generation always misses an entry stored under the old one.
    #[test]
    fn registry_bump_invalidates_lazily(key in arb_key(), allowed in any::<bool>(), object_type in "[a-z]{1,8}", object_id in "[a-z]{1,8}") {
        let registry = GenerationRegistry::new();
        let scope = Scope::object(&object_type, &object_id);
        let mut l1 = L1Cache::new();

        let gen0 = registry.current(&scope);
        l1.store(&key, gen0, u64::MAX, allowed);
        prop_assert_eq!(l1.lookup(&key, gen0, 0), Some(allowed));

        registry.bump(&scope);
        let gen1 = registry.current(&scope);
        prop_assert_eq!(l1.lookup(&key, gen1, 0), None);
    }
}
