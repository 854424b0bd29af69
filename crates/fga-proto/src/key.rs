//! Cache key: a 128-bit fingerprint over the fields that identify one
//! `check(object, relation, subject)` call within a store and policy model.

/// FNV-1a 64-bit offset basis / prime. Two independent hashes (different
/// seeds) over the same length-prefixed field stream give us the two
/// halves of a 128-bit fingerprint without pulling in a hashing crate.
const FNV_PRIME: u64 = 0x0000_0100_0000_01B3;
const SEED_LOW: u64 = 0xcbf2_9ce4_8422_2325;
const SEED_HIGH: u64 = 0x9e37_79b9_7f4a_7c15;

struct Fnv1a(u64);

impl Fnv1a {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= u64::from(b);
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    /// Writes a length prefix ahead of the field so that
    /// `("ab", "c")` and `("a", "bc")` never collide on concatenation.
    fn write_field(&mut self, field: &str) {
        self.write(&(field.len() as u32).to_le_bytes());
        self.write(field.as_bytes());
    }

    fn finish(self) -> u64 {
        self.0
    }
}

/// Value-type cache key: a fingerprint of
/// `(store_id, model_id, object_type, object_id, subject_type, subject_id, relation)`.
///
/// Equality is the full 128-bit comparison; collisions are treated as cache
/// misses (bounded by 2⁻¹²⁸). The low 64 bits double as an
/// "object key" usable for partial invalidation of all entries touching a
/// given object, without needing to store the object identity separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub low: u64,
    pub high: u64,
}

impl CacheKey {
    /// Builds the fingerprint for one check's coordinates.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store_id: &str,
        model_id: Option<&str>,
        object_type: &str,
        object_id: &str,
        subject_type: &str,
        subject_id: &str,
        relation: &str,
    ) -> Self {
        let mut low = Fnv1a::new(SEED_LOW);
        let mut high = Fnv1a::new(SEED_HIGH);
        for field in [
            store_id,
            model_id.unwrap_or(""),
            object_type,
            object_id,
            subject_type,
            subject_id,
            relation,
        ] {
            low.write_field(field);
            high.write_field(field);
        }
        Self {
            low: low.finish(),
            high: high.finish(),
        }
    }

    /// The low 64 bits, usable to key a partial (object-scoped) invalidation
    /// index. Not unique on its own — only the full 128-bit key disambiguates
    /// entries.
    #[inline]
    pub fn object_key(&self) -> u64 {
        self.low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_produce_same_key() {
        let a = CacheKey::new("s1", Some("m1"), "doc", "budget", "user", "alice", "reader");
        let b = CacheKey::new("s1", Some("m1"), "doc", "budget", "user", "alice", "reader");
        assert_eq!(a, b);
    }

    #[test]
    fn different_relation_changes_key() {
        let a = CacheKey::new("s1", Some("m1"), "doc", "budget", "user", "alice", "reader");
        let b = CacheKey::new("s1", Some("m1"), "doc", "budget", "user", "alice", "writer");
        assert_ne!(a, b);
    }

    #[test]
    fn field_boundary_does_not_collide() {
        // Concatenation without length-prefixing would make these equal.
        let a = CacheKey::new("s1", None, "ab", "c", "user", "alice", "reader");
        let b = CacheKey::new("s1", None, "a", "bc", "user", "alice", "reader");
        assert_ne!(a, b);
    }

    #[test]
    fn absent_model_id_matches_explicit_empty_one() {
        let a = CacheKey::new("s1", None, "doc", "budget", "user", "alice", "reader");
        let b = CacheKey::new("s1", Some(""), "doc", "budget", "user", "alice", "reader");
        assert_eq!(a, b, "None and Some(\"\") both serialize to an empty field");
    }
}
