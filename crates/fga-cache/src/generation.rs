//! Generation registry — monotonic counters that drive lazy cache
//! invalidation. A cache entry is stale the moment its stored generation no
//! longer matches the registry's current value for its scope; nothing needs
//! to touch the cache itself at bump time.

use parking_lot::Mutex;
use std::collections::HashMap;

/// A generation's scope: either the single global counter, or a partition
/// keyed by an arbitrary string (typically `"{object_type}:{object_id}"`,
/// built with [`Scope::object`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Partition(String),
}

impl Scope {
    /// Builds a scope key for one object, e.g. `Scope::object("doc", "budget")`.
    pub fn object(object_type: &str, object_id: &str) -> Self {
        Self::Partition(format!("{object_type}:{object_id}"))
    }
}

/// Outcome of a [`GenerationRegistry::bump`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BumpResult {
    pub generation: u16,
    /// `true` when the 16-bit counter wrapped past `u16::MAX` and was reset.
    /// A caller that sees `wrapped == true` must eagerly invalidate any
    /// entries still tagged with a stale generation for this scope — lazy
    /// invalidation alone cannot distinguish "old generation 3" from "new
    /// generation 3" after a wrap.
    pub wrapped: bool,
}

/// Thread-safe table of 16-bit generation counters, one per scope.
#[derive(Debug, Default)]
pub struct GenerationRegistry {
    counters: Mutex<HashMap<String, u16>>,
}

impl GenerationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn map_key(scope: &Scope) -> String {
        match scope {
            Scope::Global => "__global__".to_string(),
            Scope::Partition(key) => key.clone(),
        }
    }

    /// Current generation for `scope`. Scopes never bumped read as `0`, a
    /// valid baseline generation rather than a sentinel.
    pub fn current(&self, scope: &Scope) -> u16 {
        let key = Self::map_key(scope);
        *self.counters.lock().get(&key).unwrap_or(&0)
    }

    /// Increments the generation for `scope`, returning the new value and
    /// whether the counter wrapped.
    pub fn bump(&self, scope: &Scope) -> BumpResult {
        let key = Self::map_key(scope);
        let mut counters = self.counters.lock();
        let entry = counters.entry(key).or_insert(0);
        if *entry == u16::MAX {
            *entry = 1;
            BumpResult {
                generation: *entry,
                wrapped: true,
            }
        } else {
            *entry += 1;
            BumpResult {
                generation: *entry,
                wrapped: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_scope_reads_as_zero() {
        let registry = GenerationRegistry::new();
        assert_eq!(registry.current(&Scope::Global), 0);
    }

    #[test]
    fn bump_is_monotonic() {
        let registry = GenerationRegistry::new();
        let first = registry.bump(&Scope::Global);
        let second = registry.bump(&Scope::Global);
        assert_eq!(first.generation, 1);
        assert_eq!(second.generation, 2);
        assert!(!first.wrapped && !second.wrapped);
    }

    #[test]
    fn scopes_are_independent() {
        let registry = GenerationRegistry::new();
        registry.bump(&Scope::Global);
        let doc_scope = Scope::object("doc", "budget");
        assert_eq!(registry.current(&doc_scope), 0);
        registry.bump(&doc_scope);
        assert_eq!(registry.current(&doc_scope), 1);
        assert_eq!(registry.current(&Scope::Global), 1);
    }

    #[test]
    fn wraps_past_u16_max_without_aliasing() {
        let registry = GenerationRegistry::new();
        {
            let mut counters = registry.counters.lock();
            counters.insert(GenerationRegistry::map_key(&Scope::Global), u16::MAX);
        }
        let result = registry.bump(&Scope::Global);
        assert_eq!(result.generation, 1);
        assert!(result.wrapped);
    }
}
