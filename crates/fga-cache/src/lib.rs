//! Two-level authorization-check cache: a per-worker [`L1Cache`] backed by a
//! shared [`L2Cache`], both invalidated lazily through a [`GenerationRegistry`].
//!
//! Neither cache layer knows about generations directly — callers read the
//! relevant [`Scope`]'s current generation from the registry before a lookup
//! and pass it in, and bump the registry (never the caches) on a write.

mod generation;
mod l1;
mod l2;

pub use generation::{BumpResult, GenerationRegistry, Scope};
pub use l1::L1Cache;
pub use l2::L2Cache;
