//! Host boundary: the narrow set of operations this crate needs from
//! whatever process embeds it — a wait-latch primitive, a named shared-lock
//! registry, a configuration lookup, and leveled logging.
//!
//! A real PostgreSQL extension glue layer would back [`HostEnv`] with the
//! backend's actual latch/LWLock/GUC APIs. [`StdHostEnv`] backs it with
//! `parking_lot` primitives and `tracing` logging instead, so the crate is
//! fully usable and testable standalone.

use fga_channel::{CondvarLatch, Latch, WaitOutcome};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Identifies one latch in the host's registry: `Producer(id)` for a query
/// worker's own wakeup, `Consumer` for the single long-lived worker's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LatchId {
    Producer(u64),
    Consumer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchWait {
    Signaled,
    TimedOut,
    /// The host detected the long-lived consumer process has died; callers
    /// must stop waiting rather than block forever.
    PostmasterDied,
}

impl From<WaitOutcome> for LatchWait {
    fn from(o: WaitOutcome) -> Self {
        match o {
            WaitOutcome::Signaled => Self::Signaled,
            WaitOutcome::TimedOut => Self::TimedOut,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// A stand-in for a held named lock. `StdHostEnv`'s shared-lock registry is
/// a thin placeholder for the host's actual LWLock registry — the real
/// PostgreSQL glue layer would hand back a genuine reader/writer guard here.
/// Nothing in this crate's own caches or channel depends on it; they carry
/// their own `parking_lot` locks directly, since shared state here is
/// modeled as a single `Arc` rather than an actual shmem segment. Kept only
/// so `HostEnv`'s shape matches the host interop boundary this crate
/// expects to be embedded behind.
pub struct SharedLockHandle {
    _name: Arc<Mutex<()>>,
}

pub trait HostEnv: Send + Sync {
    fn wait_latch(&self, latch: LatchId, timeout: Option<Duration>) -> LatchWait;
    fn set_latch(&self, latch: LatchId);
    fn shared_lock_shared(&self, name: &str) -> SharedLockHandle;
    fn shared_lock_exclusive(&self, name: &str) -> SharedLockHandle;
    fn config_get(&self, key: &str) -> Option<String>;
    fn log(&self, level: LogLevel, target: &str, message: &str);

    /// Resolves the latch registered for `latch`, creating it on first use.
    /// Needed by the channel layer, which only knows about [`Latch`]
    /// trait objects, not [`LatchId`]s.
    fn latch_handle(&self, latch: LatchId) -> Arc<dyn Latch>;
}

/// Standalone [`HostEnv`] usable outside a real database backend: a
/// `parking_lot`-guarded latch registry, a flat config map, and `tracing`
/// for logging.
pub struct StdHostEnv {
    latches: RwLock<std::collections::HashMap<LatchId, Arc<CondvarLatch>>>,
    locks: RwLock<std::collections::HashMap<String, Arc<Mutex<()>>>>,
    config: BTreeMap<String, String>,
}

impl StdHostEnv {
    pub fn new(config: BTreeMap<String, String>) -> Self {
        Self {
            latches: RwLock::new(std::collections::HashMap::new()),
            locks: RwLock::new(std::collections::HashMap::new()),
            config,
        }
    }

    fn latch_for(&self, id: LatchId) -> Arc<CondvarLatch> {
        if let Some(latch) = self.latches.read().get(&id) {
            return Arc::clone(latch);
        }
        let mut latches = self.latches.write();
        Arc::clone(latches.entry(id).or_insert_with(|| Arc::new(CondvarLatch::new())))
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().get(name) {
            return Arc::clone(lock);
        }
        let mut locks = self.locks.write();
        Arc::clone(locks.entry(name.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))))
    }
}

impl HostEnv for StdHostEnv {
    fn wait_latch(&self, latch: LatchId, timeout: Option<Duration>) -> LatchWait {
        self.latch_for(latch).wait(timeout).into()
    }

    fn set_latch(&self, latch: LatchId) {
        self.latch_for(latch).set();
    }

    fn shared_lock_shared(&self, name: &str) -> SharedLockHandle {
        SharedLockHandle { _name: self.lock_for(name) }
    }

    fn shared_lock_exclusive(&self, name: &str) -> SharedLockHandle {
        self.shared_lock_shared(name)
    }

    fn config_get(&self, key: &str) -> Option<String> {
        self.config.get(key).cloned()
    }

    fn log(&self, level: LogLevel, target: &str, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "fga", %target, "{message}"),
            LogLevel::Info => tracing::info!(target: "fga", %target, "{message}"),
            LogLevel::Warning => tracing::warn!(target: "fga", %target, "{message}"),
            LogLevel::Error => tracing::error!(target: "fga", %target, "{message}"),
        }
    }

    fn latch_handle(&self, latch: LatchId) -> Arc<dyn Latch> {
        self.latch_for(latch)
    }
}
