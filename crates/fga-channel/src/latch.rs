//! Wakeup abstraction the channel waits on.
//!
//! The real host (see `fga_core::host::HostEnv`) provides a wait-latch
//! primitive backed by a process-wide signal; this crate only needs the
//! narrow interface below so it can stay free of any host dependency.

use std::time::Duration;

/// Outcome of a bounded [`Latch::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    TimedOut,
}

pub trait Latch: Send + Sync {
    /// Blocks until `set` is called from another thread/process, or `timeout`
    /// elapses. A `None` timeout waits indefinitely.
    fn wait(&self, timeout: Option<Duration>) -> WaitOutcome;

    /// Wakes exactly one waiter (or primes the latch so the next `wait`
    /// returns immediately, if no one is currently waiting).
    fn set(&self);
}

/// `Condvar`-backed latch usable outside a real host environment — the
/// default for tests and for any embedding that has no external latch
/// registry to delegate to.
#[derive(Default)]
pub struct CondvarLatch {
    state: parking_lot::Mutex<bool>,
    condvar: parking_lot::Condvar,
}

impl CondvarLatch {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Latch for CondvarLatch {
    fn wait(&self, timeout: Option<Duration>) -> WaitOutcome {
        let mut signaled = self.state.lock();
        if *signaled {
            *signaled = false;
            return WaitOutcome::Signaled;
        }
        match timeout {
            Some(d) => {
                let result = self.condvar.wait_for(&mut signaled, d);
                if *signaled {
                    *signaled = false;
                    WaitOutcome::Signaled
                } else if result.timed_out() {
                    WaitOutcome::TimedOut
                } else {
                    WaitOutcome::TimedOut
                }
            }
            None => {
                self.condvar.wait(&mut signaled);
                *signaled = false;
                WaitOutcome::Signaled
            }
        }
    }

    fn set(&self) {
        let mut signaled = self.state.lock();
        *signaled = true;
        self.condvar.notify_one();
    }
}
