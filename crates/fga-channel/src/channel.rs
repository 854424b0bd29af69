//! Producer(many)/consumer(one) request/response channel: a fixed-size slot
//! pool plus a power-of-two index ring, both guarded by a single mutex.
//!
//! No cache lock is ever held while this lock is held, and vice versa.

use crate::error::ChannelError;
use crate::latch::{Latch, WaitOutcome};
use crate::ring::RingQueue;
use crate::slot::{Slot, SlotState};
use fga_proto::Response;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

struct Inner {
    ring: RingQueue,
    /// Head of the intrusive free list, or `-1` when empty.
    free_head: i64,
}

/// The channel. `capacity` slots, `capacity` ring entries — one ring slot
/// covers at most one in-flight request per pool entry.
pub struct Channel {
    slots: Vec<Slot>,
    inner: Mutex<Inner>,
    consumer_latch: Arc<dyn Latch>,
}

impl Channel {
    pub fn new(capacity: usize, consumer_latch: Arc<dyn Latch>) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(Slot::default());
        }
        // Thread the intrusive free list through every slot up front: 0 -> 1
        // -> ... -> capacity-1 -> -1.
        for i in 0..capacity {
            let next = if i + 1 < capacity { i as i64 + 1 } else { -1 };
            slots[i].set_next_free(next);
        }
        Self {
            slots,
            inner: Mutex::new(Inner {
                ring: RingQueue::new(capacity),
                free_head: if capacity > 0 { 0 } else { -1 },
            }),
            consumer_latch,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> &Slot {
        &self.slots[index]
    }

    /// Pops a slot off the free list and transitions it `Empty -> Pending`.
    pub fn acquire(&self) -> Result<usize, ChannelError> {
        let mut inner = self.inner.lock();
        if inner.free_head < 0 {
            return Err(ChannelError::NoFreeSlot);
        }
        let index = inner.free_head as usize;
        inner.free_head = self.slots[index].next_free();
        drop(inner);

        let acquired = self.slots[index].try_acquire();
        debug_assert!(acquired, "slot popped from the free list must be Empty");
        Ok(index)
    }

    /// Writes `slot_index` into the ring. The slot must already hold its
    /// request payload and be `Pending`.
    pub fn enqueue(&self, slot_index: usize) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock();
        inner.ring.push(slot_index)
    }

    pub fn signal_consumer(&self) {
        self.consumer_latch.set();
    }

    /// Consumer-side: pops up to `max` slot indices in FIFO order.
    pub fn drain(&self, max: usize) -> Vec<usize> {
        self.inner.lock().ring.drain(max)
    }

    /// Blocks the consumer until at least one entry is queued or `timeout`
    /// elapses, then drains up to `max`.
    pub fn wait_and_drain(&self, max: usize, timeout: Option<Duration>) -> Vec<usize> {
        loop {
            let drained = self.drain(max);
            if !drained.is_empty() {
                return drained;
            }
            if self.consumer_latch.wait(timeout) == WaitOutcome::TimedOut && timeout.is_some() {
                return Vec::new();
            }
        }
    }

    /// Returns a slot to the free list. A no-op if the slot is already
    /// `Empty` (idempotent release).
    pub fn release(&self, slot_index: usize) {
        if self.slots[slot_index].state() == SlotState::Empty {
            return;
        }
        self.slots[slot_index].reset();
        let mut inner = self.inner.lock();
        self.slots[slot_index].set_next_free(inner.free_head);
        inner.free_head = slot_index as i64;
    }

    /// Producer-side wait for completion. Re-checks the slot's state on every
    /// wake rather than trusting the wakeup reason, since spurious wakes and
    /// lost signals are both possible. `cancelled` is polled on every
    /// iteration; when it reports true the slot is released unconditionally
    /// and [`ChannelError::Cancelled`] is returned, without consuming a
    /// response even if one has since arrived.
    ///
    /// `timeout` bounds the total wait, not each individual latch wake: a
    /// producer's latch is keyed by its own id (see `LatchId::Producer`),
    /// not by slot, so a wake here can belong to a *different* in-flight
    /// request on the same producer. Measuring against a fixed deadline
    /// rather than re-arming `timeout` on every wake keeps such a wake from
    /// resetting how long this call is willing to wait.
    pub fn wait_for_completion(
        &self,
        slot_index: usize,
        producer_latch: &dyn Latch,
        timeout: Option<Duration>,
        mut cancelled: impl FnMut() -> bool,
    ) -> Result<Response, ChannelError> {
        let deadline = timeout.map(|d| std::time::Instant::now() + d);
        loop {
            match self.slots[slot_index].state() {
                SlotState::Done | SlotState::Error => {
                    let response = self.slots[slot_index]
                        .take_response()
                        .expect("Done/Error slot always carries a response");
                    self.release(slot_index);
                    return Ok(response);
                }
                _ => {}
            }
            if cancelled() {
                self.release(slot_index);
                return Err(ChannelError::Cancelled);
            }
            let remaining = match deadline {
                Some(dl) => {
                    let now = std::time::Instant::now();
                    if now >= dl {
                        self.release(slot_index);
                        return Err(ChannelError::TimedOut);
                    }
                    Some(dl - now)
                }
                None => None,
            };
            let _ = producer_latch.wait(remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::latch::CondvarLatch;
    use fga_proto::{RequestVariant, ResponseBody, Tuple};
    use std::sync::Arc;

    fn tuple() -> Tuple {
        Tuple::new("doc", "budget", "viewer", "user", "anne").unwrap()
    }

    fn request() -> RequestVariant {
        RequestVariant::CheckTuple {
            store_id: None,
            model_id: None,
            tuple: tuple(),
        }
    }

    #[test]
    fn acquire_enqueue_drain_round_trip() {
        let channel = Channel::new(4, Arc::new(CondvarLatch::new()));
        let idx = channel.acquire().unwrap();
        channel.slot(idx).fill_request(1, 1, request());
        channel.enqueue(idx).unwrap();
        assert_eq!(channel.drain(8), vec![idx]);
    }

    #[test]
    fn all_slots_acquired_then_next_acquire_fails() {
        let channel = Channel::new(2, Arc::new(CondvarLatch::new()));
        channel.acquire().unwrap();
        channel.acquire().unwrap();
        assert!(matches!(channel.acquire(), Err(ChannelError::NoFreeSlot)));
    }

    #[test]
    fn release_frees_a_slot_for_reuse() {
        let channel = Channel::new(1, Arc::new(CondvarLatch::new()));
        let idx = channel.acquire().unwrap();
        assert!(matches!(channel.acquire(), Err(ChannelError::NoFreeSlot)));
        channel.release(idx);
        assert_eq!(channel.acquire().unwrap(), idx);
    }

    #[test]
    fn releasing_an_empty_slot_is_a_no_op() {
        let channel = Channel::new(1, Arc::new(CondvarLatch::new()));
        let idx = channel.acquire().unwrap();
        channel.release(idx);
        channel.release(idx);
        assert_eq!(channel.acquire().unwrap(), idx);
    }

    #[test]
    fn queue_capacity_minus_one_then_recovers_after_one_dequeue() {
        let channel = Channel::new(4, Arc::new(CondvarLatch::new()));
        let mut indices = Vec::new();
        for _ in 0..3 {
            let idx = channel.acquire().unwrap();
            channel.slot(idx).fill_request(1, 1, request());
            channel.enqueue(idx).unwrap();
            indices.push(idx);
        }
        let overflow_slot = channel.acquire().unwrap();
        assert!(matches!(channel.enqueue(overflow_slot), Err(ChannelError::QueueFull)));

        assert_eq!(channel.drain(1), vec![indices[0]]);
        assert!(channel.enqueue(overflow_slot).is_ok());
    }

    #[test]
    fn cancellation_releases_the_slot_and_later_completion_is_discarded() {
        let channel = Channel::new(1, Arc::new(CondvarLatch::new()));
        let idx = channel.acquire().unwrap();
        channel.slot(idx).fill_request(1, 1, request());
        channel.enqueue(idx).unwrap();
        channel.drain(1);
        channel.slot(idx).begin_processing();

        let producer_latch = CondvarLatch::new();
        let result = channel.wait_for_completion(
            idx,
            &producer_latch,
            Some(std::time::Duration::from_millis(1)),
            || true,
        );
        assert!(matches!(result, Err(ChannelError::Cancelled)));
        assert_eq!(channel.slot(idx).state(), SlotState::Empty);

        let completed = channel.slot(idx).complete(
            Response::ok(ResponseBody::CheckTuple { allowed: true }),
            true,
        );
        assert!(!completed, "a stale completion racing a cancel must be discarded");
    }

    #[test]
    fn repeated_spurious_wakes_do_not_reset_the_deadline() {
        let channel = Channel::new(1, Arc::new(CondvarLatch::new()));
        let idx = channel.acquire().unwrap();
        channel.slot(idx).fill_request(1, 1, request());
        channel.enqueue(idx).unwrap();
        // Leave the slot Pending (never drained/completed) so the wait can
        // only end via the deadline or cancellation.

        let producer_latch = Arc::new(CondvarLatch::new());
        let waker = Arc::clone(&producer_latch);
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let stop_waker = Arc::clone(&stop);
        // Simulate a sibling request on the same producer id waking this
        // latch far more often than the configured timeout.
        let spam = std::thread::spawn(move || {
            while !stop_waker.load(std::sync::atomic::Ordering::Relaxed) {
                waker.set();
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
        });

        let start = std::time::Instant::now();
        let result = channel.wait_for_completion(
            idx,
            producer_latch.as_ref(),
            Some(std::time::Duration::from_millis(50)),
            || false,
        );
        let elapsed = start.elapsed();
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
        spam.join().unwrap();

        assert!(matches!(result, Err(ChannelError::TimedOut)));
        assert!(
            elapsed < std::time::Duration::from_millis(500),
            "constant spurious wakes must not keep resetting the deadline, took {elapsed:?}"
        );
    }

    #[test]
    fn fifo_per_producer() {
        let channel = Channel::new(8, Arc::new(CondvarLatch::new()));
        let first = channel.acquire().unwrap();
        channel.slot(first).fill_request(1, 1, request());
        channel.enqueue(first).unwrap();
        let second = channel.acquire().unwrap();
        channel.slot(second).fill_request(1, 2, request());
        channel.enqueue(second).unwrap();

        assert_eq!(channel.drain(8), vec![first, second]);
    }
}
