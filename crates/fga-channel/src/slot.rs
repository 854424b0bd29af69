//! The reusable request/response record and its five-state lifecycle.
//!
//! A two-state, polling-based draft of this same idea exists elsewhere in
//! the pipeline's history; it is not implemented here. The slot below is the
//! latch-based, five-state design: `Empty -> Pending -> Processing ->
//! {Done | Error} -> Empty`.

use fga_proto::{RequestVariant, Response};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotState {
    Empty = 0,
    Pending = 1,
    Processing = 2,
    Done = 3,
    Error = 4,
}

impl SlotState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Empty,
            1 => Self::Pending,
            2 => Self::Processing,
            3 => Self::Done,
            4 => Self::Error,
            other => unreachable!("invalid slot state byte {other}"),
        }
    }
}

/// Mutable payload fields. A slot is in at most one data structure (free
/// list or ready-queue) at a time; the payload mutex exists only to satisfy
/// the borrow checker across the producer/consumer handoff, not to arbitrate
/// contention — the state machine already guarantees a single mutator at any
/// given moment.
#[derive(Default)]
struct SlotPayload {
    producer_id: u64,
    request_id: u64,
    request: Option<RequestVariant>,
    response: Option<Response>,
}

pub struct Slot {
    state: AtomicU8,
    /// Intrusive free-list link: the index of the next free slot, or `-1` at
    /// the tail. Mutated only while the channel's single mutex is held.
    next_free: AtomicI64,
    payload: Mutex<SlotPayload>,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(SlotState::Empty as u8),
            next_free: AtomicI64::new(-1),
            payload: Mutex::new(SlotPayload::default()),
        }
    }
}

impl Slot {
    pub fn state(&self) -> SlotState {
        SlotState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn next_free(&self) -> i64 {
        self.next_free.load(Ordering::Relaxed)
    }

    pub(crate) fn set_next_free(&self, next: i64) {
        self.next_free.store(next, Ordering::Relaxed);
    }

    /// Atomically transitions `Empty -> Pending`, the acquire step. Returns
    /// `false` if the slot was not Empty (the caller should never see this
    /// for a slot it just popped off the free list).
    pub(crate) fn try_acquire(&self) -> bool {
        self.state
            .compare_exchange(
                SlotState::Empty as u8,
                SlotState::Pending as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Fills the request payload. Must only be called by the owning producer
    /// between `try_acquire` succeeding and the slot being enqueued.
    pub fn fill_request(&self, producer_id: u64, request_id: u64, request: RequestVariant) {
        let mut payload = self.payload.lock();
        payload.producer_id = producer_id;
        payload.request_id = request_id;
        payload.request = Some(request);
    }

    pub fn producer_id(&self) -> u64 {
        self.payload.lock().producer_id
    }

    pub fn request_id(&self) -> u64 {
        self.payload.lock().request_id
    }

    /// Consumer-side: transitions `Pending -> Processing` and takes the
    /// request payload, or returns `None` if the slot was reset out from
    /// under it by a producer cancellation.
    pub fn begin_processing(&self) -> Option<RequestVariant> {
        let ok = self
            .state
            .compare_exchange(
                SlotState::Pending as u8,
                SlotState::Processing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !ok {
            return None;
        }
        self.payload.lock().request.take()
    }

    /// Consumer-side: writes the response and transitions to `Done` or
    /// `Error`. A no-op (returns `false`) if the slot is no longer
    /// `Processing` — the producer cancelled and the slot was already reset;
    /// the result must be discarded rather than written into a slot the
    /// producer no longer owns.
    pub fn complete(&self, response: Response, ok: bool) -> bool {
        let current = self.state.load(Ordering::Acquire);
        if current != SlotState::Processing as u8 {
            return false;
        }
        self.payload.lock().response = Some(response);
        let target = if ok { SlotState::Done } else { SlotState::Error };
        self.state.store(target as u8, Ordering::Release);
        true
    }

    /// Producer-side: takes the response after observing `Done`/`Error`.
    pub fn take_response(&self) -> Option<Response> {
        self.payload.lock().response.take()
    }

    /// Resets the slot to `Empty` unconditionally and clears its payload.
    /// Used both by a normal release and by a cancelled producer wait, which
    /// must reclaim the slot regardless of its current state.
    pub(crate) fn reset(&self) {
        let mut payload = self.payload.lock();
        payload.producer_id = 0;
        payload.request_id = 0;
        payload.request = None;
        payload.response = None;
        drop(payload);
        self.state.store(SlotState::Empty as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fga_proto::Tuple;

    fn tuple() -> Tuple {
        Tuple::new("doc", "budget", "viewer", "user", "anne").unwrap()
    }

    #[test]
    fn lifecycle_happy_path() {
        let slot = Slot::default();
        assert_eq!(slot.state(), SlotState::Empty);
        assert!(slot.try_acquire());
        assert_eq!(slot.state(), SlotState::Pending);

        slot.fill_request(7, 1, RequestVariant::CheckTuple {
            store_id: None,
            model_id: None,
            tuple: tuple(),
        });

        let taken = slot.begin_processing();
        assert!(taken.is_some());
        assert_eq!(slot.state(), SlotState::Processing);

        let completed = slot.complete(Response::ok(fga_proto::ResponseBody::CheckTuple { allowed: true }), true);
        assert!(completed);
        assert_eq!(slot.state(), SlotState::Done);

        assert!(slot.take_response().is_some());
        slot.reset();
        assert_eq!(slot.state(), SlotState::Empty);
    }

    #[test]
    fn complete_after_reset_is_discarded() {
        let slot = Slot::default();
        slot.try_acquire();
        slot.begin_processing();
        slot.reset();
        let completed = slot.complete(Response::ok(fga_proto::ResponseBody::None), true);
        assert!(!completed, "a completion racing a cancel must be discarded, not written");
    }

    #[test]
    fn double_acquire_fails() {
        let slot = Slot::default();
        assert!(slot.try_acquire());
        assert!(!slot.try_acquire());
    }
}
