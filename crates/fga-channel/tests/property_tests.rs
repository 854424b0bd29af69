//! Property-based tests over the slot pool + ring queue, covering the
//! boundary behaviors and ordering guarantees the channel must uphold
//! regardless of the sequence of acquire/enqueue/drain/release calls thrown
//! at it.

use fga_channel::latch::CondvarLatch;
use fga_channel::{Channel, ChannelError};
use fga_proto::{RequestVariant, Tuple};
use proptest::prelude::*;
use std::sync::Arc;

fn request(n: u64) -> RequestVariant {
    RequestVariant::CheckTuple {
        store_id: None,
        model_id: None,
        tuple: Tuple::new("doc", &format!("doc-{n}"), "viewer", "user", "anne").unwrap(),
    }
}

fn new_channel(capacity: usize) -> Channel {
    Channel::new(capacity, Arc::new(CondvarLatch::new()))
}

proptest! {
    /// Queue length never exceeds `capacity - 1`, regardless of how many
    /// acquire/enqueue/drain operations run in sequence.
    #[test]
    fn queue_never_exceeds_capacity_minus_one(ops in prop::collection::vec(0u8..3, 0..200)) {
        let capacity = 16;
        let channel = new_channel(capacity);
        let mut queued = Vec::new();

        for (i, op) in ops.into_iter().enumerate() {
            match op {
                0 => {
                    if let Ok(idx) = channel.acquire() {
                        channel.slot(idx).fill_request(1, i as u64, request(i as u64));
                        if channel.enqueue(idx).is_ok() {
                            queued.push(idx);
                        } else {
                            channel.release(idx);
                        }
                    }
                }
                1 => {
                    if let Some(idx) = channel.drain(1).into_iter().next() {
                        prop_assert_eq!(Some(idx), queued.first().copied());
                        queued.remove(0);
                        channel.release(idx);
                    }
                }
                _ => {}
            }
            prop_assert!(queued.len() <= capacity - 1);
        }
    }

    /// A single producer's requests are always drained in the order they
    /// were enqueued, no matter how many other acquire/release cycles are
    /// interleaved by other (simulated) producers in between.
    #[test]
    fn fifo_per_producer_holds_under_interleaving(noise in 0usize..20) {
        let channel = new_channel(32);

        // Unrelated churn from other producers before and after.
        for i in 0..noise {
            if let Ok(idx) = channel.acquire() {
                channel.slot(idx).fill_request(99, i as u64, request(1000 + i as u64));
                let _ = channel.enqueue(idx);
            }
        }
        let before = channel.drain(noise);
        for idx in before {
            channel.release(idx);
        }

        let mut mine = Vec::new();
        for i in 0..5u64 {
            let idx = channel.acquire().unwrap();
            channel.slot(idx).fill_request(1, i, request(i));
            channel.enqueue(idx).unwrap();
            mine.push(idx);
        }

        let drained = channel.drain(5);
        prop_assert_eq!(drained, mine);
    }
}

#[test]
fn all_slots_acquired_then_next_acquire_fails_then_recovers() {
    let channel = new_channel(8);
    let mut acquired = Vec::new();
    for _ in 0..8 {
        acquired.push(channel.acquire().unwrap());
    }
    assert!(matches!(channel.acquire(), Err(ChannelError::NoFreeSlot)));

    channel.release(acquired[0]);
    assert_eq!(channel.acquire().unwrap(), acquired[0]);
}
