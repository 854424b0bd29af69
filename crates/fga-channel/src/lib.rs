//! Fixed-capacity slot pool + power-of-two index ring used as the
//! request/response channel between query workers (producers, many) and the
//! long-lived worker process (consumer, one). Guarded by a single mutex —
//! deliberately not the lock-free per-producer design this crate's name
//! might suggest from elsewhere in the pipeline's history.

pub mod channel;
pub mod error;
pub mod latch;
pub mod ring;
pub mod slot;

pub use channel::Channel;
pub use error::ChannelError;
pub use latch::{CondvarLatch, Latch, WaitOutcome};
pub use ring::RingQueue;
pub use slot::{Slot, SlotState};
